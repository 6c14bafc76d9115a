//! Message handles: tag-addressed access to the fields of a wire-encoded
//! message.
//!
//! A message is a descriptor plus a part spanning its payload. The root
//! message wraps the whole journal buffer; nested messages wrap a
//! submessage payload. Fields are located lazily by scanning, never
//! cached, so a message handle stays cheap to copy and survives
//! mutations made through other handles.

use crate::cursor::Cursor;
use crate::descriptor::{FieldDescriptor, FieldType, Label, MessageDescriptor};
use crate::error::Error;
use crate::journal::Journal;
use crate::part::{Diff, Offset, Part};
use crate::value::Value;
use crate::wire::{self, WireType};

/// A handle onto one message within a journal.
#[derive(Debug, Copy, Clone)]
pub struct Message {
    descriptor: &'static MessageDescriptor,
    part: Part,
}

impl Message {
    /// Creates the root message spanning the journal's whole buffer.
    pub fn new(descriptor: &'static MessageDescriptor, journal: &Journal<'_>) -> Self {
        Message {
            descriptor,
            part: Part::from_journal(journal),
        }
    }

    /// Wraps an existing part, e.g. a submessage payload.
    pub(crate) fn from_part(descriptor: &'static MessageDescriptor, part: Part) -> Self {
        Message { descriptor, part }
    }

    /// The message's descriptor.
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Whether the handle is usable.
    pub fn valid(&self) -> bool {
        self.part.valid()
    }

    /// The sticky error state, if any.
    pub fn error(&self) -> Option<Error> {
        self.part.error()
    }

    pub(crate) fn align_part(&mut self, journal: &Journal<'_>) -> Result<(), Error> {
        self.part.align(journal)
    }

    pub(crate) fn part_offset(&self) -> Offset {
        self.part.offset()
    }

    /// Whether at least one occurrence of the field is present. A packed
    /// repeated field counts as present only when it holds elements.
    pub fn has(&mut self, journal: &Journal<'_>, tag: u32) -> Result<bool, Error> {
        self.align_part(journal)?;
        let mut cursor = Cursor::new(*self, tag);
        cursor.next(journal)
    }

    /// Reads the first occurrence of the field.
    ///
    /// Returns the declared default when the field is absent, without
    /// touching the buffer — unlike [`crate::Field::create`], which
    /// materializes the default. Fails with [`Error::Absent`] when there
    /// is no default. Message-typed fields cannot be read as values;
    /// open them with [`Message::create_within`].
    pub fn get<'j>(&mut self, journal: &'j Journal<'_>, tag: u32) -> Result<Value<'j>, Error> {
        self.align_part(journal)?;
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        if descriptor.typ == FieldType::Message {
            return Err(Error::Descriptor);
        }
        let mut cursor = Cursor::new(*self, tag);
        if cursor.next(journal)? {
            cursor.get(journal)
        } else {
            descriptor.default.ok_or(Error::Absent)
        }
    }

    /// Writes a value to the field.
    ///
    /// Singular fields are rewritten in place, or appended when absent.
    /// Repeated fields gain a new occurrence on every call; packed
    /// repeated fields gain a new element at the end of their payload.
    pub fn put(
        &mut self,
        journal: &mut Journal<'_>,
        tag: u32,
        value: &Value<'_>,
    ) -> Result<(), Error> {
        self.align_part(journal)?;
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        if descriptor.typ == FieldType::Message {
            return Err(Error::Descriptor);
        }
        if !value.fits(descriptor.typ) {
            return Err(Error::Descriptor);
        }

        if descriptor.packed() {
            let mut cursor = Cursor::new(*self, tag);
            if cursor.next(journal)? {
                return cursor.append_packed(journal, value);
            }
        } else if descriptor.label != Label::Repeated {
            let mut cursor = Cursor::new(*self, tag);
            if cursor.next(journal)? {
                return cursor.put(journal, value);
            }
        }
        self.append_value(journal, descriptor, value).map(|_| ())
    }

    /// Tests the first occurrence of the field against a value without
    /// copying it out. Absent fields match their declared default.
    pub fn matches(
        &mut self,
        journal: &Journal<'_>,
        tag: u32,
        value: &Value<'_>,
    ) -> Result<bool, Error> {
        match self.get(journal, tag) {
            Ok(present) => Ok(present == *value),
            Err(Error::Absent) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Erases every occurrence of the field. Erasing an absent field is a
    /// no-op and leaves the journal version unchanged.
    pub fn erase(&mut self, journal: &mut Journal<'_>, tag: u32) -> Result<(), Error> {
        self.align_part(journal)?;
        let mut cursor = Cursor::new(*self, tag);
        while cursor.next(journal)? {
            cursor.erase(journal)?;
        }
        self.align_part(journal)
    }

    /// Erases all fields, leaving the message present but empty.
    pub fn clear(&mut self, journal: &mut Journal<'_>) -> Result<(), Error> {
        self.part.clear(journal)
    }

    /// The raw payload bytes of the first occurrence of the field. For a
    /// packed repeated field this is the whole packed payload.
    pub fn raw<'j>(&mut self, journal: &'j Journal<'_>, tag: u32) -> Result<&'j [u8], Error> {
        self.align_part(journal)?;
        let mut cursor = Cursor::new(*self, tag);
        if !cursor.next(journal)? {
            return Err(Error::Absent);
        }
        cursor.raw_field(journal)
    }

    /// Opens a nested message field, creating an empty one when absent.
    /// A repeated message field gains a new occurrence on every call.
    pub fn create_within(
        &mut self,
        journal: &mut Journal<'_>,
        tag: u32,
    ) -> Result<Message, Error> {
        self.align_part(journal)?;
        let descriptor = self.descriptor.field_by_tag(tag).ok_or(Error::Descriptor)?;
        let nested = descriptor.message().ok_or(Error::Descriptor)?;

        if descriptor.label != Label::Repeated {
            let mut cursor = Cursor::new(*self, tag);
            if cursor.next(journal)? {
                return cursor.message();
            }
        }
        let part = self.append_value(journal, descriptor, &Value::Bytes(&[]))?;
        Ok(Message::from_part(nested, part))
    }

    /// Resolves a path of nested submessage tags in one call, creating
    /// empty messages along the way where needed.
    pub fn create_nested(
        &mut self,
        journal: &mut Journal<'_>,
        tags: &[u32],
    ) -> Result<Message, Error> {
        let (&first, rest) = tags.split_first().ok_or(Error::Invalid)?;
        let mut message = self.create_within(journal, first)?;
        for &tag in rest {
            message = message.create_within(journal, tag)?;
        }
        Ok(message)
    }

    /// Validates the message against its descriptor, recursively: every
    /// required field present, at most one member per oneof group, every
    /// enum occurrence within the declared values. Returns the first
    /// violation.
    pub fn check(&mut self, journal: &Journal<'_>) -> Result<(), Error> {
        self.align_part(journal)?;
        let mut oneof_seen: Vec<usize> = Vec::new();
        for field in self.descriptor.iter() {
            let present = self.has(journal, field.tag)?;
            match field.label {
                Label::Required if !present => return Err(Error::Absent),
                Label::Oneof(group) if present => {
                    if oneof_seen.contains(&group) {
                        return Err(Error::Descriptor);
                    }
                    oneof_seen.push(group);
                }
                _ => {}
            }
            if !present {
                continue;
            }
            match field.typ {
                FieldType::Enum => {
                    let declared = field.enumeration().ok_or(Error::Descriptor)?;
                    let mut cursor = Cursor::new(*self, field.tag);
                    while cursor.next(journal)? {
                        let number = cursor
                            .get(journal)?
                            .as_enum()
                            .ok_or(Error::Descriptor)?;
                        if declared.value_by_number(number).is_none() {
                            return Err(Error::Descriptor);
                        }
                    }
                }
                FieldType::Message => {
                    let mut cursor = Cursor::new(*self, field.tag);
                    while cursor.next(journal)? {
                        cursor.message()?.check(journal)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Appends a freshly encoded field at the end of the message payload
    /// and returns a part over its value window.
    pub(crate) fn append_value(
        &mut self,
        journal: &mut Journal<'_>,
        descriptor: &'static FieldDescriptor,
        value: &Value<'_>,
    ) -> Result<Part, Error> {
        self.align_part(journal)?;
        let offset = self.part.offset();
        let origin = offset.start;
        let at = offset.end;

        let mut bytes = Vec::new();
        wire::write_varint32(&mut bytes, wire::make_key(descriptor.tag, descriptor.wire_type()));
        let key_len = bytes.len();
        let mut prefix_len = 0;
        match descriptor.wire_type() {
            WireType::LengthDelimited => {
                let mut payload = Vec::new();
                value.encode(&mut payload);
                let before = bytes.len();
                wire::write_varint64(&mut bytes, payload.len() as u64);
                prefix_len = bytes.len() - before;
                bytes.extend_from_slice(&payload);
            }
            _ => value.encode(&mut bytes),
        }

        let stamp = journal.version() + 1;
        journal.write(origin, at, at, &bytes)?;
        self.align_part(journal)?;

        // The window as it stood right after the append entry; aligning
        // replays any prefix rewrites the append cascaded into.
        let value_start = at + key_len + prefix_len;
        let value_end = at + bytes.len();
        let mut part = Part::with_version(
            stamp,
            Offset {
                start: value_start,
                end: value_end,
                diff: Diff {
                    origin: origin as isize - value_start as isize,
                    tag: at as isize - value_start as isize,
                    length: if prefix_len > 0 {
                        (at + key_len) as isize - value_start as isize
                    } else {
                        0
                    },
                },
            },
        );
        part.align(journal)?;
        Ok(part)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_util::{person_bytes, PERSON};

    #[test]
    fn build_person_by_journal_puts() -> Result<()> {
        let mut journal = Journal::new();
        let mut person = Message::new(&PERSON, &journal);

        person.put(&mut journal, 1, &Value::String("John Doe"))?;
        person.put(&mut journal, 2, &Value::Int32(1234))?;
        person.put(&mut journal, 3, &Value::String("jdoe@example.com"))?;

        let mut home = person.create_within(&mut journal, 4)?;
        home.put(&mut journal, 1, &Value::String("+1-541-754-3010"))?;
        home.put(&mut journal, 2, &Value::Enum(1))?;

        let mut mobile = person.create_within(&mut journal, 4)?;
        mobile.put(&mut journal, 1, &Value::String("+1-541-293-8228"))?;
        mobile.put(&mut journal, 2, &Value::Enum(0))?;

        assert_eq!(journal.data(), person_bytes().as_slice());
        Ok(())
    }

    #[test]
    fn in_place_update_keeps_siblings() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        // 9999 encodes in the same two varint bytes as 1234, so the
        // buffer keeps its size.
        let before = journal.len();
        person.put(&mut journal, 2, &Value::Int32(9999))?;
        assert_eq!(journal.len(), before);
        assert_eq!(journal.version(), 0);

        assert_eq!(person.get(&journal, 2)?, Value::Int32(9999));
        assert_eq!(person.get(&journal, 1)?, Value::String("John Doe"));
        assert_eq!(person.get(&journal, 3)?, Value::String("jdoe@example.com"));
        Ok(())
    }

    #[test]
    fn resizing_update_shifts_siblings() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        person.put(&mut journal, 1, &Value::String("Jane"))?;
        assert_eq!(person.get(&journal, 1)?, Value::String("Jane"));
        assert_eq!(person.get(&journal, 2)?, Value::Int32(1234));
        assert_eq!(person.get(&journal, 3)?, Value::String("jdoe@example.com"));
        assert_eq!(journal.len(), person_bytes().len() - 4);
        Ok(())
    }

    #[test]
    fn erase_is_idempotent() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        person.erase(&mut journal, 3)?;
        assert!(!person.has(&journal, 3)?);
        assert_matches!(person.get(&journal, 3), Err(Error::Absent));

        let version = journal.version();
        person.erase(&mut journal, 3)?;
        assert_eq!(journal.version(), version);
        Ok(())
    }

    #[test]
    fn erase_repeated_removes_all_occurrences() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        person.erase(&mut journal, 4)?;
        assert!(!person.has(&journal, 4)?);
        assert_eq!(journal.len(), person_bytes().len() - 42);
        Ok(())
    }

    #[test]
    fn clear_empties_the_message() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        person.clear(&mut journal)?;
        assert!(journal.is_empty());
        assert!(!person.has(&journal, 1)?);
        Ok(())
    }

    #[test]
    fn nested_growth_widens_enclosing_prefix() -> Result<()> {
        // Wrap the Person fixture as a submessage of an envelope.
        static ENVELOPE: MessageDescriptor = MessageDescriptor {
            name: "Envelope",
            fields: &[FieldDescriptor {
                tag: 1,
                name: "person",
                typ: FieldType::Message,
                label: Label::Optional,
                refer: crate::descriptor::Refer::Message(&PERSON),
                default: None,
                flags: crate::descriptor::FieldFlags::empty(),
            }],
            extension: None,
        };

        let person = person_bytes();
        let mut bytes = vec![10, person.len() as u8];
        bytes.extend_from_slice(&person);
        let mut journal = Journal::from_bytes(&bytes);

        let mut envelope = Message::new(&ENVELOPE, &journal);
        let mut nested = envelope.create_within(&mut journal, 1)?;

        // Grow the email until the person payload crosses 128 bytes; the
        // envelope's length prefix must widen from one byte to two.
        let long_email = "a-rather-long-address-for-prefix-widening@example.com\
                          .some.more.label.text";
        nested.put(&mut journal, 3, &Value::String(long_email))?;

        let grown = person.len() + long_email.len() - 16;
        assert!(grown > 127);
        assert_eq!(&journal.data()[..3], &[10, (grown & 0x7f) as u8 | 0x80, (grown >> 7) as u8]);
        assert_eq!(journal.len(), 1 + 2 + grown);

        // The stale envelope handle self-heals and still reads through.
        assert_eq!(nested.get(&journal, 3)?, Value::String(long_email));
        assert_eq!(nested.get(&journal, 1)?, Value::String("John Doe"));
        Ok(())
    }

    #[test]
    fn create_nested_resolves_a_path() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        // Phones are repeated, so a path step appends a fresh occurrence.
        let mut phone = person.create_nested(&mut journal, &[4])?;
        assert!(phone.valid());
        assert!(!phone.has(&journal, 1)?);

        assert_matches!(
            person.create_nested(&mut journal, &[]),
            Err(Error::Invalid)
        );
        Ok(())
    }

    #[test]
    fn get_returns_declared_default_without_writing() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);
        let mut phone = person.create_within(&mut journal, 4)?;
        phone.put(&mut journal, 1, &Value::String("+1-000"))?;

        // The type field is absent; reads fall back to HOME while the
        // buffer stays as it is and the field stays absent.
        let version = journal.version();
        let len = journal.len();
        assert_eq!(phone.get(&journal, 2)?, Value::Enum(1));
        assert!(phone.matches(&journal, 2, &Value::Enum(1))?);
        assert!(!phone.has(&journal, 2)?);
        assert_eq!((journal.version(), journal.len()), (version, len));
        Ok(())
    }

    #[test]
    fn check_enforces_oneof_exclusivity() -> Result<()> {
        static CONTACT: MessageDescriptor = MessageDescriptor {
            name: "Contact",
            fields: &[
                FieldDescriptor {
                    tag: 1,
                    name: "mobile",
                    typ: FieldType::String,
                    label: Label::Oneof(0),
                    refer: crate::descriptor::Refer::None,
                    default: None,
                    flags: crate::descriptor::FieldFlags::empty(),
                },
                FieldDescriptor {
                    tag: 2,
                    name: "landline",
                    typ: FieldType::String,
                    label: Label::Oneof(0),
                    refer: crate::descriptor::Refer::None,
                    default: None,
                    flags: crate::descriptor::FieldFlags::empty(),
                },
            ],
            extension: None,
        };

        let mut journal = Journal::new();
        let mut contact = Message::new(&CONTACT, &journal);

        // One member of the group present: fine.
        contact.put(&mut journal, 1, &Value::String("+1-541-754-3010"))?;
        contact.check(&journal)?;

        // A second member of the same group violates the invariant.
        contact.put(&mut journal, 2, &Value::String("+1-541-293-8228"))?;
        assert_matches!(contact.check(&journal), Err(Error::Descriptor));
        Ok(())
    }

    #[test]
    fn check_validates_required_and_enums() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);
        person.check(&journal)?;

        // Remove the required name.
        person.erase(&mut journal, 1)?;
        assert_matches!(person.check(&journal), Err(Error::Absent));
        Ok(())
    }

    #[test]
    fn check_rejects_undeclared_enum_numbers() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut person = Message::new(&PERSON, &journal);

        let mut phone = person.create_within(&mut journal, 4)?;
        phone.put(&mut journal, 1, &Value::String("+1-000"))?;
        phone.put(&mut journal, 2, &Value::Enum(7))?;
        assert_matches!(person.check(&journal), Err(Error::Descriptor));
        Ok(())
    }

    #[test]
    fn zero_copy_puts_are_width_bound() -> Result<()> {
        let mut bytes = person_bytes();
        let mut journal = Journal::zero_copy(&mut bytes);
        let mut person = Message::new(&PERSON, &journal);

        // Same varint width: rewritten in place.
        person.put(&mut journal, 2, &Value::Int32(9999))?;
        assert_eq!(person.get(&journal, 2)?, Value::Int32(9999));

        // Any resize is refused and the bytes stay untouched.
        assert_matches!(
            person.put(&mut journal, 1, &Value::String("J")),
            Err(Error::Alloc)
        );
        assert_eq!(person.get(&journal, 1)?, Value::String("John Doe"));
        Ok(())
    }

    #[test]
    fn alignment_soundness_across_handles() -> Result<()> {
        let mut journal = Journal::from_bytes(&person_bytes());
        let mut writer = Message::new(&PERSON, &journal);
        let mut reader = Message::new(&PERSON, &journal);

        writer.put(&mut journal, 1, &Value::String("Jane Roe III"))?;
        writer.erase(&mut journal, 3)?;

        // The stale handle must agree with one built from the final bytes.
        let rebuilt_bytes = journal.data().to_vec();
        let fresh_journal = Journal::from_bytes(&rebuilt_bytes);
        let mut fresh = Message::new(&PERSON, &fresh_journal);

        assert_eq!(reader.get(&journal, 1)?, fresh.get(&fresh_journal, 1)?);
        assert_eq!(reader.get(&journal, 2)?, fresh.get(&fresh_journal, 2)?);
        assert_eq!(reader.has(&journal, 3)?, fresh.has(&fresh_journal, 3)?);
        Ok(())
    }
}
