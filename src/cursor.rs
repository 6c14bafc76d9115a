//! Cursors: forward iteration over the fields of a message.
//!
//! A cursor scans the wire format directly, halting on every field or
//! only on a given tag. It survives mutations made through other handles
//! by realigning its position, and when the element under it is erased it
//! recovers by advancing to the element that took its place. Packed
//! repeated payloads are iterated element by element, with the element
//! type taken from the descriptor rather than the wire.

use log::trace;

use crate::descriptor::FieldDescriptor;
use crate::error::Error;
use crate::field::Field;
use crate::journal::Journal;
use crate::message::Message;
use crate::part::{Diff, Offset, Part};
use crate::value::Value;
use crate::wire::{self, WireType};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Before,
    At,
    After,
}

/// A forward iterator over the fields of a message.
#[derive(Debug, Copy, Clone)]
pub struct Cursor {
    message: Message,
    tag: Option<u32>,
    state: State,
    descriptor: Option<&'static FieldDescriptor>,
    current_tag: u32,
    current: Part,
    packed: Option<Part>,
    pos: usize,
    error: Option<Error>,
}

impl Cursor {
    /// Creates a cursor halting on occurrences of one tag.
    pub fn new(message: Message, tag: u32) -> Self {
        let error = if message.descriptor().field_by_tag(tag).is_none() {
            Some(Error::Descriptor)
        } else {
            message.error()
        };
        Cursor {
            message,
            tag: Some(tag),
            state: State::Before,
            descriptor: None,
            current_tag: 0,
            current: Part::invalid(),
            packed: None,
            pos: 0,
            error,
        }
    }

    /// Creates a cursor halting on every field.
    pub fn without_tag(message: Message) -> Self {
        Cursor {
            message,
            tag: None,
            state: State::Before,
            descriptor: None,
            current_tag: 0,
            current: Part::invalid(),
            packed: None,
            pos: 0,
            error: message.error(),
        }
    }

    /// Whether the cursor stands on an element.
    pub fn valid(&self) -> bool {
        self.error.is_none() && self.state == State::At
    }

    /// The sticky error state, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// The tag at the current position.
    pub fn tag(&self) -> Option<u32> {
        (self.state == State::At).then_some(self.current_tag)
    }

    /// The field descriptor at the current position; `None` on a field
    /// unknown to the message descriptor.
    pub fn descriptor(&self) -> Option<&'static FieldDescriptor> {
        (self.state == State::At).then_some(self.descriptor).flatten()
    }

    /// Returns the cursor to its initial position before the first match.
    pub fn rewind(&mut self) {
        if self.error.is_none() {
            self.state = State::Before;
            self.descriptor = None;
            self.current = Part::invalid();
            self.packed = None;
            self.pos = 0;
        }
    }

    /// Advances to the next matching element.
    ///
    /// Returns `false` once the message is exhausted; the cursor is then
    /// past the last element and value operations fail with
    /// [`Error::Absent`].
    pub fn next(&mut self, journal: &Journal<'_>) -> Result<bool, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.state == State::After {
            return Ok(false);
        }
        if let Err(error) = self.message.align_part(journal) {
            return self.fail(error);
        }

        match self.state {
            State::Before => {
                let start = self.message.part_offset().start;
                let found = self.scan(journal, start, 0)?;
                if found {
                    self.pos = 0;
                }
                Ok(found)
            }
            State::At => {
                if self.packed.is_some() {
                    return self.advance_packed(journal);
                }
                match self.current.align(journal) {
                    Ok(()) => {
                        let from = self.current.offset().end;
                        let found = self.scan(journal, from, 0)?;
                        if found {
                            self.pos += 1;
                        }
                        Ok(found)
                    }
                    Err(Error::Offset) => self.recover(journal),
                    Err(error) => self.fail(error),
                }
            }
            State::After => unreachable!(),
        }
    }

    /// Walks to the final matching element.
    pub fn last(&mut self, journal: &Journal<'_>) -> Result<bool, Error> {
        let mut hit = None;
        while self.next(journal)? {
            hit = Some((self.descriptor, self.current_tag, self.current, self.packed, self.pos));
        }
        match hit {
            Some((descriptor, tag, current, packed, pos)) => {
                self.state = State::At;
                self.descriptor = descriptor;
                self.current_tag = tag;
                self.current = current;
                self.packed = packed;
                self.pos = pos;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Advances to the next element equal to `value`.
    pub fn seek(&mut self, journal: &Journal<'_>, value: &Value<'_>) -> Result<bool, Error> {
        while self.next(journal)? {
            if self.matches(journal, value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decodes the element at the current position.
    pub fn get<'j>(&mut self, journal: &'j Journal<'_>) -> Result<Value<'j>, Error> {
        self.expect_at()?;
        let descriptor = self.descriptor.ok_or(Error::Descriptor)?;
        if descriptor.typ == crate::descriptor::FieldType::Message {
            return Err(Error::Descriptor);
        }
        let data = self.current.read(journal)?;
        let (value, _) = Value::decode(descriptor.typ, data)?;
        Ok(value)
    }

    /// Writes a value to the element at the current position.
    pub fn put(&mut self, journal: &mut Journal<'_>, value: &Value<'_>) -> Result<(), Error> {
        self.expect_at()?;
        let descriptor = self.descriptor.ok_or(Error::Descriptor)?;
        if descriptor.typ == crate::descriptor::FieldType::Message {
            return Err(Error::Descriptor);
        }
        if !value.fits(descriptor.typ) {
            return Err(Error::Descriptor);
        }
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        self.current.write(journal, &bytes)
    }

    /// Erases the element at the current position: the whole field for a
    /// plain occurrence, the single element for a packed one. The cursor
    /// recovers on the next advance.
    pub fn erase(&mut self, journal: &mut Journal<'_>) -> Result<(), Error> {
        self.expect_at()?;
        trace!("cursor erase at match {}", self.pos);
        self.current.erase(journal)
    }

    /// Tests the element at the current position against a value without
    /// advancing.
    pub fn matches(&mut self, journal: &Journal<'_>, value: &Value<'_>) -> Result<bool, Error> {
        Ok(self.get(journal)? == *value)
    }

    /// The raw bytes of the element at the current position.
    pub fn raw<'j>(&mut self, journal: &'j Journal<'_>) -> Result<&'j [u8], Error> {
        self.expect_at()?;
        self.current.read(journal)
    }

    /// The raw payload of the field at the current position; for a packed
    /// element this is the whole packed payload.
    pub(crate) fn raw_field<'j>(&mut self, journal: &'j Journal<'_>) -> Result<&'j [u8], Error> {
        self.expect_at()?;
        match self.packed.as_mut() {
            Some(packed) => packed.read(journal),
            None => self.current.read(journal),
        }
    }

    /// A field handle over the current position.
    pub fn field(&self) -> Result<Field, Error> {
        self.expect_at()?;
        let descriptor = self.descriptor.ok_or(Error::Descriptor)?;
        Ok(Field::from_parts(descriptor, self.current))
    }

    /// A message handle over the current position, for message-typed
    /// fields.
    pub fn message(&self) -> Result<Message, Error> {
        self.expect_at()?;
        let descriptor = self.descriptor.ok_or(Error::Descriptor)?;
        let nested = descriptor.message().ok_or(Error::Descriptor)?;
        Ok(Message::from_part(nested, self.current))
    }

    pub(crate) fn current_part(&self) -> Part {
        self.current
    }

    /// Appends one element at the end of the packed payload the cursor
    /// stands in.
    pub(crate) fn append_packed(
        &mut self,
        journal: &mut Journal<'_>,
        value: &Value<'_>,
    ) -> Result<(), Error> {
        self.expect_at()?;
        let packed = self.packed.as_mut().ok_or(Error::Invalid)?;
        packed.align(journal)?;
        let offset = packed.offset();
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        journal.write(offset.start, offset.end, offset.end, &bytes)
    }

    fn expect_at(&self) -> Result<(), Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.state != State::At {
            return Err(Error::Absent);
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Result<bool, Error> {
        self.error = Some(error);
        Err(error)
    }

    /// Re-finds the match ordinal the cursor stood on after its element
    /// vanished; the erased element's successor inherits its ordinal.
    fn recover(&mut self, journal: &Journal<'_>) -> Result<bool, Error> {
        trace!("cursor recovering at match {}", self.pos);
        self.packed = None;
        let start = self.message.part_offset().start;
        self.scan(journal, start, self.pos)
    }

    /// Steps to the next element inside the current packed payload, or
    /// resumes the field scan after it.
    fn advance_packed(&mut self, journal: &Journal<'_>) -> Result<bool, Error> {
        let mut packed = match self.packed {
            Some(packed) => packed,
            None => return Err(Error::Invalid),
        };
        match packed.align(journal) {
            Ok(()) => self.packed = Some(packed),
            Err(Error::Offset) => {
                self.packed = None;
                return self.recover(journal);
            }
            Err(error) => return self.fail(error),
        }
        match self.current.align(journal) {
            Ok(()) => {}
            Err(Error::Offset) => return self.recover(journal),
            Err(error) => return self.fail(error),
        }

        let element = self.current.offset().end;
        let payload_end = packed.offset().end;
        if element >= payload_end {
            self.packed = None;
            let found = self.scan(journal, payload_end, 0)?;
            if found {
                self.pos += 1;
            }
            return Ok(found);
        }

        let descriptor = self.descriptor.ok_or(Error::Descriptor)?;
        let data = journal.data();
        let span = match self.element_span(&data[..payload_end], element, descriptor) {
            Ok(span) => span,
            Err(error) => return self.fail(error),
        };
        self.current = Part::with_offset(
            journal,
            Offset {
                start: element,
                end: element + span,
                diff: Diff {
                    origin: packed.offset().start as isize - element as isize,
                    tag: 0,
                    length: 0,
                },
            },
        );
        self.pos += 1;
        Ok(true)
    }

    fn element_span(
        &self,
        window: &[u8],
        at: usize,
        descriptor: &FieldDescriptor,
    ) -> Result<usize, Error> {
        let span = match descriptor.typ.wire_type() {
            WireType::Varint => wire::read_varint64(&window[at..]).map(|(_, n)| n)?,
            WireType::ThirtyTwoBit => 4,
            WireType::SixtyFourBit => 8,
            WireType::LengthDelimited => return Err(Error::Descriptor),
        };
        if at + span > window.len() {
            return Err(Error::Offset);
        }
        Ok(span)
    }

    /// Scans fields from the absolute position `from`, skipping `skip`
    /// matches, and halts on the next one. Malformed wire bytes leave the
    /// cursor permanently invalid.
    fn scan(&mut self, journal: &Journal<'_>, from: usize, mut skip: usize) -> Result<bool, Error> {
        let message_offset = self.message.part_offset();
        let msg_start = message_offset.start;
        let msg_end = message_offset.end;
        let data = journal.data();
        if msg_end > data.len() {
            return self.fail(Error::Offset);
        }
        let window = &data[..msg_end];
        let mut pos = from;

        while pos < msg_end {
            let field_pos = pos;
            let (key, key_len) = match wire::read_varint32(&window[pos..]) {
                Ok(parsed) => parsed,
                Err(error) => return self.fail(error),
            };
            let (tag, wire_type) = match wire::split_key(key) {
                Ok(parsed) => parsed,
                Err(error) => return self.fail(error),
            };
            let value_pos = field_pos + key_len;
            let span = match wire::value_span(&window[value_pos..], wire_type) {
                Ok(span) => span,
                Err(error) => return self.fail(error),
            };
            let field_end = value_pos + span;
            pos = field_end;

            if !self.tag.map_or(true, |filter| filter == tag) {
                continue;
            }
            let descriptor = self.message.descriptor().field_by_tag(tag);

            let Some(descriptor) = descriptor else {
                // Unknown field: an unfiltered cursor halts on it anyway,
                // without a descriptor, so that erasure still works.
                if self.tag.is_none() {
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }
                    self.halt(journal, None, tag, wire_type, field_pos, value_pos, field_end);
                    return Ok(true);
                }
                continue;
            };

            let plain = descriptor.typ.wire_type();
            if wire_type != plain && wire_type != descriptor.wire_type() {
                return self.fail(Error::Wiretype);
            }

            if wire_type == WireType::LengthDelimited && plain != WireType::LengthDelimited {
                // Packed payload: iterate elements of the declared type.
                let (payload_len, prefix_width) = match wire::read_varint32(&window[value_pos..]) {
                    Ok(parsed) => parsed,
                    Err(error) => return self.fail(error),
                };
                let payload_start = value_pos + prefix_width;
                let payload_end = payload_start + payload_len as usize;
                let mut element = payload_start;
                while element < payload_end {
                    let span = match self.element_span(&window[..payload_end], element, descriptor)
                    {
                        Ok(span) => span,
                        Err(error) => return self.fail(error),
                    };
                    if skip == 0 {
                        self.packed = Some(Part::with_offset(
                            journal,
                            Offset {
                                start: payload_start,
                                end: payload_end,
                                diff: Diff {
                                    origin: msg_start as isize - payload_start as isize,
                                    tag: field_pos as isize - payload_start as isize,
                                    length: value_pos as isize - payload_start as isize,
                                },
                            },
                        ));
                        self.descriptor = Some(descriptor);
                        self.current_tag = tag;
                        self.current = Part::with_offset(
                            journal,
                            Offset {
                                start: element,
                                end: element + span,
                                diff: Diff {
                                    origin: payload_start as isize - element as isize,
                                    tag: 0,
                                    length: 0,
                                },
                            },
                        );
                        self.state = State::At;
                        return Ok(true);
                    }
                    skip -= 1;
                    element += span;
                }
                // Empty payload or exhausted while skipping.
                continue;
            }

            if skip > 0 {
                skip -= 1;
                continue;
            }
            self.halt(journal, Some(descriptor), tag, wire_type, field_pos, value_pos, field_end);
            return Ok(true);
        }

        self.state = State::After;
        self.packed = None;
        Ok(false)
    }

    /// Sets the current position onto a plain (non-packed) field.
    #[allow(clippy::too_many_arguments)]
    fn halt(
        &mut self,
        journal: &Journal<'_>,
        descriptor: Option<&'static FieldDescriptor>,
        tag: u32,
        wire_type: WireType,
        field_pos: usize,
        value_pos: usize,
        field_end: usize,
    ) {
        let msg_start = self.message.part_offset().start;
        let offset = if wire_type == WireType::LengthDelimited {
            // The part spans the payload; prefix and tag stay reachable
            // through the framing distances.
            let data = journal.data();
            let (_, prefix_width) =
                wire::read_varint32(&data[value_pos..field_end]).unwrap_or((0, 1));
            let payload_start = value_pos + prefix_width;
            Offset {
                start: payload_start,
                end: field_end,
                diff: Diff {
                    origin: msg_start as isize - payload_start as isize,
                    tag: field_pos as isize - payload_start as isize,
                    length: value_pos as isize - payload_start as isize,
                },
            }
        } else {
            Offset {
                start: value_pos,
                end: field_end,
                diff: Diff {
                    origin: msg_start as isize - value_pos as isize,
                    tag: field_pos as isize - value_pos as isize,
                    length: 0,
                },
            }
        };
        self.packed = None;
        self.descriptor = descriptor;
        self.current_tag = tag;
        self.current = Part::with_offset(journal, offset);
        self.state = State::At;
    }
}
