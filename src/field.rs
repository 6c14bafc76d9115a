//! Field handles: typed access to a single field occurrence.
//!
//! A field is a descriptor plus a part. For scalars the part spans just
//! the value bytes; for strings and bytes it spans the payload, with the
//! tag and length prefix reachable through the part's framing distances.

use crate::cursor::Cursor;
use crate::descriptor::{FieldDescriptor, FieldType, Label};
use crate::error::Error;
use crate::journal::Journal;
use crate::message::Message;
use crate::part::Part;
use crate::value::Value;

/// A handle onto one field occurrence within a journal.
#[derive(Debug, Copy, Clone)]
pub struct Field {
    descriptor: &'static FieldDescriptor,
    part: Part,
}

impl Field {
    /// Finds the field in the message. An absent singular field that
    /// declares a default is materialized: the default is written into
    /// the buffer and the field handle points at those bytes.
    ///
    /// Repeated fields are never grown through `create` — it finds the
    /// first occurrence, and new occurrences are appended with
    /// [`Message::put`]. Fails with [`Error::Absent`] when the field is
    /// absent and cannot be materialized, and with [`Error::Descriptor`]
    /// for message-typed fields, which are opened with
    /// [`Message::create_within`] instead.
    pub fn create(
        journal: &mut Journal<'_>,
        message: &mut Message,
        tag: u32,
    ) -> Result<Field, Error> {
        let descriptor = message
            .descriptor()
            .field_by_tag(tag)
            .ok_or(Error::Descriptor)?;
        if descriptor.typ == FieldType::Message {
            return Err(Error::Descriptor);
        }
        let mut cursor = Cursor::new(*message, tag);
        if cursor.next(journal)? {
            return Ok(Field {
                descriptor,
                part: cursor.current_part(),
            });
        }
        if descriptor.label == Label::Repeated {
            return Err(Error::Absent);
        }
        let default = descriptor.default.ok_or(Error::Absent)?;
        let part = message.append_value(journal, descriptor, &default)?;
        Ok(Field { descriptor, part })
    }

    /// Finds the field in the message without materializing anything;
    /// fails with [`Error::Absent`] when it is missing.
    pub fn create_without_default(
        journal: &Journal<'_>,
        message: &mut Message,
        tag: u32,
    ) -> Result<Field, Error> {
        let descriptor = message
            .descriptor()
            .field_by_tag(tag)
            .ok_or(Error::Descriptor)?;
        if descriptor.typ == FieldType::Message {
            return Err(Error::Descriptor);
        }
        let mut cursor = Cursor::new(*message, tag);
        if cursor.next(journal)? {
            Ok(Field {
                descriptor,
                part: cursor.current_part(),
            })
        } else {
            Err(Error::Absent)
        }
    }

    pub(crate) fn from_parts(descriptor: &'static FieldDescriptor, part: Part) -> Self {
        Field { descriptor, part }
    }

    /// The field's descriptor.
    pub fn descriptor(&self) -> &'static FieldDescriptor {
        self.descriptor
    }

    /// The field's tag.
    pub fn tag(&self) -> u32 {
        self.descriptor.tag
    }

    /// Whether the handle is usable.
    pub fn valid(&self) -> bool {
        self.part.valid()
    }

    /// The sticky error state, if any.
    pub fn error(&self) -> Option<Error> {
        self.part.error()
    }

    /// Number of value bytes.
    pub fn size(&mut self, journal: &Journal<'_>) -> Result<usize, Error> {
        self.part.size(journal)
    }

    /// Decodes the field's value according to its descriptor.
    pub fn get<'j>(&mut self, journal: &'j Journal<'_>) -> Result<Value<'j>, Error> {
        let data = self.part.read(journal)?;
        let (value, _) = Value::decode(self.descriptor.typ, data)?;
        Ok(value)
    }

    /// Encodes and writes a value. Scalar writes of unchanged width go
    /// straight to the buffer; anything else resizes through the journal.
    pub fn put(&mut self, journal: &mut Journal<'_>, value: &Value<'_>) -> Result<(), Error> {
        if !value.fits(self.descriptor.typ) {
            return Err(Error::Descriptor);
        }
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        self.part.write(journal, &bytes)
    }

    /// Erases the field's wire bytes, framing included. A later `get`
    /// through the message reports the default or [`Error::Absent`].
    pub fn clear(&mut self, journal: &mut Journal<'_>) -> Result<(), Error> {
        self.part.erase(journal)
    }

    /// Decodes the value in place and compares it, without copying it into
    /// a caller buffer.
    pub fn matches(&mut self, journal: &Journal<'_>, value: &Value<'_>) -> Result<bool, Error> {
        Ok(self.get(journal)? == *value)
    }

    /// The raw payload bytes.
    pub fn raw<'j>(&mut self, journal: &'j Journal<'_>) -> Result<&'j [u8], Error> {
        self.part.read(journal)
    }
}
