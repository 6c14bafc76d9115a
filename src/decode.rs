//! The callback streaming decoder.
//!
//! A decoder walks a flat buffer once, dispatching each field occurrence
//! to a handler together with its descriptor. Unknown tags are skipped
//! for wire-format forward compatibility. Submessage fields yield their
//! raw payload; the handler descends by constructing a sub-decoder from
//! the nested descriptor.

use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::Error;
use crate::value::Value;
use crate::wire::{self, WireType};

/// A streaming decoder over one wire-encoded message.
#[derive(Debug, Copy, Clone)]
pub struct Decoder<'a> {
    descriptor: &'static MessageDescriptor,
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the given bytes.
    pub fn new(descriptor: &'static MessageDescriptor, data: &'a [u8]) -> Self {
        Decoder { descriptor, data }
    }

    /// The message descriptor being decoded.
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Walks the buffer in wire order, invoking the handler once per
    /// field occurrence, and once per element of a packed repeated field.
    ///
    /// The handler may abort the walk by returning an error, which is
    /// passed through unchanged.
    pub fn decode<H>(&self, mut handler: H) -> Result<(), Error>
    where
        H: FnMut(&'static FieldDescriptor, Value<'a>) -> Result<(), Error>,
    {
        let data = self.data;
        let mut pos = 0;
        while pos < data.len() {
            let (key, key_len) = wire::read_varint32(&data[pos..])?;
            let (tag, wire_type) = wire::split_key(key)?;
            let value_pos = pos + key_len;
            let span = wire::value_span(&data[value_pos..], wire_type)?;
            pos = value_pos + span;

            let Some(descriptor) = self.descriptor.field_by_tag(tag) else {
                continue;
            };
            let plain = descriptor.typ.wire_type();
            if wire_type != plain && wire_type != descriptor.wire_type() {
                return Err(Error::Wiretype);
            }

            if wire_type == WireType::LengthDelimited {
                let (payload_len, prefix_width) = wire::read_varint32(&data[value_pos..])?;
                let payload_start = value_pos + prefix_width;
                let payload = &data[payload_start..payload_start + payload_len as usize];
                if plain == WireType::LengthDelimited {
                    let (value, _) = Value::decode(descriptor.typ, payload)?;
                    handler(descriptor, value)?;
                } else {
                    // Packed payload: element type comes from the
                    // descriptor, not the wire.
                    let mut element = 0;
                    while element < payload.len() {
                        let (value, consumed) =
                            Value::decode(descriptor.typ, &payload[element..])?;
                        handler(descriptor, value)?;
                        element += consumed;
                    }
                }
            } else {
                let (value, _) = Value::decode(descriptor.typ, &data[value_pos..pos])?;
                handler(descriptor, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_util::{person_bytes, PERSON, SAMPLE_SET};

    #[test]
    fn decodes_the_person_fixture() -> Result<()> {
        let bytes = person_bytes();
        let decoder = Decoder::new(&PERSON, &bytes);

        let mut name = None;
        let mut id = None;
        let mut email = None;
        let mut phones = Vec::new();

        decoder.decode(|field, value| {
            match (field.name, value) {
                ("name", Value::String(v)) => name = Some(v),
                ("id", Value::Int32(v)) => id = Some(v),
                ("email", Value::String(v)) => email = Some(v),
                ("phone", Value::Bytes(payload)) => {
                    let nested = Decoder::new(field.message().unwrap(), payload);
                    let mut number = None;
                    let mut kind = None;
                    nested.decode(|inner, value| {
                        match (inner.name, value) {
                            ("number", Value::String(v)) => number = Some(v),
                            ("type", Value::Enum(v)) => kind = Some(v),
                            _ => {}
                        }
                        Ok(())
                    })?;
                    phones.push((number.unwrap(), kind.unwrap()));
                }
                _ => {}
            }
            Ok(())
        })?;

        assert_eq!(name, Some("John Doe"));
        assert_eq!(id, Some(1234));
        assert_eq!(email, Some("jdoe@example.com"));
        assert_eq!(
            phones,
            vec![("+1-541-754-3010", 1), ("+1-541-293-8228", 0)]
        );
        Ok(())
    }

    #[test]
    fn skips_unknown_tags() -> Result<()> {
        // Field 9 does not exist in the Person schema.
        let decoder = Decoder::new(&PERSON, &[72, 1, 16, 5]);
        let mut seen = Vec::new();
        decoder.decode(|field, value| {
            seen.push((field.tag, value));
            Ok(())
        })?;
        assert_eq!(seen, vec![(2, Value::Int32(5))]);
        Ok(())
    }

    #[test]
    fn dispatches_packed_elements() -> Result<()> {
        let decoder = Decoder::new(&SAMPLE_SET, &[10, 3, 1, 4, 5]);
        let mut seen = Vec::new();
        decoder.decode(|_, value| {
            seen.push(value);
            Ok(())
        })?;
        assert_eq!(
            seen,
            vec![Value::SInt32(-1), Value::SInt32(2), Value::SInt32(-3)]
        );
        Ok(())
    }

    #[test]
    fn rejects_group_wire_types() {
        let decoder = Decoder::new(&PERSON, &[11, 0]);
        assert_matches!(decoder.decode(|_, _| Ok(())), Err(Error::Wiretype));
    }

    #[test]
    fn rejects_truncated_payloads() {
        // The name field claims eight payload bytes but only three follow.
        let decoder = Decoder::new(&PERSON, &[10, 8, 74, 111, 104]);
        assert_matches!(decoder.decode(|_, _| Ok(())), Err(Error::Offset));
    }
}
