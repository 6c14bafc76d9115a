//! Typed values passed between fields, messages, cursors and the
//! streaming encoder and decoder.

use crate::descriptor::FieldType;
use crate::error::Error;
use crate::wire;

/// A decoded field value, borrowing string and byte payloads from the
/// underlying buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value<'a> {
    /// `int32` value.
    Int32(i32),
    /// `int64` value.
    Int64(i64),
    /// `uint32` value.
    UInt32(u32),
    /// `uint64` value.
    UInt64(u64),
    /// `sint32` value.
    SInt32(i32),
    /// `sint64` value.
    SInt64(i64),
    /// `fixed32` value.
    Fixed32(u32),
    /// `fixed64` value.
    Fixed64(u64),
    /// `sfixed32` value.
    SFixed32(i32),
    /// `sfixed64` value.
    SFixed64(i64),
    /// `float` value.
    Float(f32),
    /// `double` value.
    Double(f64),
    /// `bool` value.
    Bool(bool),
    /// Enum number.
    Enum(i32),
    /// `string` payload.
    String(&'a str),
    /// `bytes` payload, also used for raw submessage payloads.
    Bytes(&'a [u8]),
}

impl<'a> Value<'a> {
    /// Whether this value is acceptable for a field of the given declared
    /// type.
    pub fn fits(&self, typ: FieldType) -> bool {
        matches!(
            (self, typ),
            (Value::Int32(_), FieldType::Int32)
                | (Value::Int64(_), FieldType::Int64)
                | (Value::UInt32(_), FieldType::UInt32)
                | (Value::UInt64(_), FieldType::UInt64)
                | (Value::SInt32(_), FieldType::SInt32)
                | (Value::SInt64(_), FieldType::SInt64)
                | (Value::Fixed32(_), FieldType::Fixed32)
                | (Value::Fixed64(_), FieldType::Fixed64)
                | (Value::SFixed32(_), FieldType::SFixed32)
                | (Value::SFixed64(_), FieldType::SFixed64)
                | (Value::Float(_), FieldType::Float)
                | (Value::Double(_), FieldType::Double)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::Enum(_), FieldType::Enum)
                | (Value::String(_), FieldType::String)
                | (Value::Bytes(_), FieldType::Bytes)
                | (Value::Bytes(_), FieldType::Message)
        )
    }

    /// Appends the wire encoding of the value alone: the scalar bytes, or
    /// the raw payload for strings and bytes. Tag keys and length prefixes
    /// are framing and belong to the caller.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            // int32 sign-extends to 64 bits on the wire
            Value::Int32(v) => wire::write_varint64(out, v as i64 as u64),
            Value::Int64(v) => wire::write_varint64(out, v as u64),
            Value::UInt32(v) => wire::write_varint32(out, v),
            Value::UInt64(v) => wire::write_varint64(out, v),
            Value::SInt32(v) => wire::write_varint32(out, wire::zigzag_encode32(v)),
            Value::SInt64(v) => wire::write_varint64(out, wire::zigzag_encode64(v)),
            Value::Fixed32(v) => wire::write_fixed32(out, v),
            Value::Fixed64(v) => wire::write_fixed64(out, v),
            Value::SFixed32(v) => wire::write_fixed32(out, v as u32),
            Value::SFixed64(v) => wire::write_fixed64(out, v as u64),
            Value::Float(v) => wire::write_fixed32(out, v.to_bits()),
            Value::Double(v) => wire::write_fixed64(out, v.to_bits()),
            Value::Bool(v) => out.push(v as u8),
            Value::Enum(v) => wire::write_varint64(out, v as i64 as u64),
            Value::String(v) => out.extend_from_slice(v.as_bytes()),
            Value::Bytes(v) => out.extend_from_slice(v),
        }
    }

    /// Decodes a value of the declared type from the head of `data`,
    /// returning the value and the number of bytes consumed.
    ///
    /// Strings, bytes and submessages consume the whole slice; the caller
    /// passes exactly the payload window.
    pub fn decode(typ: FieldType, data: &'a [u8]) -> Result<(Value<'a>, usize), Error> {
        let value = match typ {
            FieldType::Int32 => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::Int32(v as i32), n));
            }
            FieldType::Int64 => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::Int64(v as i64), n));
            }
            FieldType::UInt32 => {
                let (v, n) = wire::read_varint32(data)?;
                return Ok((Value::UInt32(v), n));
            }
            FieldType::UInt64 => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::UInt64(v), n));
            }
            FieldType::SInt32 => {
                let (v, n) = wire::read_varint32(data)?;
                return Ok((Value::SInt32(wire::zigzag_decode32(v)), n));
            }
            FieldType::SInt64 => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::SInt64(wire::zigzag_decode64(v)), n));
            }
            FieldType::Bool => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::Bool(v != 0), n));
            }
            FieldType::Enum => {
                let (v, n) = wire::read_varint64(data)?;
                return Ok((Value::Enum(v as i32), n));
            }
            FieldType::Fixed32 => Value::Fixed32(wire::read_fixed32(data)?),
            FieldType::SFixed32 => Value::SFixed32(wire::read_fixed32(data)? as i32),
            FieldType::Float => Value::Float(f32::from_bits(wire::read_fixed32(data)?)),
            FieldType::Fixed64 => Value::Fixed64(wire::read_fixed64(data)?),
            FieldType::SFixed64 => Value::SFixed64(wire::read_fixed64(data)? as i64),
            FieldType::Double => Value::Double(f64::from_bits(wire::read_fixed64(data)?)),
            FieldType::String => {
                let text = std::str::from_utf8(data).map_err(|_| Error::Invalid)?;
                return Ok((Value::String(text), data.len()));
            }
            FieldType::Bytes | FieldType::Message => return Ok((Value::Bytes(data), data.len())),
        };
        Ok((value, typ.native_size()))
    }

    /// Enum number of the value, if it is an enum.
    pub fn as_enum(&self) -> Option<i32> {
        match *self {
            Value::Enum(number) => Some(number),
            _ => None,
        }
    }
}
