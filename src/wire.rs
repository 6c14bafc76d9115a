//! Wire-format primitives: varints, zig-zag, fixed-width integers and
//! tag keys.
//!
//! Everything here operates on flat byte slices, since the random-access
//! subsystem addresses an already-buffered message by offset rather than
//! pulling from a stream.

use byteorder::{ByteOrder, LittleEndian};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

use crate::error::Error;

/// Longest legal varint, in bytes.
pub const VARINT_MAX_BYTES: usize = 10;

/// The 3-bit wire type carried in the low bits of every tag key.
///
/// The deprecated group wire types 3 and 4 have no variant and are
/// rejected during conversion.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Primitive)]
pub enum WireType {
    /// Base-128 varint.
    Varint = 0,
    /// Fixed 64-bit little-endian value.
    SixtyFourBit = 1,
    /// Varint length prefix followed by that many payload bytes.
    LengthDelimited = 2,
    /// Fixed 32-bit little-endian value.
    ThirtyTwoBit = 5,
}

/// Packs a field tag and wire type into a tag key.
pub fn make_key(tag: u32, wire_type: WireType) -> u32 {
    (tag << 3) | wire_type as u32
}

/// Splits a tag key into its field tag and wire type.
///
/// Fails with [`Error::Wiretype`] for the deprecated group wire types.
pub fn split_key(key: u32) -> Result<(u32, WireType), Error> {
    let wire_type = WireType::from_u32(key & 7).ok_or(Error::Wiretype)?;
    Ok((key >> 3, wire_type))
}

/// Reads a base-128 varint of at most ten bytes.
///
/// Returns the value and the number of bytes consumed. Fails with
/// [`Error::Varint`] on a truncated or overlong encoding.
pub fn read_varint64(data: &[u8]) -> Result<(u64, usize), Error> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().take(VARINT_MAX_BYTES).enumerate() {
        // The tenth byte may only carry the final high bit.
        if i == VARINT_MAX_BYTES - 1 && byte > 1 {
            return Err(Error::Varint);
        }
        value |= u64::from(byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::Varint)
}

/// Reads a varint that must fit an unsigned 32-bit value.
pub fn read_varint32(data: &[u8]) -> Result<(u32, usize), Error> {
    let (value, size) = read_varint64(data)?;
    u32::try_from(value).map(|v| (v, size)).map_err(|_| Error::Varint)
}

/// Appends a base-128 varint.
pub fn write_varint64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Appends a 32-bit varint.
pub fn write_varint32(out: &mut Vec<u8>, value: u32) {
    write_varint64(out, u64::from(value));
}

/// Returns the number of bytes the varint encoding of `value` occupies.
pub fn size_varint64(value: u64) -> usize {
    // 1 + floor(bits / 7), with 0 encoding in one byte
    match 64 - value.leading_zeros() as usize {
        0 => 1,
        bits => bits.div_ceil(7),
    }
}

/// Zig-zag encodes a signed 32-bit integer.
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Zig-zag decodes an unsigned 32-bit integer.
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Zig-zag encodes a signed 64-bit integer.
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Zig-zag decodes an unsigned 64-bit integer.
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Reads a fixed 32-bit little-endian value.
pub fn read_fixed32(data: &[u8]) -> Result<u32, Error> {
    if data.len() < 4 {
        return Err(Error::Offset);
    }
    Ok(LittleEndian::read_u32(&data[..4]))
}

/// Reads a fixed 64-bit little-endian value.
pub fn read_fixed64(data: &[u8]) -> Result<u64, Error> {
    if data.len() < 8 {
        return Err(Error::Offset);
    }
    Ok(LittleEndian::read_u64(&data[..8]))
}

/// Appends a fixed 32-bit little-endian value.
pub fn write_fixed32(out: &mut Vec<u8>, value: u32) {
    let mut bytes = [0; 4];
    LittleEndian::write_u32(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

/// Appends a fixed 64-bit little-endian value.
pub fn write_fixed64(out: &mut Vec<u8>, value: u64) {
    let mut bytes = [0; 8];
    LittleEndian::write_u64(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

/// Returns the size of the value a wire type announces at the head of
/// `data`, including the length prefix for length-delimited values.
pub fn value_span(data: &[u8], wire_type: WireType) -> Result<usize, Error> {
    match wire_type {
        WireType::Varint => {
            let (_, size) = read_varint64(data)?;
            Ok(size)
        }
        WireType::SixtyFourBit => {
            if data.len() < 8 {
                return Err(Error::Offset);
            }
            Ok(8)
        }
        WireType::ThirtyTwoBit => {
            if data.len() < 4 {
                return Err(Error::Offset);
            }
            Ok(4)
        }
        WireType::LengthDelimited => {
            let (length, size) = read_varint32(data)?;
            let span = size + length as usize;
            if span > data.len() {
                return Err(Error::Offset);
            }
            Ok(span)
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn varint_roundtrip() {
        for value in [0, 1, 127, 128, 300, 1234, 9999, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint64(&mut buf, value);
            assert_eq!(buf.len(), size_varint64(value));
            assert_eq!(read_varint64(&buf).unwrap(), (value, buf.len()));
        }
    }

    #[test]
    fn varint_known_bytes() {
        let mut buf = Vec::new();
        write_varint64(&mut buf, 1234);
        assert_eq!(buf, [210, 9]);

        buf.clear();
        write_varint64(&mut buf, 9999);
        assert_eq!(buf, [0x8f, 0x4e]);
    }

    #[test]
    fn varint_truncated() {
        assert_matches!(read_varint64(&[0x80]), Err(Error::Varint));
        assert_matches!(read_varint64(&[]), Err(Error::Varint));
    }

    #[test]
    fn varint_overlong() {
        let buf = [0x80; 11];
        assert_matches!(read_varint64(&buf), Err(Error::Varint));

        // Ten continuation bytes with a too-large final byte overflow u64.
        let buf = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        assert_matches!(read_varint64(&buf), Err(Error::Varint));
    }

    #[test]
    fn varint32_range() {
        let mut buf = Vec::new();
        write_varint64(&mut buf, u64::from(u32::MAX) + 1);
        assert_matches!(read_varint32(&buf), Err(Error::Varint));
    }

    #[test]
    fn zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);

        for value in [0, -1, 1, i32::MIN, i32::MAX] {
            assert_eq!(zigzag_decode32(zigzag_encode32(value)), value);
        }
        for value in [0i64, -1, 1, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode64(zigzag_encode64(value)), value);
        }
    }

    #[test]
    fn fixed_roundtrip() {
        let mut buf = Vec::new();
        write_fixed32(&mut buf, 0xdead_beef);
        write_fixed64(&mut buf, 0x0123_4567_89ab_cdef);
        assert_eq!(read_fixed32(&buf).unwrap(), 0xdead_beef);
        assert_eq!(read_fixed64(&buf[4..]).unwrap(), 0x0123_4567_89ab_cdef);
        assert_matches!(read_fixed32(&buf[..3]), Err(Error::Offset));
    }

    #[test]
    fn keys() {
        assert_eq!(make_key(1, WireType::LengthDelimited), 10);
        assert_eq!(make_key(2, WireType::Varint), 16);
        assert_eq!(split_key(34).unwrap(), (4, WireType::LengthDelimited));

        // Deprecated group wire types are rejected.
        assert_matches!(split_key(3), Err(Error::Wiretype));
        assert_matches!(split_key(4), Err(Error::Wiretype));
    }

    #[test]
    fn spans() {
        assert_eq!(value_span(&[210, 9], WireType::Varint).unwrap(), 2);
        assert_eq!(value_span(&[2, 0xab, 0xcd], WireType::LengthDelimited).unwrap(), 3);
        assert_matches!(
            value_span(&[5, 0xab], WireType::LengthDelimited),
            Err(Error::Offset)
        );
    }
}
