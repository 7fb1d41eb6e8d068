//! Wire-format primitives shared by the synthesized codecs.
//!
//! Generated codec modules reuse these helpers through the [`Codec`]
//! runtime; they are public so that behavior tests can drive the wire
//! layer directly.
//!
//! [`Codec`]: crate::Codec

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// The smallest valid field number.
pub const MIN_FNUM: u32 = 1;
/// The largest valid field number.
pub const MAX_FNUM: u32 = (1 << 29) - 1;

/// How many levels of sub-message nesting a decode call will follow.
pub const RECURSION_LIMIT: u32 = 100;

/// The 3-bit framing designator carried in every field key.
///
/// The integer value is equivalent to the encoded value. Group wire types
/// (3 and 4) are not part of the supported surface and are rejected as
/// malformed alongside the undefined values 6 and 7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    SixtyFourBit = 1,
    LengthDelimited = 2,
    ThirtyTwoBit = 5,
}

impl WireType {
    pub(crate) fn from_key(value: u64) -> Result<WireType, DecodeError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::SixtyFourBit),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::ThirtyTwoBit),
            _ => Err(DecodeError::malformed_wire_type(value)),
        }
    }
}

/// Checks that the expected wire type matches the actual wire type, or
/// returns an error result.
#[inline]
pub fn check_wire_type(expected: WireType, actual: WireType) -> Result<(), DecodeError> {
    if expected != actual {
        return Err(DecodeError::unexpected_wire_type(expected, actual));
    }
    Ok(())
}

/// Encodes an integer value into LEB128 variable length format, and writes
/// it to the buffer. A varint is never more than 10 bytes.
#[inline]
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    for _ in 0..10 {
        if value < 0x80 {
            buf.put_u8(value as u8);
            break;
        } else {
            buf.put_u8(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        }
    }
}

/// Returns the encoded length of the value in LEB128 variable length
/// format. The returned value will be between 1 and 10, inclusive.
#[inline]
pub fn encoded_len_varint(value: u64) -> usize {
    ((((value | 1).leading_zeros() ^ 63) * 9 + 73) / 64) as usize
}

/// Decodes a LEB128-encoded variable length integer from the buffer.
///
/// A buffer that runs out mid-varint is reported as truncated; a varint
/// that overflows 64 bits or runs past 10 bytes is invalid.
pub fn decode_varint(buf: &mut impl Buf) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    for count in 0..10 {
        if !buf.has_remaining() {
            return Err(DecodeError::truncated());
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << (count * 7);
        if byte <= 0x7F {
            // The tenth byte may only carry the single bit left over after
            // nine 7-bit groups.
            if count == 9 && byte >= 0x02 {
                return Err(DecodeError::invalid_varint());
            }
            return Ok(value);
        }
    }
    Err(DecodeError::invalid_varint())
}

/// Zig-zag maps signed integers onto unsigned so that numbers with a small
/// magnitude stay short on the wire.
#[inline]
pub fn zigzag_encode32(value: i32) -> u64 {
    ((value << 1) ^ (value >> 31)) as u32 as u64
}

#[inline]
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode32(value: u64) -> i32 {
    let value = value as u32;
    ((value >> 1) as i32) ^ (-((value & 1) as i32))
}

#[inline]
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

/// Encodes a field key, which consists of a wire type designator and the
/// field number.
#[inline]
pub fn encode_key(fnum: u32, wire_type: WireType, buf: &mut impl BufMut) {
    debug_assert!((MIN_FNUM..=MAX_FNUM).contains(&fnum));
    let key = (fnum << 3) | wire_type as u32;
    encode_varint(u64::from(key), buf);
}

/// Decodes a field key, which consists of a wire type designator and the
/// field number.
#[inline]
pub fn decode_key(buf: &mut impl Buf) -> Result<(u32, WireType), DecodeError> {
    let key = decode_varint(buf)?;
    if key > u64::from(u32::MAX) {
        return Err(DecodeError::invalid_key(key));
    }
    let wire_type = WireType::from_key(key & 0x07)?;
    let fnum = key as u32 >> 3;
    if fnum < MIN_FNUM {
        return Err(DecodeError::invalid_tag());
    }
    Ok((fnum, wire_type))
}

/// Returns the width of an encoded field key with the given field number.
/// The returned width will be between 1 and 5 bytes (inclusive).
#[inline]
pub fn key_len(fnum: u32) -> usize {
    encoded_len_varint(u64::from(fnum << 3))
}

/// Precomputes the key bytes for a field.
pub fn key_bytes(fnum: u32, wire_type: WireType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(key_len(fnum));
    encode_key(fnum, wire_type, &mut buf);
    buf
}

/// Consumes the value of an unrecognized field, dispatching on its wire
/// type, and leaves the buffer positioned at the next key.
pub fn skip_field(wire_type: WireType, buf: &mut impl Buf) -> Result<(), DecodeError> {
    let len = match wire_type {
        WireType::Varint => decode_varint(buf).map(|_| 0)?,
        WireType::ThirtyTwoBit => 4,
        WireType::SixtyFourBit => 8,
        WireType::LengthDelimited => decode_varint(buf)?,
    };

    if len > buf.remaining() as u64 {
        return Err(DecodeError::truncated());
    }

    buf.advance(len as usize);
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::DecodeErrorKind;

    #[test]
    fn varint() {
        fn check(value: u64, encoded: &[u8]) {
            let mut buf = Vec::with_capacity(1);
            encode_varint(value, &mut buf);
            assert_eq!(buf, encoded);

            assert_eq!(encoded_len_varint(value), encoded.len());

            let mut encoded_copy = encoded;
            let roundtrip = decode_varint(&mut encoded_copy).expect("decoding failed");
            assert_eq!(value, roundtrip);
        }

        check(0, &[0x00]);
        check(1, &[0x01]);
        check(127, &[0x7F]);
        check(128, &[0x80, 0x01]);
        check(300, &[0xAC, 0x02]);
        check(16_383, &[0xFF, 0x7F]);
        check(16_384, &[0x80, 0x80, 0x01]);
        check(
            u64::MAX,
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
        );
    }

    #[test]
    fn varint_overflow() {
        let mut bytes: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        let err = decode_varint(&mut bytes).expect_err("u64::MAX + 1 decoded");
        assert_eq!(err.kind(), &DecodeErrorKind::InvalidVarint);
    }

    #[test]
    fn varint_truncated() {
        let mut bytes: &[u8] = &[0x80, 0x80];
        let err = decode_varint(&mut bytes).expect_err("truncated varint decoded");
        assert_eq!(err.kind(), &DecodeErrorKind::Truncated);
    }

    #[test]
    fn zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), 0xFFFF_FFFE);
        assert_eq!(zigzag_encode32(i32::MIN), 0xFFFF_FFFF);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);
        assert_eq!(zigzag_decode32(1), -1);
        assert_eq!(zigzag_decode64(2), 1);
    }

    #[test]
    fn key_roundtrip() {
        let mut buf = Vec::new();
        encode_key(1, WireType::Varint, &mut buf);
        assert_eq!(buf, [0x08]);

        let mut slice = buf.as_slice();
        let (fnum, wire_type) = decode_key(&mut slice).unwrap();
        assert_eq!((fnum, wire_type), (1, WireType::Varint));

        assert_eq!(key_bytes(16, WireType::LengthDelimited), vec![0x82, 0x01]);
        assert_eq!(key_len(MAX_FNUM), 5);
    }

    #[test]
    fn key_rejects_group_wire_types() {
        for malformed in [0x0B_u8, 0x0C, 0x0E, 0x0F] {
            let mut slice: &[u8] = &[malformed];
            let err = decode_key(&mut slice).expect_err("group wire type accepted");
            assert_eq!(
                err.kind(),
                &DecodeErrorKind::MalformedWireType(u64::from(malformed & 0x07))
            );
        }
    }

    #[test]
    fn key_rejects_fnum_zero() {
        let mut slice: &[u8] = &[0x00];
        let err = decode_key(&mut slice).expect_err("field number 0 accepted");
        assert_eq!(err.kind(), &DecodeErrorKind::InvalidTag);
    }

    #[test]
    fn skip_by_wire_type() {
        let mut slice: &[u8] = &[0x96, 0x01, 0xAA];
        skip_field(WireType::Varint, &mut slice).unwrap();
        assert_eq!(slice, [0xAA]);

        let mut slice: &[u8] = &[1, 2, 3, 4, 0xAA];
        skip_field(WireType::ThirtyTwoBit, &mut slice).unwrap();
        assert_eq!(slice, [0xAA]);

        let mut slice: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 0xAA];
        skip_field(WireType::SixtyFourBit, &mut slice).unwrap();
        assert_eq!(slice, [0xAA]);

        let mut slice: &[u8] = &[0x03, 1, 2, 3, 0xAA];
        skip_field(WireType::LengthDelimited, &mut slice).unwrap();
        assert_eq!(slice, [0xAA]);

        let mut slice: &[u8] = &[0x05, 1, 2];
        let err = skip_field(WireType::LengthDelimited, &mut slice).unwrap_err();
        assert_eq!(err.kind(), &DecodeErrorKind::Truncated);
    }

    proptest! {
        #[test]
        fn varint_roundtrip(value: u64) {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            prop_assert_eq!(encoded_len_varint(value), buf.len());
            let mut slice = buf.as_slice();
            prop_assert_eq!(decode_varint(&mut slice).unwrap(), value);
            prop_assert!(slice.is_empty());
        }

        #[test]
        fn zigzag_roundtrip(v32: i32, v64: i64) {
            prop_assert_eq!(zigzag_decode32(zigzag_encode32(v32)), v32);
            prop_assert_eq!(zigzag_decode64(zigzag_encode64(v64)), v64);
            // A zig-zagged 32-bit value never needs the 64-bit tail.
            prop_assert!(encoded_len_varint(zigzag_encode32(v32)) <= 5);
        }

        #[test]
        fn key_roundtrip_any_fnum(fnum in MIN_FNUM..=MAX_FNUM) {
            for wire_type in [
                WireType::Varint,
                WireType::SixtyFourBit,
                WireType::LengthDelimited,
                WireType::ThirtyTwoBit,
            ] {
                let buf = key_bytes(fnum, wire_type);
                let mut slice = buf.as_slice();
                prop_assert_eq!(decode_key(&mut slice).unwrap(), (fnum, wire_type));
            }
        }
    }
}
