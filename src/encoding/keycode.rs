//! Order-preserving field encoding.
//!
//! Every primitive encodes so that lexicographic byte comparison of the
//! encodings agrees with the natural ordering of the values, which is what
//! lets composite keys be compared with memcmp. Unsigned integers are
//! big-endian; signed integers flip the sign bit first so negatives sort
//! before positives; byte strings escape embedded zeros and end with a
//! two-byte terminator so a shorter string sorts before its extensions.
//!
//! Decoders consume from the front of a mutable slice, leaving the rest for
//! the caller.

use crate::error::Result;
use crate::errkey;

/// Escape and terminator bytes for variable-length fields. An embedded 0x00
/// becomes 0x00 0xff; the field ends with 0x00 0x00. 0x00 0x00 < 0x00 0xff
/// keeps "a" sorting before "ab".
const TERMINATOR: [u8; 2] = [0x00, 0x00];
const ESCAPE: [u8; 2] = [0x00, 0xff];

pub fn encode_bool(buf: &mut Vec<u8>, b: bool) {
    buf.push(if b { 0x01 } else { 0x00 });
}

pub fn decode_bool(input: &mut &[u8]) -> Result<bool> {
    match take(input, 1)?[0] {
        0x00 => Ok(false),
        0x01 => Ok(true),
        byte => errkey!("invalid boolean byte {byte:#04x}"),
    }
}

pub fn encode_u8(buf: &mut Vec<u8>, i: u8) {
    buf.push(i);
}

pub fn decode_u8(input: &mut &[u8]) -> Result<u8> {
    Ok(take(input, 1)?[0])
}

pub fn encode_u16(buf: &mut Vec<u8>, i: u16) {
    buf.extend_from_slice(&i.to_be_bytes());
}

pub fn decode_u16(input: &mut &[u8]) -> Result<u16> {
    Ok(u16::from_be_bytes(take(input, 2)?.try_into().unwrap()))
}

pub fn encode_u32(buf: &mut Vec<u8>, i: u32) {
    buf.extend_from_slice(&i.to_be_bytes());
}

pub fn decode_u32(input: &mut &[u8]) -> Result<u32> {
    Ok(u32::from_be_bytes(take(input, 4)?.try_into().unwrap()))
}

pub fn encode_u64(buf: &mut Vec<u8>, i: u64) {
    buf.extend_from_slice(&i.to_be_bytes());
}

pub fn decode_u64(input: &mut &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(take(input, 8)?.try_into().unwrap()))
}

// Signed integers flip the sign bit so that negative values sort before
// positive ones under unsigned byte comparison.

pub fn encode_i8(buf: &mut Vec<u8>, i: i8) {
    encode_u8(buf, (i as u8) ^ (1 << 7));
}

pub fn decode_i8(input: &mut &[u8]) -> Result<i8> {
    Ok((decode_u8(input)? ^ (1 << 7)) as i8)
}

pub fn encode_i16(buf: &mut Vec<u8>, i: i16) {
    encode_u16(buf, (i as u16) ^ (1 << 15));
}

pub fn decode_i16(input: &mut &[u8]) -> Result<i16> {
    Ok((decode_u16(input)? ^ (1 << 15)) as i16)
}

pub fn encode_i32(buf: &mut Vec<u8>, i: i32) {
    encode_u32(buf, (i as u32) ^ (1 << 31));
}

pub fn decode_i32(input: &mut &[u8]) -> Result<i32> {
    Ok((decode_u32(input)? ^ (1 << 31)) as i32)
}

pub fn encode_i64(buf: &mut Vec<u8>, i: i64) {
    encode_u64(buf, (i as u64) ^ (1 << 63));
}

pub fn decode_i64(input: &mut &[u8]) -> Result<i64> {
    Ok((decode_u64(input)? ^ (1 << 63)) as i64)
}

/// Encode a byte string with 0x00 escaping and a 0x00 0x00 terminator.
pub fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        if byte == 0x00 {
            buf.extend_from_slice(&ESCAPE);
        } else {
            buf.push(byte);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

/// Decode an escaped, terminated byte string.
pub fn decode_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    let mut iter = input.iter().enumerate();
    let taken = loop {
        match iter.next() {
            Some((_, 0x00)) => match iter.next() {
                Some((i, 0x00)) => break i + 1, // terminator
                Some((_, 0xff)) => decoded.push(0x00),
                Some((_, byte)) => return errkey!("invalid escape byte {byte:#04x}"),
                None => return errkey!("unexpected end of input"),
            },
            Some((_, byte)) => decoded.push(*byte),
            None => return errkey!("unexpected end of input"),
        }
    };
    *input = &input[taken..];
    Ok(decoded)
}

pub fn encode_string(buf: &mut Vec<u8>, s: &str) {
    encode_bytes(buf, s.as_bytes());
}

pub fn decode_string(input: &mut &[u8]) -> Result<String> {
    let bytes = decode_bytes(input)?;
    String::from_utf8(bytes).map_err(|e| crate::error::Error::KeyCodec(e.to_string()))
}

/// Consume and return the next len bytes of the input.
fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if input.len() < len {
        return errkey!("expected {len} more bytes, have {}", input.len());
    }
    let (taken, rest) = input.split_at(len);
    *input = rest;
    Ok(taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoded<F: Fn(&mut Vec<u8>)>(f: F) -> Vec<u8> {
        let mut buf = Vec::new();
        f(&mut buf);
        buf
    }

    #[test]
    fn test_bool_ordering_and_round_trip() {
        let f = encoded(|b| encode_bool(b, false));
        let t = encoded(|b| encode_bool(b, true));
        assert!(f < t);

        assert!(!decode_bool(&mut f.as_slice()).unwrap());
        assert!(decode_bool(&mut t.as_slice()).unwrap());
        assert!(decode_bool(&mut [0x02].as_slice()).is_err());
    }

    #[test]
    fn test_signed_ordering() {
        let values = [i64::MIN, -100, -1, 0, 1, 100, i64::MAX];
        let keys: Vec<_> = values.iter().map(|v| encoded(|b| encode_i64(b, *v))).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_bytes_escaping() {
        let mut buf = Vec::new();
        encode_bytes(&mut buf, &[0x01, 0x00, 0xff]);
        assert_eq!(buf, vec![0x01, 0x00, 0xff, 0xff, 0x00, 0x00]);

        let mut input = buf.as_slice();
        assert_eq!(decode_bytes(&mut input).unwrap(), vec![0x01, 0x00, 0xff]);
        assert!(input.is_empty());
    }

    #[test]
    fn test_string_prefix_sorts_first() {
        let a = encoded(|b| encode_string(b, "a"));
        let ab = encoded(|b| encode_string(b, "ab"));
        let b_ = encoded(|b| encode_string(b, "b"));
        assert!(a < ab);
        assert!(ab < b_);
    }

    #[test]
    fn test_decode_leaves_remainder() {
        let mut buf = Vec::new();
        encode_string(&mut buf, "key");
        encode_u64(&mut buf, 7);

        let mut input = buf.as_slice();
        assert_eq!(decode_string(&mut input).unwrap(), "key");
        assert_eq!(decode_u64(&mut input).unwrap(), 7);
        assert!(input.is_empty());
    }

    #[test]
    fn test_truncated_input_errors() {
        let buf = encoded(|b| encode_u64(b, 42));
        assert!(decode_u64(&mut &buf[..4]).is_err());
        assert!(decode_bytes(&mut [0x61].as_slice()).is_err());
        assert!(decode_bytes(&mut [0x61, 0x00].as_slice()).is_err());
    }

    proptest! {
        #[test]
        fn prop_u64_round_trip_and_order(a: u64, b: u64) {
            let ea = encoded(|buf| encode_u64(buf, a));
            let eb = encoded(|buf| encode_u64(buf, b));
            prop_assert_eq!(decode_u64(&mut ea.as_slice()).unwrap(), a);
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn prop_i64_round_trip_and_order(a: i64, b: i64) {
            let ea = encoded(|buf| encode_i64(buf, a));
            let eb = encoded(|buf| encode_i64(buf, b));
            prop_assert_eq!(decode_i64(&mut ea.as_slice()).unwrap(), a);
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn prop_bytes_round_trip_and_order(a: Vec<u8>, b: Vec<u8>) {
            let ea = encoded(|buf| encode_bytes(buf, &a));
            let eb = encoded(|buf| encode_bytes(buf, &b));
            prop_assert_eq!(decode_bytes(&mut ea.as_slice()).unwrap(), a.clone());
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn prop_string_round_trip_and_order(a: String, b: String) {
            let ea = encoded(|buf| encode_string(buf, &a));
            let eb = encoded(|buf| encode_string(buf, &b));
            prop_assert_eq!(decode_string(&mut ea.as_slice()).unwrap(), a.clone());
            prop_assert_eq!(a.as_bytes().cmp(b.as_bytes()), ea.cmp(&eb));
        }
    }
}
