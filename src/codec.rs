//! Framing codec for the counting protocol.
//!
//! Both framed values on the wire are fixed-width big-endian `u32`s:
//!
//! ```text
//! Request:  <N: u32 BE><N payload bytes>
//! Response: <count: u32 BE>
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Width in bytes of every framed integer.
pub const FRAME_HEADER_LEN: usize = 4;

/// Encode a value as 4 big-endian bytes.
pub fn encode_u32(value: u32) -> [u8; FRAME_HEADER_LEN] {
    value.to_be_bytes()
}

/// Decode 4 big-endian bytes.
pub fn decode_u32(bytes: [u8; FRAME_HEADER_LEN]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Build a complete request frame (length prefix followed by payload).
///
/// Returns `None` if the payload does not fit in a `u32` length.
pub fn encode_request(payload: &[u8]) -> Option<Bytes> {
    let len = u32::try_from(payload.len()).ok()?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u32(len);
    frame.put_slice(payload);
    Some(frame.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_big_endian() {
        assert_eq!(encode_u32(1), [0, 0, 0, 1]);
        assert_eq!(encode_u32(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn test_round_trip_boundaries() {
        for value in [0, 1, 255, 256, 65_535, 1 << 24, u32::MAX - 1, u32::MAX] {
            assert_eq!(decode_u32(encode_u32(value)), value);
        }
    }

    #[test]
    fn test_encode_request() {
        let frame = encode_request(b"Hi!").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, b'H', b'i', b'!']);

        let empty = encode_request(b"").unwrap();
        assert_eq!(&empty[..], &[0, 0, 0, 0]);
    }
}
