// Copyright 2023 litep2p developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Unsigned varint codec and length-prefixed framing.

use crate::error::{Error, FramingError};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded size of a varint. Nine 7-bit groups cover 63 bits; the
/// continuation bit must be clear on the ninth byte.
pub const MAX_VARINT_SIZE: usize = 9;

/// Encode `value` as an unsigned LEB128 varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut buffer = unsigned_varint::encode::u64_buffer();
    unsigned_varint::encode::u64(value, &mut buffer).to_vec()
}

/// Decode an unsigned LEB128 varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// varint is still incomplete.
pub fn decode_varint(bytes: &[u8]) -> crate::Result<Option<(u64, usize)>> {
    let mut value = 0u64;

    for (index, byte) in bytes.iter().enumerate() {
        if index >= MAX_VARINT_SIZE || (index == MAX_VARINT_SIZE - 1 && byte & 0x80 != 0) {
            return Err(Error::Framing(FramingError::VarintOverflow));
        }

        value |= u64::from(byte & 0x7f) << (7 * index);

        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }

    Ok(None)
}

/// Read an unsigned LEB128 varint from `io`, failing with
/// [`FramingError::VarintOverflow`] if the value does not fit in 63 bits or
/// exceeds `max`.
pub async fn read_varint<R: AsyncRead + Unpin>(io: &mut R, max: u64) -> crate::Result<u64> {
    let mut value = 0u64;
    let mut byte = [0u8; 1];

    for index in 0..MAX_VARINT_SIZE {
        io.read_exact(&mut byte).await?;

        if index == MAX_VARINT_SIZE - 1 && byte[0] & 0x80 != 0 {
            return Err(Error::Framing(FramingError::VarintOverflow));
        }

        value |= u64::from(byte[0] & 0x7f) << (7 * index);

        if byte[0] & 0x80 == 0 {
            if value > max {
                return Err(Error::Framing(FramingError::VarintOverflow));
            }
            return Ok(value);
        }
    }

    Err(Error::Framing(FramingError::VarintOverflow))
}

/// Write `value` to `io` as an unsigned LEB128 varint.
pub async fn write_varint<W: AsyncWrite + Unpin>(io: &mut W, value: u64) -> crate::Result<()> {
    io.write_all(&encode_varint(value)).await.map_err(From::from)
}

/// Prefix `frame` with its varint-encoded length.
pub fn encode_length_prefixed(frame: &[u8]) -> Vec<u8> {
    let mut buffer = encode_varint(frame.len() as u64);
    buffer.extend_from_slice(frame);
    buffer
}

/// Read one length-prefixed frame from `io`.
///
/// A frame whose declared length exceeds `max` is rejected before any
/// allocation is made for it.
pub async fn read_length_prefixed<R: AsyncRead + Unpin>(
    io: &mut R,
    max: usize,
) -> crate::Result<Vec<u8>> {
    let size = read_varint(io, u64::MAX >> 1).await?;

    if size > max as u64 {
        return Err(Error::Framing(FramingError::OversizedFrame {
            size: size as usize,
            max,
        }));
    }

    let mut frame = vec![0u8; size as usize];
    io.read_exact(&mut frame).await?;

    Ok(frame)
}

/// Write `frame` to `io`, prefixed with its varint-encoded length, as a
/// single write.
pub async fn write_length_prefixed<W: AsyncWrite + Unpin>(
    io: &mut W,
    frame: &[u8],
) -> crate::Result<()> {
    io.write_all(&encode_length_prefixed(frame))
        .await
        .map_err(From::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use quickcheck::quickcheck;

    quickcheck! {
        fn varint_roundtrip_identity(value: u64) -> bool {
            let value = value >> 1;
            let encoded = encode_varint(value);
            let expected_len = match value {
                0 => 1,
                n => (64 - n.leading_zeros() as usize + 6) / 7,
            };

            encoded.len() == expected_len
                && matches!(decode_varint(&encoded), Ok(Some((v, n))) if v == value && n == encoded.len())
        }
    }

    #[tokio::test]
    async fn varint_boundaries() {
        for (value, len) in [(0u64, 1usize), (127, 1), (128, 2), (16383, 2), (16384, 3)] {
            let encoded = encode_varint(value);
            assert_eq!(encoded.len(), len);

            let mut cursor = Cursor::new(encoded);
            assert_eq!(read_varint(&mut cursor, u64::MAX >> 1).await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn varint_continuation_on_ninth_byte_overflows() {
        let mut cursor = Cursor::new(vec![0xffu8; 10]);
        match read_varint(&mut cursor, u64::MAX >> 1).await {
            Err(Error::Framing(FramingError::VarintOverflow)) => {}
            result => panic!("expected overflow, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn varint_caller_maximum_enforced() {
        let mut cursor = Cursor::new(encode_varint(1025));
        match read_varint(&mut cursor, 1024).await {
            Err(Error::Framing(FramingError::VarintOverflow)) => {}
            result => panic!("expected overflow, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn length_prefixed_roundtrip() {
        let frame = b"/multistream/1.0.0\n".to_vec();
        let mut buffer = Vec::new();
        write_length_prefixed(&mut buffer, &frame).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_length_prefixed(&mut cursor, 1024).await.unwrap(), frame);
    }

    #[tokio::test]
    async fn oversized_frame_rejected_before_read() {
        let mut buffer = encode_varint(2048);
        buffer.extend_from_slice(&[0u8; 16]);

        let mut cursor = Cursor::new(buffer);
        match read_length_prefixed(&mut cursor, 1024).await {
            Err(Error::Framing(FramingError::OversizedFrame { size: 2048, max: 1024 })) => {}
            result => panic!("expected oversized frame, got {result:?}"),
        }
    }

    #[test]
    fn incomplete_varint_reports_none() {
        assert!(matches!(decode_varint(&[0x80]), Ok(None)));
        assert!(matches!(decode_varint(&[0x80, 0x01]), Ok(Some((128, 2)))));
    }

    #[test]
    fn known_wire_vectors() {
        use hex_literal::hex;

        assert_eq!(encode_varint(1), hex!("01"));
        assert_eq!(encode_varint(127), hex!("7f"));
        assert_eq!(encode_varint(128), hex!("8001"));
        assert_eq!(encode_varint(300), hex!("ac02"));
        assert_eq!(encode_varint(16384), hex!("808001"));
    }
}
