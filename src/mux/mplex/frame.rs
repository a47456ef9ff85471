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

//! Mplex frame encoding.
//!
//! Wire form is `varint(stream_id << 3 | flag) ‖ varint(len) ‖ payload`.

use crate::{
    codec,
    error::{Error, FramingError},
};

use bytes::Bytes;

/// Frame flag, the low three bits of the header varint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum MplexFlag {
    /// Open a new stream, payload is an optional name.
    NewStream,

    /// Message sent by the receiver side of the stream.
    MessageReceiver,

    /// Message sent by the initiator side of the stream.
    MessageInitiator,

    /// Half-close by the receiver side.
    CloseReceiver,

    /// Half-close by the initiator side.
    CloseInitiator,

    /// Reset by the receiver side.
    ResetReceiver,

    /// Reset by the initiator side.
    ResetInitiator,
}

impl MplexFlag {
    pub fn from_u8(value: u8) -> crate::Result<MplexFlag> {
        match value {
            0 => Ok(MplexFlag::NewStream),
            1 => Ok(MplexFlag::MessageReceiver),
            2 => Ok(MplexFlag::MessageInitiator),
            3 => Ok(MplexFlag::CloseReceiver),
            4 => Ok(MplexFlag::CloseInitiator),
            5 => Ok(MplexFlag::ResetReceiver),
            6 => Ok(MplexFlag::ResetInitiator),
            value => Err(Error::Framing(FramingError::UnknownFrameType(value))),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MplexFlag::NewStream => 0,
            MplexFlag::MessageReceiver => 1,
            MplexFlag::MessageInitiator => 2,
            MplexFlag::CloseReceiver => 3,
            MplexFlag::CloseInitiator => 4,
            MplexFlag::ResetReceiver => 5,
            MplexFlag::ResetInitiator => 6,
        }
    }
}

/// One mplex frame.
#[derive(Debug, Clone)]
pub(super) struct Frame {
    /// Frame flag.
    pub flag: MplexFlag,

    /// Stream ID in the sender's numbering.
    pub stream_id: u64,

    /// Payload, non-empty only for messages and new streams.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(flag: MplexFlag, stream_id: u64, payload: Bytes) -> Frame {
        Frame {
            flag,
            stream_id,
            payload,
        }
    }

    /// Split a header varint into stream ID and flag.
    pub fn parse_header(header: u64) -> crate::Result<(u64, MplexFlag)> {
        Ok((header >> 3, MplexFlag::from_u8((header & 0x07) as u8)?))
    }

    /// Serialize the frame.
    pub fn encode(&self) -> Vec<u8> {
        let header = (self.stream_id << 3) | u64::from(self.flag.as_u8());

        let mut buffer = codec::encode_varint(header);
        buffer.extend_from_slice(&codec::encode_varint(self.payload.len() as u64));
        buffer.extend_from_slice(&self.payload);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packs_id_and_flag() {
        let frame = Frame::new(MplexFlag::MessageInitiator, 5, Bytes::from_static(b"abc"));
        let encoded = frame.encode();

        let (header, consumed) = codec::decode_varint(&encoded).unwrap().unwrap();
        let (stream_id, flag) = Frame::parse_header(header).unwrap();
        assert_eq!(stream_id, 5);
        assert_eq!(flag, MplexFlag::MessageInitiator);

        let (length, consumed_len) = codec::decode_varint(&encoded[consumed..]).unwrap().unwrap();
        assert_eq!(length, 3);
        assert_eq!(&encoded[consumed + consumed_len..], b"abc");
    }

    #[test]
    fn unknown_flag_rejected() {
        match Frame::parse_header(7) {
            Err(Error::Framing(FramingError::UnknownFrameType(7))) => {}
            result => panic!("expected unknown frame type, got {result:?}"),
        }
    }
}
