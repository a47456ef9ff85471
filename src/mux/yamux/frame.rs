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

//! Yamux frame encoding and decoding.

use crate::error::{Error, FramingError};

use bytes::Bytes;

/// Size of the fixed frame header.
pub(super) const HEADER_SIZE: usize = 12;

/// Protocol version carried in every header.
const VERSION: u8 = 0;

/// Session termination code for a normal close.
pub(super) const GO_AWAY_NORMAL: u32 = 0;

/// Session termination code for a protocol error.
pub(super) const GO_AWAY_PROTOCOL_ERROR: u32 = 1;

/// Session termination code for an internal error.
pub(super) const GO_AWAY_INTERNAL_ERROR: u32 = 2;

/// Frame type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum FrameType {
    /// Data frame, used both for payload delivery and stream lifecycle flags.
    Data,

    /// Flow-control credit grant.
    WindowUpdate,

    /// Keepalive probe or response, nonce in the length field.
    Ping,

    /// Session termination, code in the length field.
    GoAway,
}

impl FrameType {
    fn from_u8(value: u8) -> Option<FrameType> {
        match value {
            0 => Some(FrameType::Data),
            1 => Some(FrameType::WindowUpdate),
            2 => Some(FrameType::Ping),
            3 => Some(FrameType::GoAway),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            FrameType::Data => 0,
            FrameType::WindowUpdate => 1,
            FrameType::Ping => 2,
            FrameType::GoAway => 3,
        }
    }
}

/// Frame flags.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(super) struct Flags(u16);

impl Flags {
    /// First frame of a new stream.
    pub(super) const SYN: Flags = Flags(0x01);

    /// Acknowledgement of a new stream.
    pub(super) const ACK: Flags = Flags(0x02);

    /// Half-close of the sender's direction.
    pub(super) const FIN: Flags = Flags(0x04);

    /// Immediate teardown of the stream.
    pub(super) const RST: Flags = Flags(0x08);

    pub(super) fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

/// One yamux frame: a 12-byte header and, for data frames, a payload.
#[derive(Debug, Clone)]
pub(super) struct Frame {
    /// Frame type.
    pub frame_type: FrameType,

    /// Frame flags.
    pub flags: Flags,

    /// Stream the frame belongs to, `0` for session-level frames.
    pub stream_id: u32,

    /// Payload size for data frames, credit delta for window updates, nonce
    /// for pings, termination code for goaways.
    pub length: u32,

    /// Payload, non-empty only for data frames.
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame.
    pub fn data(stream_id: u32, flags: Flags, payload: Bytes) -> Frame {
        Frame {
            frame_type: FrameType::Data,
            flags,
            stream_id,
            length: payload.len() as u32,
            payload,
        }
    }

    /// Create a window update frame granting `delta` bytes of credit.
    pub fn window_update(stream_id: u32, flags: Flags, delta: u32) -> Frame {
        Frame {
            frame_type: FrameType::WindowUpdate,
            flags,
            stream_id,
            length: delta,
            payload: Bytes::new(),
        }
    }

    /// Create a ping frame.
    pub fn ping(flags: Flags, nonce: u32) -> Frame {
        Frame {
            frame_type: FrameType::Ping,
            flags,
            stream_id: 0,
            length: nonce,
            payload: Bytes::new(),
        }
    }

    /// Create a session termination frame.
    pub fn go_away(code: u32) -> Frame {
        Frame {
            frame_type: FrameType::GoAway,
            flags: Flags::default(),
            stream_id: 0,
            length: code,
            payload: Bytes::new(),
        }
    }

    /// Serialize the frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buffer.push(VERSION);
        buffer.push(self.frame_type.as_u8());
        buffer.extend_from_slice(&self.flags.0.to_be_bytes());
        buffer.extend_from_slice(&self.stream_id.to_be_bytes());
        buffer.extend_from_slice(&self.length.to_be_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer
    }

    /// Parse a frame header. The payload, if any, is read separately.
    pub fn parse_header(header: &[u8; HEADER_SIZE]) -> crate::Result<Frame> {
        if header[0] != VERSION {
            return Err(Error::Framing(FramingError::UnsupportedVersion(header[0])));
        }

        let frame_type = FrameType::from_u8(header[1])
            .ok_or(Error::Framing(FramingError::UnknownFrameType(header[1])))?;

        Ok(Frame {
            frame_type,
            flags: Flags(u16::from_be_bytes([header[2], header[3]])),
            stream_id: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
            length: u32::from_be_bytes([header[8], header[9], header[10], header[11]]),
            payload: Bytes::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let frame = Frame::data(7, Flags::SYN | Flags::ACK, Bytes::from_static(b"payload"));
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + 7);

        let header: [u8; HEADER_SIZE] = encoded[..HEADER_SIZE].try_into().unwrap();
        let parsed = Frame::parse_header(&header).unwrap();

        assert_eq!(parsed.frame_type, FrameType::Data);
        assert!(parsed.flags.contains(Flags::SYN));
        assert!(parsed.flags.contains(Flags::ACK));
        assert!(!parsed.flags.contains(Flags::FIN));
        assert_eq!(parsed.stream_id, 7);
        assert_eq!(parsed.length, 7);
    }

    #[test]
    fn unknown_version_rejected() {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = 1;

        match Frame::parse_header(&header) {
            Err(Error::Framing(FramingError::UnsupportedVersion(1))) => {}
            result => panic!("expected unsupported version, got {result:?}"),
        }
    }

    #[test]
    fn unknown_type_rejected() {
        let mut header = [0u8; HEADER_SIZE];
        header[1] = 4;

        match Frame::parse_header(&header) {
            Err(Error::Framing(FramingError::UnknownFrameType(4))) => {}
            result => panic!("expected unknown frame type, got {result:?}"),
        }
    }
}
