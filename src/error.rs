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

//! Error types of the crate.

use crate::peer_id::PeerId;

use thiserror::Error;

use std::io;

/// Errors that can occur during the lifetime of a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying byte pipe. Recoverable only by
    /// discarding the session.
    #[error("i/o error: `{0}`")]
    Io(#[from] io::Error),

    /// Invalid argument or configuration supplied by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Failed to parse or use a network address.
    #[error("address error: `{0}`")]
    Address(#[from] AddressError),

    /// Malformed frame on the wire.
    #[error("framing error: `{0}`")]
    Framing(#[from] FramingError),

    /// Protocol negotiation failed.
    #[error("negotiation error: `{0}`")]
    Negotiation(#[from] NegotiationError),

    /// Cryptographic failure, fatal to the session.
    #[error("crypto error: `{0}`")]
    Crypto(#[from] CryptoError),

    /// Substream-level failure, the session survives.
    #[error("substream error: `{0}`")]
    Substream(#[from] SubstreamError),

    /// Remote peer violated the muxer protocol.
    #[error("muxer protocol violation: {0}")]
    MuxerProtocolViolation(&'static str),

    /// Remote peer terminated the session.
    #[error("remote sent GoAway (code {0})")]
    GoAwayReceived(u32),

    /// Remote identity did not match the expected one.
    #[error("peer id mismatch: expected `{expected}`, got `{got}`")]
    PeerIdMismatch {
        /// Peer ID the dialer expected to reach.
        expected: PeerId,

        /// Peer ID the remote actually presented.
        got: PeerId,
    },

    /// Deadline expired.
    #[error("operation timed out")]
    Timeout,

    /// Caller-initiated abort.
    #[error("operation cancelled")]
    Cancelled,

    /// The session backing this handle is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Errors from parsing and matching multiaddresses.
#[derive(Debug, Error)]
pub enum AddressError {
    /// Address contains a protocol the TCP transport cannot dial.
    #[error("invalid protocol")]
    InvalidProtocol,

    /// `/p2p` component did not contain a valid peer ID.
    #[error("invalid peer id")]
    PeerIdMissing,
}

/// Errors from the varint codec and length-prefixed framing.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Varint did not terminate within 9 bytes or exceeded the caller's
    /// maximum.
    #[error("varint overflow")]
    VarintOverflow,

    /// Declared frame length exceeds the allowed maximum.
    #[error("frame of {size} bytes exceeds maximum of {max} bytes")]
    OversizedFrame {
        /// Length declared by the frame header.
        size: usize,

        /// Maximum the receiver accepts.
        max: usize,
    },

    /// Frame header carried an unknown type.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// Frame header carried an unsupported version.
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
}

/// Errors from multistream-select.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Remote did not send the `/multistream/1.0.0` header.
    #[error("multistream-select header mismatch")]
    HeaderMismatch,

    /// Remote rejected every proposed protocol.
    #[error("no mutually supported protocol")]
    NoMutualProtocol,

    /// Received line was not a well-formed protocol id.
    #[error("malformed multistream-select line")]
    MalformedLine,

    /// Remote closed the pipe mid-negotiation.
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

/// Errors from the Noise handshake and transport ciphers.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Error reported by the Noise state machine.
    #[error("noise failure: `{0}`")]
    Noise(#[from] snow::Error),

    /// Handshake payload was not a valid protobuf message.
    #[error("failed to decode handshake payload: `{0}`")]
    PayloadDecode(#[from] prost::DecodeError),

    /// Remote identity key could not be decoded.
    #[error("failed to decode remote public key")]
    InvalidKey,

    /// Signature did not bind the remote static key to its identity key.
    #[error("invalid signature over the noise static key")]
    InvalidSignature,

    /// Handshake finished without the remote sending its identity payload.
    #[error("identity payload missing from handshake")]
    PayloadMissing,
}

/// Errors local to one substream. The parent session survives these.
#[derive(Debug, Error)]
pub enum SubstreamError {
    /// Substream was reset, locally or by the remote.
    #[error("substream reset")]
    Reset,

    /// Substream is closed in the written direction.
    #[error("substream closed")]
    Closed,

    /// Parent session terminated.
    #[error("session closed")]
    SessionClosed,

    /// Inbound buffer limit exceeded, substream was reset.
    #[error("inbound buffer limit exceeded")]
    BufferOverflow,
}

/// Failure kinds surfaced by the connection upgrader.
///
/// Every lower-layer error is mapped to one of these kinds before the
/// upgrader returns; the lower pipe is closed in all cases.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// A required argument was null or invalid.
    #[error("required argument was null or invalid")]
    NullArgument,

    /// Handshake deadline expired.
    #[error("handshake deadline expired")]
    Timeout,

    /// No mutually supported security protocol.
    #[error("no mutually supported security protocol")]
    NoSecurity,

    /// No mutually supported muxer protocol.
    #[error("no mutually supported muxer protocol")]
    NoMuxer,

    /// Security handshake failed.
    #[error("security handshake failed: `{0}`")]
    HandshakeFailed(#[source] Box<Error>),

    /// Unexpected internal failure.
    #[error("internal error: `{0}`")]
    Internal(#[source] Box<Error>),
}

impl UpgradeError {
    /// Short, stable name of the error kind, used by diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpgradeError::NullArgument => "NULL_ARGUMENT",
            UpgradeError::Timeout => "TIMEOUT",
            UpgradeError::NoSecurity => "SECURITY",
            UpgradeError::NoMuxer => "MUXER",
            UpgradeError::HandshakeFailed(_) => "HANDSHAKE",
            UpgradeError::Internal(_) => "INTERNAL",
        }
    }
}
