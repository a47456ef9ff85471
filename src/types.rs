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

//! Common types.

use std::{fmt, sync::Arc};

/// Multistream-select header, exchanged by both sides before any
/// protocol is proposed.
pub const MULTISTREAM_PROTOCOL: &str = "/multistream/1.0.0";

/// Protocol name of the Noise security protocol.
pub const NOISE_PROTOCOL: &str = "/noise";

/// Protocol name of the yamux multiplexer.
pub const YAMUX_PROTOCOL: &str = "/yamux/1.0.0";

/// Protocol name of the mplex multiplexer.
pub const MPLEX_PROTOCOL: &str = "/mplex/6.7.0";

/// Protocol name of the ping protocol.
pub const PING_PROTOCOL: &str = "/ipfs/ping/1.0.0";

/// Protocol name.
///
/// Short ASCII string starting with `/`, at most 1024 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolName(Arc<str>);

impl ProtocolName {
    /// Get the protocol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProtocolName {
    fn from(protocol: &str) -> Self {
        ProtocolName(Arc::from(protocol))
    }
}

impl From<String> for ProtocolName {
    fn from(protocol: String) -> Self {
        ProtocolName(Arc::from(protocol))
    }
}

impl AsRef<str> for ProtocolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl From<usize> for ConnectionId {
    fn from(id: usize) -> Self {
        ConnectionId(id)
    }
}

/// Unique identifier for a substream within a connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubstreamId(usize);

impl From<usize> for SubstreamId {
    fn from(id: usize) -> Self {
        SubstreamId(id)
    }
}
