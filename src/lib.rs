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

//! Minimal peer-to-peer networking stack.
//!
//! Dials a remote peer over TCP, authenticates both parties with a Noise XX
//! handshake bound to their long-term identity keys, multiplexes many logical
//! substreams over the single encrypted connection (yamux, with mplex as a
//! fallback) and negotiates application protocols per substream with
//! multistream-select.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod multistream;
pub mod mux;
pub mod peer_id;
pub mod protocol;
pub mod transport;
pub mod types;
pub mod upgrader;

pub use error::Error;
pub use peer_id::PeerId;

/// Protobuf schemas compiled by `prost-build`.
pub(crate) mod schema {
    pub(crate) mod keys {
        include!(concat!(env!("OUT_DIR"), "/keys.rs"));
    }
    pub(crate) mod noise {
        include!(concat!(env!("OUT_DIR"), "/noise.rs"));
    }
}

/// Result type of the crate.
pub type Result<T> = std::result::Result<T, error::Error>;
