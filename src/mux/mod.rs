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

//! Stream multiplexers.

use futures::{AsyncRead, AsyncWrite};

pub mod mplex;
pub mod yamux;

/// Byte pipe provided by a muxer.
///
/// Every substream is itself a byte pipe: ordered, reliable and owned by
/// exactly one task at a time.
pub trait Substream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Substream for T {}

/// Multiplexed session over an encrypted connection.
///
/// Concrete session types are tagged variants so the per-frame hot path
/// stays monomorphised inside each muxer.
pub enum MuxedSession {
    /// Yamux session.
    Yamux(yamux::Session),

    /// Mplex session.
    Mplex(mplex::Session),
}

impl MuxedSession {
    /// Open a new outbound substream.
    pub fn open_stream(&self) -> crate::Result<Box<dyn Substream>> {
        match self {
            MuxedSession::Yamux(session) => session.open_stream().map(boxed),
            MuxedSession::Mplex(session) => session.open_stream().map(boxed),
        }
    }

    /// Wait for the next inbound substream.
    pub async fn accept_stream(&mut self) -> crate::Result<Box<dyn Substream>> {
        match self {
            MuxedSession::Yamux(session) => session.accept_stream().await.map(boxed),
            MuxedSession::Mplex(session) => session.accept_stream().await.map(boxed),
        }
    }

    /// Close the session, resetting all live substreams.
    pub fn close(&self) {
        match self {
            MuxedSession::Yamux(session) => session.close(),
            MuxedSession::Mplex(session) => session.close(),
        }
    }
}

fn boxed<T: Substream + 'static>(substream: T) -> Box<dyn Substream> {
    Box::new(substream)
}
