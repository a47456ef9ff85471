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

//! Transport abstractions.

use crate::peer_id::PeerId;

use futures::{AsyncRead, AsyncWrite};
use multiaddr::Multiaddr;

pub mod tcp;

/// Raw byte pipe between two peers.
///
/// Every layer of the connection consumes a lower pipe and exposes one
/// upward; a pipe exclusively owns the one beneath it and releases it on
/// close.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Trait implemented by transports capable of dialing remote peers.
#[async_trait::async_trait]
pub trait Transport {
    /// Dial `address` and return a raw byte pipe, together with the peer ID
    /// carried in the address's `/p2p` component, if any.
    async fn dial(&self, address: Multiaddr) -> crate::Result<(Box<dyn Connection>, Option<PeerId>)>;
}
