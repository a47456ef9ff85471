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

//! [`/ipfs/ping/1.0.0`](https://github.com/libp2p/specs/blob/master/ping/ping.md) implementation.

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use rand::RngCore;
use thiserror::Error;

use std::{
    io,
    time::{Duration, Instant},
};

/// Logging target for the file.
const LOG_TARGET: &str = "ipfs::ping";

/// Size of the ping payload.
pub const PAYLOAD_SIZE: usize = 32;

/// Errors of a ping round-trip.
#[derive(Debug, Error)]
pub enum PingError {
    /// Echoed payload was empty, short, or different from the one sent.
    #[error("ping payload mismatch")]
    Mismatch,

    /// Substream failed mid-round-trip.
    #[error("ping i/o failure: `{0}`")]
    Io(#[from] io::Error),
}

/// Perform one ping round-trip on `substream`.
///
/// Writes 32 random bytes, reads 32 bytes back and compares. The round-trip
/// time is measured from just before the write to just after the read.
pub async fn ping<S: AsyncRead + AsyncWrite + Unpin>(
    substream: &mut S,
) -> Result<Duration, PingError> {
    let mut payload = [0u8; PAYLOAD_SIZE];
    rand::thread_rng().fill_bytes(&mut payload);

    let now = Instant::now();
    substream.write_all(&payload).await?;
    substream.flush().await?;

    let mut echo = [0u8; PAYLOAD_SIZE];
    let mut nread = 0usize;
    while nread < PAYLOAD_SIZE {
        match substream.read(&mut echo[nread..]).await? {
            0 => return Err(PingError::Mismatch),
            n => nread += n,
        }
    }
    let elapsed = now.elapsed();

    if echo != payload {
        return Err(PingError::Mismatch);
    }

    tracing::trace!(target: LOG_TARGET, ?elapsed, "ping round-trip");
    Ok(elapsed)
}

/// Echo inbound pings on `substream` until the remote closes it.
pub async fn respond<S: AsyncRead + AsyncWrite + Unpin>(substream: &mut S) -> Result<(), PingError> {
    loop {
        let mut payload = [0u8; PAYLOAD_SIZE];
        match substream.read_exact(&mut payload).await {
            Ok(()) => {
                substream.write_all(&payload).await?;
                substream.flush().await?;
            }
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(error) => return Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_ringbuf::Endpoint;

    #[tokio::test]
    async fn ping_roundtrip() {
        let (mut dialer, mut listener) = Endpoint::pair(1024, 1024);

        let responder = tokio::spawn(async move { respond(&mut listener).await });

        let rtt = ping(&mut dialer).await.unwrap();
        assert!(rtt < Duration::from_secs(1));

        drop(dialer);
        responder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn several_roundtrips_on_one_substream() {
        let (mut dialer, mut listener) = Endpoint::pair(1024, 1024);

        tokio::spawn(async move {
            let _ = respond(&mut listener).await;
        });

        for _ in 0..5 {
            ping(&mut dialer).await.unwrap();
        }
    }

    #[tokio::test]
    async fn tampered_echo_is_a_mismatch() {
        let (mut dialer, mut listener) = Endpoint::pair(1024, 1024);

        tokio::spawn(async move {
            let mut payload = [0u8; PAYLOAD_SIZE];
            listener.read_exact(&mut payload).await.unwrap();
            payload[0] ^= 0x01;
            listener.write_all(&payload).await.unwrap();
            listener.flush().await.unwrap();
        });

        match ping(&mut dialer).await {
            Err(PingError::Mismatch) => {}
            result => panic!("expected mismatch, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn empty_echo_is_a_mismatch() {
        let (mut dialer, mut listener) = Endpoint::pair(1024, 1024);

        tokio::spawn(async move {
            let mut payload = [0u8; PAYLOAD_SIZE];
            listener.read_exact(&mut payload).await.unwrap();
            drop(listener);
        });

        match ping(&mut dialer).await {
            Err(PingError::Mismatch) => {}
            result => panic!("expected mismatch, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn short_echo_is_a_mismatch() {
        let (mut dialer, mut listener) = Endpoint::pair(1024, 1024);

        tokio::spawn(async move {
            let mut payload = [0u8; PAYLOAD_SIZE];
            listener.read_exact(&mut payload).await.unwrap();
            listener.write_all(&payload[..PAYLOAD_SIZE / 2]).await.unwrap();
            listener.flush().await.unwrap();
            drop(listener);
        });

        match ping(&mut dialer).await {
            Err(PingError::Mismatch) => {}
            result => panic!("expected mismatch, got {result:?}"),
        }
    }
}
