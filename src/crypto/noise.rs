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

//! Noise XX handshake and transport cipher.
//!
//! The handshake authenticates both parties by their long-term identity keys:
//! the second and third handshake messages carry a payload binding the Noise
//! static key to the identity key with a signature over
//! `"noise-libp2p-static-key:" ‖ static_public_key`. After the handshake the
//! pipe carries `u16_be(len) ‖ ciphertext` frames, each ciphertext being the
//! plaintext plus a 16-byte authentication tag.

use crate::{
    config::Role,
    crypto::{ed25519::Keypair, PublicKey},
    error::{CryptoError, Error},
    peer_id::PeerId,
    schema,
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use prost::Message;
use snow::{params::NoiseParams, HandshakeState, TransportState};

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

/// Logging target for the file.
const LOG_TARGET: &str = "crypto::noise";

/// Noise parameters of the XX handshake.
const NOISE_PARAMETERS: &str = "Noise_XX_25519_ChaChaPoly_SHA256";

/// Domain separation string of the identity-binding signature.
const STATIC_KEY_DOMAIN: &str = "noise-libp2p-static-key:";

/// Maximum size of one Noise wire frame's ciphertext.
const MAX_FRAME_SIZE: usize = 65535;

/// Length of the Poly1305 authentication tag.
const TAG_SIZE: usize = 16;

/// Maximum plaintext one frame can carry.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_FRAME_SIZE - TAG_SIZE;

/// Noise handshake configuration.
pub struct NoiseConfiguration {
    /// Identity keypair of the local node.
    pub keypair: Keypair,

    /// Connection role.
    pub role: Role,

    /// Maximum plaintext carried by one frame after the handshake.
    pub max_plaintext: usize,
}

impl NoiseConfiguration {
    /// Create new [`NoiseConfiguration`].
    pub fn new(keypair: &Keypair, role: Role) -> Self {
        Self {
            keypair: keypair.clone(),
            role,
            max_plaintext: MAX_PLAINTEXT_SIZE,
        }
    }
}

/// Noise handshake state and the locally prepared identity payload.
struct NoiseContext {
    /// Noise XX state machine.
    noise: HandshakeState,

    /// Protobuf-encoded identity payload, sent in the second (listener) or
    /// third (dialer) handshake message.
    payload: Vec<u8>,
}

impl NoiseContext {
    /// Create a new [`NoiseContext`], generating a fresh static keypair and
    /// binding it to `keypair` with a signature.
    fn new(keypair: &Keypair, role: Role) -> crate::Result<Self> {
        let params: NoiseParams = NOISE_PARAMETERS.parse().map_err(CryptoError::from)?;

        let builder = snow::Builder::new(params);
        let dh_keypair = builder.generate_keypair().map_err(CryptoError::from)?;

        let noise = {
            let builder = builder.local_private_key(&dh_keypair.private);
            match role {
                Role::Dialer => builder.build_initiator(),
                Role::Listener => builder.build_responder(),
            }
            .map_err(CryptoError::from)?
        };

        let to_sign = [STATIC_KEY_DOMAIN.as_bytes(), &dh_keypair.public].concat();
        let payload = schema::noise::NoiseHandshakePayload {
            identity_key: Some(PublicKey::Ed25519(keypair.public()).to_protobuf_encoding()),
            identity_sig: Some(keypair.sign(&to_sign)),
            data: None,
        }
        .encode_to_vec();

        Ok(Self { noise, payload })
    }
}

/// Parse the remote identity payload and verify that it binds the remote
/// Noise static key to the remote identity key.
fn parse_peer_identity(noise: &HandshakeState, payload: &[u8]) -> crate::Result<PublicKey> {
    let payload =
        schema::noise::NoiseHandshakePayload::decode(payload).map_err(CryptoError::from)?;

    let identity_key = payload
        .identity_key
        .as_deref()
        .ok_or(Error::Crypto(CryptoError::PayloadMissing))?;
    let public = PublicKey::from_protobuf_encoding(identity_key)?;

    let static_key = noise
        .get_remote_static()
        .ok_or(Error::Crypto(CryptoError::PayloadMissing))?;
    let signature = payload
        .identity_sig
        .as_deref()
        .ok_or(Error::Crypto(CryptoError::PayloadMissing))?;

    let to_verify = [STATIC_KEY_DOMAIN.as_bytes(), static_key].concat();
    if !public.verify(&to_verify, signature) {
        return Err(Error::Crypto(CryptoError::InvalidSignature));
    }

    Ok(public)
}

/// Send one `u16_be`-prefixed handshake frame.
async fn send_frame<S: AsyncWrite + Unpin>(io: &mut S, frame: &[u8]) -> crate::Result<()> {
    debug_assert!(frame.len() <= MAX_FRAME_SIZE);

    let mut message = Vec::with_capacity(frame.len() + 2);
    message.extend_from_slice(&(frame.len() as u16).to_be_bytes());
    message.extend_from_slice(frame);

    io.write_all(&message).await?;
    io.flush().await?;

    Ok(())
}

/// Read one `u16_be`-prefixed handshake frame.
async fn read_frame<S: AsyncRead + Unpin>(io: &mut S) -> crate::Result<Vec<u8>> {
    let mut size = [0u8; 2];
    io.read_exact(&mut size).await?;

    let mut frame = vec![0u8; u16::from_be_bytes(size) as usize];
    io.read_exact(&mut frame).await?;

    Ok(frame)
}

/// Perform the Noise XX handshake over `io`.
///
/// Returns the encrypted byte pipe and the authenticated peer ID of the
/// remote node.
pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(
    mut io: S,
    config: NoiseConfiguration,
) -> crate::Result<(NoiseSocket<S>, PeerId)> {
    tracing::debug!(target: LOG_TARGET, role = ?config.role, "start noise handshake");

    let mut context = NoiseContext::new(&config.keypair, config.role)?;
    let mut buffer = vec![0u8; MAX_FRAME_SIZE];

    let remote_key = match config.role {
        Role::Dialer => {
            // -> e
            let size = context
                .noise
                .write_message(&[], &mut buffer)
                .map_err(CryptoError::from)?;
            send_frame(&mut io, &buffer[..size]).await?;

            // <- e, ee, s, es, payload
            let frame = read_frame(&mut io).await?;
            let size = context
                .noise
                .read_message(&frame, &mut buffer)
                .map_err(CryptoError::from)?;
            let remote_key = parse_peer_identity(&context.noise, &buffer[..size])?;

            // -> s, se, payload
            let size = context
                .noise
                .write_message(&context.payload, &mut buffer)
                .map_err(CryptoError::from)?;
            send_frame(&mut io, &buffer[..size]).await?;

            remote_key
        }
        Role::Listener => {
            // <- e
            let frame = read_frame(&mut io).await?;
            context
                .noise
                .read_message(&frame, &mut buffer)
                .map_err(CryptoError::from)?;

            // -> e, ee, s, es, payload
            let size = context
                .noise
                .write_message(&context.payload, &mut buffer)
                .map_err(CryptoError::from)?;
            send_frame(&mut io, &buffer[..size]).await?;

            // <- s, se, payload
            let frame = read_frame(&mut io).await?;
            let size = context
                .noise
                .read_message(&frame, &mut buffer)
                .map_err(CryptoError::from)?;
            parse_peer_identity(&context.noise, &buffer[..size])?
        }
    };

    let peer = remote_key.to_peer_id();
    let noise = context.noise.into_transport_mode().map_err(CryptoError::from)?;

    tracing::debug!(target: LOG_TARGET, ?peer, "noise handshake done");

    Ok((NoiseSocket::new(io, noise, config.max_plaintext), peer))
}

/// Encrypted byte pipe produced by a completed handshake.
///
/// Both cipher counters live inside the transport state and are strictly
/// monotonic; a decryption failure poisons the pipe permanently.
pub struct NoiseSocket<S> {
    /// Underlying byte pipe.
    io: S,

    /// Transport-phase cipher states.
    noise: TransportState,

    /// Maximum plaintext per outbound frame.
    max_plaintext: usize,

    /// Inbound frame under accumulation. The first two bytes are the length
    /// prefix; the vector is grown to the full frame size once the prefix is
    /// complete.
    read_buffer: Vec<u8>,

    /// How much of `read_buffer` holds received bytes.
    read_offset: usize,

    /// Decrypted bytes not yet handed to the caller.
    decrypted: Vec<u8>,

    /// How much of `decrypted` the caller has consumed.
    decrypted_offset: usize,

    /// Encrypted frame waiting to be written out.
    pending_write: Vec<u8>,

    /// How much of `pending_write` has been written.
    pending_offset: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> NoiseSocket<S> {
    fn new(io: S, noise: TransportState, max_plaintext: usize) -> Self {
        Self {
            io,
            noise,
            max_plaintext: max_plaintext.min(MAX_PLAINTEXT_SIZE),
            read_buffer: vec![0u8; 2],
            read_offset: 0,
            decrypted: Vec::new(),
            decrypted_offset: 0,
            pending_write: Vec::new(),
            pending_offset: 0,
        }
    }

    /// Write as much of the pending encrypted frame as the pipe accepts.
    fn poll_flush_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.pending_offset < self.pending_write.len() {
            let nwritten = futures::ready!(
                Pin::new(&mut self.io).poll_write(cx, &self.pending_write[self.pending_offset..])
            )?;
            if nwritten == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pending_offset += nwritten;
        }

        self.pending_write.clear();
        self.pending_offset = 0;

        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for NoiseSocket<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        loop {
            if this.decrypted_offset < this.decrypted.len() {
                let nread = (this.decrypted.len() - this.decrypted_offset).min(buf.len());
                buf[..nread].copy_from_slice(
                    &this.decrypted[this.decrypted_offset..this.decrypted_offset + nread],
                );
                this.decrypted_offset += nread;
                return Poll::Ready(Ok(nread));
            }

            if this.read_offset < this.read_buffer.len() {
                let nread = futures::ready!(
                    Pin::new(&mut this.io).poll_read(cx, &mut this.read_buffer[this.read_offset..])
                )?;
                if nread == 0 {
                    // EOF is clean only on a frame boundary.
                    return if this.read_offset == 0 && this.read_buffer.len() == 2 {
                        Poll::Ready(Ok(0))
                    } else {
                        Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()))
                    };
                }
                this.read_offset += nread;
                continue;
            }

            if this.read_buffer.len() == 2 {
                let size = u16::from_be_bytes([this.read_buffer[0], this.read_buffer[1]]) as usize;
                if size < TAG_SIZE {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "noise frame shorter than the authentication tag",
                    )));
                }
                this.read_buffer.resize(2 + size, 0);
                continue;
            }

            // A full frame has been accumulated.
            this.decrypted.resize(this.read_buffer.len() - 2, 0);
            match this.noise.read_message(&this.read_buffer[2..], &mut this.decrypted) {
                Ok(size) => {
                    this.decrypted.truncate(size);
                    this.decrypted_offset = 0;
                }
                Err(error) => {
                    tracing::debug!(target: LOG_TARGET, ?error, "failed to decrypt noise frame");
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("noise decryption failure: {error}"),
                    )));
                }
            }

            this.read_buffer.truncate(2);
            this.read_buffer[..2].copy_from_slice(&[0u8, 0u8]);
            this.read_offset = 0;
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for NoiseSocket<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        futures::ready!(this.poll_flush_pending(cx))?;

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let chunk = buf.len().min(this.max_plaintext);
        this.pending_write.resize(2 + chunk + TAG_SIZE, 0);

        let size = match this.noise.write_message(&buf[..chunk], &mut this.pending_write[2..]) {
            Ok(size) => size,
            Err(error) => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("noise encryption failure: {error}"),
                )))
            }
        };
        debug_assert_eq!(size, chunk + TAG_SIZE);

        this.pending_write.truncate(2 + size);
        this.pending_write[..2].copy_from_slice(&(size as u16).to_be_bytes());

        // The frame is flushed on the next write or flush.
        Poll::Ready(Ok(chunk))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        futures::ready!(this.poll_flush_pending(cx))?;
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        futures::ready!(this.poll_flush_pending(cx))?;
        futures::ready!(Pin::new(&mut this.io).poll_flush(cx))?;
        Pin::new(&mut this.io).poll_close(cx)
    }
}
