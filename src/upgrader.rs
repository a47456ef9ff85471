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

//! Connection upgrader.
//!
//! Turns a raw byte pipe into an authenticated, multiplexed session: one
//! deadline covers multistream-select of the security protocol, the Noise
//! handshake and multistream-select of the muxer. On any failure the lower
//! pipe is closed before the error is returned.

use crate::{
    config::{ConnectionConfig, Role},
    crypto::{
        ed25519::Keypair,
        noise::{self, NoiseConfiguration},
        PublicKey,
    },
    error::{Error, NegotiationError, UpgradeError},
    multistream,
    mux::{mplex, yamux, MuxedSession, Substream},
    peer_id::PeerId,
    transport::Connection,
    types::{ProtocolName, MPLEX_PROTOCOL, NOISE_PROTOCOL, YAMUX_PROTOCOL},
};

use futures::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Logging target for the file.
const LOG_TARGET: &str = "upgrader";

/// Connection upgrader.
pub struct Upgrader {
    /// Identity keypair of the local node.
    keypair: Keypair,

    /// Peer ID of the local node.
    local_peer: PeerId,

    /// Connection configuration.
    config: ConnectionConfig,

    /// Application protocols served on inbound substreams.
    protocols: Vec<ProtocolName>,
}

impl Upgrader {
    /// Create a new [`Upgrader`].
    pub fn new(keypair: Keypair, config: ConnectionConfig) -> Upgrader {
        let local_peer = PublicKey::Ed25519(keypair.public()).to_peer_id();

        Upgrader {
            keypair,
            local_peer,
            config,
            protocols: Vec::new(),
        }
    }

    /// Peer ID of the local node.
    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Register an application protocol served on inbound substreams.
    pub fn register_protocol(&mut self, protocol: ProtocolName) {
        self.protocols.push(protocol);
    }

    /// Upgrade an outbound connection.
    ///
    /// If `expected_peer` is given, the upgrade fails unless the remote
    /// authenticates as exactly that peer.
    pub async fn upgrade_outbound(
        &self,
        connection: Box<dyn Connection>,
        expected_peer: Option<PeerId>,
    ) -> Result<UpgradedConnection, UpgradeError> {
        tracing::debug!(target: LOG_TARGET, peer = ?expected_peer, "upgrade outbound connection");

        match tokio::time::timeout(
            self.config.handshake_timeout,
            self.upgrade(connection, Role::Dialer, expected_peer),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(UpgradeError::Timeout),
        }
    }

    /// Upgrade an inbound connection.
    pub async fn upgrade_inbound(
        &self,
        connection: Box<dyn Connection>,
    ) -> Result<UpgradedConnection, UpgradeError> {
        tracing::debug!(target: LOG_TARGET, "upgrade inbound connection");

        match tokio::time::timeout(
            self.config.handshake_timeout,
            self.upgrade(connection, Role::Listener, None),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(UpgradeError::Timeout),
        }
    }

    /// Drive security selection, the security handshake and muxer selection.
    async fn upgrade(
        &self,
        mut connection: Box<dyn Connection>,
        role: Role,
        expected_peer: Option<PeerId>,
    ) -> Result<UpgradedConnection, UpgradeError> {
        if self.config.security.is_empty() || self.config.muxers.is_empty() {
            let _ = connection.close().await;
            return Err(UpgradeError::NullArgument);
        }

        let security = match negotiate(role, &mut connection, &self.config.security).await {
            Ok(security) => security,
            Err(error) => {
                let _ = connection.close().await;
                return Err(match error {
                    Error::Negotiation(NegotiationError::NoMutualProtocol) => {
                        UpgradeError::NoSecurity
                    }
                    error => UpgradeError::HandshakeFailed(Box::new(error)),
                });
            }
        };

        if security.as_str() != NOISE_PROTOCOL {
            let _ = connection.close().await;
            return Err(UpgradeError::Internal(Box::new(Error::InvalidArgument(
                "unsupported security protocol",
            ))));
        }

        let mut noise_config = NoiseConfiguration::new(&self.keypair, role);
        noise_config.max_plaintext = self.config.noise_max_plaintext;

        // On failure the handshake drops, and thereby closes, the pipe.
        let (mut socket, remote_peer) = match noise::handshake(connection, noise_config).await {
            Ok(outcome) => outcome,
            Err(error) => return Err(UpgradeError::HandshakeFailed(Box::new(error))),
        };

        if let Some(expected) = expected_peer {
            if expected != remote_peer {
                let _ = socket.close().await;
                return Err(UpgradeError::HandshakeFailed(Box::new(
                    Error::PeerIdMismatch {
                        expected,
                        got: remote_peer,
                    },
                )));
            }
        }

        let muxer = match negotiate(role, &mut socket, &self.config.muxers).await {
            Ok(muxer) => muxer,
            Err(error) => {
                let _ = socket.close().await;
                return Err(match error {
                    Error::Negotiation(NegotiationError::NoMutualProtocol) => {
                        UpgradeError::NoMuxer
                    }
                    error => UpgradeError::Internal(Box::new(error)),
                });
            }
        };

        let session = match muxer.as_str() {
            YAMUX_PROTOCOL => MuxedSession::Yamux(yamux::Session::new(
                Box::new(socket),
                self.config.yamux.clone(),
                role,
            )),
            MPLEX_PROTOCOL => MuxedSession::Mplex(mplex::Session::new(
                Box::new(socket),
                self.config.mplex.clone(),
            )),
            _ => {
                let _ = socket.close().await;
                return Err(UpgradeError::Internal(Box::new(Error::InvalidArgument(
                    "unsupported muxer protocol",
                ))));
            }
        };

        tracing::debug!(
            target: LOG_TARGET,
            ?remote_peer,
            ?muxer,
            "connection upgraded",
        );

        Ok(UpgradedConnection {
            session,
            muxer,
            local_peer: self.local_peer,
            remote_peer,
            protocols: self.protocols.clone(),
        })
    }
}

/// Run multistream-select in the direction matching `role`.
async fn negotiate<S: AsyncRead + AsyncWrite + Unpin>(
    role: Role,
    io: &mut S,
    protocols: &[ProtocolName],
) -> crate::Result<ProtocolName> {
    match role {
        Role::Dialer => multistream::dialer_select(io, protocols).await,
        Role::Listener => multistream::listener_select(io, protocols).await,
    }
}

/// Authenticated, multiplexed connection produced by the upgrader.
pub struct UpgradedConnection {
    /// Multiplexed session.
    session: MuxedSession,

    /// Muxer protocol the session runs on.
    muxer: ProtocolName,

    /// Peer ID of the local node.
    local_peer: PeerId,

    /// Authenticated peer ID of the remote node.
    remote_peer: PeerId,

    /// Application protocols served on inbound substreams.
    protocols: Vec<ProtocolName>,
}

impl UpgradedConnection {
    /// Peer ID of the local node.
    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Authenticated peer ID of the remote node.
    pub fn remote_peer(&self) -> PeerId {
        self.remote_peer
    }

    /// Muxer protocol the session was built on.
    pub fn muxer(&self) -> &ProtocolName {
        &self.muxer
    }

    /// Open a substream and negotiate `protocol` on it.
    pub async fn open_substream(
        &self,
        protocol: ProtocolName,
    ) -> crate::Result<Box<dyn Substream>> {
        let mut substream = self.session.open_stream()?;
        multistream::dialer_select(&mut substream, std::slice::from_ref(&protocol)).await?;

        Ok(substream)
    }

    /// Wait for the next inbound substream and negotiate one of the
    /// registered protocols on it.
    pub async fn accept_substream(&mut self) -> crate::Result<(ProtocolName, Box<dyn Substream>)> {
        let mut substream = self.session.accept_stream().await?;
        let protocol = multistream::listener_select(&mut substream, &self.protocols).await?;

        Ok((protocol, substream))
    }

    /// Close the session, resetting all live substreams.
    pub fn close(&self) {
        self.session.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PING_PROTOCOL;
    use futures::{AsyncReadExt, AsyncWriteExt};
    use futures_ringbuf::Endpoint;

    use std::time::Duration;

    fn upgrader(security: &[&str], muxers: &[&str]) -> Upgrader {
        let mut config = ConnectionConfig::default();
        config.handshake_timeout = Duration::from_secs(5);
        config.security = security.iter().map(|name| ProtocolName::from(*name)).collect();
        config.muxers = muxers.iter().map(|name| ProtocolName::from(*name)).collect();

        Upgrader::new(Keypair::generate(), config)
    }

    fn connection_pair() -> (Box<dyn Connection>, Box<dyn Connection>) {
        let (dialer, listener) = Endpoint::pair(256 * 1024, 256 * 1024);
        (Box::new(dialer), Box::new(listener))
    }

    #[tokio::test]
    async fn upgrade_selects_yamux() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0", "/mplex/6.7.0"]);
        let listener = upgrader(&["/noise"], &["/yamux/1.0.0", "/mplex/6.7.0"]);
        let (dialer_io, listener_io) = connection_pair();

        let (outbound, inbound) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, None),
            listener.upgrade_inbound(listener_io),
        );
        let outbound = outbound.unwrap();
        let inbound = inbound.unwrap();

        assert_eq!(outbound.muxer().as_str(), YAMUX_PROTOCOL);
        assert_eq!(outbound.remote_peer(), listener.local_peer());
        assert_eq!(inbound.remote_peer(), dialer.local_peer());
    }

    #[tokio::test]
    async fn muxer_falls_back_to_mplex() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0", "/mplex/6.7.0"]);
        let listener = upgrader(&["/noise"], &["/mplex/6.7.0"]);
        let (dialer_io, listener_io) = connection_pair();

        let (outbound, inbound) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, None),
            listener.upgrade_inbound(listener_io),
        );

        assert_eq!(outbound.unwrap().muxer().as_str(), MPLEX_PROTOCOL);
        assert_eq!(inbound.unwrap().muxer().as_str(), MPLEX_PROTOCOL);
    }

    #[tokio::test]
    async fn no_mutual_security() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        let listener = upgrader(&["/tls/1.0.0"], &["/yamux/1.0.0"]);
        let (dialer_io, listener_io) = connection_pair();

        let (outbound, _) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, None),
            listener.upgrade_inbound(listener_io),
        );

        match outbound {
            Err(UpgradeError::NoSecurity) => {}
            result => panic!("expected no mutual security, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn no_mutual_muxer() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        let listener = upgrader(&["/noise"], &["/mplex/6.7.0"]);
        let (dialer_io, listener_io) = connection_pair();

        let (outbound, _) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, None),
            listener.upgrade_inbound(listener_io),
        );

        match outbound {
            Err(UpgradeError::NoMuxer) => {}
            result => panic!("expected no mutual muxer, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_remote_identity() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        let listener = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        let (dialer_io, listener_io) = connection_pair();

        let expected = PeerId::random();
        let (outbound, _) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, Some(expected)),
            listener.upgrade_inbound(listener_io),
        );

        match outbound {
            Err(UpgradeError::HandshakeFailed(error)) => {
                assert!(matches!(*error, Error::PeerIdMismatch { .. }));
            }
            result => panic!("expected peer id mismatch, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn unresponsive_peer_times_out() {
        let mut config = ConnectionConfig::default();
        config.handshake_timeout = Duration::from_millis(100);
        let dialer = Upgrader::new(Keypair::generate(), config);

        let (dialer_io, _listener_io) = connection_pair();

        match dialer.upgrade_outbound(dialer_io, None).await {
            Err(UpgradeError::Timeout) => {}
            result => panic!("expected timeout, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn empty_configuration_is_rejected() {
        let mut config = ConnectionConfig::default();
        config.security = Vec::new();
        let dialer = Upgrader::new(Keypair::generate(), config);

        let (dialer_io, _listener_io) = connection_pair();

        match dialer.upgrade_outbound(dialer_io, None).await {
            Err(UpgradeError::NullArgument) => {}
            result => panic!("expected null argument, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn substream_protocol_negotiation() {
        let dialer = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        let mut listener = upgrader(&["/noise"], &["/yamux/1.0.0"]);
        listener.register_protocol(ProtocolName::from(PING_PROTOCOL));
        let (dialer_io, listener_io) = connection_pair();

        let (outbound, inbound) = tokio::join!(
            dialer.upgrade_outbound(dialer_io, None),
            listener.upgrade_inbound(listener_io),
        );
        let outbound = outbound.unwrap();
        let mut inbound = inbound.unwrap();

        let (mut substream, accepted) = tokio::join!(
            outbound.open_substream(ProtocolName::from(PING_PROTOCOL)),
            inbound.accept_substream(),
        );
        let mut substream = substream.unwrap();
        let (protocol, mut accepted) = accepted.unwrap();
        assert_eq!(protocol.as_str(), PING_PROTOCOL);

        substream.write_all(b"probe").await.unwrap();
        let mut buffer = [0u8; 5];
        accepted.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"probe");
    }
}
