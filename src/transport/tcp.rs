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

//! TCP transport implementation.

use crate::{
    error::{AddressError, Error},
    peer_id::PeerId,
    transport::{Connection, Transport},
};

use multiaddr::{Multiaddr, Protocol};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::compat::TokioAsyncReadCompatExt;

use std::net::{IpAddr, SocketAddr};

/// Logging target for the file.
const LOG_TARGET: &str = "transport::tcp";

/// TCP transport.
#[derive(Debug, Default)]
pub struct TcpTransport;

impl TcpTransport {
    /// Extract socket address and `PeerId`, if found, from `address`.
    fn get_socket_address(address: &Multiaddr) -> crate::Result<(SocketAddr, Option<PeerId>)> {
        tracing::trace!(target: LOG_TARGET, ?address, "parse multiaddress");

        let mut iter = address.iter();
        let socket_address = match iter.next() {
            Some(Protocol::Ip6(address)) => match iter.next() {
                Some(Protocol::Tcp(port)) => SocketAddr::new(IpAddr::V6(address), port),
                protocol => {
                    tracing::error!(
                        target: LOG_TARGET,
                        ?protocol,
                        "invalid transport protocol, expected `Tcp`",
                    );
                    return Err(Error::Address(AddressError::InvalidProtocol));
                }
            },
            Some(Protocol::Ip4(address)) => match iter.next() {
                Some(Protocol::Tcp(port)) => SocketAddr::new(IpAddr::V4(address), port),
                protocol => {
                    tracing::error!(
                        target: LOG_TARGET,
                        ?protocol,
                        "invalid transport protocol, expected `Tcp`",
                    );
                    return Err(Error::Address(AddressError::InvalidProtocol));
                }
            },
            protocol => {
                tracing::error!(target: LOG_TARGET, ?protocol, "invalid transport protocol");
                return Err(Error::Address(AddressError::InvalidProtocol));
            }
        };

        let maybe_peer = match iter.next() {
            Some(Protocol::P2p(multihash)) => Some(
                PeerId::from_multihash(multihash)
                    .map_err(|_| Error::Address(AddressError::PeerIdMissing))?,
            ),
            None => None,
            protocol => {
                tracing::error!(
                    target: LOG_TARGET,
                    ?protocol,
                    "invalid protocol, expected `P2p` or `None`"
                );
                return Err(Error::Address(AddressError::InvalidProtocol));
            }
        };

        Ok((socket_address, maybe_peer))
    }

    /// Bind a listener to `address`.
    pub async fn listen(address: &Multiaddr) -> crate::Result<TcpTransportListener> {
        let (socket_address, _) = Self::get_socket_address(address)?;
        let listener = TcpListener::bind(socket_address).await?;

        tracing::debug!(
            target: LOG_TARGET,
            address = ?listener.local_addr(),
            "start listening",
        );

        Ok(TcpTransportListener { listener })
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn dial(
        &self,
        address: Multiaddr,
    ) -> crate::Result<(Box<dyn Connection>, Option<PeerId>)> {
        let (socket_address, peer) = Self::get_socket_address(&address)?;

        tracing::debug!(target: LOG_TARGET, ?address, "open connection to remote peer");

        let stream = TcpStream::connect(socket_address).await?;
        stream.set_nodelay(true)?;

        Ok((Box::new(stream.compat()), peer))
    }
}

/// Listening side of the TCP transport.
pub struct TcpTransportListener {
    /// TCP listener.
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Address the listener is bound to, with the actual port filled in.
    pub fn local_address(&self) -> crate::Result<Multiaddr> {
        let address = self.listener.local_addr()?;

        let mut multiaddr = Multiaddr::empty();
        match address.ip() {
            IpAddr::V4(ip) => multiaddr.push(Protocol::Ip4(ip)),
            IpAddr::V6(ip) => multiaddr.push(Protocol::Ip6(ip)),
        }
        multiaddr.push(Protocol::Tcp(address.port()));

        Ok(multiaddr)
    }

    /// Accept the next inbound connection.
    pub async fn accept(&mut self) -> crate::Result<Box<dyn Connection>> {
        let (stream, address) = self.listener.accept().await?;
        stream.set_nodelay(true)?;

        tracing::debug!(target: LOG_TARGET, ?address, "inbound connection");

        Ok(Box::new(stream.compat()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_multiaddresses() {
        assert!(TcpTransport::get_socket_address(
            &"/ip6/::1/tcp/8888".parse().expect("valid multiaddress")
        )
        .is_ok());
        assert!(TcpTransport::get_socket_address(
            &"/ip4/127.0.0.1/tcp/8888"
                .parse()
                .expect("valid multiaddress")
        )
        .is_ok());
        assert!(TcpTransport::get_socket_address(
            &"/ip6/::1/tcp/8888/p2p/12D3KooWT2ouvz5uMmCvHJGzAGRHiqDts5hzXR7NdoQ27pGdzp9Q"
                .parse()
                .expect("valid multiaddress")
        )
        .is_ok());
        assert!(TcpTransport::get_socket_address(
            &"/ip4/127.0.0.1/tcp/8888/p2p/12D3KooWT2ouvz5uMmCvHJGzAGRHiqDts5hzXR7NdoQ27pGdzp9Q"
                .parse()
                .expect("valid multiaddress")
        )
        .is_ok());
        assert!(TcpTransport::get_socket_address(
            &"/ip6/::1/udp/8888/p2p/12D3KooWT2ouvz5uMmCvHJGzAGRHiqDts5hzXR7NdoQ27pGdzp9Q"
                .parse()
                .expect("valid multiaddress")
        )
        .is_err());
        assert!(TcpTransport::get_socket_address(
            &"/ip4/127.0.0.1/udp/8888/p2p/12D3KooWT2ouvz5uMmCvHJGzAGRHiqDts5hzXR7NdoQ27pGdzp9Q"
                .parse()
                .expect("valid multiaddress")
        )
        .is_err());
    }

    #[tokio::test]
    async fn dial_refused_port() {
        let address = {
            let listener =
                TcpTransport::listen(&"/ip4/127.0.0.1/tcp/0".parse().expect("valid multiaddress"))
                    .await
                    .unwrap();
            listener.local_address().unwrap()
        };

        assert!(TcpTransport.dial(address).await.is_err());
    }

    #[tokio::test]
    async fn dial_and_accept() {
        let mut listener =
            TcpTransport::listen(&"/ip4/127.0.0.1/tcp/0".parse().expect("valid multiaddress"))
                .await
                .unwrap();
        let address = listener.local_address().unwrap();

        let (dialed, accepted) = tokio::join!(TcpTransport.dial(address), listener.accept());

        assert!(dialed.is_ok());
        assert!(accepted.is_ok());
    }
}
