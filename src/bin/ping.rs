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

//! Demo dialer: dial a multiaddr, upgrade the connection and ping the peer.
//!
//! Exits 0 iff the ping round-trip succeeds.

use minip2p::{
    config::ConnectionConfig,
    crypto::ed25519::Keypair,
    protocol::ping,
    transport::{tcp::TcpTransport, Transport},
    types::{ProtocolName, PING_PROTOCOL},
    upgrader::Upgrader,
};

use multiaddr::Multiaddr;

use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Some(address) = std::env::args().nth(1) else {
        eprintln!("usage: ping <multiaddr>");
        std::process::exit(1);
    };

    match run(&address).await {
        Ok(rtt) => println!("ping: {} ms", rtt.as_millis()),
        Err(error) => {
            eprintln!("ping failed: {error}");
            std::process::exit(1);
        }
    }
}

async fn run(address: &str) -> Result<Duration, String> {
    let address: Multiaddr = address
        .parse()
        .map_err(|_| format!("invalid multiaddr: {address}"))?;

    let (connection, peer) = TcpTransport
        .dial(address)
        .await
        .map_err(|error| format!("dial failed: {error}"))?;

    let upgrader = Upgrader::new(Keypair::generate(), ConnectionConfig::default());
    let connection = upgrader
        .upgrade_outbound(connection, peer)
        .await
        .map_err(|error| format!("upgrade failed ({}): {error}", error.kind()))?;

    let mut substream = connection
        .open_substream(ProtocolName::from(PING_PROTOCOL))
        .await
        .map_err(|error| format!("failed to open ping substream: {error}"))?;

    ping::ping(&mut substream)
        .await
        .map_err(|error| format!("{error}"))
}
