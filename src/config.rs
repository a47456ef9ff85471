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

//! Connection configuration.

use crate::{
    mux::{mplex, yamux},
    types::{ProtocolName, MPLEX_PROTOCOL, NOISE_PROTOCOL, YAMUX_PROTOCOL},
};

use std::time::Duration;

/// Default budget for the entire connection upgrade, covering security and
/// muxer negotiation.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection role.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// Local node opened the connection.
    Dialer,

    /// Local node accepted the connection.
    Listener,
}

impl Role {
    /// Is the local node the dialer of the connection?
    pub fn is_dialer(&self) -> bool {
        matches!(self, Role::Dialer)
    }
}

/// Configuration for upgrading raw connections into multiplexed sessions.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Total budget for security and muxer negotiation.
    pub handshake_timeout: Duration,

    /// Security protocols, in preference order.
    pub security: Vec<ProtocolName>,

    /// Muxer protocols, in preference order.
    pub muxers: Vec<ProtocolName>,

    /// Yamux session configuration.
    pub yamux: yamux::Config,

    /// Mplex session configuration.
    pub mplex: mplex::Config,

    /// Maximum plaintext carried by one Noise frame.
    pub noise_max_plaintext: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            security: vec![ProtocolName::from(NOISE_PROTOCOL)],
            muxers: vec![
                ProtocolName::from(YAMUX_PROTOCOL),
                ProtocolName::from(MPLEX_PROTOCOL),
            ],
            yamux: yamux::Config::default(),
            mplex: mplex::Config::default(),
            noise_max_plaintext: crate::crypto::noise::MAX_PLAINTEXT_SIZE,
        }
    }
}
