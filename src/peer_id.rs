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

//! Peer IDs, the stable names of peers derived from their identity keys.

use crate::{crypto::PublicKey, error::Error};

use cid::Cid;
use multihash::{Code, Multihash, MultihashDigest};

use std::{fmt, str::FromStr};

/// Public keys whose protobuf encoding is at most this long are carried
/// verbatim inside an identity multihash.
const MAX_INLINE_KEY_LENGTH: usize = 42;

/// Multicodec code of the `libp2p-key` CID codec.
const LIBP2P_KEY_CODEC: u64 = 0x72;

/// Multihash code of the identity "hash".
const MULTIHASH_IDENTITY: u64 = 0x00;

/// Multihash code of sha2-256.
const MULTIHASH_SHA2_256: u64 = 0x12;

/// Identifier of a peer of the network.
///
/// The data is a multihash of the protobuf-encoded public key of the peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    multihash: Multihash,
}

impl PeerId {
    /// Build a `PeerId` from a public key.
    pub fn from_public_key(key: &PublicKey) -> PeerId {
        let key_enc = key.to_protobuf_encoding();

        let code = if key_enc.len() <= MAX_INLINE_KEY_LENGTH {
            Code::Identity
        } else {
            Code::Sha2_256
        };

        PeerId {
            multihash: code.digest(&key_enc),
        }
    }

    /// Build a `PeerId` from a multihash, checking that the hash algorithm is
    /// one a peer ID may use.
    pub fn from_multihash(multihash: Multihash) -> Result<PeerId, Multihash> {
        match multihash.code() {
            MULTIHASH_IDENTITY | MULTIHASH_SHA2_256 => Ok(PeerId { multihash }),
            _ => Err(multihash),
        }
    }

    /// Parse a `PeerId` from raw multihash bytes.
    pub fn from_bytes(data: &[u8]) -> crate::Result<PeerId> {
        Multihash::from_bytes(data)
            .ok()
            .and_then(|multihash| PeerId::from_multihash(multihash).ok())
            .ok_or(Error::InvalidArgument("invalid peer id"))
    }

    /// Generate a random peer ID. Useful for testing.
    pub fn random() -> PeerId {
        let digest: [u8; 32] = rand::random();

        PeerId {
            multihash: Code::Sha2_256.digest(&digest),
        }
    }

    /// Raw bytes of the underlying multihash.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.multihash.to_bytes()
    }

    /// Legacy textual form, base58btc over the raw multihash.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    /// CIDv1 textual form, base32 multibase over `libp2p-key ‖ multihash`.
    pub fn to_cid_string(&self) -> String {
        Cid::new_v1(LIBP2P_KEY_CODEC, self.multihash).to_string()
    }
}

impl From<PublicKey> for PeerId {
    fn from(key: PublicKey) -> PeerId {
        PeerId::from_public_key(&key)
    }
}

impl From<PeerId> for Multihash {
    fn from(peer: PeerId) -> Multihash {
        peer.multihash
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bytes) = bs58::decode(s).into_vec() {
            if let Ok(peer) = PeerId::from_bytes(&bytes) {
                return Ok(peer);
            }
        }

        let cid = Cid::try_from(s).map_err(|_| Error::InvalidArgument("invalid peer id"))?;
        if cid.codec() != LIBP2P_KEY_CODEC {
            return Err(Error::InvalidArgument("invalid peer id"));
        }

        PeerId::from_multihash(*cid.hash())
            .map_err(|_| Error::InvalidArgument("invalid peer id"))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_base58().fmt(f)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PeerId").field(&self.to_base58()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ed25519::Keypair;

    #[test]
    fn ed25519_key_is_inlined() {
        let keypair = Keypair::generate();
        let peer = PeerId::from_public_key(&PublicKey::Ed25519(keypair.public()));

        assert_eq!(peer.multihash.code(), MULTIHASH_IDENTITY);
    }

    #[test]
    fn base58_roundtrip() {
        let peer = PeerId::random();
        assert_eq!(peer.to_base58().parse::<PeerId>().unwrap(), peer);
    }

    #[test]
    fn cid_roundtrip() {
        let peer = PeerId::random();
        let encoded = peer.to_cid_string();

        assert!(encoded.starts_with('b'));
        assert_eq!(encoded.parse::<PeerId>().unwrap(), peer);
    }

    #[test]
    fn both_forms_name_the_same_peer() {
        let keypair = Keypair::generate();
        let peer = PeerId::from_public_key(&PublicKey::Ed25519(keypair.public()));

        assert_eq!(
            peer.to_base58().parse::<PeerId>().unwrap(),
            peer.to_cid_string().parse::<PeerId>().unwrap(),
        );
    }

    #[test]
    fn parse_well_known_base58() {
        assert!("12D3KooWT2ouvz5uMmCvHJGzAGRHiqDts5hzXR7NdoQ27pGdzp9Q"
            .parse::<PeerId>()
            .is_ok());
    }

    #[test]
    fn garbage_rejected() {
        assert!("not-a-peer-id".parse::<PeerId>().is_err());
        assert!(PeerId::from_bytes(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn unsupported_hash_rejected() {
        let multihash = Code::Sha2_512.digest(b"peer");
        assert!(PeerId::from_multihash(multihash).is_err());
    }
}
