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

//! Identity keys of the node.

use crate::{error::CryptoError, peer_id::PeerId, schema::keys};

use prost::Message;

pub mod ed25519;
pub mod noise;

/// Public key of a node's identity keypair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 public key.
    Ed25519(ed25519::PublicKey),
}

impl PublicKey {
    /// Verify `signature` on `msg` using this public key.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let PublicKey::Ed25519(key) = self;
        key.verify(msg, signature)
    }

    /// Encode the public key into the protobuf structure carried in handshake
    /// payloads.
    pub fn to_protobuf_encoding(&self) -> Vec<u8> {
        let PublicKey::Ed25519(key) = self;

        keys::PublicKey {
            r#type: keys::KeyType::Ed25519 as i32,
            data: key.to_bytes().to_vec(),
        }
        .encode_to_vec()
    }

    /// Decode a public key from its protobuf encoding.
    pub fn from_protobuf_encoding(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
        let pubkey = keys::PublicKey::decode(bytes)?;

        match keys::KeyType::from_i32(pubkey.r#type) {
            Some(keys::KeyType::Ed25519) => ed25519::PublicKey::try_from_bytes(&pubkey.data)
                .map(PublicKey::Ed25519)
                .ok_or(CryptoError::InvalidKey),
            _ => Err(CryptoError::InvalidKey),
        }
    }

    /// Derive the peer ID naming this public key.
    pub fn to_peer_id(&self) -> PeerId {
        PeerId::from_public_key(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protobuf_encoding_roundtrip() {
        let keypair = ed25519::Keypair::generate();
        let public = PublicKey::Ed25519(keypair.public());
        let encoded = public.to_protobuf_encoding();

        assert_eq!(PublicKey::from_protobuf_encoding(&encoded).unwrap(), public);
    }

    #[test]
    fn truncated_protobuf_rejected() {
        let keypair = ed25519::Keypair::generate();
        let encoded = PublicKey::Ed25519(keypair.public()).to_protobuf_encoding();

        assert!(PublicKey::from_protobuf_encoding(&encoded[..encoded.len() - 8]).is_err());
    }

    #[test]
    fn verify_through_wrapper() {
        let keypair = ed25519::Keypair::generate();
        let public = PublicKey::Ed25519(keypair.public());
        let signature = keypair.sign(b"payload");

        assert!(public.verify(b"payload", &signature));
        assert!(!public.verify(b"tampered", &signature));
    }
}
