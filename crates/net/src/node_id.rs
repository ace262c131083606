//! Node identity: the 64-byte uncompressed secp256k1 public key.

use crate::{NetError, NetResult};
use alloy_primitives::B512;
use k256::ecdsa::{SigningKey, VerifyingKey};

/// A devp2p node id: the uncompressed public key without its SEC1 tag byte.
pub type NodeId = B512;

/// The node id belonging to a key pair.
pub fn node_id_of(key: &SigningKey) -> NodeId {
    let point = key.verifying_key().to_encoded_point(false);
    B512::from_slice(&point.as_bytes()[1..])
}

/// Recovers the verifying key behind a node id.
pub fn public_key_of(id: &NodeId) -> NetResult<VerifyingKey> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(id.as_slice());
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| NetError::InvalidSignature)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let id = node_id_of(&key);
        let recovered = public_key_of(&id).unwrap();
        assert_eq!(&recovered, key.verifying_key());
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(public_key_of(&B512::ZERO).is_err());
    }
}
