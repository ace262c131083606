//! The RLPx auth/ack handshake and session-secret derivation.

use crate::rlpx::ecies::{ecies_decrypt, ecies_encrypt, ECIES_OVERHEAD};
use crate::{public_key_of, NetError, NetResult, NodeId};
use alloy_primitives::{keccak256, B256};
use k256::{
    ecdh,
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};

/// Plaintext auth body: signature, ephemeral-key hash, static key, nonce,
/// and the version byte.
const AUTH_PLAIN_LEN: usize = 65 + 32 + 64 + 32 + 1;

/// Plaintext ack body: ephemeral key, nonce, version byte.
const ACK_PLAIN_LEN: usize = 64 + 32 + 1;

/// The auth packet size on the wire.
pub const AUTH_PACKET_LEN: usize = AUTH_PLAIN_LEN + ECIES_OVERHEAD;

/// The ack packet size on the wire.
pub const ACK_PACKET_LEN: usize = ACK_PLAIN_LEN + ECIES_OVERHEAD;

/// The symmetric material both sides derive from the handshake. The two MAC
/// states are rolling Keccak sponges seeded with the handshake transcripts.
#[derive(Debug, Clone)]
pub struct SessionSecrets {
    /// AES-256-CTR key for frame bodies and headers.
    pub aes_secret: B256,
    /// Key of the MAC whitening cipher.
    pub mac_secret: B256,
    /// Our sending MAC state.
    pub egress_mac: Keccak256,
    /// Our receiving MAC state.
    pub ingress_mac: Keccak256,
    /// The authenticated remote node id.
    pub remote_id: NodeId,
}

fn derive_secrets(
    ephemeral_shared: &[u8],
    initiator_nonce: B256,
    responder_nonce: B256,
    auth_wire: &[u8],
    ack_wire: &[u8],
    we_initiated: bool,
    remote_id: NodeId,
) -> SessionSecrets {
    let mut nonce_material = [0u8; 64];
    nonce_material[..32].copy_from_slice(responder_nonce.as_slice());
    nonce_material[32..].copy_from_slice(initiator_nonce.as_slice());
    let nonce_hash = keccak256(nonce_material);

    let mut buffer = Vec::with_capacity(64);
    buffer.extend_from_slice(ephemeral_shared);
    buffer.extend_from_slice(nonce_hash.as_slice());
    let shared_secret = keccak256(&buffer);

    buffer.truncate(32);
    buffer.extend_from_slice(shared_secret.as_slice());
    let aes_secret = keccak256(&buffer);

    buffer.truncate(32);
    buffer.extend_from_slice(aes_secret.as_slice());
    let mac_secret = keccak256(&buffer);

    let seed_mac = |nonce: B256, transcript: &[u8]| {
        let mut mac = Keccak256::new();
        let mut xored = [0u8; 32];
        for (out, (lhs, rhs)) in
            xored.iter_mut().zip(mac_secret.iter().zip(nonce.iter()))
        {
            *out = lhs ^ rhs;
        }
        mac.update(xored);
        mac.update(transcript);
        mac
    };

    // Egress is seeded with the remote nonce and what we sent; ingress with
    // our nonce and what we received.
    let (egress_mac, ingress_mac) = if we_initiated {
        (seed_mac(responder_nonce, auth_wire), seed_mac(initiator_nonce, ack_wire))
    } else {
        (seed_mac(initiator_nonce, ack_wire), seed_mac(responder_nonce, auth_wire))
    };

    SessionSecrets { aes_secret, mac_secret, egress_mac, ingress_mac, remote_id }
}

/// The dialing side of the handshake: build the auth, hold the ephemeral
/// material, absorb the ack.
#[derive(Debug)]
pub struct InitiatorHandshake {
    ephemeral: SecretKey,
    nonce: B256,
    remote_id: NodeId,
    auth_wire: Vec<u8>,
}

impl InitiatorHandshake {
    /// Builds the sealed auth packet for `remote_id`.
    pub fn new(static_key: &SigningKey, remote_id: NodeId) -> NetResult<(Self, Vec<u8>)> {
        let remote_public = PublicKey::from(public_key_of(&remote_id)?);
        let ephemeral = SecretKey::random(&mut OsRng);
        let mut nonce = B256::ZERO;
        rand::RngCore::fill_bytes(&mut OsRng, &mut nonce.0);

        // static-shared ^ nonce, signed with the ephemeral key, lets the
        // responder recover our ephemeral public key.
        let static_shared = ecdh::diffie_hellman(
            SecretKey::from(static_key.clone()).to_nonzero_scalar(),
            remote_public.as_affine(),
        );
        let mut to_sign = [0u8; 32];
        for (out, (lhs, rhs)) in to_sign
            .iter_mut()
            .zip(static_shared.raw_secret_bytes().iter().zip(nonce.iter()))
        {
            *out = lhs ^ rhs;
        }
        let ephemeral_signer = SigningKey::from(&ephemeral);
        let (signature, recovery_id) = ephemeral_signer
            .sign_prehash_recoverable(&to_sign)
            .map_err(|_| NetError::InvalidSignature)?;

        let ephemeral_pub = ephemeral.public_key().to_encoded_point(false);
        let static_pub = static_key.verifying_key().to_encoded_point(false);

        let mut plain = Vec::with_capacity(AUTH_PLAIN_LEN);
        plain.extend_from_slice(&signature.to_bytes());
        plain.push(recovery_id.to_byte());
        plain.extend_from_slice(keccak256(&ephemeral_pub.as_bytes()[1..]).as_slice());
        plain.extend_from_slice(&static_pub.as_bytes()[1..]);
        plain.extend_from_slice(nonce.as_slice());
        plain.push(0x00);

        let auth_wire = ecies_encrypt(&remote_public, &plain)?;
        let state = Self { ephemeral, nonce, remote_id, auth_wire: auth_wire.clone() };
        Ok((state, auth_wire))
    }

    /// Absorbs the responder's ack and derives the session secrets.
    pub fn finish(self, static_key: &SigningKey, ack_wire: &[u8]) -> NetResult<SessionSecrets> {
        let plain = ecies_decrypt(&SecretKey::from(static_key.clone()), ack_wire)?;
        if plain.len() < ACK_PLAIN_LEN {
            return Err(NetError::Protocol("short ack"));
        }
        let remote_ephemeral = decode_public_64(&plain[..64])?;
        let responder_nonce = B256::from_slice(&plain[64..96]);

        let ephemeral_shared = ecdh::diffie_hellman(
            self.ephemeral.to_nonzero_scalar(),
            remote_ephemeral.as_affine(),
        );
        Ok(derive_secrets(
            ephemeral_shared.raw_secret_bytes().as_slice(),
            self.nonce,
            responder_nonce,
            &self.auth_wire,
            ack_wire,
            true,
            self.remote_id,
        ))
    }
}

/// The listening side: absorb an auth, emit the ack, derive the secrets.
#[derive(Debug)]
pub struct ResponderHandshake;

impl ResponderHandshake {
    /// Processes a sealed auth packet and produces the sealed ack along with
    /// the session secrets.
    pub fn respond(
        static_key: &SigningKey,
        auth_wire: &[u8],
    ) -> NetResult<(SessionSecrets, Vec<u8>)> {
        let plain = ecies_decrypt(&SecretKey::from(static_key.clone()), auth_wire)?;
        if plain.len() < AUTH_PLAIN_LEN {
            return Err(NetError::Protocol("short auth"));
        }

        let signature =
            Signature::from_slice(&plain[..64]).map_err(|_| NetError::InvalidSignature)?;
        let recovery_id =
            RecoveryId::from_byte(plain[64]).ok_or(NetError::InvalidSignature)?;
        let ephemeral_hash = &plain[65..97];
        let initiator_static = decode_public_64(&plain[97..161])?;
        let initiator_nonce = B256::from_slice(&plain[161..193]);
        let initiator_id = NodeId::from_slice(&plain[97..161]);

        // Undo the XOR to recover the initiator's ephemeral public key from
        // the signature.
        let static_shared = ecdh::diffie_hellman(
            SecretKey::from(static_key.clone()).to_nonzero_scalar(),
            initiator_static.as_affine(),
        );
        let mut signed = [0u8; 32];
        for (out, (lhs, rhs)) in signed.iter_mut().zip(
            static_shared.raw_secret_bytes().iter().zip(initiator_nonce.iter()),
        ) {
            *out = lhs ^ rhs;
        }
        let remote_ephemeral_key =
            VerifyingKey::recover_from_prehash(&signed, &signature, recovery_id)
                .map_err(|_| NetError::InvalidSignature)?;
        let remote_ephemeral_bytes = remote_ephemeral_key.to_encoded_point(false);
        if keccak256(&remote_ephemeral_bytes.as_bytes()[1..]).as_slice() != ephemeral_hash {
            return Err(NetError::Protocol("ephemeral key hash mismatch"));
        }

        // Build the ack.
        let ephemeral = SecretKey::random(&mut OsRng);
        let mut responder_nonce = B256::ZERO;
        rand::RngCore::fill_bytes(&mut OsRng, &mut responder_nonce.0);

        let mut ack_plain = Vec::with_capacity(ACK_PLAIN_LEN);
        ack_plain
            .extend_from_slice(&ephemeral.public_key().to_encoded_point(false).as_bytes()[1..]);
        ack_plain.extend_from_slice(responder_nonce.as_slice());
        ack_plain.push(0x00);
        let ack_wire = ecies_encrypt(&PublicKey::from(initiator_static), &ack_plain)?;

        let remote_ephemeral = PublicKey::from(remote_ephemeral_key);
        let ephemeral_shared = ecdh::diffie_hellman(
            ephemeral.to_nonzero_scalar(),
            remote_ephemeral.as_affine(),
        );
        let secrets = derive_secrets(
            ephemeral_shared.raw_secret_bytes().as_slice(),
            initiator_nonce,
            responder_nonce,
            auth_wire,
            &ack_wire,
            false,
            initiator_id,
        );
        Ok((secrets, ack_wire))
    }
}

/// Parses a 64-byte uncompressed public key without its tag byte.
fn decode_public_64(bytes: &[u8]) -> NetResult<PublicKey> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(bytes);
    PublicKey::from_sec1_bytes(&sec1).map_err(|_| NetError::Protocol("invalid public key"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_id_of;

    #[test]
    fn test_both_sides_derive_equal_secrets() {
        let initiator_key = SigningKey::from_slice(&[0x61u8; 32]).unwrap();
        let responder_key = SigningKey::from_slice(&[0x62u8; 32]).unwrap();

        let (state, auth_wire) =
            InitiatorHandshake::new(&initiator_key, node_id_of(&responder_key)).unwrap();
        assert_eq!(auth_wire.len(), AUTH_PACKET_LEN);

        let (responder_secrets, ack_wire) =
            ResponderHandshake::respond(&responder_key, &auth_wire).unwrap();
        assert_eq!(ack_wire.len(), ACK_PACKET_LEN);
        assert_eq!(responder_secrets.remote_id, node_id_of(&initiator_key));

        let initiator_secrets = state.finish(&initiator_key, &ack_wire).unwrap();
        assert_eq!(initiator_secrets.remote_id, node_id_of(&responder_key));
        assert_eq!(initiator_secrets.aes_secret, responder_secrets.aes_secret);
        assert_eq!(initiator_secrets.mac_secret, responder_secrets.mac_secret);

        // The MAC sponges are cross-seeded: my egress is your ingress.
        let egress: [u8; 32] = initiator_secrets.egress_mac.clone().finalize().into();
        let ingress: [u8; 32] = responder_secrets.ingress_mac.clone().finalize().into();
        assert_eq!(egress, ingress);
        let egress: [u8; 32] = responder_secrets.egress_mac.clone().finalize().into();
        let ingress: [u8; 32] = initiator_secrets.ingress_mac.clone().finalize().into();
        assert_eq!(egress, ingress);
    }

    #[test]
    fn test_garbage_auth_rejected() {
        let responder_key = SigningKey::from_slice(&[0x62u8; 32]).unwrap();
        assert!(ResponderHandshake::respond(&responder_key, &[0u8; AUTH_PACKET_LEN]).is_err());
    }
}
