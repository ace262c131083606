//! ECIES as used by the RLPx handshake: ephemeral secp256k1 ECDH,
//! concat-KDF over SHA-256, AES-128-CTR, and an HMAC-SHA-256 tag.

use crate::{NetError, NetResult};
use aes::Aes128;
use cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ecdh, PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Wire overhead of an ECIES message: tagged public key, IV, and MAC.
pub(crate) const ECIES_OVERHEAD: usize = 65 + 16 + 32;

/// Derives the AES key and the MAC key from an ECDH shared secret.
fn derive_keys(shared: &[u8]) -> NetResult<([u8; 16], [u8; 32])> {
    let mut derived = [0u8; 32];
    concat_kdf::derive_key_into::<Sha256>(shared, &[], &mut derived)
        .map_err(|_| NetError::Ecies("key derivation failed"))?;
    let mut enc_key = [0u8; 16];
    enc_key.copy_from_slice(&derived[..16]);
    let mac_key: [u8; 32] = Sha256::digest(&derived[16..]).into();
    Ok((enc_key, mac_key))
}

/// Encrypts `plaintext` to the holder of `recipient`:
/// `0x04 ∥ ephemeral-pub ∥ iv ∥ ciphertext ∥ hmac`.
pub fn ecies_encrypt(recipient: &PublicKey, plaintext: &[u8]) -> NetResult<Vec<u8>> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let shared = ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let (enc_key, mac_key) = derive_keys(shared.raw_secret_bytes().as_slice())?;

    let mut iv = [0u8; 16];
    rand::RngCore::fill_bytes(&mut OsRng, &mut iv);

    let mut ciphertext = plaintext.to_vec();
    Aes128Ctr::new(&enc_key.into(), &iv.into()).apply_keystream(&mut ciphertext);

    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|_| NetError::Ecies("mac key rejected"))?;
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let ephemeral_pub = ephemeral.public_key().to_encoded_point(false);
    let mut out = Vec::with_capacity(ECIES_OVERHEAD + plaintext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypts an ECIES message addressed to `secret`.
pub fn ecies_decrypt(secret: &SecretKey, message: &[u8]) -> NetResult<Vec<u8>> {
    if message.len() < ECIES_OVERHEAD {
        return Err(NetError::Ecies("message too short"));
    }
    let (header, rest) = message.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (ciphertext, tag) = rest.split_at(rest.len() - 32);

    let ephemeral = PublicKey::from_sec1_bytes(header)
        .map_err(|_| NetError::Ecies("invalid ephemeral key"))?;
    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let (enc_key, mac_key) = derive_keys(shared.raw_secret_bytes().as_slice())?;

    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|_| NetError::Ecies("mac key rejected"))?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(tag).map_err(|_| NetError::MacMismatch)?;

    let mut plaintext = ciphertext.to_vec();
    let iv: [u8; 16] = iv.try_into().expect("split at 16");
    Aes128Ctr::new(&enc_key.into(), &iv.into()).apply_keystream(&mut plaintext);
    Ok(plaintext)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let secret = SecretKey::random(&mut OsRng);
        let message = b"auth bytes under seal";
        let sealed = ecies_encrypt(&secret.public_key(), message).unwrap();
        assert_eq!(sealed.len(), message.len() + ECIES_OVERHEAD);
        assert_eq!(ecies_decrypt(&secret, &sealed).unwrap(), message);
    }

    #[test]
    fn test_tamper_detected() {
        let secret = SecretKey::random(&mut OsRng);
        let mut sealed = ecies_encrypt(&secret.public_key(), b"payload").unwrap();
        let mid = sealed.len() / 2;
        sealed[mid] ^= 0x01;
        assert!(ecies_decrypt(&secret, &sealed).is_err());
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let alice = SecretKey::random(&mut OsRng);
        let mallory = SecretKey::random(&mut OsRng);
        let sealed = ecies_encrypt(&alice.public_key(), b"payload").unwrap();
        assert!(ecies_decrypt(&mallory, &sealed).is_err());
    }
}
