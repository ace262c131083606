//! RLPx frame coding: AES-256-CTR bodies chained to rolling Keccak MACs.
//!
//! The two directions are cryptographically independent (own keystream, own
//! MAC sponge), so the codec splits into an encoder and a decoder that the
//! session's writer and reader tasks own separately.

use crate::rlpx::SessionSecrets;
use crate::{NetError, NetResult};
use aes::cipher::generic_array::GenericArray;
use aes::Aes256;
use cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use sha3::{Digest, Keccak256};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// The MAC length appended to headers and bodies.
pub const MAC_LEN: usize = 16;

/// A frame header with its MAC, as read off the wire.
pub const HEADER_WIRE_LEN: usize = 16 + MAC_LEN;

/// The constant header tail: `rlp([capability-id, context-id])`, both zero.
const HEADER_PADDING: [u8; 3] = [0xC2, 0x80, 0x80];

/// The sending half: one continuous keystream and MAC chain, so frames must
/// be written in order.
pub struct FrameEncoder {
    aes: Aes256Ctr,
    mac: Keccak256,
    mac_cipher: Aes256,
}

/// The receiving half.
pub struct FrameDecoder {
    aes: Aes256Ctr,
    mac: Keccak256,
    mac_cipher: Aes256,
    pending_body_len: Option<usize>,
}

/// Both halves of a session's frame crypto.
pub struct FrameCodec {
    /// The sending half.
    pub encoder: FrameEncoder,
    /// The receiving half.
    pub decoder: FrameDecoder,
}

impl core::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}

impl core::fmt::Debug for FrameEncoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameEncoder").finish_non_exhaustive()
    }
}

impl core::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameDecoder").finish_non_exhaustive()
    }
}

impl FrameCodec {
    /// Builds the codec from handshake secrets. The frame ciphers start from
    /// a zero IV; the handshake-seeded MACs carry the freshness.
    pub fn new(secrets: SessionSecrets) -> Self {
        let zero_iv = GenericArray::from([0u8; 16]);
        let key = GenericArray::from_slice(secrets.aes_secret.as_slice());
        Self {
            encoder: FrameEncoder {
                aes: Aes256Ctr::new(key, &zero_iv),
                mac: secrets.egress_mac,
                mac_cipher: Aes256::new(GenericArray::from_slice(
                    secrets.mac_secret.as_slice(),
                )),
            },
            decoder: FrameDecoder {
                aes: Aes256Ctr::new(key, &zero_iv),
                mac: secrets.ingress_mac,
                mac_cipher: Aes256::new(GenericArray::from_slice(
                    secrets.mac_secret.as_slice(),
                )),
                pending_body_len: None,
            },
        }
    }

    /// Splits the codec for separate reader/writer ownership.
    pub fn split(self) -> (FrameEncoder, FrameDecoder) {
        (self.encoder, self.decoder)
    }

    /// Seals one frame (convenience for the pre-split handshake phase).
    pub fn write_frame(&mut self, frame_data: &[u8]) -> Vec<u8> {
        self.encoder.write_frame(frame_data)
    }

    /// Reads a header (convenience for the pre-split handshake phase).
    pub fn read_header(&mut self, wire: &[u8; HEADER_WIRE_LEN]) -> NetResult<usize> {
        self.decoder.read_header(wire)
    }

    /// Reads a body (convenience for the pre-split handshake phase).
    pub fn read_body(&mut self, wire: &[u8]) -> NetResult<Vec<u8>> {
        self.decoder.read_body(wire)
    }
}

impl FrameEncoder {
    /// Seals one frame: encrypted sized header, header MAC, encrypted
    /// zero-padded body, body MAC.
    pub fn write_frame(&mut self, frame_data: &[u8]) -> Vec<u8> {
        let mut header = [0u8; 16];
        let size = frame_data.len();
        header[0] = (size >> 16) as u8;
        header[1] = (size >> 8) as u8;
        header[2] = size as u8;
        header[3..6].copy_from_slice(&HEADER_PADDING);
        self.aes.apply_keystream(&mut header);
        let header_mac = update_mac(&mut self.mac, &self.mac_cipher, &header);

        let padded_len = size.div_ceil(16) * 16;
        let mut body = vec![0u8; padded_len];
        body[..size].copy_from_slice(frame_data);
        self.aes.apply_keystream(&mut body);

        self.mac.update(&body);
        let body_seed = digest_head(&self.mac);
        let body_mac = update_mac(&mut self.mac, &self.mac_cipher, &body_seed);

        let mut out = Vec::with_capacity(HEADER_WIRE_LEN + padded_len + MAC_LEN);
        out.extend_from_slice(&header);
        out.extend_from_slice(&header_mac);
        out.extend_from_slice(&body);
        out.extend_from_slice(&body_mac);
        out
    }
}

impl FrameDecoder {
    /// Verifies and decrypts a header, returning how many wire bytes of body
    /// (padding and MAC included) follow it.
    pub fn read_header(&mut self, wire: &[u8; HEADER_WIRE_LEN]) -> NetResult<usize> {
        let (cipher_header, mac) = wire.split_at(16);
        let expected = update_mac(
            &mut self.mac,
            &self.mac_cipher,
            cipher_header.try_into().expect("split at 16"),
        );
        if expected.as_slice() != mac {
            return Err(NetError::MacMismatch);
        }

        let mut header = [0u8; 16];
        header.copy_from_slice(cipher_header);
        self.aes.apply_keystream(&mut header);
        let size =
            (header[0] as usize) << 16 | (header[1] as usize) << 8 | header[2] as usize;
        self.pending_body_len = Some(size);
        Ok(size.div_ceil(16) * 16 + MAC_LEN)
    }

    /// Verifies and decrypts the body bytes announced by the last header.
    pub fn read_body(&mut self, wire: &[u8]) -> NetResult<Vec<u8>> {
        let size = self
            .pending_body_len
            .take()
            .ok_or(NetError::Protocol("body before header"))?;
        if wire.len() < MAC_LEN {
            return Err(NetError::Protocol("short frame body"));
        }
        let (ciphertext, mac) = wire.split_at(wire.len() - MAC_LEN);

        self.mac.update(ciphertext);
        let seed = digest_head(&self.mac);
        let expected = update_mac(&mut self.mac, &self.mac_cipher, &seed);
        if expected.as_slice() != mac {
            return Err(NetError::MacMismatch);
        }

        let mut body = ciphertext.to_vec();
        self.aes.apply_keystream(&mut body);
        body.truncate(size);
        Ok(body)
    }
}

/// The first half of a sponge's current digest.
fn digest_head(mac: &Keccak256) -> [u8; 16] {
    let digest: [u8; 32] = mac.clone().finalize().into();
    digest[..16].try_into().expect("sized")
}

/// The devp2p MAC chaining step: whiten the current digest with AES, fold in
/// the seed, absorb, and emit the new head.
fn update_mac(mac: &mut Keccak256, cipher: &Aes256, seed: &[u8; 16]) -> [u8; 16] {
    let mut block = GenericArray::from(digest_head(mac));
    cipher.encrypt_block(&mut block);
    for (out, seed_byte) in block.iter_mut().zip(seed) {
        *out ^= seed_byte;
    }
    mac.update(&block);
    digest_head(mac)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_id_of;
    use crate::rlpx::{InitiatorHandshake, ResponderHandshake};
    use k256::ecdsa::SigningKey;

    fn codec_pair() -> (FrameCodec, FrameCodec) {
        let initiator_key = SigningKey::from_slice(&[0x71u8; 32]).unwrap();
        let responder_key = SigningKey::from_slice(&[0x72u8; 32]).unwrap();

        let (state, auth) =
            InitiatorHandshake::new(&initiator_key, node_id_of(&responder_key)).unwrap();
        let (responder_secrets, ack) =
            ResponderHandshake::respond(&responder_key, &auth).unwrap();
        let initiator_secrets = state.finish(&initiator_key, &ack).unwrap();
        (FrameCodec::new(initiator_secrets), FrameCodec::new(responder_secrets))
    }

    #[test]
    fn test_frame_roundtrip() {
        let (mut sender, mut receiver) = codec_pair();
        for payload in [&b"\x80"[..], &b"hello devp2p frame"[..], &[0xAA; 100][..]] {
            let wire = sender.write_frame(payload);
            let header: [u8; HEADER_WIRE_LEN] =
                wire[..HEADER_WIRE_LEN].try_into().unwrap();
            let body_len = receiver.read_header(&header).unwrap();
            assert_eq!(wire.len(), HEADER_WIRE_LEN + body_len);
            let body = receiver.read_body(&wire[HEADER_WIRE_LEN..]).unwrap();
            assert_eq!(body, payload);
        }
    }

    #[test]
    fn test_split_halves_continue_the_streams() {
        let (sender, receiver) = codec_pair();
        let (mut encoder, _) = sender.split();
        let (_, mut decoder) = receiver.split();

        let wire = encoder.write_frame(b"after the split");
        let header: [u8; HEADER_WIRE_LEN] = wire[..HEADER_WIRE_LEN].try_into().unwrap();
        decoder.read_header(&header).unwrap();
        assert_eq!(
            decoder.read_body(&wire[HEADER_WIRE_LEN..]).unwrap(),
            b"after the split"
        );
    }

    #[test]
    fn test_corrupt_header_mac_detected() {
        let (mut sender, mut receiver) = codec_pair();
        let mut wire = sender.write_frame(b"payload");
        wire[20] ^= 0x01;
        let header: [u8; HEADER_WIRE_LEN] = wire[..HEADER_WIRE_LEN].try_into().unwrap();
        assert!(matches!(
            receiver.read_header(&header),
            Err(NetError::MacMismatch)
        ));
    }

    #[test]
    fn test_corrupt_body_mac_detected() {
        let (mut sender, mut receiver) = codec_pair();
        let mut wire = sender.write_frame(b"payload");
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        let header: [u8; HEADER_WIRE_LEN] = wire[..HEADER_WIRE_LEN].try_into().unwrap();
        receiver.read_header(&header).unwrap();
        assert!(matches!(
            receiver.read_body(&wire[HEADER_WIRE_LEN..]),
            Err(NetError::MacMismatch)
        ));
    }
}
