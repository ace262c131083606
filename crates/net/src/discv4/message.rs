//! The four discovery packet kinds and their signed envelope.

use crate::{NetError, NetResult, NodeId};
use alloy_primitives::{keccak256, B256};
use ember_rlp::{decode, encode, Decodable, Encodable, Item, RlpError, RlpResult};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use std::net::{IpAddr, SocketAddr};

/// Packet type byte for ping.
pub const PING: u8 = 0x01;
/// Packet type byte for pong.
pub const PONG: u8 = 0x02;
/// Packet type byte for find-neighbours.
pub const FIND_NODE: u8 = 0x03;
/// Packet type byte for neighbours.
pub const NEIGHBOURS: u8 = 0x04;

/// The discovery protocol version carried in pings.
const DISCOVERY_VERSION: u64 = 4;

/// A UDP endpoint as carried on the wire: `[ip, udp-port, tcp-port]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// The node's IP address.
    pub ip: IpAddr,
    /// The discovery port.
    pub udp_port: u16,
    /// The RLPx listener port.
    pub tcp_port: u16,
}

impl Endpoint {
    /// Builds an endpoint from a socket address, advertising the same port
    /// for TCP.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { ip: addr.ip(), udp_port: addr.port(), tcp_port: addr.port() }
    }

    /// The UDP socket address.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.udp_port)
    }
}

impl Encodable for Endpoint {
    fn to_rlp(&self) -> Item {
        let ip = match self.ip {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        Item::list(vec![
            Item::bytes(ip),
            Item::from_u64(self.udp_port.into()),
            Item::from_u64(self.tcp_port.into()),
        ])
    }
}

impl Decodable for Endpoint {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() < 3 {
            return Err(RlpError::UnexpectedLength);
        }
        let ip = match fields[0].as_bytes()? {
            bytes if bytes.len() == 4 => {
                IpAddr::from(<[u8; 4]>::try_from(bytes).expect("length checked"))
            }
            bytes if bytes.len() == 16 => {
                IpAddr::from(<[u8; 16]>::try_from(bytes).expect("length checked"))
            }
            _ => return Err(RlpError::UnexpectedLength),
        };
        Ok(Self {
            ip,
            udp_port: fields[1].as_u64()? as u16,
            tcp_port: fields[2].as_u64()? as u16,
        })
    }
}

/// A ping: protocol version, both endpoints, and an expiration timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingMessage {
    /// The sender's endpoint.
    pub from: Endpoint,
    /// The recipient's endpoint as the sender sees it.
    pub to: Endpoint,
    /// Unix seconds after which the packet is stale.
    pub expiration: u64,
}

/// A pong: the echoed endpoint, the hash of the ping answered, and an
/// expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongMessage {
    /// The ping sender's endpoint, echoed back.
    pub to: Endpoint,
    /// Hash of the ping packet being answered.
    pub ping_hash: B256,
    /// Unix seconds after which the packet is stale.
    pub expiration: u64,
}

/// A decoded discovery packet with its authenticated sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// An endpoint-proof probe.
    Ping(PingMessage),
    /// The answer to a ping.
    Pong(PongMessage),
    /// A request for the peers closest to a target id.
    FindNode {
        /// The id to search around.
        target: NodeId,
        /// Unix seconds after which the packet is stale.
        expiration: u64,
    },
    /// The answer to a find-node: up to 16 close records.
    Neighbours {
        /// `(endpoint, id)` records close to the requested target.
        nodes: Vec<(Endpoint, NodeId)>,
        /// Unix seconds after which the packet is stale.
        expiration: u64,
    },
}

impl Packet {
    const fn type_byte(&self) -> u8 {
        match self {
            Self::Ping(_) => PING,
            Self::Pong(_) => PONG,
            Self::FindNode { .. } => FIND_NODE,
            Self::Neighbours { .. } => NEIGHBOURS,
        }
    }

    fn payload(&self) -> Item {
        match self {
            Self::Ping(ping) => Item::list(vec![
                Item::from_u64(DISCOVERY_VERSION),
                ping.from.to_rlp(),
                ping.to.to_rlp(),
                Item::from_u64(ping.expiration),
            ]),
            Self::Pong(pong) => Item::list(vec![
                pong.to.to_rlp(),
                pong.ping_hash.to_rlp(),
                Item::from_u64(pong.expiration),
            ]),
            Self::FindNode { target, expiration } => {
                Item::list(vec![target.to_rlp(), Item::from_u64(*expiration)])
            }
            Self::Neighbours { nodes, expiration } => {
                let records = nodes
                    .iter()
                    .map(|(endpoint, id)| {
                        let Item::List(mut fields) = endpoint.to_rlp() else {
                            unreachable!("endpoints encode as lists")
                        };
                        fields.push(id.to_rlp());
                        Item::List(fields)
                    })
                    .collect::<Vec<_>>();
                Item::list(vec![Item::list(records), Item::from_u64(*expiration)])
            }
        }
    }

    fn from_payload(type_byte: u8, payload: &Item) -> NetResult<Self> {
        let fields = payload.as_list().map_err(NetError::from)?;
        let expiration_of = |index: usize| -> NetResult<u64> {
            fields
                .get(index)
                .ok_or(NetError::Rlp(RlpError::UnexpectedLength))?
                .as_u64()
                .map_err(NetError::from)
        };

        match type_byte {
            PING => {
                if fields.len() < 4 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::Ping(PingMessage {
                    from: Endpoint::from_rlp(&fields[1])?,
                    to: Endpoint::from_rlp(&fields[2])?,
                    expiration: expiration_of(3)?,
                }))
            }
            PONG => {
                if fields.len() < 3 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::Pong(PongMessage {
                    to: Endpoint::from_rlp(&fields[0])?,
                    ping_hash: B256::from_rlp(&fields[1])?,
                    expiration: expiration_of(2)?,
                }))
            }
            FIND_NODE => {
                if fields.len() < 2 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::FindNode {
                    target: NodeId::from_rlp(&fields[0])?,
                    expiration: expiration_of(1)?,
                })
            }
            NEIGHBOURS => {
                if fields.len() < 2 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                let mut nodes = Vec::new();
                for record in fields[0].as_list().map_err(NetError::from)? {
                    let parts = record.as_list().map_err(NetError::from)?;
                    if parts.len() < 4 {
                        return Err(RlpError::UnexpectedLength.into());
                    }
                    let endpoint = Endpoint::from_rlp(record)?;
                    let id = NodeId::from_rlp(&parts[3])?;
                    nodes.push((endpoint, id));
                }
                Ok(Self::Neighbours { nodes, expiration: expiration_of(1)? })
            }
            other => Err(NetError::UnknownMessage(other)),
        }
    }

    /// Seals the packet: `hash(32) ∥ signature(65) ∥ type(1) ∥ rlp(payload)`,
    /// with the signature over `Keccak256(type ∥ rlp(payload))`. Returns the
    /// wire bytes and the packet hash (pongs echo it).
    pub fn seal(&self, key: &SigningKey) -> NetResult<(Vec<u8>, B256)> {
        let payload = encode(&self.payload());
        let mut signed_portion = Vec::with_capacity(1 + payload.len());
        signed_portion.push(self.type_byte());
        signed_portion.extend_from_slice(&payload);

        let digest = keccak256(&signed_portion);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| NetError::InvalidSignature)?;

        let mut wire = Vec::with_capacity(32 + 65 + signed_portion.len());
        wire.extend_from_slice(&[0u8; 32]);
        wire.extend_from_slice(&signature.to_bytes());
        wire.push(recovery_id.to_byte());
        wire.extend_from_slice(&signed_portion);

        let hash = keccak256(&wire[32..]);
        wire[..32].copy_from_slice(hash.as_slice());
        Ok((wire, hash))
    }

    /// Opens a wire packet: checks the hash, recovers the signer, and
    /// decodes the payload. Returns the packet, the sender's node id, and
    /// the packet hash.
    pub fn open(wire: &[u8]) -> NetResult<(Self, NodeId, B256)> {
        if wire.len() < 32 + 65 + 1 {
            return Err(NetError::Protocol("short discovery packet"));
        }
        let hash = B256::from_slice(&wire[..32]);
        if keccak256(&wire[32..]) != hash {
            return Err(NetError::PacketHashMismatch);
        }

        let signature = Signature::from_slice(&wire[32..96])
            .map_err(|_| NetError::InvalidSignature)?;
        let recovery_id =
            RecoveryId::from_byte(wire[96]).ok_or(NetError::InvalidSignature)?;
        let signed_portion = &wire[97..];
        let digest = keccak256(signed_portion);
        let verifying_key =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
                .map_err(|_| NetError::InvalidSignature)?;
        let sender = NodeId::from_slice(&verifying_key.to_encoded_point(false).as_bytes()[1..]);

        let payload = decode(&signed_portion[1..])?;
        let packet = Self::from_payload(signed_portion[0], &payload)?;
        Ok((packet, sender, hash))
    }
}

/// Rejects packets whose expiration has passed.
pub(crate) fn check_expiration(expiration: u64, now: u64) -> NetResult<()> {
    if expiration < now {
        return Err(NetError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_id_of;

    fn endpoint(last: u8, port: u16) -> Endpoint {
        Endpoint { ip: IpAddr::from([10, 0, 0, last]), udp_port: port, tcp_port: port }
    }

    #[test]
    fn test_ping_seal_open() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let ping = Packet::Ping(PingMessage {
            from: endpoint(1, 30303),
            to: endpoint(2, 30304),
            expiration: 1_700_000_000,
        });

        let (wire, hash) = ping.seal(&key).unwrap();
        let (opened, sender, opened_hash) = Packet::open(&wire).unwrap();
        assert_eq!(opened, ping);
        assert_eq!(sender, node_id_of(&key));
        assert_eq!(opened_hash, hash);
    }

    #[test]
    fn test_neighbours_roundtrip() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let other = SigningKey::from_slice(&[0x43u8; 32]).unwrap();
        let packet = Packet::Neighbours {
            nodes: vec![(endpoint(7, 30307), node_id_of(&other))],
            expiration: 1_700_000_000,
        };
        let (wire, _) = packet.seal(&key).unwrap();
        let (opened, _, _) = Packet::open(&wire).unwrap();
        assert_eq!(opened, packet);
    }

    #[test]
    fn test_tampered_packet_rejected() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let packet = Packet::FindNode {
            target: node_id_of(&key),
            expiration: 1_700_000_000,
        };
        let (mut wire, _) = packet.seal(&key).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        assert!(matches!(
            Packet::open(&wire),
            Err(NetError::PacketHashMismatch)
        ));
    }

    #[test]
    fn test_signature_identifies_sender() {
        let alice = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let bob = SigningKey::from_slice(&[0x43u8; 32]).unwrap();
        let packet = Packet::FindNode {
            target: node_id_of(&alice),
            expiration: 1_700_000_000,
        };
        let (wire, _) = packet.seal(&bob).unwrap();
        let (_, sender, _) = Packet::open(&wire).unwrap();
        assert_eq!(sender, node_id_of(&bob));
        assert_ne!(sender, node_id_of(&alice));
    }

    #[test]
    fn test_expiration_check() {
        assert!(check_expiration(100, 50).is_ok());
        assert!(matches!(check_expiration(100, 150), Err(NetError::Expired)));
    }
}
