//! The base `p2p` capability: hello, disconnect, and keepalive.

use crate::{NetError, NetResult, NodeId};
use ember_rlp::{decode, encode, Decodable, Encodable, Item, RlpError};

/// The p2p protocol version spoken (pre-snappy).
pub const P2P_VERSION: u64 = 4;

/// Message ids above this offset belong to negotiated subprotocols, assigned
/// in alphabetical capability order.
pub const BASE_PROTOCOL_OFFSET: u8 = 0x10;

/// Message id of [Hello].
const HELLO_ID: u8 = 0x00;
/// Message id of disconnect.
const DISCONNECT_ID: u8 = 0x01;
/// Message id of the keepalive ping.
const PING_ID: u8 = 0x02;
/// Message id of the keepalive pong.
const PONG_ID: u8 = 0x03;

/// A named subprotocol at a version, as advertised in [Hello].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// The short ASCII name, e.g. `eth`.
    pub name: String,
    /// The protocol version.
    pub version: u64,
}

impl Encodable for Capability {
    fn to_rlp(&self) -> Item {
        Item::list(vec![self.name.to_rlp(), self.version.to_rlp()])
    }
}

impl Decodable for Capability {
    fn from_rlp(item: &Item) -> Result<Self, RlpError> {
        let fields = item.as_list()?;
        if fields.len() < 2 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self { name: String::from_rlp(&fields[0])?, version: u64::from_rlp(&fields[1])? })
    }
}

/// The session-opening message: versions, identity, and capability offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// The p2p protocol version.
    pub protocol_version: u64,
    /// Free-form client identifier.
    pub client_id: String,
    /// Offered subprotocols.
    pub capabilities: Vec<Capability>,
    /// The TCP listener port, zero when not listening.
    pub listen_port: u64,
    /// The sender's node id.
    pub node_id: NodeId,
}

/// Disconnect reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Locally requested.
    Requested = 0x00,
    /// A protocol violation.
    ProtocolError = 0x02,
    /// A peer of no use (no shared capabilities).
    UselessPeer = 0x03,
    /// Too many peers connected.
    TooManyPeers = 0x04,
    /// The remote timed out.
    Timeout = 0x0B,
    /// Another, unmapped reason.
    Other = 0x10,
}

impl From<u64> for DisconnectReason {
    fn from(code: u64) -> Self {
        match code {
            0x00 => Self::Requested,
            0x02 => Self::ProtocolError,
            0x03 => Self::UselessPeer,
            0x04 => Self::TooManyPeers,
            0x0B => Self::Timeout,
            _ => Self::Other,
        }
    }
}

/// A base-protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum P2pMessage {
    /// Session opening.
    Hello(Hello),
    /// Session teardown with a reason.
    Disconnect(DisconnectReason),
    /// Keepalive request.
    Ping,
    /// Keepalive answer.
    Pong,
}

impl P2pMessage {
    /// Encodes the message as `msg-id ∥ rlp(payload)` frame data.
    pub fn to_frame(&self) -> Vec<u8> {
        let (id, payload) = match self {
            Self::Hello(hello) => (
                HELLO_ID,
                Item::list(vec![
                    hello.protocol_version.to_rlp(),
                    hello.client_id.to_rlp(),
                    hello.capabilities.to_rlp(),
                    hello.listen_port.to_rlp(),
                    hello.node_id.to_rlp(),
                ]),
            ),
            Self::Disconnect(reason) => {
                (DISCONNECT_ID, Item::list(vec![Item::from_u64(*reason as u64)]))
            }
            Self::Ping => (PING_ID, Item::empty_list()),
            Self::Pong => (PONG_ID, Item::empty_list()),
        };
        let mut frame = encode(&Item::from_u64(id.into()));
        frame.extend_from_slice(&encode(&payload));
        frame
    }

    /// Decodes a base-protocol message from a frame's id and payload bytes.
    pub fn from_frame(id: u8, payload: &[u8]) -> NetResult<Self> {
        match id {
            HELLO_ID => {
                let item = decode(payload)?;
                let fields = item.as_list().map_err(NetError::from)?;
                if fields.len() < 5 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::Hello(Hello {
                    protocol_version: u64::from_rlp(&fields[0])?,
                    client_id: String::from_rlp(&fields[1])?,
                    capabilities: Vec::from_rlp(&fields[2])?,
                    listen_port: u64::from_rlp(&fields[3])?,
                    node_id: NodeId::from_rlp(&fields[4])?,
                }))
            }
            DISCONNECT_ID => {
                // Accept both `[reason]` and a bare reason byte.
                let reason = match decode(payload) {
                    Ok(Item::List(fields)) if !fields.is_empty() => {
                        fields[0].as_u64().unwrap_or(0x10)
                    }
                    Ok(item) => item.as_u64().unwrap_or(0x10),
                    Err(_) => 0x10,
                };
                Ok(Self::Disconnect(reason.into()))
            }
            PING_ID => Ok(Self::Ping),
            PONG_ID => Ok(Self::Pong),
            other => Err(NetError::UnknownMessage(other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::B512;

    fn split_frame(frame: &[u8]) -> (u8, &[u8]) {
        // Message id zero encodes as the empty string (0x80); other small
        // ids are their own encoding.
        let id = if frame[0] == 0x80 { 0 } else { frame[0] };
        (id, &frame[1..])
    }

    #[test]
    fn test_hello_roundtrip() {
        let hello = P2pMessage::Hello(Hello {
            protocol_version: P2P_VERSION,
            client_id: "ember/v0.1.0".to_string(),
            capabilities: vec![Capability { name: "eth".to_string(), version: 63 }],
            listen_port: 30303,
            node_id: B512::repeat_byte(0x99),
        });
        let frame = hello.to_frame();
        let (id, payload) = split_frame(&frame);
        assert_eq!(P2pMessage::from_frame(id, payload).unwrap(), hello);
    }

    #[test]
    fn test_disconnect_roundtrip() {
        let message = P2pMessage::Disconnect(DisconnectReason::TooManyPeers);
        let frame = message.to_frame();
        let (id, payload) = split_frame(&frame);
        assert_eq!(P2pMessage::from_frame(id, payload).unwrap(), message);
    }

    #[test]
    fn test_ping_pong() {
        let ping_frame = P2pMessage::Ping.to_frame();
        let (id, payload) = split_frame(&ping_frame);
        assert_eq!(P2pMessage::from_frame(id, payload).unwrap(), P2pMessage::Ping);
        let pong_frame = P2pMessage::Pong.to_frame();
        let (id, payload) = split_frame(&pong_frame);
        assert_eq!(P2pMessage::from_frame(id, payload).unwrap(), P2pMessage::Pong);
    }
}
