//! Protocol messages multiplexed over an RLPx session.

mod p2p;
pub use p2p::{
    Capability, DisconnectReason, Hello, P2pMessage, BASE_PROTOCOL_OFFSET, P2P_VERSION,
};

mod eth;
pub use eth::{EthMessage, HeadersRequest, HeadersStart, Status, ETH_PROTOCOL_VERSION};
