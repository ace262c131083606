#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{NetError, NetResult};

mod node_id;
pub use node_id::{node_id_of, public_key_of, NodeId};

pub mod discv4;
pub mod rlpx;
pub mod wire;

mod peer;
pub use peer::{
    ChainView, PeerCommand, PeerHandle, PeerSet, SessionEvent, REQUEST_TIMEOUT,
};

mod listener;
pub use listener::{connect_peer, serve_incoming, NetworkConfig, TreeChainView};
