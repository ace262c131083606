//! Node discovery v4: signed UDP packets and a Kademlia routing table.

mod message;
pub use message::{Endpoint, Packet, PingMessage, PongMessage};

mod table;
pub use table::{KademliaTable, NodeRecord, BUCKET_COUNT, BUCKET_SIZE};

mod service;
pub use service::{Discovery, DiscoveryConfig, DiscoveryHandle};
