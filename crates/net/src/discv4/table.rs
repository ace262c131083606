//! The Kademlia routing table: 256 distance buckets of 16 entries.

use crate::discv4::Endpoint;
use crate::NodeId;
use alloy_primitives::{keccak256, B256};

/// One bucket per possible log-distance.
pub const BUCKET_COUNT: usize = 256;

/// The `k` parameter: entries retained per bucket.
pub const BUCKET_SIZE: usize = 16;

/// Pings a node may fail before it is evicted.
const MAX_FAILURES: u32 = 3;

/// A peer known to discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// The peer's node id.
    pub id: NodeId,
    /// Where to reach it.
    pub endpoint: Endpoint,
    /// Consecutive unanswered pings.
    pub failures: u32,
}

/// The routing table. Buckets order entries least-recently-seen first, so
/// the eviction candidate is always at the front.
#[derive(Debug)]
pub struct KademliaTable {
    local_hash: B256,
    buckets: Vec<Vec<NodeRecord>>,
}

/// The log-distance between two ids over their Keccak-256 images, or `None`
/// for identical ids.
fn log_distance(a: B256, b: B256) -> Option<usize> {
    for (index, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let xor = x ^ y;
        if xor != 0 {
            return Some(255 - index * 8 - xor.leading_zeros() as usize);
        }
    }
    None
}

impl KademliaTable {
    /// A table centered on `local_id`.
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_hash: keccak256(local_id),
            buckets: vec![Vec::new(); BUCKET_COUNT],
        }
    }

    fn bucket_of(&self, id: &NodeId) -> Option<usize> {
        log_distance(self.local_hash, keccak256(id))
    }

    /// The number of tracked nodes.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// True when no nodes are tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Records that `id` was seen alive at `endpoint`. A known node moves to
    /// the fresh end of its bucket; a new node joins a non-full bucket.
    /// When the bucket is full, the stalest resident is returned so the
    /// caller can probe it before anything is displaced.
    pub fn note_seen(&mut self, id: NodeId, endpoint: Endpoint) -> Option<NodeRecord> {
        let index = self.bucket_of(&id)?;
        let bucket = &mut self.buckets[index];

        if let Some(position) = bucket.iter().position(|record| record.id == id) {
            let mut record = bucket.remove(position);
            record.endpoint = endpoint;
            record.failures = 0;
            bucket.push(record);
            return None;
        }
        if bucket.len() < BUCKET_SIZE {
            bucket.push(NodeRecord { id, endpoint, failures: 0 });
            return None;
        }
        bucket.first().cloned()
    }

    /// Records an unanswered ping. After [MAX_FAILURES] strikes the node
    /// leaves the table.
    pub fn note_failure(&mut self, id: &NodeId) {
        let Some(index) = self.bucket_of(id) else {
            return;
        };
        let bucket = &mut self.buckets[index];
        if let Some(position) = bucket.iter().position(|record| record.id == *id) {
            bucket[position].failures += 1;
            if bucket[position].failures >= MAX_FAILURES {
                bucket.remove(position);
            }
        }
    }

    /// Drops `stale` in favor of `fresh` once the probe of the eviction
    /// candidate has failed.
    pub fn replace(&mut self, stale: &NodeId, fresh: NodeRecord) {
        let Some(index) = self.bucket_of(stale) else {
            return;
        };
        {
            let bucket = &mut self.buckets[index];
            if let Some(position) = bucket.iter().position(|record| record.id == *stale) {
                bucket.remove(position);
            }
        }
        if let Some(fresh_index) = self.bucket_of(&fresh.id) {
            if fresh_index == index && self.buckets[index].len() < BUCKET_SIZE {
                self.buckets[index].push(fresh);
            }
        }
    }

    /// The `count` tracked nodes closest to `target` by log-distance.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeRecord> {
        let target_hash = keccak256(target);
        let mut all: Vec<&NodeRecord> = self.buckets.iter().flatten().collect();
        all.sort_by_key(|record| {
            log_distance(target_hash, keccak256(record.id)).unwrap_or(0)
        });
        all.into_iter().take(count).cloned().collect()
    }

    /// Every tracked record, for seeding dials.
    pub fn records(&self) -> Vec<NodeRecord> {
        self.buckets.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node_id_of;
    use k256::ecdsa::SigningKey;
    use std::net::IpAddr;

    fn id(seed: u8) -> NodeId {
        node_id_of(&SigningKey::from_slice(&[seed; 32]).unwrap())
    }

    fn endpoint(last: u8) -> Endpoint {
        Endpoint { ip: IpAddr::from([10, 0, 0, last]), udp_port: 30303, tcp_port: 30303 }
    }

    #[test]
    fn test_log_distance() {
        let a = B256::ZERO;
        let mut b = B256::ZERO;
        assert_eq!(log_distance(a, b), None);
        b.0[31] = 1;
        assert_eq!(log_distance(a, b), Some(0));
        b.0[0] = 0x80;
        assert_eq!(log_distance(a, b), Some(255));
    }

    #[test]
    fn test_insert_and_refresh() {
        let mut table = KademliaTable::new(id(1));
        assert!(table.note_seen(id(2), endpoint(2)).is_none());
        assert_eq!(table.len(), 1);

        // Seeing the same node again refreshes rather than duplicates.
        assert!(table.note_seen(id(2), endpoint(3)).is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].endpoint, endpoint(3));
    }

    #[test]
    fn test_self_is_never_tracked() {
        let mut table = KademliaTable::new(id(1));
        assert!(table.note_seen(id(1), endpoint(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_three_strikes_evict() {
        let mut table = KademliaTable::new(id(1));
        table.note_seen(id(2), endpoint(2));
        table.note_failure(&id(2));
        table.note_failure(&id(2));
        assert_eq!(table.len(), 1);
        table.note_failure(&id(2));
        assert!(table.is_empty());
    }

    #[test]
    fn test_closest_ordering() {
        let mut table = KademliaTable::new(id(1));
        for seed in 2..40u8 {
            table.note_seen(id(seed), endpoint(seed));
        }
        let closest = table.closest(&id(2), 5);
        assert_eq!(closest.len(), 5);
        // The target itself is tracked and sorts first.
        assert_eq!(closest[0].id, id(2));
    }

    #[test]
    fn test_failure_resets_on_sighting() {
        let mut table = KademliaTable::new(id(1));
        table.note_seen(id(2), endpoint(2));
        table.note_failure(&id(2));
        table.note_failure(&id(2));
        table.note_seen(id(2), endpoint(2));
        table.note_failure(&id(2));
        table.note_failure(&id(2));
        // Two fresh strikes after the reset: still resident.
        assert_eq!(table.len(), 1);
    }
}
