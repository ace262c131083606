//! The set of known blocks and the canonical-tip choice.

use crate::{DriverError, DriverResult};
use alloy_primitives::{B256, U256};
use ember_primitives::{Block, Header};
use std::collections::HashMap;
use tracing::info;

/// A block in the tree, with its accumulated weight and forward links.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    /// The block itself.
    pub block: Block,
    /// Sum of difficulties from genesis through this block.
    pub total_difficulty: U256,
    /// Hashes of known children.
    pub children: Vec<B256>,
}

/// All known blocks, rooted at genesis, indexed by hash. The canonical tip
/// is the entry of maximum total difficulty; on a tie the first-seen block
/// keeps the crown.
#[derive(Debug)]
pub struct Blocktree {
    entries: HashMap<B256, BlockEntry>,
    genesis_hash: B256,
    best_hash: B256,
}

impl Blocktree {
    /// A tree holding only `genesis`.
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let entry = BlockEntry {
            total_difficulty: genesis.header.difficulty,
            block: genesis,
            children: Vec::new(),
        };
        Self {
            entries: HashMap::from([(hash, entry)]),
            genesis_hash: hash,
            best_hash: hash,
        }
    }

    /// The genesis hash the tree is rooted at.
    pub const fn genesis_hash(&self) -> B256 {
        self.genesis_hash
    }

    /// True when `hash` is a known block.
    pub fn contains(&self, hash: &B256) -> bool {
        self.entries.contains_key(hash)
    }

    /// The entry at `hash`, if known.
    pub fn entry(&self, hash: &B256) -> Option<&BlockEntry> {
        self.entries.get(hash)
    }

    /// The header at `hash`, if known.
    pub fn header(&self, hash: &B256) -> Option<&Header> {
        self.entries.get(hash).map(|entry| &entry.block.header)
    }

    /// The canonical tip.
    pub fn best_block(&self) -> &Block {
        &self.entries[&self.best_hash].block
    }

    /// The canonical tip's hash.
    pub const fn best_hash(&self) -> B256 {
        self.best_hash
    }

    /// The canonical tip's height.
    pub fn best_number(&self) -> u64 {
        self.best_block().header.number
    }

    /// The canonical tip's total difficulty.
    pub fn total_difficulty(&self) -> U256 {
        self.entries[&self.best_hash].total_difficulty
    }

    /// Walks the canonical chain down to `number`.
    pub fn canonical_block(&self, number: u64) -> Option<&Block> {
        let mut current = &self.entries[&self.best_hash];
        if number > current.block.header.number {
            return None;
        }
        while current.block.header.number > number {
            current = self.entries.get(&current.block.header.parent_hash)?;
        }
        Some(&current.block)
    }

    /// Adds a validated block, linking it under its parent. Returns `true`
    /// when the block became the new canonical tip. Re-inserting a known
    /// block is a no-op.
    pub fn insert(&mut self, block: Block) -> DriverResult<bool> {
        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return Ok(false);
        }
        let parent_hash = block.header.parent_hash;
        let parent_td = self
            .entries
            .get(&parent_hash)
            .map(|parent| parent.total_difficulty)
            .ok_or(DriverError::UnknownParent(parent_hash))?;

        let total_difficulty = parent_td + block.header.difficulty;
        let number = block.header.number;
        self.entries.insert(
            hash,
            BlockEntry { block, total_difficulty, children: Vec::new() },
        );
        self.entries
            .get_mut(&parent_hash)
            .expect("parent presence checked above")
            .children
            .push(hash);

        // Strictly greater: ties keep the first-seen tip.
        let reorged = total_difficulty > self.total_difficulty();
        if reorged {
            if self.best_hash != parent_hash {
                info!(
                    target: "driver::blocktree",
                    number,
                    %hash,
                    "chain reorganization"
                );
            }
            self.best_hash = hash;
        }
        Ok(reorged)
    }

    /// The deepest block on both `a`'s and `b`'s ancestor paths: the reorg
    /// pivot.
    pub fn common_ancestor(&self, a: B256, b: B256) -> Option<B256> {
        let mut a = self.entries.get(&a)?;
        let mut b = self.entries.get(&b)?;
        while a.block.header.number > b.block.header.number {
            a = self.entries.get(&a.block.header.parent_hash)?;
        }
        while b.block.header.number > a.block.header.number {
            b = self.entries.get(&b.block.header.parent_hash)?;
        }
        while a.block.hash() != b.block.hash() {
            a = self.entries.get(&a.block.header.parent_hash)?;
            b = self.entries.get(&b.block.header.parent_hash)?;
        }
        Some(a.block.hash())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::Address;

    fn genesis() -> Block {
        Block {
            header: Header { difficulty: U256::from(1000), ..Default::default() },
            transactions: vec![],
            ommers: vec![],
        }
    }

    fn child_of(parent: &Block, beneficiary: u8, difficulty: u64) -> Block {
        Block {
            header: Header {
                parent_hash: parent.hash(),
                number: parent.header.number + 1,
                difficulty: U256::from(difficulty),
                beneficiary: Address::repeat_byte(beneficiary),
                timestamp: parent.header.timestamp + 10,
                ..Default::default()
            },
            transactions: vec![],
            ommers: vec![],
        }
    }

    #[test]
    fn test_linear_growth() {
        let genesis = genesis();
        let mut tree = Blocktree::new(genesis.clone());
        let one = child_of(&genesis, 1, 100);
        let two = child_of(&one, 1, 100);

        assert!(tree.insert(one.clone()).unwrap());
        assert!(tree.insert(two.clone()).unwrap());
        assert_eq!(tree.best_hash(), two.hash());
        assert_eq!(tree.best_number(), 2);
        assert_eq!(tree.total_difficulty(), U256::from(1200));
        assert_eq!(tree.canonical_block(1).unwrap().hash(), one.hash());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut tree = Blocktree::new(genesis());
        let orphan = Block {
            header: Header {
                parent_hash: alloy_primitives::keccak256(b"nowhere"),
                number: 1,
                ..Default::default()
            },
            transactions: vec![],
            ommers: vec![],
        };
        assert!(matches!(
            tree.insert(orphan),
            Err(DriverError::UnknownParent(_))
        ));
    }

    #[test]
    fn test_heavier_fork_wins() {
        let genesis = genesis();
        let mut tree = Blocktree::new(genesis.clone());

        let a1 = child_of(&genesis, 1, 100);
        let a2 = child_of(&a1, 1, 100);
        tree.insert(a1.clone()).unwrap();
        tree.insert(a2.clone()).unwrap();

        // A competing fork with more accumulated difficulty.
        let b1 = child_of(&genesis, 2, 150);
        let b2 = child_of(&b1, 2, 150);
        assert!(!tree.insert(b1.clone()).unwrap());
        assert!(tree.insert(b2.clone()).unwrap());
        assert_eq!(tree.best_hash(), b2.hash());

        assert_eq!(
            tree.common_ancestor(a2.hash(), b2.hash()),
            Some(genesis.hash())
        );
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let genesis = genesis();
        let mut tree = Blocktree::new(genesis.clone());

        let first = child_of(&genesis, 1, 100);
        let second = child_of(&genesis, 2, 100);
        assert!(tree.insert(first.clone()).unwrap());
        assert!(!tree.insert(second).unwrap());
        assert_eq!(tree.best_hash(), first.hash());
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let genesis = genesis();
        let mut tree = Blocktree::new(genesis.clone());
        let one = child_of(&genesis, 1, 100);
        tree.insert(one.clone()).unwrap();
        assert!(!tree.insert(one.clone()).unwrap());
        assert_eq!(tree.entry(&genesis.hash()).unwrap().children.len(), 1);
    }
}
