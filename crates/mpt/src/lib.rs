#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{b256, B256};

mod errors;
pub use errors::{StoreError, StoreResult, TrieError, TrieResult};

mod nibbles;
pub use nibbles::Nibbles;

mod node;
pub use node::{NodeRef, TrieNode};

mod store;
pub use store::{MemoryTrieStore, TrieStore};

mod trie;
pub use trie::Trie;

mod ordered;
pub use ordered::ordered_trie_root;

/// The root hash of the empty trie: `Keccak256(RLP(<>))`.
pub const EMPTY_ROOT: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");
