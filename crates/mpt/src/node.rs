//! This module contains the [TrieNode] type and its RLP shape.

use crate::{Nibbles, TrieError, TrieResult};
use alloy_primitives::{keccak256, B256};
use ember_rlp::{decode, encode, Item};

/// The element count of an RLP-encoded branch node.
const BRANCH_LIST_LENGTH: usize = 17;

/// The element count of an RLP-encoded leaf or extension node.
const LEAF_OR_EXTENSION_LIST_LENGTH: usize = 2;

/// A reference from a trie node to a child node: the child's RLP inline when
/// that RLP is shorter than 32 bytes, or the 32-byte Keccak of that RLP, in
/// which case the child is persisted at that key in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// No child.
    Empty,
    /// A hash reference to a persisted node.
    Hash(B256),
    /// A short child, embedded as its raw RLP.
    Inline(Vec<u8>),
}

impl NodeRef {
    /// Builds the reference for a node with the given encoding, returning the
    /// bytes to persist alongside when the node does not fit inline.
    pub(crate) fn from_encoded(encoded: Vec<u8>) -> (Self, Option<(B256, Vec<u8>)>) {
        if encoded.len() < 32 {
            (Self::Inline(encoded), None)
        } else {
            let hash = keccak256(&encoded);
            (Self::Hash(hash), Some((hash, encoded)))
        }
    }

    /// The RLP item this reference contributes to its parent's encoding.
    pub(crate) fn to_item(&self) -> TrieResult<Item> {
        match self {
            Self::Empty => Ok(Item::empty()),
            Self::Hash(hash) => Ok(Item::bytes(hash.as_slice())),
            Self::Inline(rlp) => Ok(decode(rlp)?),
        }
    }

    /// Parses a reference out of a parent node's RLP element.
    pub(crate) fn from_item(item: &Item) -> TrieResult<Self> {
        match item {
            Item::Bytes(bytes) if bytes.is_empty() => Ok(Self::Empty),
            Item::Bytes(bytes) if bytes.len() == 32 => {
                Ok(Self::Hash(B256::from_slice(bytes)))
            }
            Item::Bytes(_) => Err(TrieError::InvalidNode),
            Item::List(_) => Ok(Self::Inline(encode(item))),
        }
    }

    /// True when no child is referenced.
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A node within the Merkle Patricia Trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    /// The absent node, standing in for an empty subtree.
    Empty,
    /// A terminal node: `rlp([hex_prefix(path, leaf = true), value])`.
    Leaf {
        /// The remaining path to the stored key.
        path: Nibbles,
        /// The stored value.
        value: Vec<u8>,
    },
    /// A shared-prefix pointer node: `rlp([hex_prefix(path, leaf = false), child])`.
    Extension {
        /// The shared path prefix.
        path: Nibbles,
        /// The node continuing below the prefix.
        child: NodeRef,
    },
    /// A 16-way fan-out with an optional value: `rlp([c0, ..., c15, value])`.
    Branch {
        /// One child slot per next-nibble.
        children: Box<[NodeRef; 16]>,
        /// The value stored when a key terminates at this branch.
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// An all-empty branch with no value.
    pub(crate) fn empty_branch() -> Self {
        Self::Branch { children: Box::new(core::array::from_fn(|_| NodeRef::Empty)), value: None }
    }

    /// RLP-encodes the node. [TrieNode::Empty] encodes as the empty string.
    pub fn to_item(&self) -> TrieResult<Item> {
        match self {
            Self::Empty => Ok(Item::empty()),
            Self::Leaf { path, value } => Ok(Item::list(vec![
                Item::bytes(path.encode_compact(true)),
                Item::bytes(value.clone()),
            ])),
            Self::Extension { path, child } => Ok(Item::list(vec![
                Item::bytes(path.encode_compact(false)),
                child.to_item()?,
            ])),
            Self::Branch { children, value } => {
                let mut elements = Vec::with_capacity(BRANCH_LIST_LENGTH);
                for child in children.iter() {
                    elements.push(child.to_item()?);
                }
                elements.push(Item::bytes(value.clone().unwrap_or_default()));
                Ok(Item::list(elements))
            }
        }
    }

    /// The node's full RLP encoding.
    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        Ok(encode(&self.to_item()?))
    }

    /// Decodes a node from a persisted RLP blob.
    pub fn decode(rlp: &[u8]) -> TrieResult<Self> {
        Self::from_item(&decode(rlp)?)
    }

    /// Reconstructs a node from its RLP item, dispatching on list length.
    pub fn from_item(item: &Item) -> TrieResult<Self> {
        if item.is_empty_bytes() {
            return Ok(Self::Empty);
        }
        let elements = item.as_list().map_err(|_| TrieError::InvalidNode)?;
        match elements.len() {
            LEAF_OR_EXTENSION_LIST_LENGTH => {
                let compact = elements[0].as_bytes().map_err(|_| TrieError::InvalidNode)?;
                let (path, leaf) = Nibbles::decode_compact(compact)?;
                if leaf {
                    let value =
                        elements[1].as_bytes().map_err(|_| TrieError::InvalidNode)?.to_vec();
                    Ok(Self::Leaf { path, value })
                } else {
                    Ok(Self::Extension { path, child: NodeRef::from_item(&elements[1])? })
                }
            }
            BRANCH_LIST_LENGTH => {
                let mut children: [NodeRef; 16] = core::array::from_fn(|_| NodeRef::Empty);
                for (slot, element) in children.iter_mut().zip(&elements[..16]) {
                    *slot = NodeRef::from_item(element)?;
                }
                let value_bytes = elements[16].as_bytes().map_err(|_| TrieError::InvalidNode)?;
                let value = (!value_bytes.is_empty()).then(|| value_bytes.to_vec());
                Ok(Self::Branch { children: Box::new(children), value })
            }
            _ => Err(TrieError::InvalidNode),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn test_decode_leaf() {
        let rlp = hex!("ca8320646f8576657262ff");
        let node = TrieNode::decode(&rlp).unwrap();
        assert_eq!(
            node,
            TrieNode::Leaf {
                path: Nibbles::from_nibbles([0x6, 0x4, 0x6, 0xf]),
                value: hex!("76657262ff").to_vec(),
            }
        );
        assert_eq!(node.encode().unwrap(), rlp);
    }

    #[test]
    fn test_decode_extension() {
        let rlp = hex!("cf8300646fca84303030308476657262");
        let node = TrieNode::decode(&rlp).unwrap();
        let TrieNode::Extension { path, child } = &node else {
            panic!("expected extension");
        };
        assert_eq!(*path, Nibbles::from_nibbles([0x6, 0x4, 0x6, 0xf]));
        assert!(matches!(child, NodeRef::Inline(_)));
        assert_eq!(node.encode().unwrap(), rlp);
    }

    #[test]
    fn test_branch_roundtrip() {
        let mut children: [NodeRef; 16] = core::array::from_fn(|_| NodeRef::Empty);
        children[3] = NodeRef::Hash(alloy_primitives::keccak256(b"child"));
        let node =
            TrieNode::Branch { children: Box::new(children), value: Some(b"value".to_vec()) };
        let rlp = node.encode().unwrap();
        assert_eq!(TrieNode::decode(&rlp).unwrap(), node);
    }

    #[test]
    fn test_empty_node() {
        assert_eq!(TrieNode::Empty.encode().unwrap(), hex!("80"));
        assert_eq!(TrieNode::decode(&hex!("80")).unwrap(), TrieNode::Empty);
    }
}
