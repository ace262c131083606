//! Store-backed trie operations: lookup, insertion, and deletion with node
//! collapse.

use crate::{NodeRef, Nibbles, TrieNode, TrieResult, TrieStore, EMPTY_ROOT};
use alloy_primitives::{keccak256, B256};

/// The flush granularity for node batches produced by a single operation.
const BATCH_CHUNK: usize = 256;

/// A view of the Merkle Patricia Trie at any root, bound to a backing store.
///
/// Operations are functional: mutation returns the new root hash and leaves
/// every prior root intact, so multiple roots share subtrees in the store.
#[derive(Debug)]
pub struct Trie<'a, S: TrieStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TrieStore + ?Sized> Trie<'a, S> {
    /// Binds a trie view to `store`.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns the value stored at `key` under `root`, if any.
    pub fn get(&self, root: B256, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        let mut node = self.load_root(root)?;
        let path = Nibbles::unpack(key);
        let mut offset = 0;

        loop {
            match node {
                TrieNode::Empty => return Ok(None),
                TrieNode::Leaf { path: leaf_path, value } => {
                    return Ok((path.suffix(offset) == leaf_path).then_some(value));
                }
                TrieNode::Extension { path: ext_path, child } => {
                    let remaining = path.suffix(offset);
                    if remaining.len() < ext_path.len()
                        || remaining.prefix(ext_path.len()) != ext_path
                    {
                        return Ok(None);
                    }
                    offset += ext_path.len();
                    node = self.load_ref(&child, &[])?;
                }
                TrieNode::Branch { children, value } => {
                    if offset == path.len() {
                        return Ok(value);
                    }
                    let slot = &children[path.at(offset) as usize];
                    if slot.is_empty() {
                        return Ok(None);
                    }
                    node = self.load_ref(slot, &[])?;
                    offset += 1;
                }
            }
        }
    }

    /// Inserts or overwrites `key`, returning the new root hash. An empty
    /// `value` deletes the key.
    pub fn insert(&self, root: B256, key: &[u8], value: &[u8]) -> TrieResult<B256> {
        if value.is_empty() {
            return self.remove(root, key);
        }
        let mut batch = Vec::new();
        let node = self.load_root(root)?;
        let updated =
            self.insert_at(node, Nibbles::unpack(key), value.to_vec(), &mut batch)?;
        self.commit_root(updated, batch)
    }

    /// Deletes `key` if present, returning the new root hash.
    pub fn remove(&self, root: B256, key: &[u8]) -> TrieResult<B256> {
        let mut batch = Vec::new();
        let node = self.load_root(root)?;
        let updated = self.remove_at(node, Nibbles::unpack(key), &mut batch)?;
        self.commit_root(updated, batch)
    }

    /// Materializes the node behind `root`. The empty root loads as
    /// [TrieNode::Empty] without touching the store.
    fn load_root(&self, root: B256) -> TrieResult<TrieNode> {
        if root == EMPTY_ROOT {
            return Ok(TrieNode::Empty);
        }
        TrieNode::decode(&self.store.get_or_raise(&root)?)
    }

    /// Materializes the node behind a child reference. `pending` holds nodes
    /// committed earlier in the same operation that have not reached the
    /// store yet.
    fn load_ref(&self, node_ref: &NodeRef, pending: &[(B256, Vec<u8>)]) -> TrieResult<TrieNode> {
        match node_ref {
            NodeRef::Empty => Ok(TrieNode::Empty),
            NodeRef::Inline(rlp) => TrieNode::decode(rlp),
            NodeRef::Hash(hash) => {
                if let Some((_, rlp)) = pending.iter().rev().find(|(key, _)| key == hash) {
                    return TrieNode::decode(rlp);
                }
                TrieNode::decode(&self.store.get_or_raise(hash)?)
            }
        }
    }

    /// Encodes `node` into a child reference, queueing a store write when it
    /// does not fit inline.
    fn commit(&self, node: TrieNode, batch: &mut Vec<(B256, Vec<u8>)>) -> TrieResult<NodeRef> {
        if node == TrieNode::Empty {
            return Ok(NodeRef::Empty);
        }
        let (node_ref, persist) = NodeRef::from_encoded(node.encode()?);
        if let Some(entry) = persist {
            batch.push(entry);
        }
        Ok(node_ref)
    }

    /// Persists the root node unconditionally (the root is always addressed by
    /// hash) along with every queued interior node, and returns the root hash.
    fn commit_root(
        &self,
        node: TrieNode,
        mut batch: Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<B256> {
        if node == TrieNode::Empty {
            return Ok(EMPTY_ROOT);
        }
        let rlp = node.encode()?;
        let root = keccak256(&rlp);
        batch.push((root, rlp));
        self.store.batch_put(batch, BATCH_CHUNK)?;
        Ok(root)
    }

    fn insert_at(
        &self,
        node: TrieNode,
        path: Nibbles,
        value: Vec<u8>,
        batch: &mut Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<TrieNode> {
        match node {
            TrieNode::Empty => Ok(TrieNode::Leaf { path, value }),
            TrieNode::Leaf { path: leaf_path, value: leaf_value } => {
                if leaf_path == path {
                    return Ok(TrieNode::Leaf { path, value });
                }
                let common = leaf_path.common_prefix_len(&path);
                let branch = self.branch_of(
                    &[(leaf_path.suffix(common), leaf_value), (path.suffix(common), value)],
                    batch,
                )?;
                self.wrap_extension(path.prefix(common), branch, batch)
            }
            TrieNode::Extension { path: ext_path, child } => {
                let common = ext_path.common_prefix_len(&path);
                if common == ext_path.len() {
                    // Full prefix match: descend into the child.
                    let child_node = self.load_ref(&child, batch)?;
                    let updated =
                        self.insert_at(child_node, path.suffix(common), value, batch)?;
                    let child_ref = self.commit(updated, batch)?;
                    return Ok(TrieNode::Extension { path: ext_path, child: child_ref });
                }

                // Partial match: split into a branch at the divergence point.
                let mut branch = TrieNode::empty_branch();
                let TrieNode::Branch { children, value: branch_value } = &mut branch else {
                    unreachable!()
                };

                let ext_tail = ext_path.suffix(common);
                let slot = ext_tail.at(0) as usize;
                children[slot] = if ext_tail.len() == 1 {
                    child
                } else {
                    self.commit(
                        TrieNode::Extension { path: ext_tail.suffix(1), child },
                        batch,
                    )?
                };

                let new_tail = path.suffix(common);
                if new_tail.is_empty() {
                    *branch_value = Some(value);
                } else {
                    let leaf = TrieNode::Leaf { path: new_tail.suffix(1), value };
                    children[new_tail.at(0) as usize] = self.commit(leaf, batch)?;
                }

                self.wrap_extension(path.prefix(common), branch, batch)
            }
            TrieNode::Branch { mut children, value: branch_value } => {
                if path.is_empty() {
                    return Ok(TrieNode::Branch { children, value: Some(value) });
                }
                let slot = path.at(0) as usize;
                let child_node = self.load_ref(&children[slot], batch)?;
                let updated = self.insert_at(child_node, path.suffix(1), value, batch)?;
                children[slot] = self.commit(updated, batch)?;
                Ok(TrieNode::Branch { children, value: branch_value })
            }
        }
    }

    /// Builds a branch out of diverging tails. A tail that is empty lands in
    /// the branch's value slot; the rest become leaf children.
    fn branch_of(
        &self,
        tails: &[(Nibbles, Vec<u8>)],
        batch: &mut Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<TrieNode> {
        let mut branch = TrieNode::empty_branch();
        let TrieNode::Branch { children, value } = &mut branch else { unreachable!() };
        for (tail, tail_value) in tails {
            if tail.is_empty() {
                *value = Some(tail_value.clone());
            } else {
                let leaf =
                    TrieNode::Leaf { path: tail.suffix(1), value: tail_value.clone() };
                children[tail.at(0) as usize] = self.commit(leaf, batch)?;
            }
        }
        Ok(branch)
    }

    /// Wraps `node` in an extension over `prefix`, or returns it unchanged
    /// when the prefix is empty.
    fn wrap_extension(
        &self,
        prefix: Nibbles,
        node: TrieNode,
        batch: &mut Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<TrieNode> {
        if prefix.is_empty() {
            return Ok(node);
        }
        let child = self.commit(node, batch)?;
        Ok(TrieNode::Extension { path: prefix, child })
    }

    fn remove_at(
        &self,
        node: TrieNode,
        path: Nibbles,
        batch: &mut Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<TrieNode> {
        match node {
            TrieNode::Empty => Ok(TrieNode::Empty),
            TrieNode::Leaf { path: leaf_path, value } => {
                if leaf_path == path {
                    Ok(TrieNode::Empty)
                } else {
                    Ok(TrieNode::Leaf { path: leaf_path, value })
                }
            }
            TrieNode::Extension { path: ext_path, child } => {
                if path.len() < ext_path.len() || path.prefix(ext_path.len()) != ext_path {
                    return Ok(TrieNode::Extension { path: ext_path, child });
                }
                let child_node = self.load_ref(&child, batch)?;
                let updated =
                    self.remove_at(child_node, path.suffix(ext_path.len()), batch)?;

                // An extension may not point at a leaf, an extension, or
                // nothing; merge paths downward.
                match updated {
                    TrieNode::Empty => Ok(TrieNode::Empty),
                    TrieNode::Leaf { path: tail, value } => {
                        Ok(TrieNode::Leaf { path: ext_path.join(&tail), value })
                    }
                    TrieNode::Extension { path: tail, child } => {
                        Ok(TrieNode::Extension { path: ext_path.join(&tail), child })
                    }
                    branch => {
                        let child = self.commit(branch, batch)?;
                        Ok(TrieNode::Extension { path: ext_path, child })
                    }
                }
            }
            TrieNode::Branch { mut children, value } => {
                let (children, value) = if path.is_empty() {
                    (children, None)
                } else {
                    let slot = path.at(0) as usize;
                    if children[slot].is_empty() {
                        return Ok(TrieNode::Branch { children, value });
                    }
                    let child_node = self.load_ref(&children[slot], batch)?;
                    let updated = self.remove_at(child_node, path.suffix(1), batch)?;
                    children[slot] = self.commit(updated, batch)?;
                    (children, value)
                };
                self.collapse_branch(children, value, batch)
            }
        }
    }

    /// Re-normalizes a branch after a removal: zero occupants disappear, a
    /// lone value becomes a leaf, and a lone child merges upward.
    fn collapse_branch(
        &self,
        children: Box<[NodeRef; 16]>,
        value: Option<Vec<u8>>,
        batch: &mut Vec<(B256, Vec<u8>)>,
    ) -> TrieResult<TrieNode> {
        let occupied: Vec<usize> =
            (0..16).filter(|&slot| !children[slot].is_empty()).collect();

        match (occupied.len(), value) {
            (0, None) => Ok(TrieNode::Empty),
            (0, Some(value)) => Ok(TrieNode::Leaf { path: Nibbles::default(), value }),
            (1, None) => {
                let slot = occupied[0];
                let nibble = slot as u8;
                match self.load_ref(&children[slot], batch)? {
                    TrieNode::Leaf { path, value } => {
                        Ok(TrieNode::Leaf { path: path.prepend(nibble), value })
                    }
                    TrieNode::Extension { path, child } => {
                        Ok(TrieNode::Extension { path: path.prepend(nibble), child })
                    }
                    TrieNode::Branch { .. } => Ok(TrieNode::Extension {
                        path: Nibbles::from_nibbles([nibble]),
                        child: children[slot].clone(),
                    }),
                    TrieNode::Empty => unreachable!("occupied slot loads to a node"),
                }
            }
            (_, value) => Ok(TrieNode::Branch { children, value }),
        }
    }
}
