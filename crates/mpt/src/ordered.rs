//! Index-keyed tries for transaction and receipt lists.

use crate::{MemoryTrieStore, Trie, TrieResult, EMPTY_ROOT};
use alloy_primitives::B256;
use ember_rlp::{encode, Item};

/// Computes the root of the `rlp(index) -> value` trie over `items`, the
/// layout the header's `transactions_root` and `receipts_root` commit to.
/// Values must already be RLP-encoded.
pub fn ordered_trie_root(items: impl IntoIterator<Item = Vec<u8>>) -> TrieResult<B256> {
    let store = MemoryTrieStore::new();
    let trie = Trie::new(&store);
    let mut root = EMPTY_ROOT;
    for (index, value) in items.into_iter().enumerate() {
        let key = encode(&Item::from_u64(index as u64));
        root = trie.insert(root, &key, &value)?;
    }
    Ok(root)
}
