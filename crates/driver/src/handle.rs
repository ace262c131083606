//! The query surface the node exposes to its RPC collaborator.

use crate::Blocktree;
use alloy_primitives::U256;
use ember_executor::{BlockExecutor, CallRequest, ExecutorResult, NoopSeal};
use ember_evm::Execution;
use ember_genesis::ChainSpec;
use ember_mpt::TrieStore;
use ember_primitives::Block;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, RwLock,
};

/// A cloneable handle over the running node's shared state. This is the
/// contract the JSON-RPC server consumes: `eth_blockNumber`,
/// `eth_getBlockByNumber`, `eth_syncing`, `eth_call`, `eth_estimateGas`,
/// and `net_peerCount` all resolve through here.
#[derive(Debug)]
pub struct NodeHandle<S: TrieStore + ?Sized> {
    spec: Arc<ChainSpec>,
    store: Arc<S>,
    tree: Arc<RwLock<Blocktree>>,
    peer_count: Arc<AtomicUsize>,
    syncing: Arc<AtomicBool>,
}

impl<S: TrieStore + ?Sized> Clone for NodeHandle<S> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            store: self.store.clone(),
            tree: self.tree.clone(),
            peer_count: self.peer_count.clone(),
            syncing: self.syncing.clone(),
        }
    }
}

impl<S: TrieStore + ?Sized> NodeHandle<S> {
    /// Wraps the node's shared surfaces.
    pub fn new(
        spec: Arc<ChainSpec>,
        store: Arc<S>,
        tree: Arc<RwLock<Blocktree>>,
        peer_count: Arc<AtomicUsize>,
        syncing: Arc<AtomicBool>,
    ) -> Self {
        Self { spec, store, tree, peer_count, syncing }
    }

    /// The chain this node follows.
    pub fn chain_spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// The canonical tip height.
    pub fn best_block_number(&self) -> u64 {
        self.tree.read().expect("blocktree lock poisoned").best_number()
    }

    /// The canonical tip's total difficulty.
    pub fn total_difficulty(&self) -> U256 {
        self.tree.read().expect("blocktree lock poisoned").total_difficulty()
    }

    /// The canonical block at `number`, if the chain is that long.
    pub fn block_by_number(&self, number: u64) -> Option<Block> {
        self.tree
            .read()
            .expect("blocktree lock poisoned")
            .canonical_block(number)
            .cloned()
    }

    /// True while a sync round is pulling blocks.
    pub fn syncing(&self) -> bool {
        self.syncing.load(Ordering::Relaxed)
    }

    /// The number of live peer sessions.
    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::Relaxed)
    }

    /// Executes `request` read-only against the canonical tip state.
    pub fn call(&self, request: &CallRequest) -> ExecutorResult<Execution> {
        let (state_root, header) = {
            let tree = self.tree.read().expect("blocktree lock poisoned");
            let header = tree.best_block().header.clone();
            (header.state_root, header)
        };
        BlockExecutor::new(&self.spec, self.store.as_ref(), &NoopSeal)
            .call(state_root, &header, request)
    }

    /// Estimates the gas `request` would consume at the canonical tip.
    pub fn estimate_gas(&self, request: &CallRequest) -> ExecutorResult<u64> {
        let header = {
            let tree = self.tree.read().expect("blocktree lock poisoned");
            tree.best_block().header.clone()
        };
        BlockExecutor::new(&self.spec, self.store.as_ref(), &NoopSeal)
            .estimate_gas(header.state_root, &header, request)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ember_mpt::MemoryTrieStore;

    fn handle() -> NodeHandle<MemoryTrieStore> {
        let mut spec = ChainSpec::ropsten();
        spec.genesis.state_root = ember_mpt::EMPTY_ROOT;
        let genesis = Block {
            header: spec.genesis_header(),
            transactions: vec![],
            ommers: vec![],
        };
        NodeHandle::new(
            Arc::new(spec),
            Arc::new(MemoryTrieStore::new()),
            Arc::new(RwLock::new(Blocktree::new(genesis))),
            Arc::new(AtomicUsize::new(2)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_queries() {
        let handle = handle();
        assert_eq!(handle.best_block_number(), 0);
        assert_eq!(handle.peer_count(), 2);
        assert!(!handle.syncing());
        assert!(handle.block_by_number(0).is_some());
        assert!(handle.block_by_number(5).is_none());
    }

    #[test]
    fn test_estimate_through_handle() {
        let handle = handle();
        let request = CallRequest {
            to: Some(alloy_primitives::Address::repeat_byte(0xEE)),
            ..Default::default()
        };
        assert_eq!(handle.estimate_gas(&request).unwrap(), 21_000);
    }
}
