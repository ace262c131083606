//! Header/body pipelining from a peer into the blocktree.

use crate::{Blocktree, DriverError, DriverResult, SourceError};
use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use ember_executor::BlockExecutor;
use ember_mpt::TrieStore;
use ember_primitives::{Block, BlockBody, Header};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// The hard cap on headers requested per round trip.
pub const MAX_HEADERS_PER_REQUEST: usize = 192;

/// Chain data served by a peer. The network layer implements this over
/// eth/63 requests with its own timeouts; requests fail with
/// [SourceError::PeerGone] when the session closes underneath them.
#[async_trait]
pub trait BlockSource {
    /// Fetches up to `max` headers ascending from block number `start`.
    async fn request_headers(
        &self,
        start: u64,
        max: usize,
    ) -> Result<Vec<Header>, SourceError>;

    /// Fetches the bodies for `hashes`, in order.
    async fn request_bodies(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<BlockBody>, SourceError>;
}

/// Drives one peer's chain into the shared blocktree: batched header
/// download, body fetch for non-empty blocks, serial validation and
/// application. The tree lock is held only across individual reads and
/// inserts, never across network awaits, so RPC readers stay live.
#[derive(Debug)]
pub struct SyncDriver<'a, S: TrieStore + ?Sized> {
    tree: &'a RwLock<Blocktree>,
    executor: BlockExecutor<'a, S>,
}

impl<'a, S: TrieStore + ?Sized> SyncDriver<'a, S> {
    /// Binds the driver to the tree it extends and the executor that
    /// validates for it.
    pub fn new(tree: &'a RwLock<Blocktree>, executor: BlockExecutor<'a, S>) -> Self {
        Self { tree, executor }
    }

    fn best_number(&self) -> u64 {
        self.tree.read().expect("blocktree lock poisoned").best_number()
    }

    fn total_difficulty(&self) -> U256 {
        self.tree.read().expect("blocktree lock poisoned").total_difficulty()
    }

    /// Pulls the peer's chain until it is exhausted or stops beating our
    /// total difficulty. Returns the number of blocks applied.
    pub async fn sync_from<P: BlockSource + ?Sized>(
        &mut self,
        peer: &P,
        peer_total_difficulty: U256,
    ) -> DriverResult<usize> {
        if peer_total_difficulty <= self.total_difficulty() {
            debug!(target: "driver::sync", "peer offers no heavier chain");
            return Ok(0);
        }

        let mut applied = 0usize;
        let mut start = self.best_number() + 1;
        loop {
            let headers = peer.request_headers(start, MAX_HEADERS_PER_REQUEST).await?;
            let Some(first) = headers.first() else {
                break;
            };

            let parent_known = self
                .tree
                .read()
                .expect("blocktree lock poisoned")
                .contains(&first.parent_hash);
            if !parent_known {
                // The peer is on a fork below our tip: walk the request
                // window back toward the common ancestor.
                if start <= 1 {
                    return Err(DriverError::UnknownParent(first.parent_hash));
                }
                start = start.saturating_sub(MAX_HEADERS_PER_REQUEST as u64).max(1);
                continue;
            }

            let blocks = self.fetch_bodies(peer, headers).await?;
            let mut progressed = false;
            for block in blocks {
                if self.apply(block)? {
                    applied += 1;
                    progressed = true;
                }
            }
            if !progressed {
                // Everything served was already known; a further request
                // would loop on the same window.
                break;
            }
            start = self.best_number() + 1;
        }

        info!(
            target: "driver::sync",
            applied,
            best = self.best_number(),
            "sync round complete"
        );
        Ok(applied)
    }

    /// Pairs headers with bodies, skipping the fetch for headers that commit
    /// to empty bodies.
    async fn fetch_bodies<P: BlockSource + ?Sized>(
        &self,
        peer: &P,
        headers: Vec<Header>,
    ) -> DriverResult<Vec<Block>> {
        let wanted: Vec<B256> = headers
            .iter()
            .filter(|header| !Block::header_implies_empty_body(header))
            .map(Header::hash)
            .collect();
        let mut bodies = if wanted.is_empty() {
            Vec::new()
        } else {
            peer.request_bodies(wanted.clone()).await?
        };
        if bodies.len() != wanted.len() {
            return Err(DriverError::InconsistentData);
        }

        let mut blocks = Vec::with_capacity(headers.len());
        let mut next_body = 0usize;
        for header in headers {
            let block = if Block::header_implies_empty_body(&header) {
                Block { header, transactions: vec![], ommers: vec![] }
            } else {
                let body = std::mem::take(&mut bodies[next_body]);
                next_body += 1;
                Block::from_parts(header, body)
            };
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Validates one block against its parent and extends the tree. Returns
    /// `false` for blocks the tree already holds.
    fn apply(&mut self, block: Block) -> DriverResult<bool> {
        let parent = {
            let tree = self.tree.read().expect("blocktree lock poisoned");
            if tree.contains(&block.hash()) {
                return Ok(false);
            }
            tree.header(&block.header.parent_hash)
                .ok_or(DriverError::UnknownParent(block.header.parent_hash))?
                .clone()
        };

        if let Err(err) = self.executor.execute_block(&block, &parent) {
            warn!(
                target: "driver::sync",
                number = block.header.number,
                %err,
                "rejecting block"
            );
            return Err(err.into());
        }
        self.tree.write().expect("blocktree lock poisoned").insert(block)?;
        Ok(true)
    }
}
