//! The block processor: header validation, transaction application, rewards,
//! and root reconciliation.

use crate::{
    calc_difficulty, ExecutorResult, SealVerifier, StateDb, ValidationError,
};
use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use ember_evm::{
    create_address, gas::intrinsic_gas, BlockEnv, CallKind, Evm, Execution, Host, Message,
};
use ember_genesis::{ChainSpec, Fork};
use ember_mpt::{ordered_trie_root, TrieStore};
use ember_primitives::{
    logs_bloom, Block, Header, Receipt, ReceiptOutcome, Transaction,
};
use ember_rlp::Encodable;
use tracing::{debug, info};

/// The gas-limit floor every block must respect.
const MIN_GAS_LIMIT: u64 = 5000;

/// The divisor of the gas-limit adjustment band.
const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// The deepest generation an ommer may come from.
const MAX_OMMER_DEPTH: u64 = 7;

/// At most this many ommers per block.
const MAX_OMMER_COUNT: usize = 2;

/// The result of executing a block against its parent state.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    /// The post-state root, equal to the header's.
    pub state_root: B256,
    /// One receipt per transaction.
    pub receipts: Vec<Receipt>,
    /// Total gas consumed.
    pub gas_used: u64,
    /// The union of every receipt's bloom.
    pub logs_bloom: Bloom,
}

/// A read-only execution request, the `eth_call`/`eth_estimateGas` contract.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    /// The apparent sender; zero when unspecified.
    pub from: Option<Address>,
    /// The callee, or `None` to simulate a creation.
    pub to: Option<Address>,
    /// Gas allowance; the block gas limit when unspecified.
    pub gas: Option<u64>,
    /// Gas price; zero when unspecified.
    pub gas_price: Option<U256>,
    /// Value to transfer.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
}

/// Applies blocks to state under a chain specification. Stateless itself:
/// every call names the parent state explicitly.
pub struct BlockExecutor<'a, S: TrieStore + ?Sized> {
    spec: &'a ChainSpec,
    store: &'a S,
    seal: &'a dyn SealVerifier,
}

impl<S: TrieStore + ?Sized> core::fmt::Debug for BlockExecutor<'_, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockExecutor").field("chain", &self.spec.name).finish_non_exhaustive()
    }
}

impl<'a, S: TrieStore + ?Sized> BlockExecutor<'a, S> {
    /// Binds a processor to its chain and store.
    pub fn new(spec: &'a ChainSpec, store: &'a S, seal: &'a dyn SealVerifier) -> Self {
        Self { spec, store, seal }
    }

    /// Validates every header rule against the parent: numbering, timestamp
    /// ordering, extra-data bound, the gas-limit band, the difficulty
    /// formula, and the proof-of-work seal.
    pub fn validate_header(
        &self,
        header: &Header,
        parent: &Header,
    ) -> Result<(), ValidationError> {
        if header.number != parent.number + 1 {
            return Err(ValidationError::NonSequentialNumber {
                number: header.number,
                parent: parent.number,
            });
        }
        if header.timestamp <= parent.timestamp {
            return Err(ValidationError::TimestampNotAfterParent {
                timestamp: header.timestamp,
                parent: parent.timestamp,
            });
        }
        if header.extra_data.len() > 32 {
            return Err(ValidationError::ExtraDataTooLong(header.extra_data.len()));
        }

        let band = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        let delta = header.gas_limit.abs_diff(parent.gas_limit);
        if delta >= band || header.gas_limit < MIN_GAS_LIMIT {
            return Err(ValidationError::GasLimitOutOfBounds {
                limit: header.gas_limit,
                parent: parent.gas_limit,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(ValidationError::GasUsedExceedsLimit {
                used: header.gas_used,
                limit: header.gas_limit,
            });
        }

        let expected =
            calc_difficulty(self.spec, parent, header.number, header.timestamp);
        if header.difficulty != expected {
            return Err(ValidationError::WrongDifficulty {
                expected,
                got: header.difficulty,
            });
        }

        self.seal.verify(header)
    }

    /// Structural ommer checks: the count bound, the committed hash, and the
    /// depth window. Lineage against the canonical chain is the blocktree's
    /// concern.
    fn validate_ommers(&self, block: &Block) -> Result<(), ValidationError> {
        if block.ommers.len() > MAX_OMMER_COUNT {
            return Err(ValidationError::InvalidOmmers);
        }
        if block.ommers_hash() != block.header.ommers_hash {
            return Err(ValidationError::WrongOmmersHash);
        }
        for ommer in &block.ommers {
            let depth = block.header.number.saturating_sub(ommer.number);
            if depth == 0 || depth > MAX_OMMER_DEPTH {
                return Err(ValidationError::InvalidOmmers);
            }
        }
        Ok(())
    }

    /// Executes `block` on top of `parent`, enforcing every consensus check.
    /// On any failure the canonical state is untouched: previously committed
    /// roots stay live and the overlay is discarded.
    pub fn execute_block(
        &self,
        block: &Block,
        parent: &Header,
    ) -> ExecutorResult<BlockOutcome> {
        let header = &block.header;
        self.validate_header(header, parent)?;
        self.validate_ommers(block)?;

        let transactions_root = ordered_trie_root(
            block.transactions.iter().map(Encodable::rlp_bytes),
        )?;
        if transactions_root != header.transactions_root {
            return Err(ValidationError::WrongTransactionsRoot.into());
        }

        info!(
            target: "executor",
            number = header.number,
            txs = block.transactions.len(),
            "executing block"
        );

        let fork = self.spec.fork_at(header.number);
        let env = block_env(self.spec, header);
        let mut state = StateDb::new(self.store, parent.state_root);
        state.insert_block_hash(parent.number, parent.hash());

        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut cumulative_gas = 0u64;
        for (index, tx) in block.transactions.iter().enumerate() {
            let receipt =
                self.apply_transaction(&mut state, &env, fork, tx, cumulative_gas)?;
            debug!(
                target: "executor",
                index,
                cumulative = receipt.cumulative_gas_used,
                "transaction applied"
            );
            cumulative_gas = receipt.cumulative_gas_used;
            receipts.push(receipt);
        }

        if cumulative_gas != header.gas_used {
            return Err(ValidationError::WrongGasUsed {
                header: header.gas_used,
                computed: cumulative_gas,
            }
            .into());
        }

        let receipts_root =
            ordered_trie_root(receipts.iter().map(Encodable::rlp_bytes))?;
        if receipts_root != header.receipts_root {
            return Err(ValidationError::WrongReceiptsRoot.into());
        }

        let bloom = receipts
            .iter()
            .fold(Bloom::ZERO, |union, receipt| union | receipt.logs_bloom);
        if bloom != header.logs_bloom {
            return Err(ValidationError::WrongLogsBloom.into());
        }

        self.apply_rewards(&mut state, block, fork);
        let state_root = state.commit(fork)?;
        if state_root != header.state_root {
            return Err(ValidationError::WrongStateRoot {
                expected: header.state_root,
                computed: state_root,
            }
            .into());
        }

        Ok(BlockOutcome { state_root, receipts, gas_used: cumulative_gas, logs_bloom: bloom })
    }

    /// Applies one transaction: the five-step sequence of signature and
    /// balance checks, the up-front gas purchase, machine execution, the
    /// refund split, and receipt assembly.
    pub fn apply_transaction(
        &self,
        state: &mut StateDb<'_, S>,
        env: &BlockEnv,
        fork: Fork,
        tx: &Transaction,
        cumulative_gas: u64,
    ) -> ExecutorResult<Receipt> {
        if let Some(chain_id) = tx.chain_id() {
            if !fork.at_least(Fork::SpuriousDragon) || chain_id != self.spec.chain_id {
                return Err(ValidationError::WrongChainId {
                    expected: self.spec.chain_id,
                    got: chain_id,
                }
                .into());
            }
        }
        let sender = tx.recover_sender().map_err(ValidationError::from)?;

        let account_nonce = state.nonce(sender);
        if account_nonce != tx.nonce {
            return Err(ValidationError::WrongNonce {
                expected: account_nonce,
                got: tx.nonce,
            }
            .into());
        }

        let gas_cost = U256::from(tx.gas_limit) * tx.gas_price;
        let required = gas_cost + tx.value;
        let balance = state.balance(sender);
        if balance < required {
            return Err(ValidationError::InsufficientBalance { balance, required }.into());
        }

        let intrinsic = intrinsic_gas(&tx.data, tx.is_create(), fork);
        if intrinsic > tx.gas_limit {
            return Err(ValidationError::IntrinsicGasExceedsLimit {
                intrinsic,
                limit: tx.gas_limit,
            }
            .into());
        }
        if cumulative_gas + tx.gas_limit > env.gas_limit {
            return Err(ValidationError::BlockGasExceeded.into());
        }

        // Buy the gas and take the nonce before any code runs.
        state.begin_transaction();
        state.sub_balance(sender, gas_cost);
        state.increment_nonce(sender);

        let message = match tx.to {
            Some(to) => Message {
                kind: CallKind::Call,
                address: to,
                code_address: to,
                caller: sender,
                origin: sender,
                gas: tx.gas_limit - intrinsic,
                gas_price: tx.gas_price,
                value: tx.value,
                input: tx.data.clone(),
                code: state.code(to),
                depth: 0,
                is_static: false,
            },
            None => {
                let contract = create_address(sender, tx.nonce);
                Message {
                    kind: CallKind::Create,
                    address: contract,
                    code_address: contract,
                    caller: sender,
                    origin: sender,
                    gas: tx.gas_limit - intrinsic,
                    gas_price: tx.gas_price,
                    value: tx.value,
                    input: Bytes::new(),
                    code: tx.data.clone(),
                    depth: 0,
                    is_static: false,
                }
            }
        };

        let execution = Evm::new(state, env, fork).execute(message);

        let mut gas_used = tx.gas_limit - execution.gas_left;
        let refund = (gas_used / 2).min(state.take_refund());
        gas_used -= refund;

        // Return the unused purchase, pay the beneficiary.
        state.add_balance(sender, U256::from(tx.gas_limit - gas_used) * tx.gas_price);
        state.add_balance(env.beneficiary, U256::from(gas_used) * tx.gas_price);

        let logs = state.take_logs();
        let outcome = if fork.at_least(Fork::Byzantium) {
            ReceiptOutcome::Status(execution.status.is_success())
        } else {
            ReceiptOutcome::StateRoot(state.commit(fork)?)
        };

        Ok(Receipt::new(outcome, cumulative_gas + gas_used, logs))
    }

    /// Pays the static block reward, the per-ommer inclusion bonus, and each
    /// ommer's depth-scaled award.
    fn apply_rewards(&self, state: &mut StateDb<'_, S>, block: &Block, fork: Fork) {
        let reward = self.spec.block_reward(fork);
        let inclusion =
            reward / U256::from(32u64) * U256::from(block.ommers.len() as u64);
        state.add_balance(block.header.beneficiary, reward + inclusion);

        for ommer in &block.ommers {
            let depth = block.header.number - ommer.number;
            let award = U256::from(8 - depth) * reward / U256::from(8u64);
            state.add_balance(ommer.beneficiary, award);
        }
    }

    /// Read-only execution against an arbitrary state root, the node-side
    /// contract behind `eth_call`. Nothing is committed.
    pub fn call(
        &self,
        state_root: B256,
        header: &Header,
        request: &CallRequest,
    ) -> ExecutorResult<Execution> {
        let fork = self.spec.fork_at(header.number);
        let env = block_env(self.spec, header);
        let mut state = StateDb::new(self.store, state_root);

        let from = request.from.unwrap_or_default();
        let gas = request.gas.unwrap_or(header.gas_limit);
        let intrinsic = intrinsic_gas(&request.data, request.to.is_none(), fork);
        if intrinsic > gas {
            return Err(ValidationError::IntrinsicGasExceedsLimit {
                intrinsic,
                limit: gas,
            }
            .into());
        }

        let message = match request.to {
            Some(to) => Message {
                kind: CallKind::Call,
                address: to,
                code_address: to,
                caller: from,
                origin: from,
                gas: gas - intrinsic,
                gas_price: request.gas_price.unwrap_or_default(),
                value: request.value,
                input: request.data.clone(),
                code: state.code(to),
                depth: 0,
                is_static: false,
            },
            None => {
                let contract = create_address(from, state.nonce(from));
                Message {
                    kind: CallKind::Create,
                    address: contract,
                    code_address: contract,
                    caller: from,
                    origin: from,
                    gas: gas - intrinsic,
                    gas_price: request.gas_price.unwrap_or_default(),
                    value: request.value,
                    input: Bytes::new(),
                    code: request.data.clone(),
                    depth: 0,
                    is_static: false,
                }
            }
        };

        Ok(Evm::new(&mut state, &env, fork).execute(message))
    }

    /// The gas a transaction shaped like `request` would consume, the
    /// node-side contract behind `eth_estimateGas`. Refund effects are not
    /// modeled, matching common client behavior.
    pub fn estimate_gas(
        &self,
        state_root: B256,
        header: &Header,
        request: &CallRequest,
    ) -> ExecutorResult<u64> {
        let fork = self.spec.fork_at(header.number);
        let intrinsic = intrinsic_gas(&request.data, request.to.is_none(), fork);
        let gas = request.gas.unwrap_or(header.gas_limit);
        let execution = self.call(state_root, header, request)?;
        Ok(intrinsic + (gas - intrinsic - execution.gas_left))
    }
}

/// The machine-visible block context for `header`.
pub fn block_env(spec: &ChainSpec, header: &Header) -> BlockEnv {
    BlockEnv {
        beneficiary: header.beneficiary,
        number: header.number,
        timestamp: header.timestamp,
        difficulty: header.difficulty,
        gas_limit: header.gas_limit,
        chain_id: spec.chain_id,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ExecutorError, NoopSeal};
    use alloy_primitives::Address;
    use ember_mpt::{MemoryTrieStore, EMPTY_ROOT};
    use ember_primitives::Account;
    use k256::ecdsa::SigningKey;

    const ETHER: u64 = 1_000_000_000_000_000_000;

    fn signer() -> SigningKey {
        SigningKey::from_slice(&[0x11u8; 32]).unwrap()
    }

    fn signer_address() -> Address {
        let point = signer().verifying_key().to_encoded_point(false);
        Address::from_slice(&alloy_primitives::keccak256(&point.as_bytes()[1..])[12..])
    }

    /// A ropsten-ruled chain whose genesis state holds one funded account.
    fn test_chain(store: &MemoryTrieStore) -> (ChainSpec, Header, Address) {
        let alice = signer_address();
        let mut state = StateDb::new(store, EMPTY_ROOT);
        state.put_account(alice, Account::with_balance(U256::from(ETHER)));
        let root = state.commit(Fork::Frontier).unwrap();

        let mut spec = ChainSpec::ropsten();
        spec.genesis.state_root = root;
        let genesis = spec.genesis_header();
        (spec, genesis, alice)
    }

    fn transfer_tx(to: Address, value: u64, nonce: u64, gas_limit: u64) -> Transaction {
        let mut tx = Transaction {
            nonce,
            gas_price: U256::from(1),
            gas_limit,
            to: Some(to),
            value: U256::from(value),
            data: Bytes::new(),
            v: 0,
            r: U256::ZERO,
            s: U256::ZERO,
        };
        // Block one predates Spurious Dragon on this chain, so sign legacy.
        tx.sign(&signer(), None).unwrap();
        tx
    }

    #[test]
    fn test_transfer_block_replays_to_identical_roots() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, alice) = test_chain(&store);
        let bob = Address::repeat_byte(0xB0);
        let miner = Address::repeat_byte(0x33);
        let fork = spec.fork_at(1);

        let tx = transfer_tx(bob, 100, 0, 21_000);

        // Reproduce the expected state by hand: fees, value, nonce, reward.
        let mut mirror = StateDb::new(&store, genesis.state_root);
        mirror.sub_balance(alice, U256::from(21_000 + 100));
        mirror.increment_nonce(alice);
        mirror.add_balance(bob, U256::from(100));
        mirror.add_balance(miner, U256::from(21_000));
        let post_tx_root = mirror.commit(fork).unwrap();
        let receipt = Receipt::new(ReceiptOutcome::StateRoot(post_tx_root), 21_000, vec![]);
        mirror.add_balance(miner, spec.block_reward(fork));
        let final_root = mirror.commit(fork).unwrap();

        let header = Header {
            parent_hash: genesis.hash(),
            beneficiary: miner,
            state_root: final_root,
            transactions_root: ordered_trie_root([tx.rlp_bytes()]).unwrap(),
            receipts_root: ordered_trie_root([receipt.rlp_bytes()]).unwrap(),
            difficulty: calc_difficulty(&spec, &genesis, 1, 10),
            number: 1,
            gas_limit: genesis.gas_limit,
            gas_used: 21_000,
            timestamp: 10,
            ..Default::default()
        };
        let block = Block { header, transactions: vec![tx], ommers: vec![] };

        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);
        let outcome = executor.execute_block(&block, &genesis).unwrap();
        assert_eq!(outcome.state_root, final_root);
        assert_eq!(outcome.gas_used, 21_000);
        assert_eq!(outcome.receipts.len(), 1);
        assert_eq!(outcome.logs_bloom, Bloom::ZERO);

        // Determinism: a second replay reproduces everything bit for bit.
        let again = executor.execute_block(&block, &genesis).unwrap();
        assert_eq!(again.state_root, outcome.state_root);
    }

    #[test]
    fn test_tampered_state_root_rejected() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, _) = test_chain(&store);
        let miner = Address::repeat_byte(0x33);

        let mut header = Header {
            parent_hash: genesis.hash(),
            beneficiary: miner,
            state_root: alloy_primitives::keccak256(b"not the root"),
            difficulty: calc_difficulty(&spec, &genesis, 1, 10),
            number: 1,
            gas_limit: genesis.gas_limit,
            gas_used: 0,
            timestamp: 10,
            ..Default::default()
        };
        header.transactions_root = ember_primitives::EMPTY_ROOT_HASH;
        header.receipts_root = ember_primitives::EMPTY_ROOT_HASH;
        let block = Block { header, transactions: vec![], ommers: vec![] };

        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);
        assert!(matches!(
            executor.execute_block(&block, &genesis),
            Err(ExecutorError::Validation(ValidationError::WrongStateRoot { .. }))
        ));
    }

    #[test]
    fn test_gas_limit_band_boundaries() {
        let store = MemoryTrieStore::new();
        let (spec, _, _) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);

        let parent = Header {
            number: 10,
            timestamp: 100,
            gas_limit: 1_024_000,
            difficulty: U256::from(131_072u64),
            ..Default::default()
        };
        let band = parent.gas_limit / 1024;

        let mut child = Header {
            number: 11,
            timestamp: 110,
            difficulty: calc_difficulty(&spec, &parent, 11, 110),
            ..Default::default()
        };

        // One inside the band is accepted, the band edge itself is not.
        child.gas_limit = parent.gas_limit + band - 1;
        assert!(executor.validate_header(&child, &parent).is_ok());
        child.gas_limit = parent.gas_limit - (band - 1);
        assert!(executor.validate_header(&child, &parent).is_ok());
        child.gas_limit = parent.gas_limit + band;
        assert!(matches!(
            executor.validate_header(&child, &parent),
            Err(ValidationError::GasLimitOutOfBounds { .. })
        ));
        child.gas_limit = parent.gas_limit - band;
        assert!(executor.validate_header(&child, &parent).is_err());

        // The floor binds regardless of the band.
        let low_parent = Header { number: 10, timestamp: 100, gas_limit: 5001, ..parent.clone() };
        let mut low_child = child.clone();
        low_child.difficulty = calc_difficulty(&spec, &low_parent, 11, 110);
        low_child.gas_limit = 4999;
        assert!(executor.validate_header(&low_child, &low_parent).is_err());
    }

    #[test]
    fn test_header_ordering_rules() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, _) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);

        let good = Header {
            number: 1,
            timestamp: 10,
            gas_limit: genesis.gas_limit,
            difficulty: calc_difficulty(&spec, &genesis, 1, 10),
            ..Default::default()
        };
        assert!(executor.validate_header(&good, &genesis).is_ok());

        let skipped = Header { number: 2, ..good.clone() };
        assert!(matches!(
            executor.validate_header(&skipped, &genesis),
            Err(ValidationError::NonSequentialNumber { .. })
        ));

        let stale = Header { timestamp: 0, ..good.clone() };
        assert!(matches!(
            executor.validate_header(&stale, &genesis),
            Err(ValidationError::TimestampNotAfterParent { .. })
        ));

        let verbose = Header { extra_data: vec![0u8; 33].into(), ..good.clone() };
        assert!(matches!(
            executor.validate_header(&verbose, &genesis),
            Err(ValidationError::ExtraDataTooLong(33))
        ));

        let wrong_difficulty = Header { difficulty: U256::from(1u64), ..good };
        assert!(matches!(
            executor.validate_header(&wrong_difficulty, &genesis),
            Err(ValidationError::WrongDifficulty { .. })
        ));
    }

    #[test]
    fn test_transaction_preconditions() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, _) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);
        let env = block_env(&spec, &genesis);
        let fork = spec.fork_at(1);
        let bob = Address::repeat_byte(0xB0);

        // A nonce from the future.
        let mut state = StateDb::new(&store, genesis.state_root);
        let tx = transfer_tx(bob, 100, 5, 21_000);
        assert!(matches!(
            executor.apply_transaction(&mut state, &env, fork, &tx, 0),
            Err(ExecutorError::Validation(ValidationError::WrongNonce { expected: 0, got: 5 }))
        ));

        // Value plus gas exceeding the balance is rejected before execution.
        let mut state = StateDb::new(&store, genesis.state_root);
        let tx = transfer_tx(bob, ETHER, 0, 21_000);
        assert!(matches!(
            executor.apply_transaction(&mut state, &env, fork, &tx, 0),
            Err(ExecutorError::Validation(ValidationError::InsufficientBalance { .. }))
        ));

        // A gas limit under the intrinsic cost.
        let mut state = StateDb::new(&store, genesis.state_root);
        let tx = transfer_tx(bob, 100, 0, 20_999);
        assert!(matches!(
            executor.apply_transaction(&mut state, &env, fork, &tx, 0),
            Err(ExecutorError::Validation(
                ValidationError::IntrinsicGasExceedsLimit { intrinsic: 21_000, limit: 20_999 }
            ))
        ));

        // A transaction that does not fit the block's remaining gas.
        let mut state = StateDb::new(&store, genesis.state_root);
        let tx = transfer_tx(bob, 100, 0, 21_000);
        let nearly_full = env.gas_limit - 20_999;
        assert!(matches!(
            executor.apply_transaction(&mut state, &env, fork, &tx, nearly_full),
            Err(ExecutorError::Validation(ValidationError::BlockGasExceeded))
        ));
    }

    #[test]
    fn test_contract_creation_transaction() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, alice) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);
        let env = block_env(&spec, &genesis);

        // Init code that deploys a lone STOP byte.
        let init: Vec<u8> = vec![
            0x60, 0x01, 0x60, 0x0C, 0x60, 0x00, 0x39, 0x60, 0x01, 0x60, 0x00, 0xF3, 0x00,
        ];
        let mut tx = Transaction {
            nonce: 0,
            gas_price: U256::from(1),
            gas_limit: 120_000,
            to: None,
            value: U256::ZERO,
            data: init.into(),
            v: 0,
            r: U256::ZERO,
            s: U256::ZERO,
        };
        tx.sign(&signer(), None).unwrap();

        let mut state = StateDb::new(&store, genesis.state_root);
        let receipt = executor
            .apply_transaction(&mut state, &env, Fork::Byzantium, &tx, 0)
            .unwrap();
        assert!(receipt.outcome.is_success());

        let contract = create_address(alice, 0);
        assert_eq!(state.code(contract).as_ref(), &[0x00][..]);
        assert_eq!(state.nonce(contract), 1);
        assert_eq!(state.nonce(alice), 1);
    }

    #[test]
    fn test_estimate_gas_simple_transfer() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, alice) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);

        let request = CallRequest {
            from: Some(alice),
            to: Some(Address::repeat_byte(0xB0)),
            value: U256::from(1),
            ..Default::default()
        };
        let estimate =
            executor.estimate_gas(genesis.state_root, &genesis, &request).unwrap();
        assert_eq!(estimate, 21_000);
    }

    #[test]
    fn test_call_is_read_only() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, alice) = test_chain(&store);
        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);

        let request = CallRequest {
            from: Some(alice),
            to: Some(Address::repeat_byte(0xB0)),
            value: U256::from(500),
            ..Default::default()
        };
        let execution = executor.call(genesis.state_root, &genesis, &request).unwrap();
        assert!(execution.status.is_success());

        // Nothing was committed: the recipient still reads as absent.
        let mut state = StateDb::new(&store, genesis.state_root);
        assert!(!state.account_exists(Address::repeat_byte(0xB0)));
    }

    #[test]
    fn test_ommer_rewards() {
        let store = MemoryTrieStore::new();
        let (spec, genesis, _) = test_chain(&store);
        let fork = spec.fork_at(1);
        let miner = Address::repeat_byte(0x33);
        let ommer_miner = Address::repeat_byte(0x44);

        let ommer = Header { number: 7, beneficiary: ommer_miner, ..Default::default() };
        let block = Block {
            header: Header { number: 8, beneficiary: miner, ..Default::default() },
            transactions: vec![],
            ommers: vec![ommer],
        };

        let executor = BlockExecutor::new(&spec, &store, &NoopSeal);
        let mut state = StateDb::new(&store, genesis.state_root);
        executor.apply_rewards(&mut state, &block, fork);

        let reward = spec.block_reward(fork);
        assert_eq!(state.balance(miner), reward + reward / U256::from(32u64));
        // Depth one: seven eighths of the static reward.
        assert_eq!(
            state.balance(ommer_miner),
            U256::from(7u64) * reward / U256::from(8u64)
        );
    }
}
