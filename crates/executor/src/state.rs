//! The journaled world state bridging the trie and the machine.

use crate::ExecutorResult;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use ember_evm::Host;
use ember_genesis::Fork;
use ember_mpt::{Trie, TrieResult, TrieStore};
use ember_primitives::{Account, Log, EMPTY_CODE_HASH};
use ember_rlp::{Decodable, Encodable, Item};
use std::collections::{HashMap, HashSet};

/// The transaction-scoped mutable caches. Snapshots clone this whole block;
/// the trie underneath is immutable between commits, so rollback is a cache
/// restore, mirroring the content-addressed design of the store.
#[derive(Debug, Clone, Default)]
struct CacheState {
    /// Loaded or modified accounts; `None` records a known-absent account.
    accounts: HashMap<Address, Option<Account>>,
    /// Current storage values overlaying the storage tries.
    storage: HashMap<(Address, U256), U256>,
    /// Code pending installation, by account.
    pending_code: HashMap<Address, Bytes>,
    /// Logs emitted so far in the current transaction.
    logs: Vec<Log>,
    /// Accounts scheduled for destruction.
    selfdestructs: HashSet<Address>,
    /// Accounts touched, for EIP-161 clearing.
    touched: HashSet<Address>,
    /// The refund counter.
    refund: u64,
}

/// World state at a root, overlaid with journaled modifications, exposed to
/// the machine through [Host].
#[derive(Debug)]
pub struct StateDb<'a, S: TrieStore + ?Sized> {
    store: &'a S,
    /// The committed state root the overlay reads through to.
    root: B256,
    cache: CacheState,
    /// Storage values as of the start of the transaction.
    original_storage: HashMap<(Address, U256), U256>,
    /// Committed storage roots, refreshed per commit.
    storage_roots: HashMap<Address, B256>,
    /// Ancestor hashes served to BLOCKHASH.
    block_hashes: HashMap<u64, B256>,
    snapshots: Vec<CacheState>,
}

impl<'a, S: TrieStore + ?Sized> StateDb<'a, S> {
    /// Opens the state at `root`.
    pub fn new(store: &'a S, root: B256) -> Self {
        Self {
            store,
            root,
            cache: CacheState::default(),
            original_storage: HashMap::new(),
            storage_roots: HashMap::new(),
            block_hashes: HashMap::new(),
            snapshots: Vec::new(),
        }
    }

    /// The root of the last committed state.
    pub const fn root(&self) -> B256 {
        self.root
    }

    /// Registers an ancestor hash for BLOCKHASH.
    pub fn insert_block_hash(&mut self, number: u64, hash: B256) {
        self.block_hashes.insert(number, hash);
    }

    /// Reads an account through the overlay.
    pub fn account(&mut self, address: Address) -> Option<Account> {
        if let Some(cached) = self.cache.accounts.get(&address) {
            return cached.clone();
        }
        let loaded = self.load_account(address).unwrap_or_default();
        self.cache.accounts.insert(address, loaded.clone());
        loaded
    }

    fn load_account(&self, address: Address) -> TrieResult<Option<Account>> {
        let trie = Trie::new(self.store);
        let Some(rlp) = trie.get(self.root, keccak256(address).as_slice())? else {
            return Ok(None);
        };
        Ok(Some(Account::decode_bytes(&rlp)?))
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        let current = self.account(address);
        self.cache
            .accounts
            .entry(address)
            .or_insert(current)
            .get_or_insert_with(Account::default)
    }

    /// Creates or overwrites an account record directly (genesis allocation
    /// and tests).
    pub fn put_account(&mut self, address: Address, account: Account) {
        self.cache.accounts.insert(address, Some(account));
    }

    /// Debits `amount` unconditionally. The caller has already validated the
    /// balance (the up-front gas purchase).
    pub fn sub_balance(&mut self, address: Address, amount: U256) {
        let account = self.account_mut(address);
        account.balance = account.balance.saturating_sub(amount);
        self.cache.touched.insert(address);
    }

    /// Opens a transaction boundary: the original-value anchor of net gas
    /// metering re-bases onto the current overlay here, not at commit, since
    /// post-Byzantium blocks commit once at the end.
    pub fn begin_transaction(&mut self) {
        self.original_storage = self.cache.storage.clone();
    }

    /// Drains the logs accumulated since the last drain.
    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.cache.logs)
    }

    /// Reads and clears the refund counter.
    pub fn take_refund(&mut self) -> u64 {
        std::mem::take(&mut self.cache.refund)
    }

    /// Folds every journaled change into the tries and returns the new state
    /// root. Destroyed accounts, and (post-Spurious) touched-empty accounts,
    /// leave the trie. Transaction-scoped caches reset.
    pub fn commit(&mut self, fork: Fork) -> ExecutorResult<B256> {
        let trie = Trie::new(self.store);
        let mut root = self.root;

        // Fold storage writes into each account's storage trie.
        let mut storage_by_account: HashMap<Address, Vec<(U256, U256)>> = HashMap::new();
        for (&(address, key), &value) in &self.cache.storage {
            storage_by_account.entry(address).or_default().push((key, value));
        }
        for (address, entries) in storage_by_account {
            if self.cache.selfdestructs.contains(&address) {
                continue;
            }
            let mut storage_root = self
                .storage_roots
                .get(&address)
                .copied()
                .unwrap_or_else(|| self.account(address).unwrap_or_default().storage_root);
            for (key, value) in entries {
                let key_hash = keccak256(key.to_be_bytes::<32>());
                let encoded = if value.is_zero() {
                    Vec::new()
                } else {
                    ember_rlp::encode(&Item::from_uint(value))
                };
                storage_root = trie.insert(storage_root, key_hash.as_slice(), &encoded)?;
            }
            self.storage_roots.insert(address, storage_root);
            self.account_mut(address).storage_root = storage_root;
        }

        // Install pending code, content-addressed beside the trie nodes.
        for (address, code) in std::mem::take(&mut self.cache.pending_code) {
            if self.cache.selfdestructs.contains(&address) {
                continue;
            }
            let code_hash = keccak256(&code);
            self.store.put(code_hash, code.to_vec())?;
            self.account_mut(address).code_hash = code_hash;
        }

        // Write back accounts: destroyed and touched-empty records leave the
        // trie, everything else dirty is re-encoded.
        let accounts = std::mem::take(&mut self.cache.accounts);
        let touched = std::mem::take(&mut self.cache.touched);
        let destroyed = std::mem::take(&mut self.cache.selfdestructs);
        for (address, account) in accounts {
            let key = keccak256(address);
            let clears = destroyed.contains(&address)
                || account.is_none()
                || (fork.at_least(Fork::SpuriousDragon)
                    && touched.contains(&address)
                    && account.as_ref().is_some_and(Account::is_empty));
            if clears {
                root = trie.remove(root, key.as_slice())?;
            } else if let Some(account) = account {
                root = trie.insert(root, key.as_slice(), &account.rlp_bytes())?;
            }
        }

        for address in destroyed {
            self.storage_roots.remove(&address);
        }
        self.cache = CacheState::default();
        self.original_storage.clear();
        self.snapshots.clear();
        self.root = root;
        Ok(root)
    }
}

impl<S: TrieStore + ?Sized> Host for StateDb<'_, S> {
    fn account_exists(&mut self, address: Address) -> bool {
        self.account(address).is_some()
    }

    fn account_is_empty(&mut self, address: Address) -> bool {
        self.account(address).map_or(true, |account| account.is_empty())
    }

    fn balance(&mut self, address: Address) -> U256 {
        self.account(address).unwrap_or_default().balance
    }

    fn nonce(&mut self, address: Address) -> u64 {
        self.account(address).unwrap_or_default().nonce
    }

    fn increment_nonce(&mut self, address: Address) -> u64 {
        let account = self.account_mut(address);
        let nonce = account.nonce;
        account.nonce += 1;
        nonce
    }

    fn code(&mut self, address: Address) -> Bytes {
        if let Some(pending) = self.cache.pending_code.get(&address) {
            return pending.clone();
        }
        let Some(account) = self.account(address) else {
            return Bytes::new();
        };
        if account.code_hash == EMPTY_CODE_HASH {
            return Bytes::new();
        }
        self.store
            .get(&account.code_hash)
            .ok()
            .flatten()
            .map(Bytes::from)
            .unwrap_or_default()
    }

    fn code_hash(&mut self, address: Address) -> B256 {
        self.account(address).map_or(B256::ZERO, |account| account.code_hash)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.cache.pending_code.insert(address, code);
    }

    fn storage(&mut self, address: Address, key: U256) -> U256 {
        if let Some(&value) = self.cache.storage.get(&(address, key)) {
            return value;
        }
        let value = self.load_storage(address, key);
        self.original_storage.entry((address, key)).or_insert(value);
        self.cache.storage.insert((address, key), value);
        value
    }

    fn original_storage(&mut self, address: Address, key: U256) -> U256 {
        if let Some(&value) = self.original_storage.get(&(address, key)) {
            return value;
        }
        let value = self.load_storage(address, key);
        self.original_storage.insert((address, key), value);
        value
    }

    fn set_storage(&mut self, address: Address, key: U256, value: U256) {
        // Pin the original before the first overwrite.
        self.original_storage(address, key);
        self.cache.storage.insert((address, key), value);
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
        if self.balance(from) < value {
            return false;
        }
        self.account_mut(from).balance -= value;
        self.account_mut(to).balance += value;
        self.cache.touched.insert(from);
        self.cache.touched.insert(to);
        true
    }

    fn add_balance(&mut self, address: Address, value: U256) {
        self.account_mut(address).balance += value;
        self.cache.touched.insert(address);
    }

    fn touch(&mut self, address: Address) {
        // Touching materializes the account in the overlay so clearing sees
        // it.
        self.account(address);
        self.cache.touched.insert(address);
    }

    fn log(&mut self, log: Log) {
        self.cache.logs.push(log);
    }

    fn selfdestruct(&mut self, address: Address, beneficiary: Address) -> bool {
        let balance = self.balance(address);
        self.add_balance(beneficiary, balance);
        self.account_mut(address).balance = U256::ZERO;
        self.cache.selfdestructs.insert(address)
    }

    fn add_refund(&mut self, amount: u64) {
        self.cache.refund += amount;
    }

    fn sub_refund(&mut self, amount: u64) {
        self.cache.refund = self.cache.refund.saturating_sub(amount);
    }

    fn block_hash(&mut self, number: u64) -> B256 {
        self.block_hashes.get(&number).copied().unwrap_or_default()
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.cache.clone());
        self.snapshots.len() - 1
    }

    fn revert_to(&mut self, snapshot: usize) {
        self.cache = self.snapshots[snapshot].clone();
        self.snapshots.truncate(snapshot);
    }
}

impl<S: TrieStore + ?Sized> StateDb<'_, S> {
    fn load_storage(&mut self, address: Address, key: U256) -> U256 {
        let storage_root = self
            .storage_roots
            .get(&address)
            .copied()
            .unwrap_or_else(|| self.account(address).unwrap_or_default().storage_root);
        let trie = Trie::new(self.store);
        let key_hash = keccak256(key.to_be_bytes::<32>());
        trie.get(storage_root, key_hash.as_slice())
            .ok()
            .flatten()
            .and_then(|rlp| U256::decode_bytes(&rlp).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ember_mpt::{MemoryTrieStore, EMPTY_ROOT};

    fn funded_state(store: &MemoryTrieStore) -> (StateDb<'_, MemoryTrieStore>, Address) {
        let mut state = StateDb::new(store, EMPTY_ROOT);
        let alice = Address::repeat_byte(0xA1);
        state.put_account(alice, Account::with_balance(U256::from(1000)));
        (state, alice)
    }

    #[test]
    fn test_commit_then_reload() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        let root = state.commit(Fork::Byzantium).unwrap();
        assert_ne!(root, EMPTY_ROOT);

        let mut reloaded = StateDb::new(&store, root);
        assert_eq!(reloaded.balance(alice), U256::from(1000));
        assert!(!reloaded.account_exists(Address::repeat_byte(0xB2)));
    }

    #[test]
    fn test_storage_roundtrip_through_commit() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        state.set_storage(alice, U256::from(7), U256::from(42));
        let root = state.commit(Fork::Byzantium).unwrap();

        let mut reloaded = StateDb::new(&store, root);
        assert_eq!(reloaded.storage(alice, U256::from(7)), U256::from(42));
        assert_eq!(reloaded.storage(alice, U256::from(8)), U256::ZERO);
    }

    #[test]
    fn test_storage_clear_restores_empty_storage_root() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        state.set_storage(alice, U256::from(7), U256::from(42));
        let root = state.commit(Fork::Byzantium).unwrap();

        let mut state = StateDb::new(&store, root);
        state.set_storage(alice, U256::from(7), U256::ZERO);
        let root = state.commit(Fork::Byzantium).unwrap();

        let mut reloaded = StateDb::new(&store, root);
        assert_eq!(
            reloaded.account(alice).unwrap().storage_root,
            ember_primitives::EMPTY_ROOT_HASH
        );
    }

    #[test]
    fn test_snapshot_revert() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        let bob = Address::repeat_byte(0xB2);

        let snapshot = state.snapshot();
        assert!(state.transfer(alice, bob, U256::from(400)));
        state.log(Log::default());
        state.add_refund(15_000);
        assert_eq!(state.balance(bob), U256::from(400));

        state.revert_to(snapshot);
        assert_eq!(state.balance(alice), U256::from(1000));
        assert_eq!(state.balance(bob), U256::ZERO);
        assert!(state.take_logs().is_empty());
        assert_eq!(state.take_refund(), 0);
    }

    #[test]
    fn test_transfer_insufficient() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        assert!(!state.transfer(alice, Address::repeat_byte(0xB2), U256::from(2000)));
        assert_eq!(state.balance(alice), U256::from(1000));
    }

    #[test]
    fn test_touched_empty_account_clears_post_spurious() {
        let store = MemoryTrieStore::new();
        let mut state = StateDb::new(&store, EMPTY_ROOT);
        let hollow = Address::repeat_byte(0xC3);
        state.put_account(hollow, Account::default());
        let root = state.commit(Fork::Frontier).unwrap();
        // Pre-Spurious the empty record persists.
        assert_ne!(root, EMPTY_ROOT);

        let mut state = StateDb::new(&store, root);
        state.touch(hollow);
        let root = state.commit(Fork::SpuriousDragon).unwrap();
        assert_eq!(root, EMPTY_ROOT);
    }

    #[test]
    fn test_selfdestruct_moves_balance_and_clears() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        let heir = Address::repeat_byte(0xD4);

        assert!(state.selfdestruct(alice, heir));
        assert!(!state.selfdestruct(alice, heir));
        let root = state.commit(Fork::Byzantium).unwrap();

        let mut reloaded = StateDb::new(&store, root);
        assert!(!reloaded.account_exists(alice));
        assert_eq!(reloaded.balance(heir), U256::from(1000));
    }

    #[test]
    fn test_original_storage_pinned_across_writes() {
        let store = MemoryTrieStore::new();
        let (mut state, alice) = funded_state(&store);
        state.set_storage(alice, U256::from(1), U256::from(10));
        let root = state.commit(Fork::Istanbul).unwrap();

        let mut state = StateDb::new(&store, root);
        state.set_storage(alice, U256::from(1), U256::from(20));
        state.set_storage(alice, U256::from(1), U256::from(30));
        assert_eq!(state.original_storage(alice, U256::from(1)), U256::from(10));
        assert_eq!(state.storage(alice, U256::from(1)), U256::from(30));
    }
}
