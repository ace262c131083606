//! An in-memory [Host] for interpreter tests.

use crate::Host;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use ember_primitives::{Log, EMPTY_CODE_HASH};
use std::collections::{HashMap, HashSet};

/// A flat-map world state with clone-based snapshots. Good enough for unit
/// tests; the production host journals instead.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockHost {
    pub balances: HashMap<Address, U256>,
    pub nonces: HashMap<Address, u64>,
    pub codes: HashMap<Address, Bytes>,
    pub storage: HashMap<(Address, U256), U256>,
    pub original_storage: HashMap<(Address, U256), U256>,
    pub logs: Vec<Log>,
    pub destroyed: HashSet<Address>,
    pub touched: HashSet<Address>,
    pub refund: u64,
    snapshots: Vec<Box<MockHost>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn give(&mut self, address: Address, balance: U256) {
        self.balances.insert(address, balance);
    }

    pub fn install_code(&mut self, address: Address, code: impl Into<Bytes>) {
        self.codes.insert(address, code.into());
    }

    fn known(&self, address: Address) -> bool {
        self.balances.contains_key(&address)
            || self.nonces.contains_key(&address)
            || self.codes.contains_key(&address)
    }
}

impl Host for MockHost {
    fn account_exists(&mut self, address: Address) -> bool {
        self.known(address)
    }

    fn account_is_empty(&mut self, address: Address) -> bool {
        self.balance(address).is_zero()
            && self.nonce(address) == 0
            && self.code(address).is_empty()
    }

    fn balance(&mut self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn nonce(&mut self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn increment_nonce(&mut self, address: Address) -> u64 {
        let nonce = self.nonce(address);
        self.nonces.insert(address, nonce + 1);
        nonce
    }

    fn code(&mut self, address: Address) -> Bytes {
        self.codes.get(&address).cloned().unwrap_or_default()
    }

    fn code_hash(&mut self, address: Address) -> B256 {
        if !self.known(address) {
            return B256::ZERO;
        }
        let code = self.code(address);
        if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(&code)
        }
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.codes.insert(address, code);
    }

    fn storage(&mut self, address: Address, key: U256) -> U256 {
        self.storage.get(&(address, key)).copied().unwrap_or_default()
    }

    fn original_storage(&mut self, address: Address, key: U256) -> U256 {
        self.original_storage.get(&(address, key)).copied().unwrap_or_default()
    }

    fn set_storage(&mut self, address: Address, key: U256, value: U256) {
        self.storage.insert((address, key), value);
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
        let from_balance = self.balance(from);
        if from_balance < value {
            return false;
        }
        self.balances.insert(from, from_balance - value);
        let to_balance = self.balance(to);
        self.balances.insert(to, to_balance + value);
        true
    }

    fn add_balance(&mut self, address: Address, value: U256) {
        let balance = self.balance(address);
        self.balances.insert(address, balance + value);
    }

    fn touch(&mut self, address: Address) {
        self.touched.insert(address);
    }

    fn log(&mut self, log: Log) {
        self.logs.push(log);
    }

    fn selfdestruct(&mut self, address: Address, beneficiary: Address) -> bool {
        let balance = self.balance(address);
        self.add_balance(beneficiary, balance);
        self.balances.insert(address, U256::ZERO);
        self.destroyed.insert(address)
    }

    fn add_refund(&mut self, amount: u64) {
        self.refund += amount;
    }

    fn sub_refund(&mut self, amount: u64) {
        self.refund = self.refund.saturating_sub(amount);
    }

    fn block_hash(&mut self, number: u64) -> B256 {
        keccak256(number.to_be_bytes())
    }

    fn snapshot(&mut self) -> usize {
        let copy = Box::new(Self { snapshots: Vec::new(), ..self.clone() });
        self.snapshots.push(copy);
        self.snapshots.len() - 1
    }

    fn revert_to(&mut self, snapshot: usize) {
        let restored = self.snapshots[snapshot].clone();
        let snapshots = std::mem::take(&mut self.snapshots);
        *self = *restored;
        self.snapshots = snapshots;
        self.snapshots.truncate(snapshot);
    }
}
