//! The account-repository contract the machine executes against.

use alloy_primitives::{Address, Bytes, B256, U256};
use ember_primitives::Log;

/// Block-level context visible to executing code.
#[derive(Debug, Clone, Default)]
pub struct BlockEnv {
    /// Recipient of block rewards and fees (COINBASE).
    pub beneficiary: Address,
    /// Block height (NUMBER).
    pub number: u64,
    /// Block timestamp (TIMESTAMP).
    pub timestamp: u64,
    /// Block difficulty (DIFFICULTY).
    pub difficulty: U256,
    /// Block gas ceiling (GASLIMIT).
    pub gas_limit: u64,
    /// EIP-155 chain id (CHAINID).
    pub chain_id: u64,
}

/// State access for the machine. Implemented by the journaled state layer;
/// every mutation lands in the journal so a [Host::revert_to] unwinds the
/// effects of a failed sub-call, logs and refunds included.
pub trait Host {
    /// True when an account exists, even if empty.
    fn account_exists(&mut self, address: Address) -> bool;

    /// True when the account is absent or empty per EIP-161.
    fn account_is_empty(&mut self, address: Address) -> bool;

    /// The account's balance in wei.
    fn balance(&mut self, address: Address) -> U256;

    /// The account's nonce.
    fn nonce(&mut self, address: Address) -> u64;

    /// Increments the account's nonce, returning the pre-increment value.
    fn increment_nonce(&mut self, address: Address) -> u64;

    /// The account's code.
    fn code(&mut self, address: Address) -> Bytes;

    /// The Keccak-256 of the account's code, or zero for absent accounts
    /// (the EXTCODEHASH convention).
    fn code_hash(&mut self, address: Address) -> B256;

    /// Installs code on a freshly created account.
    fn set_code(&mut self, address: Address, code: Bytes);

    /// The current value of a storage slot.
    fn storage(&mut self, address: Address, key: U256) -> U256;

    /// The value the slot held when the current transaction began, the
    /// anchor of net gas metering.
    fn original_storage(&mut self, address: Address, key: U256) -> U256;

    /// Writes a storage slot.
    fn set_storage(&mut self, address: Address, key: U256, value: U256);

    /// Moves `value` wei, returning `false` (and moving nothing) when the
    /// sender's balance is insufficient.
    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool;

    /// Credits `value` wei, creating the account if needed.
    fn add_balance(&mut self, address: Address, value: U256);

    /// Marks an account touched for EIP-161 empty-account clearing.
    fn touch(&mut self, address: Address);

    /// Records a log entry.
    fn log(&mut self, log: Log);

    /// Schedules `address` for destruction, crediting its balance to
    /// `beneficiary`. Returns `true` the first time the address is scheduled.
    fn selfdestruct(&mut self, address: Address, beneficiary: Address) -> bool;

    /// Adds to the refund counter.
    fn add_refund(&mut self, amount: u64);

    /// Subtracts from the refund counter (net gas metering can un-refund).
    fn sub_refund(&mut self, amount: u64);

    /// The hash of one of the 256 most recent blocks, or zero outside that
    /// window.
    fn block_hash(&mut self, number: u64) -> B256;

    /// Opens a journal checkpoint.
    fn snapshot(&mut self) -> usize;

    /// Unwinds every change recorded since `snapshot` was opened.
    fn revert_to(&mut self, snapshot: usize);
}
