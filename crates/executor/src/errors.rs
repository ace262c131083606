//! Errors for the `ember-executor` crate.

use alloy_primitives::{B256, U256};
use ember_mpt::{StoreError, TrieError};
use ember_primitives::SignatureError;

/// A [Result] type alias where the error is [ExecutorError].
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// A consensus violation. The offending block (or transaction) is rejected
/// and the submitting peer penalized; canonical state is untouched.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The block number is not the parent's plus one.
    #[display("Block number {number} does not follow parent {parent}")]
    NonSequentialNumber {
        /// The block's number.
        number: u64,
        /// The parent's number.
        parent: u64,
    },
    /// The timestamp does not advance past the parent's.
    #[display("Timestamp {timestamp} not after parent {parent}")]
    TimestampNotAfterParent {
        /// The block's timestamp.
        timestamp: u64,
        /// The parent's timestamp.
        parent: u64,
    },
    /// The extra-data field exceeds 32 bytes.
    #[display("Extra data of {_0} bytes exceeds the 32-byte bound")]
    ExtraDataTooLong(usize),
    /// The gas limit stepped outside the ±1/1024 band or under the floor.
    #[display("Gas limit {limit} out of bounds for parent {parent}")]
    GasLimitOutOfBounds {
        /// The block's gas limit.
        limit: u64,
        /// The parent's gas limit.
        parent: u64,
    },
    /// More gas was used than the block allows.
    #[display("Gas used {used} exceeds limit {limit}")]
    GasUsedExceedsLimit {
        /// The header's gas-used value.
        used: u64,
        /// The header's gas limit.
        limit: u64,
    },
    /// The difficulty does not match the formula.
    #[display("Difficulty {got} does not match expected {expected}")]
    WrongDifficulty {
        /// The formula's output.
        expected: U256,
        /// The header's value.
        got: U256,
    },
    /// The proof-of-work seal fails verification.
    #[display("Invalid proof-of-work seal")]
    InvalidSeal,
    /// The header's ommers hash does not cover the block's ommer list.
    #[display("Ommers hash mismatch")]
    WrongOmmersHash,
    /// More than two ommers, or an ommer at an invalid depth.
    #[display("Invalid ommer list")]
    InvalidOmmers,
    /// The transactions trie root does not match the header.
    #[display("Transactions root mismatch")]
    WrongTransactionsRoot,
    /// The receipts trie root does not match the header.
    #[display("Receipts root mismatch")]
    WrongReceiptsRoot,
    /// The post-state root does not match the header.
    #[display("State root mismatch: expected {expected}, computed {computed}")]
    WrongStateRoot {
        /// The header's state root.
        expected: B256,
        /// The locally computed root.
        computed: B256,
    },
    /// The header's gas-used does not match execution.
    #[display("Gas used mismatch: header {header}, computed {computed}")]
    WrongGasUsed {
        /// The header's value.
        header: u64,
        /// The locally computed value.
        computed: u64,
    },
    /// The header's logs bloom does not match the receipts.
    #[display("Logs bloom mismatch")]
    WrongLogsBloom,
    /// A transaction signature failed to verify or recover.
    #[display("Invalid transaction signature: {_0}")]
    InvalidSignature(SignatureError),
    /// A transaction was signed for another chain.
    #[display("Transaction chain id {got} does not match chain {expected}")]
    WrongChainId {
        /// Our chain id.
        expected: u64,
        /// The transaction's chain id.
        got: u64,
    },
    /// A transaction nonce does not match the sender account.
    #[display("Nonce {got} does not match account nonce {expected}")]
    WrongNonce {
        /// The sender's account nonce.
        expected: u64,
        /// The transaction's nonce.
        got: u64,
    },
    /// The sender cannot cover gas and value up front.
    #[display("Sender balance {balance} cannot cover up-front cost {required}")]
    InsufficientBalance {
        /// The sender's balance.
        balance: U256,
        /// `gas_limit · gas_price + value`.
        required: U256,
    },
    /// The intrinsic gas alone exceeds the transaction's gas limit.
    #[display("Intrinsic gas {intrinsic} exceeds gas limit {limit}")]
    IntrinsicGasExceedsLimit {
        /// The computed intrinsic gas.
        intrinsic: u64,
        /// The transaction's gas limit.
        limit: u64,
    },
    /// The transaction's gas limit does not fit the block's remaining gas.
    #[display("Transaction gas limit exceeds remaining block gas")]
    BlockGasExceeded,
}

impl core::error::Error for ValidationError {}

impl From<SignatureError> for ValidationError {
    fn from(err: SignatureError) -> Self {
        Self::InvalidSignature(err)
    }
}

/// The error type for block processing.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// A consensus rule was violated.
    #[display("Validation failed: {_0}")]
    Validation(ValidationError),
    /// The state trie failed.
    #[display("Trie error: {_0}")]
    Trie(TrieError),
    /// The backing store failed; fatal process-wide.
    #[display("Store error: {_0}")]
    Store(StoreError),
}

impl From<ValidationError> for ExecutorError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<TrieError> for ExecutorError {
    fn from(err: TrieError) -> Self {
        Self::Trie(err)
    }
}

impl From<StoreError> for ExecutorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl core::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Trie(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}
