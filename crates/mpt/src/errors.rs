//! Errors for the `ember-mpt` crate.

use alloy_primitives::B256;
use ember_rlp::RlpError;

/// A [Result] type alias where the error is [StoreError].
pub type StoreResult<T> = Result<T, StoreError>;

/// An error type for backing-store operations. Store failures are fatal for
/// the process, never confined to a single trie operation.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A key required by a `get_or_raise` lookup was absent.
    #[display("Key not found in backing store: {_0}")]
    KeyNotFound(B256),
    /// The backing engine reported an I/O failure.
    #[display("Backing store failure: {_0}")]
    Backend(String),
}

impl core::error::Error for StoreError {}

/// A [Result] type alias where the error is [TrieError].
pub type TrieResult<T> = Result<T, TrieError>;

/// An error type for [Trie] operations.
///
/// [Trie]: crate::Trie
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// A persisted node failed to decode as RLP.
    #[display("Malformed trie node: {_0}")]
    Rlp(RlpError),
    /// A decoded node had a shape no trie node takes.
    #[display("Invalid trie node structure")]
    InvalidNode,
    /// A compact-encoded path carried an unknown prefix nibble.
    #[display("Invalid hex-prefix flag nibble: {_0}")]
    InvalidCompactPrefix(u8),
    /// The backing store failed.
    #[display("Store error: {_0}")]
    Store(StoreError),
}

impl From<RlpError> for TrieError {
    fn from(err: RlpError) -> Self {
        Self::Rlp(err)
    }
}

impl From<StoreError> for TrieError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl core::error::Error for TrieError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Rlp(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}
