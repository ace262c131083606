//! Errors for the `ember-driver` crate.

use alloy_primitives::B256;
use ember_executor::ExecutorError;

/// A [Result] type alias where the error is [DriverError].
pub type DriverResult<T> = Result<T, DriverError>;

/// A failure while fetching chain data from a peer. Peer-scoped: the sync
/// driver reacts by abandoning the round, never by corrupting the tree.
#[derive(Debug, derive_more::Display, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The serving peer's session closed with requests outstanding.
    #[display("Peer disconnected with requests in flight")]
    PeerGone,
    /// The request timed out.
    #[display("Request timed out")]
    Timeout,
    /// The peer misbehaved at the protocol level.
    #[display("Peer protocol violation: {_0}")]
    Protocol(String),
}

impl core::error::Error for SourceError {}

/// The error type for blocktree and sync operations.
#[derive(Debug, derive_more::Display)]
pub enum DriverError {
    /// A block referenced a parent the tree does not hold.
    #[display("Unknown parent block: {_0}")]
    UnknownParent(B256),
    /// A block failed consensus validation.
    #[display("Block rejected: {_0}")]
    Rejected(ExecutorError),
    /// The serving peer failed.
    #[display("Source failed: {_0}")]
    Source(SourceError),
    /// A peer served data inconsistent with what it advertised.
    #[display("Peer served inconsistent chain data")]
    InconsistentData,
}

impl From<ExecutorError> for DriverError {
    fn from(err: ExecutorError) -> Self {
        Self::Rejected(err)
    }
}

impl From<SourceError> for DriverError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

impl core::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Rejected(err) => Some(err),
            Self::Source(err) => Some(err),
            _ => None,
        }
    }
}
