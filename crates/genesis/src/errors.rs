//! Errors for the `ember-genesis` crate.

/// A [Result] type alias where the error is [SpecError].
pub type SpecResult<T> = Result<T, SpecError>;

/// An error type for chain-specification loading. These surface at startup
/// and are not recoverable.
#[derive(Debug, derive_more::Display)]
pub enum SpecError {
    /// The requested chain preset does not exist.
    #[display("Unknown chain: {_0}")]
    UnknownChain(String),
    /// A chain specification file failed to parse.
    #[display("Malformed chain specification: {_0}")]
    Malformed(serde_json::Error),
    /// An enode URL failed to parse.
    #[display("Malformed enode URL: {_0}")]
    InvalidEnode(String),
}

impl From<serde_json::Error> for SpecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err)
    }
}

impl core::error::Error for SpecError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            _ => None,
        }
    }
}
