//! Errors for the `ember-primitives` crate.

/// A [Result] type alias where the error is [SignatureError].
pub type SignatureResult<T> = Result<T, SignatureError>;

/// An error type for transaction signature operations.
#[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// The `v` field encodes neither a legacy parity nor an EIP-155 chain id.
    #[display("Signature `v` value out of range: {_0}")]
    InvalidV(u64),
    /// `r` or `s` is not a valid scalar for the curve.
    #[display("Signature r/s out of range")]
    InvalidSignature,
    /// No public key could be recovered from the signature.
    #[display("Public key recovery failed")]
    RecoveryFailed,
}

impl core::error::Error for SignatureError {}
