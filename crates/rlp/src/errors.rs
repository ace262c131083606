//! Errors for the `ember-rlp` crate.

/// A [Result] type alias where the error is [RlpError].
pub type RlpResult<T> = Result<T, RlpError>;

/// An error type for RLP encoding and decoding operations.
#[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq)]
pub enum RlpError {
    /// The input ended before the announced payload did.
    #[display("Unexpected end of input")]
    UnexpectedEof,
    /// A nested item overran the payload boundary of its enclosing list.
    #[display("Item prefix inconsistent with enclosing payload")]
    InvalidPrefix,
    /// A long-form length was used for a payload short enough for the short form.
    #[display("Long length form used for a payload shorter than 56 bytes")]
    UnderLong,
    /// A non-minimal encoding: leading zero in a length, or a single byte below 0x80
    /// wrapped in a string header.
    #[display("Non-minimal encoding")]
    NonMinimal,
    /// Input bytes remained after the top-level item was decoded.
    #[display("Trailing bytes after top-level item")]
    TrailingBytes,
    /// A string item was found where a list was required.
    #[display("Expected a list, found a string")]
    UnexpectedString,
    /// A list item was found where a string was required.
    #[display("Expected a string, found a list")]
    UnexpectedList,
    /// A payload had the wrong length for the target type.
    #[display("Payload length mismatch for target type")]
    UnexpectedLength,
    /// A numeric payload did not fit the target integer width.
    #[display("Numeric payload overflows target type")]
    Overflow,
    /// A custom decoding error raised by a [Decodable] implementation.
    ///
    /// [Decodable]: crate::Decodable
    #[display("{_0}")]
    Custom(&'static str),
}

impl core::error::Error for RlpError {}
