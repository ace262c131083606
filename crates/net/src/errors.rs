//! Errors for the `ember-net` crate.
//!
//! All of these are session- or packet-scoped: a failing peer is dropped and
//! re-queued or banned, and nothing here ever reaches the block processor.

use ember_rlp::RlpError;

/// A [Result] type alias where the error is [NetError].
pub type NetResult<T> = Result<T, NetError>;

/// An error type for networking operations.
#[derive(Debug, derive_more::Display)]
pub enum NetError {
    /// The socket failed.
    #[display("Socket error: {_0}")]
    Io(std::io::Error),
    /// A peer sent malformed RLP.
    #[display("Malformed wire RLP: {_0}")]
    Rlp(RlpError),
    /// A discovery packet's hash did not cover its content.
    #[display("Discovery packet hash mismatch")]
    PacketHashMismatch,
    /// A signature failed to verify or recover.
    #[display("Invalid packet signature")]
    InvalidSignature,
    /// A discovery packet's expiration lies in the past.
    #[display("Expired discovery packet")]
    Expired,
    /// A frame MAC did not match the rolling digest.
    #[display("Frame MAC mismatch")]
    MacMismatch,
    /// ECIES decryption failed.
    #[display("ECIES failure: {_0}")]
    Ecies(&'static str),
    /// The remote violated the handshake or message flow.
    #[display("Protocol violation: {_0}")]
    Protocol(&'static str),
    /// The remote sent a message id outside every negotiated capability.
    #[display("Unknown message id: {_0:#04x}")]
    UnknownMessage(u8),
    /// The remote disconnected with the given reason code.
    #[display("Peer disconnected: reason {_0}")]
    Disconnected(u8),
    /// An operation outlived its deadline.
    #[display("Timed out")]
    Timeout,
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<RlpError> for NetError {
    fn from(err: RlpError) -> Self {
        Self::Rlp(err)
    }
}

impl core::error::Error for NetError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Rlp(err) => Some(err),
            _ => None,
        }
    }
}
