//! Errors for the `ember-evm` crate.
//!
//! Machine faults are first-class result variants, not thrown errors: the
//! interpreter returns a halted [Execution](crate::Execution) on every
//! completion path.

/// A machine fault. Every variant consumes all gas forwarded to the faulting
/// frame and rolls its state changes back.
#[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The frame ran out of gas.
    #[display("Out of gas")]
    OutOfGas,
    /// An instruction popped more items than the stack holds.
    #[display("Stack underflow")]
    StackUnderflow,
    /// A push would exceed the 1024-item stack bound.
    #[display("Stack overflow")]
    StackOverflow,
    /// A jump landed outside the code or on a non-JUMPDEST byte.
    #[display("Invalid jump destination")]
    InvalidJump,
    /// An undefined or not-yet-activated opcode was fetched.
    #[display("Invalid opcode: {_0:#04x}")]
    InvalidOpcode(u8),
    /// A state-mutating instruction ran inside a STATICCALL frame.
    #[display("State modification in static context")]
    StaticModeViolation,
    /// RETURNDATACOPY read past the end of the return buffer.
    #[display("Return data access out of bounds")]
    ReturnDataOutOfBounds,
    /// The 1024-frame call depth bound was hit.
    #[display("Call depth limit reached")]
    CallDepth,
    /// A create frame tried to deploy code above the 24576-byte cap.
    #[display("Deployed code exceeds size cap")]
    CodeSizeLimit,
}

impl core::error::Error for VmError {}
