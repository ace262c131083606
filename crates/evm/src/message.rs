//! Call frames and their results.

use crate::VmError;
use alloy_primitives::{Address, Bytes, B256, U256};

/// The flavor of a call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Plain CALL: new context at the callee, value transferred.
    Call,
    /// CALLCODE: callee's code in the caller's context, value transferred.
    CallCode,
    /// DELEGATECALL: callee's code with the caller's context, sender, and
    /// apparent value.
    DelegateCall,
    /// STATICCALL: like CALL with zero value and all mutation forbidden.
    StaticCall,
    /// CREATE: run initialization code, deploy the returned runtime code.
    Create,
    /// CREATE2: CREATE at a salt-derived address.
    Create2 {
        /// The caller-chosen salt.
        salt: B256,
    },
}

impl CallKind {
    /// True for the two creation flavors.
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create | Self::Create2 { .. })
    }
}

/// One frame of execution: who runs what code, in which context, under how
/// much gas.
#[derive(Debug, Clone)]
pub struct Message {
    /// The frame flavor.
    pub kind: CallKind,
    /// The context address: owner of storage, balance, and emitted logs.
    pub address: Address,
    /// The address whose code runs (differs from `address` for CALLCODE and
    /// DELEGATECALL; precompiles dispatch on it).
    pub code_address: Address,
    /// The immediate caller.
    pub caller: Address,
    /// The transaction originator (ORIGIN).
    pub origin: Address,
    /// Gas available to the frame.
    pub gas: u64,
    /// Wei per gas unit of the enclosing transaction (GASPRICE).
    pub gas_price: U256,
    /// Wei transferred into the frame, or the apparent value for
    /// DELEGATECALL.
    pub value: U256,
    /// Call data; initialization code rides in `code` for creations.
    pub input: Bytes,
    /// The code to execute.
    pub code: Bytes,
    /// Call-stack depth of this frame, bounded at 1024.
    pub depth: usize,
    /// True inside any STATICCALL ancestor.
    pub is_static: bool,
}

/// How a frame halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// RETURN, STOP, or SELFDESTRUCT: effects commit.
    Success,
    /// REVERT: effects roll back, output is exposed, remaining gas returns.
    Revert,
    /// A machine fault: effects roll back and all frame gas is consumed.
    Failure(VmError),
}

impl Status {
    /// True only for [Status::Success].
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A halted frame: status, remaining gas, and output bytes. Every execution
/// path produces exactly one of these.
#[derive(Debug, Clone)]
pub struct Execution {
    /// How the frame halted.
    pub status: Status,
    /// Gas left in the frame at halt (zero for failures).
    pub gas_left: u64,
    /// RETURN or REVERT payload; the deployed-code address bytes for a
    /// successful creation frame.
    pub output: Bytes,
}

impl Execution {
    /// A successful halt.
    pub fn success(gas_left: u64, output: Bytes) -> Self {
        Self { status: Status::Success, gas_left, output }
    }

    /// A reverted halt carrying its returndata.
    pub fn revert(gas_left: u64, output: Bytes) -> Self {
        Self { status: Status::Revert, gas_left, output }
    }

    /// A faulted halt. Consumes all frame gas.
    pub fn failure(error: VmError) -> Self {
        Self { status: Status::Failure(error), gas_left: 0, output: Bytes::new() }
    }
}
