//! Opcode constants, their fork-gated static gas, and jump-destination
//! analysis.

use ember_genesis::Fork;

/// Halts execution.
pub const STOP: u8 = 0x00;
/// Addition.
pub const ADD: u8 = 0x01;
/// Multiplication.
pub const MUL: u8 = 0x02;
/// Subtraction.
pub const SUB: u8 = 0x03;
/// Unsigned division.
pub const DIV: u8 = 0x04;
/// Signed division.
pub const SDIV: u8 = 0x05;
/// Unsigned remainder.
pub const MOD: u8 = 0x06;
/// Signed remainder.
pub const SMOD: u8 = 0x07;
/// Modular addition over 512-bit intermediates.
pub const ADDMOD: u8 = 0x08;
/// Modular multiplication over 512-bit intermediates.
pub const MULMOD: u8 = 0x09;
/// Exponentiation.
pub const EXP: u8 = 0x0A;
/// Sign extension from a byte boundary.
pub const SIGNEXTEND: u8 = 0x0B;

/// Unsigned less-than.
pub const LT: u8 = 0x10;
/// Unsigned greater-than.
pub const GT: u8 = 0x11;
/// Signed less-than.
pub const SLT: u8 = 0x12;
/// Signed greater-than.
pub const SGT: u8 = 0x13;
/// Equality.
pub const EQ: u8 = 0x14;
/// Zero test.
pub const ISZERO: u8 = 0x15;
/// Bitwise AND.
pub const AND: u8 = 0x16;
/// Bitwise OR.
pub const OR: u8 = 0x17;
/// Bitwise XOR.
pub const XOR: u8 = 0x18;
/// Bitwise NOT.
pub const NOT: u8 = 0x19;
/// Single byte extraction.
pub const BYTE: u8 = 0x1A;
/// Shift left (Constantinople).
pub const SHL: u8 = 0x1B;
/// Logical shift right (Constantinople).
pub const SHR: u8 = 0x1C;
/// Arithmetic shift right (Constantinople).
pub const SAR: u8 = 0x1D;

/// Keccak-256 over a memory range.
pub const SHA3: u8 = 0x20;

/// Context address.
pub const ADDRESS: u8 = 0x30;
/// Account balance.
pub const BALANCE: u8 = 0x31;
/// Transaction originator.
pub const ORIGIN: u8 = 0x32;
/// Immediate caller.
pub const CALLER: u8 = 0x33;
/// Frame value.
pub const CALLVALUE: u8 = 0x34;
/// Call-data word load.
pub const CALLDATALOAD: u8 = 0x35;
/// Call-data length.
pub const CALLDATASIZE: u8 = 0x36;
/// Call-data to memory copy.
pub const CALLDATACOPY: u8 = 0x37;
/// Running code length.
pub const CODESIZE: u8 = 0x38;
/// Running code to memory copy.
pub const CODECOPY: u8 = 0x39;
/// Transaction gas price.
pub const GASPRICE: u8 = 0x3A;
/// External code length.
pub const EXTCODESIZE: u8 = 0x3B;
/// External code to memory copy.
pub const EXTCODECOPY: u8 = 0x3C;
/// Return-buffer length (Byzantium).
pub const RETURNDATASIZE: u8 = 0x3D;
/// Return buffer to memory copy (Byzantium).
pub const RETURNDATACOPY: u8 = 0x3E;
/// External code hash (Constantinople).
pub const EXTCODEHASH: u8 = 0x3F;

/// Recent block hash.
pub const BLOCKHASH: u8 = 0x40;
/// Block beneficiary.
pub const COINBASE: u8 = 0x41;
/// Block timestamp.
pub const TIMESTAMP: u8 = 0x42;
/// Block number.
pub const NUMBER: u8 = 0x43;
/// Block difficulty.
pub const DIFFICULTY: u8 = 0x44;
/// Block gas limit.
pub const GASLIMIT: u8 = 0x45;
/// Chain id (Istanbul).
pub const CHAINID: u8 = 0x46;
/// Own balance (Istanbul).
pub const SELFBALANCE: u8 = 0x47;

/// Discard the top of the stack.
pub const POP: u8 = 0x50;
/// Memory word load.
pub const MLOAD: u8 = 0x51;
/// Memory word store.
pub const MSTORE: u8 = 0x52;
/// Memory byte store.
pub const MSTORE8: u8 = 0x53;
/// Storage load.
pub const SLOAD: u8 = 0x54;
/// Storage store.
pub const SSTORE: u8 = 0x55;
/// Unconditional jump.
pub const JUMP: u8 = 0x56;
/// Conditional jump.
pub const JUMPI: u8 = 0x57;
/// Program counter.
pub const PC: u8 = 0x58;
/// Materialized memory size.
pub const MSIZE: u8 = 0x59;
/// Remaining gas.
pub const GAS: u8 = 0x5A;
/// Jump target marker.
pub const JUMPDEST: u8 = 0x5B;

/// First of PUSH1..PUSH32.
pub const PUSH1: u8 = 0x60;
/// Last of PUSH1..PUSH32.
pub const PUSH32: u8 = 0x7F;
/// First of DUP1..DUP16.
pub const DUP1: u8 = 0x80;
/// Last of DUP1..DUP16.
pub const DUP16: u8 = 0x8F;
/// First of SWAP1..SWAP16.
pub const SWAP1: u8 = 0x90;
/// Last of SWAP1..SWAP16.
pub const SWAP16: u8 = 0x9F;
/// First of LOG0..LOG4.
pub const LOG0: u8 = 0xA0;
/// Last of LOG0..LOG4.
pub const LOG4: u8 = 0xA4;

/// Contract creation.
pub const CREATE: u8 = 0xF0;
/// Message call.
pub const CALL: u8 = 0xF1;
/// Message call with the caller's context.
pub const CALLCODE: u8 = 0xF2;
/// Halt returning output.
pub const RETURN: u8 = 0xF3;
/// Message call preserving sender and value (Homestead).
pub const DELEGATECALL: u8 = 0xF4;
/// Contract creation at a salted address (Constantinople).
pub const CREATE2: u8 = 0xF5;
/// Read-only message call (Byzantium).
pub const STATICCALL: u8 = 0xFA;
/// Halt reverting state, returning output (Byzantium).
pub const REVERT: u8 = 0xFD;
/// Designated invalid instruction.
pub const INVALID: u8 = 0xFE;
/// Destroy the running account.
pub const SELFDESTRUCT: u8 = 0xFF;

/// The static gas of `op` under `fork`, or `None` when the opcode is
/// undefined or not yet activated. Dynamic components (memory expansion,
/// copy words, storage rules, call forwarding) are charged by the
/// interpreter on top of this.
pub fn static_gas(op: u8, fork: Fork) -> Option<u64> {
    let gas = match op {
        STOP | RETURN => 0,
        REVERT if fork.at_least(Fork::Byzantium) => 0,
        SSTORE => 0,
        JUMPDEST => 1,
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | POP | PC | MSIZE | GAS => 2,
        RETURNDATASIZE if fork.at_least(Fork::Byzantium) => 2,
        CHAINID if fork.at_least(Fork::Istanbul) => 2,
        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE
        | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 | CALLDATACOPY | CODECOPY => 3,
        SHL | SHR | SAR if fork.at_least(Fork::Constantinople) => 3,
        RETURNDATACOPY if fork.at_least(Fork::Byzantium) => 3,
        PUSH1..=PUSH32 | DUP1..=DUP16 | SWAP1..=SWAP16 => 3,
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND => 5,
        SELFBALANCE if fork.at_least(Fork::Istanbul) => 5,
        ADDMOD | MULMOD | JUMP => 8,
        EXP | JUMPI => 10,
        BLOCKHASH => 20,
        SHA3 => 30,
        LOG0..=LOG4 => 375,
        SLOAD => sload_cost(fork),
        BALANCE => balance_cost(fork),
        EXTCODESIZE | EXTCODECOPY => extcode_cost(fork),
        EXTCODEHASH if fork.at_least(Fork::Constantinople) => {
            if fork.at_least(Fork::Istanbul) {
                700
            } else {
                400
            }
        }
        CREATE => 32_000,
        CREATE2 if fork.at_least(Fork::Constantinople) => 32_000,
        CALL | CALLCODE => call_cost(fork),
        DELEGATECALL if fork.at_least(Fork::Homestead) => call_cost(fork),
        STATICCALL if fork.at_least(Fork::Byzantium) => call_cost(fork),
        SELFDESTRUCT => {
            if fork.at_least(Fork::Tangerine) {
                5000
            } else {
                0
            }
        }
        _ => return None,
    };
    Some(gas)
}

/// SLOAD: 50, repriced to 200 by EIP-150 and 800 by EIP-1884.
pub fn sload_cost(fork: Fork) -> u64 {
    if fork.at_least(Fork::Istanbul) {
        800
    } else if fork.at_least(Fork::Tangerine) {
        200
    } else {
        50
    }
}

/// BALANCE: 20, repriced to 400 by EIP-150 and 700 by EIP-1884.
pub fn balance_cost(fork: Fork) -> u64 {
    if fork.at_least(Fork::Istanbul) {
        700
    } else if fork.at_least(Fork::Tangerine) {
        400
    } else {
        20
    }
}

/// EXTCODESIZE/EXTCODECOPY base: 20, repriced to 700 by EIP-150.
pub fn extcode_cost(fork: Fork) -> u64 {
    if fork.at_least(Fork::Tangerine) {
        700
    } else {
        20
    }
}

/// CALL-family base: 40, repriced to 700 by EIP-150.
pub fn call_cost(fork: Fork) -> u64 {
    if fork.at_least(Fork::Tangerine) {
        700
    } else {
        40
    }
}

/// The per-byte cost of EXP's exponent: 10, repriced to 50 by EIP-160.
pub fn exp_byte_cost(fork: Fork) -> u64 {
    if fork.at_least(Fork::SpuriousDragon) {
        50
    } else {
        10
    }
}

/// Marks every valid JUMPDEST position in `code`, skipping bytes that are
/// PUSH immediates.
pub fn jumpdest_bitmap(code: &[u8]) -> Vec<bool> {
    let mut valid = vec![false; code.len()];
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        if op == JUMPDEST {
            valid[pc] = true;
        }
        if (PUSH1..=PUSH32).contains(&op) {
            pc += (op - PUSH1) as usize + 1;
        }
        pc += 1;
    }
    valid
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fork_gating() {
        assert_eq!(static_gas(SHL, Fork::Byzantium), None);
        assert_eq!(static_gas(SHL, Fork::Constantinople), Some(3));
        assert_eq!(static_gas(REVERT, Fork::SpuriousDragon), None);
        assert_eq!(static_gas(CHAINID, Fork::Petersburg), None);
        assert_eq!(static_gas(CHAINID, Fork::Istanbul), Some(2));
        assert_eq!(static_gas(DELEGATECALL, Fork::Frontier), None);
        assert_eq!(static_gas(INVALID, Fork::Istanbul), None);
        assert_eq!(static_gas(0x0C, Fork::Istanbul), None);
    }

    #[test]
    fn test_repricings() {
        assert_eq!(sload_cost(Fork::Homestead), 50);
        assert_eq!(sload_cost(Fork::Byzantium), 200);
        assert_eq!(sload_cost(Fork::Istanbul), 800);
        assert_eq!(call_cost(Fork::Homestead), 40);
        assert_eq!(call_cost(Fork::Tangerine), 700);
    }

    #[test]
    fn test_jumpdest_skips_push_data() {
        // PUSH2 0x5b5b; JUMPDEST.
        let code = [PUSH1 + 1, JUMPDEST, JUMPDEST, JUMPDEST];
        let map = jumpdest_bitmap(&code);
        assert_eq!(map, vec![false, false, false, true]);
    }
}
