//! Gas constants and formulas shared by the interpreter and the transaction
//! processor.

use ember_genesis::Fork;

/// Base cost of every transaction.
pub const TX_GAS: u64 = 21_000;

/// Additional intrinsic cost of a contract-creation transaction (Homestead).
pub const TX_CREATE_GAS: u64 = 32_000;

/// Intrinsic cost per zero byte of transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Intrinsic cost per nonzero byte of transaction data, before EIP-2028.
pub const TX_DATA_NONZERO_GAS: u64 = 68;

/// Intrinsic cost per nonzero byte of transaction data under Istanbul.
pub const TX_DATA_NONZERO_GAS_EIP2028: u64 = 16;

/// Per-word cost of the copy instructions.
pub const COPY_WORD_GAS: u64 = 3;

/// Per-word cost of SHA3.
pub const SHA3_WORD_GAS: u64 = 6;

/// Per-topic cost of LOGx.
pub const LOG_TOPIC_GAS: u64 = 375;

/// Per-byte cost of LOGx data.
pub const LOG_DATA_GAS: u64 = 8;

/// Surcharge for a CALL that transfers value.
pub const CALL_VALUE_GAS: u64 = 9_000;

/// Gas gifted to the callee of a value-bearing CALL.
pub const CALL_STIPEND: u64 = 2_300;

/// Surcharge for a CALL or SELFDESTRUCT that brings a new account to life.
pub const NEW_ACCOUNT_GAS: u64 = 25_000;

/// Per-byte cost of depositing created contract code.
pub const CREATE_DATA_GAS: u64 = 200;

/// Refund for scheduling a SELFDESTRUCT.
pub const SELFDESTRUCT_REFUND: u64 = 24_000;

/// SSTORE cost when a zero slot becomes nonzero.
pub const SSTORE_SET_GAS: u64 = 20_000;

/// SSTORE cost for every other write (legacy rules).
pub const SSTORE_RESET_GAS: u64 = 5_000;

/// Refund when a nonzero slot is cleared.
pub const SSTORE_CLEAR_REFUND: u64 = 15_000;

/// The minimum gas an EIP-2200 SSTORE requires to proceed.
pub const SSTORE_SENTRY_GAS: u64 = 2_300;

/// The deployed-code size cap of EIP-170.
pub const MAX_CODE_SIZE: usize = 24_576;

/// EIP-150: the most gas a frame may forward to a sub-call.
pub const fn all_but_one_64th(gas: u64) -> u64 {
    gas - gas / 64
}

/// The number of 32-byte words covering `len` bytes.
pub const fn words_for(len: u64) -> u64 {
    len.div_ceil(32)
}

/// The intrinsic gas of a transaction: charged before any code runs.
pub fn intrinsic_gas(data: &[u8], is_create: bool, fork: Fork) -> u64 {
    let mut gas = TX_GAS;
    if is_create && fork.at_least(Fork::Homestead) {
        gas += TX_CREATE_GAS;
    }
    let nonzero_gas = if fork.at_least(Fork::Istanbul) {
        TX_DATA_NONZERO_GAS_EIP2028
    } else {
        TX_DATA_NONZERO_GAS
    };
    for &byte in data {
        gas += if byte == 0 { TX_DATA_ZERO_GAS } else { nonzero_gas };
    }
    gas
}

/// Frame-local gas accounting.
#[derive(Debug, Clone, Copy)]
pub struct Gas {
    remaining: u64,
}

impl Gas {
    /// A meter holding `limit` gas.
    pub const fn new(limit: u64) -> Self {
        Self { remaining: limit }
    }

    /// The gas left in the frame.
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Deducts `cost`, halting the frame with `OutOfGas` when short. An
    /// out-of-gas halt consumes everything that remained.
    pub fn charge(&mut self, cost: u64) -> Result<(), crate::VmError> {
        if cost > self.remaining {
            self.remaining = 0;
            return Err(crate::VmError::OutOfGas);
        }
        self.remaining -= cost;
        Ok(())
    }

    /// Returns unused sub-call gas to the frame.
    pub fn refund(&mut self, gas: u64) {
        self.remaining += gas;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intrinsic_simple_transfer() {
        assert_eq!(intrinsic_gas(&[], false, Fork::Homestead), 21_000);
    }

    #[test]
    fn test_intrinsic_data_bytes() {
        let data = [0x00, 0x01, 0x00, 0xFF];
        assert_eq!(intrinsic_gas(&data, false, Fork::Byzantium), 21_000 + 4 + 68 + 4 + 68);
        assert_eq!(intrinsic_gas(&data, false, Fork::Istanbul), 21_000 + 4 + 16 + 4 + 16);
    }

    #[test]
    fn test_intrinsic_creation() {
        assert_eq!(intrinsic_gas(&[], true, Fork::Byzantium), 53_000);
        // Frontier priced creations like calls.
        assert_eq!(intrinsic_gas(&[], true, Fork::Frontier), 21_000);
    }

    #[test]
    fn test_all_but_one_64th() {
        assert_eq!(all_but_one_64th(6400), 6300);
        assert_eq!(all_but_one_64th(63), 63);
    }

    #[test]
    fn test_gas_meter() {
        let mut gas = Gas::new(100);
        gas.charge(40).unwrap();
        assert_eq!(gas.remaining(), 60);
        assert_eq!(gas.charge(61), Err(crate::VmError::OutOfGas));
        assert_eq!(gas.remaining(), 0);
    }
}
