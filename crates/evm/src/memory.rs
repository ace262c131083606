//! Byte-addressed machine memory with quadratic expansion pricing.

use crate::VmError;
use alloy_primitives::U256;

/// The linear-term coefficient of the memory cost formula.
const MEMORY_GAS: u64 = 3;

/// The divisor of the quadratic term of the memory cost formula.
const QUAD_COEFF_DIV: u64 = 512;

/// Machine memory: logically infinite, zero-initialized, charged by the
/// highest-addressed word touched at `3·w + w²/512` gas.
///
/// Expansion is two-phase: [Memory::expansion_cost] prices an access, and
/// [Memory::grow] materializes it once the caller has charged the gas. Growth
/// before payment would let absurd offsets allocate unbounded memory.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently materialized size in bytes, always a multiple of 32.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True before the first expansion.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The incremental gas cost of covering `offset + len`. A zero-length
    /// access is free and never expands. Offsets past the gas-payable range
    /// price as out-of-gas.
    pub fn expansion_cost(&self, offset: U256, len: U256) -> Result<u64, VmError> {
        if len.is_zero() {
            return Ok(0);
        }
        let end = offset
            .checked_add(len)
            .and_then(|end| u64::try_from(end).ok())
            .ok_or(VmError::OutOfGas)?;
        let new_words = end.div_ceil(32);
        let current_words = (self.bytes.len() as u64) / 32;
        if new_words <= current_words {
            return Ok(0);
        }
        Ok(Self::words_cost(new_words) - Self::words_cost(current_words))
    }

    /// Materializes memory to cover `offset + len`. Call only after the
    /// corresponding [Memory::expansion_cost] has been charged.
    pub fn grow(&mut self, offset: U256, len: U256) {
        if len.is_zero() {
            return;
        }
        let end = (offset + len).to::<u64>();
        let new_len = (end.div_ceil(32) * 32) as usize;
        if new_len > self.bytes.len() {
            self.bytes.resize(new_len, 0);
        }
    }

    /// The total cost of a memory of `words` 32-byte words.
    fn words_cost(words: u64) -> u64 {
        words
            .saturating_mul(MEMORY_GAS)
            .saturating_add(words.saturating_mul(words) / QUAD_COEFF_DIV)
    }

    /// Reads `len` bytes at `offset`. The range must have been grown.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        self.bytes[offset..offset + len].to_vec()
    }

    /// Reads the 32-byte word at `offset`.
    pub fn read_word(&self, offset: usize) -> U256 {
        U256::from_be_slice(&self.bytes[offset..offset + 32])
    }

    /// Writes `data` at `offset`. The range must have been grown.
    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Writes `data` at `offset`, zero-padding up to `len` bytes (the copy
    /// semantics of CALLDATACOPY and friends).
    pub fn write_padded(&mut self, offset: usize, len: usize, data: &[u8]) {
        let copy_len = data.len().min(len);
        self.bytes[offset..offset + copy_len].copy_from_slice(&data[..copy_len]);
        self.bytes[offset + copy_len..offset + len].fill(0);
    }
}
