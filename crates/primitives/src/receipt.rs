//! Per-transaction execution receipts.

use crate::{logs_bloom, Log};
use alloy_primitives::{Bloom, B256};
use ember_rlp::{Decodable, Encodable, Item, RlpError, RlpResult};

/// The first receipt field: the intermediate state root before Byzantium, the
/// one-byte success status after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Pre-Byzantium: the state root after the transaction was applied.
    StateRoot(B256),
    /// Post-Byzantium: `true` for success, `false` for a failed execution.
    Status(bool),
}

impl ReceiptOutcome {
    /// True unless the outcome is an explicit failure status.
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Status(false))
    }
}

impl Encodable for ReceiptOutcome {
    fn to_rlp(&self) -> Item {
        match self {
            Self::StateRoot(root) => root.to_rlp(),
            Self::Status(true) => Item::bytes([1u8]),
            Self::Status(false) => Item::empty(),
        }
    }
}

impl Decodable for ReceiptOutcome {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let bytes = item.as_bytes()?;
        match bytes.len() {
            32 => Ok(Self::StateRoot(B256::from_slice(bytes))),
            0 => Ok(Self::Status(false)),
            1 if bytes[0] == 1 => Ok(Self::Status(true)),
            _ => Err(RlpError::UnexpectedLength),
        }
    }
}

/// The execution summary appended for each transaction in a block. The block
/// header's `receipts_root` commits to the `index -> receipt` trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// State root or status, fork-dependent.
    pub outcome: ReceiptOutcome,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Bloom over this transaction's logs.
    pub logs_bloom: Bloom,
    /// Logs emitted by this transaction.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Builds a receipt, deriving the bloom from `logs`.
    pub fn new(outcome: ReceiptOutcome, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self { outcome, cumulative_gas_used, logs_bloom: logs_bloom(&logs), logs }
    }
}

impl Encodable for Receipt {
    fn to_rlp(&self) -> Item {
        Item::list(vec![
            self.outcome.to_rlp(),
            self.cumulative_gas_used.to_rlp(),
            Item::bytes(self.logs_bloom.as_slice()),
            self.logs.to_rlp(),
        ])
    }
}

impl Decodable for Receipt {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 4 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            outcome: ReceiptOutcome::from_rlp(&fields[0])?,
            cumulative_gas_used: u64::from_rlp(&fields[1])?,
            logs_bloom: Bloom::new(fields[2].as_fixed()?),
            logs: Vec::from_rlp(&fields[3])?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::{Address, Bytes};

    #[test]
    fn test_status_roundtrip() {
        let receipt = Receipt::new(ReceiptOutcome::Status(true), 21000, vec![]);
        assert_eq!(Receipt::decode_bytes(&receipt.rlp_bytes()).unwrap(), receipt);
        assert!(receipt.outcome.is_success());

        let failed = Receipt::new(ReceiptOutcome::Status(false), 50000, vec![]);
        assert_eq!(Receipt::decode_bytes(&failed.rlp_bytes()).unwrap(), failed);
        assert!(!failed.outcome.is_success());
    }

    #[test]
    fn test_state_root_roundtrip() {
        let receipt = Receipt::new(
            ReceiptOutcome::StateRoot(alloy_primitives::keccak256(b"root")),
            42000,
            vec![Log {
                address: Address::repeat_byte(0x22),
                topics: vec![alloy_primitives::keccak256(b"topic")],
                data: Bytes::from_static(&[1, 2, 3]),
            }],
        );
        let decoded = Receipt::decode_bytes(&receipt.rlp_bytes()).unwrap();
        assert_eq!(decoded, receipt);
        assert_ne!(decoded.logs_bloom, Bloom::ZERO);
    }
}
