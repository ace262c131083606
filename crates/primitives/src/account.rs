//! The persistent account record stored in the world-state trie.

use crate::{EMPTY_CODE_HASH, EMPTY_ROOT_HASH};
use alloy_primitives::{B256, U256};
use ember_rlp::{Decodable, Encodable, Item, RlpError, RlpResult};

/// The state of one account: `(nonce, balance, storage_root, code_hash)`,
/// keyed in the world-state trie by the Keccak-256 of the 20-byte address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Number of transactions sent from (or contracts created by) the account.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    /// Keccak-256 of the account's code.
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

impl Account {
    /// An account holding `balance` wei and nothing else.
    pub fn with_balance(balance: U256) -> Self {
        Self { balance, ..Default::default() }
    }

    /// True for accounts that are empty per EIP-161: zero nonce, zero
    /// balance, no code. Empty accounts are removed from state when touched.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    /// True when the account has deployed code.
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

impl Encodable for Account {
    fn to_rlp(&self) -> Item {
        Item::list(vec![
            self.nonce.to_rlp(),
            self.balance.to_rlp(),
            self.storage_root.to_rlp(),
            self.code_hash.to_rlp(),
        ])
    }
}

impl Decodable for Account {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 4 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            nonce: u64::from_rlp(&fields[0])?,
            balance: U256::from_rlp(&fields[1])?,
            storage_root: B256::from_rlp(&fields[2])?,
            code_hash: B256::from_rlp(&fields[3])?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_account() {
        let account = Account::default();
        assert!(account.is_empty());
        assert!(!account.has_code());
        assert_eq!(account.storage_root, EMPTY_ROOT_HASH);
    }

    #[test]
    fn test_roundtrip() {
        let account = Account {
            nonce: 7,
            balance: U256::from(10u64.pow(18)),
            storage_root: EMPTY_ROOT_HASH,
            code_hash: alloy_primitives::keccak256(b"code"),
        };
        let decoded = Account::decode_bytes(&account.rlp_bytes()).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn test_funded_account_not_empty() {
        assert!(!Account::with_balance(U256::from(1)).is_empty());
    }
}
