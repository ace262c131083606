//! The 15-field block header.

use crate::{EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH};
use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256};
use ember_rlp::{encode, Decodable, Encodable, Item, RlpError, RlpResult};

/// A block header. Field order is the yellow-paper RLP order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Keccak-256 of the parent block's header.
    pub parent_hash: B256,
    /// Keccak-256 of the RLP of the ommer header list.
    pub ommers_hash: B256,
    /// Recipient of block rewards and fees.
    pub beneficiary: Address,
    /// Root of the world-state trie after this block.
    pub state_root: B256,
    /// Root of the `index -> transaction` trie.
    pub transactions_root: B256,
    /// Root of the `index -> receipt` trie.
    pub receipts_root: B256,
    /// Union of every receipt's bloom.
    pub logs_bloom: Bloom,
    /// Proof-of-work difficulty target.
    pub difficulty: U256,
    /// Block height; the genesis block is number zero.
    pub number: u64,
    /// Gas ceiling for the block.
    pub gas_limit: u64,
    /// Gas consumed by all transactions in the block.
    pub gas_used: u64,
    /// Unix timestamp at sealing.
    pub timestamp: u64,
    /// Arbitrary sealing extra, at most 32 bytes.
    pub extra_data: Bytes,
    /// Ethash mix digest.
    pub mix_hash: B256,
    /// Ethash 8-byte nonce.
    pub nonce: B64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: B256::ZERO,
            ommers_hash: EMPTY_OMMERS_HASH,
            beneficiary: Address::ZERO,
            state_root: EMPTY_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: B256::ZERO,
            nonce: B64::ZERO,
        }
    }
}

impl Header {
    /// The block hash: Keccak-256 of the full header RLP.
    pub fn hash(&self) -> B256 {
        keccak256(self.rlp_bytes())
    }

    /// The hash the proof-of-work seals: the header RLP with `mix_hash` and
    /// `nonce` omitted.
    pub fn seal_hash(&self) -> B256 {
        let fields = self.field_items();
        keccak256(encode(&Item::list(fields[..13].to_vec())))
    }

    fn field_items(&self) -> Vec<Item> {
        vec![
            self.parent_hash.to_rlp(),
            self.ommers_hash.to_rlp(),
            self.beneficiary.to_rlp(),
            self.state_root.to_rlp(),
            self.transactions_root.to_rlp(),
            self.receipts_root.to_rlp(),
            Item::bytes(self.logs_bloom.as_slice()),
            self.difficulty.to_rlp(),
            self.number.to_rlp(),
            self.gas_limit.to_rlp(),
            self.gas_used.to_rlp(),
            self.timestamp.to_rlp(),
            self.extra_data.to_rlp(),
            self.mix_hash.to_rlp(),
            self.nonce.to_rlp(),
        ]
    }
}

impl Encodable for Header {
    fn to_rlp(&self) -> Item {
        Item::list(self.field_items())
    }
}

impl Decodable for Header {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 15 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            parent_hash: B256::from_rlp(&fields[0])?,
            ommers_hash: B256::from_rlp(&fields[1])?,
            beneficiary: Address::from_rlp(&fields[2])?,
            state_root: B256::from_rlp(&fields[3])?,
            transactions_root: B256::from_rlp(&fields[4])?,
            receipts_root: B256::from_rlp(&fields[5])?,
            logs_bloom: Bloom::new(fields[6].as_fixed()?),
            difficulty: U256::from_rlp(&fields[7])?,
            number: u64::from_rlp(&fields[8])?,
            gas_limit: u64::from_rlp(&fields[9])?,
            gas_used: u64::from_rlp(&fields[10])?,
            timestamp: u64::from_rlp(&fields[11])?,
            extra_data: Bytes::from_rlp(&fields[12])?,
            mix_hash: B256::from_rlp(&fields[13])?,
            nonce: B64::from_rlp(&fields[14])?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::{address, b64};

    fn sample_header() -> Header {
        Header {
            parent_hash: keccak256(b"parent"),
            beneficiary: address!("2adc25665018aa1fe0e6bc666dac8fc2697ff9ba"),
            difficulty: U256::from(131_072u64),
            number: 5,
            gas_limit: 5000,
            gas_used: 21000,
            timestamp: 1_438_269_988,
            extra_data: Bytes::from_static(b"ember"),
            mix_hash: keccak256(b"mix"),
            nonce: b64!("0000000000000042"),
            ..Default::default()
        }
    }

    #[test]
    fn test_roundtrip() {
        let header = sample_header();
        assert_eq!(Header::decode_bytes(&header.rlp_bytes()).unwrap(), header);
    }

    #[test]
    fn test_seal_hash_excludes_seal_fields() {
        let header = sample_header();
        let mut resealed = header.clone();
        resealed.mix_hash = keccak256(b"other mix");
        resealed.nonce = b64!("00000000000000ff");

        assert_eq!(header.seal_hash(), resealed.seal_hash());
        assert_ne!(header.hash(), resealed.hash());
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let Item::List(mut fields) = sample_header().to_rlp() else { panic!() };
        fields.pop();
        let truncated = ember_rlp::encode(&Item::List(fields));
        assert_eq!(Header::decode_bytes(&truncated), Err(RlpError::UnexpectedLength));
    }
}
