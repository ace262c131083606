//! Blocks and block bodies.

use crate::{Header, Transaction, EMPTY_OMMERS_HASH};
use alloy_primitives::{keccak256, B256};
use ember_rlp::{encode, Decodable, Encodable, Item, RlpError, RlpResult};

/// A complete block: header, transaction list, and ommer headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// The sealed header.
    pub header: Header,
    /// Transactions applied by the block, in execution order.
    pub transactions: Vec<Transaction>,
    /// Referenced stale headers, at most two.
    pub ommers: Vec<Header>,
}

impl Block {
    /// The block hash, which is the header hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// Keccak-256 of the RLP of the ommer list, the value `header.ommers_hash`
    /// must carry.
    pub fn ommers_hash(&self) -> B256 {
        ommers_hash(&self.ommers)
    }

    /// Splits off the body for wire transfer.
    pub fn body(&self) -> BlockBody {
        BlockBody { transactions: self.transactions.clone(), ommers: self.ommers.clone() }
    }

    /// Reassembles a block from a header and a fetched body.
    pub fn from_parts(header: Header, body: BlockBody) -> Self {
        Self { header, transactions: body.transactions, ommers: body.ommers }
    }

    /// True when the header commits to a body with no transactions and no
    /// ommers, in which case sync skips the body fetch.
    pub fn header_implies_empty_body(header: &Header) -> bool {
        header.transactions_root == crate::EMPTY_ROOT_HASH
            && header.ommers_hash == EMPTY_OMMERS_HASH
    }
}

/// Keccak-256 of an RLP-encoded ommer header list.
pub fn ommers_hash(ommers: &[Header]) -> B256 {
    keccak256(encode(&ommers.to_vec().to_rlp()))
}

impl Encodable for Block {
    fn to_rlp(&self) -> Item {
        Item::list(vec![
            self.header.to_rlp(),
            self.transactions.to_rlp(),
            self.ommers.to_rlp(),
        ])
    }
}

impl Decodable for Block {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 3 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            header: Header::from_rlp(&fields[0])?,
            transactions: Vec::from_rlp(&fields[1])?,
            ommers: Vec::from_rlp(&fields[2])?,
        })
    }
}

/// The transferable part of a block: everything but the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBody {
    /// Transactions applied by the block.
    pub transactions: Vec<Transaction>,
    /// Referenced stale headers.
    pub ommers: Vec<Header>,
}

impl Encodable for BlockBody {
    fn to_rlp(&self) -> Item {
        Item::list(vec![self.transactions.to_rlp(), self.ommers.to_rlp()])
    }
}

impl Decodable for BlockBody {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 2 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            transactions: Vec::from_rlp(&fields[0])?,
            ommers: Vec::from_rlp(&fields[1])?,
        })
    }
}
