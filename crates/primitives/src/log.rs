//! Log entries emitted by contract execution, and their bloom accrual.

use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use ember_rlp::{Decodable, Encodable, Item, RlpError, RlpResult};

/// A log entry: the emitting address, up to four indexed topics, and opaque
/// data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// The address whose code emitted the log.
    pub address: Address,
    /// Indexed topics, at most four.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
}

impl Log {
    /// Folds the log's address and topics into `bloom`, three 11-bit indices
    /// per item.
    pub fn accrue_to(&self, bloom: &mut Bloom) {
        bloom.accrue(BloomInput::Raw(self.address.as_slice()));
        for topic in &self.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
}

/// The 2048-bit bloom filter summarizing a sequence of logs.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        log.accrue_to(&mut bloom);
    }
    bloom
}

impl Encodable for Log {
    fn to_rlp(&self) -> Item {
        Item::list(vec![
            self.address.to_rlp(),
            self.topics.to_rlp(),
            self.data.to_rlp(),
        ])
    }
}

impl Decodable for Log {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 3 {
            return Err(RlpError::UnexpectedLength);
        }
        Ok(Self {
            address: Address::from_rlp(&fields[0])?,
            topics: Vec::from_rlp(&fields[1])?,
            data: Bytes::from_rlp(&fields[2])?,
        })
    }
}
