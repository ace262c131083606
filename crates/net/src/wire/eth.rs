//! The `eth/63` block-synchronization subprotocol.

use crate::{NetError, NetResult};
use alloy_primitives::{B256, U256};
use ember_primitives::{Block, BlockBody, Header, Receipt, Transaction};
use ember_rlp::{decode, encode, Decodable, Encodable, Item, RlpError};

/// The eth protocol version spoken.
pub const ETH_PROTOCOL_VERSION: u64 = 63;

/// The session-gating status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The eth protocol version.
    pub protocol_version: u64,
    /// The chain id.
    pub network_id: u64,
    /// Total difficulty of the sender's best chain.
    pub total_difficulty: U256,
    /// Hash of the sender's best block.
    pub best_hash: B256,
    /// The sender's genesis hash; sessions across chains are useless.
    pub genesis_hash: B256,
}

/// Where a header request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersStart {
    /// From a block hash.
    Hash(B256),
    /// From a block number.
    Number(u64),
}

/// A `GetBlockHeaders` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersRequest {
    /// First block to return.
    pub start: HeadersStart,
    /// Maximum number of headers.
    pub max: u64,
    /// Blocks to skip between consecutive headers.
    pub skip: u64,
    /// True to walk toward genesis.
    pub reverse: bool,
}

/// An eth/63 message. Ids are relative to the capability's offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthMessage {
    /// `Status (0x00)`.
    Status(Status),
    /// `NewBlockHashes (0x01)`: `(hash, number)` announcements.
    NewBlockHashes(Vec<(B256, u64)>),
    /// `Transactions (0x02)`.
    Transactions(Vec<Transaction>),
    /// `GetBlockHeaders (0x03)`.
    GetBlockHeaders(HeadersRequest),
    /// `BlockHeaders (0x04)`.
    BlockHeaders(Vec<Header>),
    /// `GetBlockBodies (0x05)`.
    GetBlockBodies(Vec<B256>),
    /// `BlockBodies (0x06)`.
    BlockBodies(Vec<BlockBody>),
    /// `NewBlock (0x07)`: a full block with its total difficulty.
    NewBlock {
        /// The propagated block.
        block: Box<Block>,
        /// The sender's total difficulty through that block.
        total_difficulty: U256,
    },
    /// `GetNodeData (0x0d)`: trie node preimages by hash.
    GetNodeData(Vec<B256>),
    /// `NodeData (0x0e)`.
    NodeData(Vec<Vec<u8>>),
    /// `GetReceipts (0x0f)`.
    GetReceipts(Vec<B256>),
    /// `Receipts (0x10)`: one receipt list per requested block.
    Receipts(Vec<Vec<Receipt>>),
}

impl EthMessage {
    /// The message id relative to the eth capability offset.
    pub const fn id(&self) -> u8 {
        match self {
            Self::Status(_) => 0x00,
            Self::NewBlockHashes(_) => 0x01,
            Self::Transactions(_) => 0x02,
            Self::GetBlockHeaders(_) => 0x03,
            Self::BlockHeaders(_) => 0x04,
            Self::GetBlockBodies(_) => 0x05,
            Self::BlockBodies(_) => 0x06,
            Self::NewBlock { .. } => 0x07,
            Self::GetNodeData(_) => 0x0D,
            Self::NodeData(_) => 0x0E,
            Self::GetReceipts(_) => 0x0F,
            Self::Receipts(_) => 0x10,
        }
    }

    /// Encodes the payload (without the id).
    pub fn payload(&self) -> Vec<u8> {
        let item = match self {
            Self::Status(status) => Item::list(vec![
                status.protocol_version.to_rlp(),
                status.network_id.to_rlp(),
                status.total_difficulty.to_rlp(),
                status.best_hash.to_rlp(),
                status.genesis_hash.to_rlp(),
            ]),
            Self::NewBlockHashes(hashes) => Item::list(
                hashes
                    .iter()
                    .map(|(hash, number)| {
                        Item::list(vec![hash.to_rlp(), Item::from_u64(*number)])
                    })
                    .collect::<Vec<_>>(),
            ),
            Self::Transactions(transactions) => transactions.to_rlp(),
            Self::GetBlockHeaders(request) => {
                let start = match request.start {
                    HeadersStart::Hash(hash) => hash.to_rlp(),
                    HeadersStart::Number(number) => Item::from_u64(number),
                };
                Item::list(vec![
                    start,
                    Item::from_u64(request.max),
                    Item::from_u64(request.skip),
                    Item::from_u64(request.reverse as u64),
                ])
            }
            Self::BlockHeaders(headers) => headers.to_rlp(),
            Self::GetBlockBodies(hashes) | Self::GetNodeData(hashes) | Self::GetReceipts(hashes) => {
                hashes.to_rlp()
            }
            Self::BlockBodies(bodies) => bodies.to_rlp(),
            Self::NewBlock { block, total_difficulty } => {
                Item::list(vec![block.to_rlp(), total_difficulty.to_rlp()])
            }
            Self::NodeData(blobs) => Item::list(
                blobs.iter().map(|blob| Item::bytes(blob.clone())).collect::<Vec<_>>(),
            ),
            Self::Receipts(lists) => {
                Item::list(lists.iter().map(Encodable::to_rlp).collect::<Vec<_>>())
            }
        };
        encode(&item)
    }

    /// Decodes a message from its relative id and payload bytes.
    pub fn from_payload(id: u8, payload: &[u8]) -> NetResult<Self> {
        let item = decode(payload)?;
        match id {
            0x00 => {
                let fields = item.as_list().map_err(NetError::from)?;
                if fields.len() < 5 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::Status(Status {
                    protocol_version: u64::from_rlp(&fields[0])?,
                    network_id: u64::from_rlp(&fields[1])?,
                    total_difficulty: U256::from_rlp(&fields[2])?,
                    best_hash: B256::from_rlp(&fields[3])?,
                    genesis_hash: B256::from_rlp(&fields[4])?,
                }))
            }
            0x01 => {
                let mut hashes = Vec::new();
                for entry in item.as_list().map_err(NetError::from)? {
                    let fields = entry.as_list().map_err(NetError::from)?;
                    if fields.len() < 2 {
                        return Err(RlpError::UnexpectedLength.into());
                    }
                    hashes.push((B256::from_rlp(&fields[0])?, u64::from_rlp(&fields[1])?));
                }
                Ok(Self::NewBlockHashes(hashes))
            }
            0x02 => Ok(Self::Transactions(Vec::from_rlp(&item)?)),
            0x03 => {
                let fields = item.as_list().map_err(NetError::from)?;
                if fields.len() < 4 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                let start = match fields[0].as_bytes().map_err(NetError::from)? {
                    bytes if bytes.len() == 32 => HeadersStart::Hash(B256::from_slice(bytes)),
                    _ => HeadersStart::Number(fields[0].as_u64().map_err(NetError::from)?),
                };
                Ok(Self::GetBlockHeaders(HeadersRequest {
                    start,
                    max: u64::from_rlp(&fields[1])?,
                    skip: u64::from_rlp(&fields[2])?,
                    reverse: u64::from_rlp(&fields[3])? != 0,
                }))
            }
            0x04 => Ok(Self::BlockHeaders(Vec::from_rlp(&item)?)),
            0x05 => Ok(Self::GetBlockBodies(Vec::from_rlp(&item)?)),
            0x06 => Ok(Self::BlockBodies(Vec::from_rlp(&item)?)),
            0x07 => {
                let fields = item.as_list().map_err(NetError::from)?;
                if fields.len() < 2 {
                    return Err(RlpError::UnexpectedLength.into());
                }
                Ok(Self::NewBlock {
                    block: Box::new(Block::from_rlp(&fields[0])?),
                    total_difficulty: U256::from_rlp(&fields[1])?,
                })
            }
            0x0D => Ok(Self::GetNodeData(Vec::from_rlp(&item)?)),
            0x0E => {
                let mut blobs = Vec::new();
                for entry in item.as_list().map_err(NetError::from)? {
                    blobs.push(entry.as_bytes().map_err(NetError::from)?.to_vec());
                }
                Ok(Self::NodeData(blobs))
            }
            0x0F => Ok(Self::GetReceipts(Vec::from_rlp(&item)?)),
            0x10 => {
                let mut lists = Vec::new();
                for entry in item.as_list().map_err(NetError::from)? {
                    lists.push(Vec::from_rlp(entry)?);
                }
                Ok(Self::Receipts(lists))
            }
            other => Err(NetError::UnknownMessage(other)),
        }
    }
}
