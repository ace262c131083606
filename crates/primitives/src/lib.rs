#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{b256, B256};

mod errors;
pub use errors::{SignatureError, SignatureResult};

mod account;
pub use account::Account;

mod log;
pub use log::{logs_bloom, Log};

mod transaction;
pub use transaction::Transaction;

mod header;
pub use header::Header;

mod block;
pub use block::{Block, BlockBody};

mod receipt;
pub use receipt::{Receipt, ReceiptOutcome};

/// Keccak-256 of the empty byte string: the code hash of every account
/// without code.
pub const EMPTY_CODE_HASH: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Keccak-256 of `RLP(<>)`: the root of the empty trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Keccak-256 of `RLP([])`: the ommers hash of a block with no ommers.
pub const EMPTY_OMMERS_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
