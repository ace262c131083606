#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{ExecutorError, ExecutorResult, ValidationError};

mod state;
pub use state::StateDb;

mod difficulty;
pub use difficulty::calc_difficulty;

mod ethash;
pub use ethash::{cache_size, dataset_size, hashimoto_light, make_cache, seed_hash, EPOCH_LENGTH};

mod seal;
pub use seal::{EthashVerifier, NoopSeal, SealVerifier};

mod processor;
pub use processor::{block_env, BlockExecutor, BlockOutcome, CallRequest};
