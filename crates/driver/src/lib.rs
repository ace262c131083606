#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{DriverError, DriverResult, SourceError};

mod blocktree;
pub use blocktree::{BlockEntry, Blocktree};

mod sync;
pub use sync::{BlockSource, SyncDriver, MAX_HEADERS_PER_REQUEST};

mod handle;
pub use handle::NodeHandle;
