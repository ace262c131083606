#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{SpecError, SpecResult};

mod fork;
pub use fork::{Fork, ForkSchedule};

mod spec;
pub use spec::{ChainSpec, Genesis};

mod enode;
pub use enode::Enode;
