#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::VmError;

mod stack;
pub use stack::{Stack, STACK_LIMIT};

mod memory;
pub use memory::Memory;

mod host;
pub use host::{BlockEnv, Host};

mod message;
pub use message::{CallKind, Execution, Message, Status};

pub mod gas;
pub mod opcode;

mod interpreter;
pub use interpreter::{create2_address, create_address, Evm, CALL_DEPTH_LIMIT};

mod calls;

mod precompile;
pub use precompile::is_precompile;

#[cfg(test)]
mod test_utils;
