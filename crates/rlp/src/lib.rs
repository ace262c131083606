#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{RlpError, RlpResult};

mod item;
pub use item::Item;

mod encode;
pub use encode::{encode, encode_to, Encodable};

mod decode;
pub use decode::{decode, Decodable};
