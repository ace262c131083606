//! RLP encoding: the unique byte representation of an [Item].

use crate::Item;
use alloy_primitives::{Address, Bytes, B256, B512, B64, U256};

/// Encodes `item` to its canonical RLP representation.
pub fn encode(item: &Item) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_length(item));
    encode_to(item, &mut out);
    out
}

/// Encodes `item` onto the end of `out`.
pub fn encode_to(item: &Item, out: &mut Vec<u8>) {
    match item {
        Item::Bytes(payload) => {
            // A single byte below 0x80 is its own encoding.
            if payload.len() == 1 && payload[0] < 0x80 {
                out.push(payload[0]);
            } else {
                encode_length(payload.len(), 0x80, out);
                out.extend_from_slice(payload);
            }
        }
        Item::List(items) => {
            let payload_length: usize = items.iter().map(encoded_length).sum();
            encode_length(payload_length, 0xC0, out);
            for child in items {
                encode_to(child, out);
            }
        }
    }
}

/// The length in bytes of the encoding of `item`, without materializing it.
fn encoded_length(item: &Item) -> usize {
    match item {
        Item::Bytes(payload) => {
            if payload.len() == 1 && payload[0] < 0x80 {
                1
            } else {
                length_of_length(payload.len()) + payload.len()
            }
        }
        Item::List(items) => {
            let payload_length: usize = items.iter().map(encoded_length).sum();
            length_of_length(payload_length) + payload_length
        }
    }
}

/// The size of the length header for a payload of `len` bytes.
const fn length_of_length(len: usize) -> usize {
    if len < 56 {
        1
    } else {
        1 + be_length(len)
    }
}

/// The number of bytes in the minimal big-endian encoding of `value`.
const fn be_length(value: usize) -> usize {
    (usize::BITS as usize - value.leading_zeros() as usize).div_ceil(8)
}

/// Writes a length header with the given short-form `offset` (0x80 for strings,
/// 0xC0 for lists).
fn encode_length(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let be = len.to_be_bytes();
        let be = &be[be.len() - be_length(len)..];
        out.push(offset + 55 + be.len() as u8);
        out.extend_from_slice(be);
    }
}

/// Types with a canonical [Item] representation.
pub trait Encodable {
    /// Converts `self` into an [Item].
    fn to_rlp(&self) -> Item;

    /// Encodes `self` directly to bytes.
    fn rlp_bytes(&self) -> Vec<u8> {
        encode(&self.to_rlp())
    }
}

impl Encodable for Item {
    fn to_rlp(&self) -> Item {
        self.clone()
    }
}

impl Encodable for u64 {
    fn to_rlp(&self) -> Item {
        Item::from_u64(*self)
    }
}

impl Encodable for U256 {
    fn to_rlp(&self) -> Item {
        Item::from_uint(*self)
    }
}

impl Encodable for Bytes {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.to_vec())
    }
}

impl Encodable for B64 {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.as_slice())
    }
}

impl Encodable for B256 {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.as_slice())
    }
}

impl Encodable for B512 {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.as_slice())
    }
}

impl Encodable for Address {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.as_slice())
    }
}

impl Encodable for String {
    fn to_rlp(&self) -> Item {
        Item::bytes(self.as_bytes())
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn to_rlp(&self) -> Item {
        Item::list(self.iter().map(Encodable::to_rlp).collect::<Vec<_>>())
    }
}

impl<T: Encodable> Encodable for &T {
    fn to_rlp(&self) -> Item {
        (*self).to_rlp()
    }
}
