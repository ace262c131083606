//! This module contains the [Item] type, the recursive sum type all RLP streams decode to.

use crate::{RlpError, RlpResult};
use alloy_primitives::U256;

/// An RLP item: either an opaque byte string or an ordered list of nested items.
///
/// Lists may be empty and may nest without bound. Byte payloads are arbitrary;
/// interpretation (integers, hashes, addresses) is layered on top by accessors
/// and by the [Decodable](crate::Decodable) trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// An ordered, possibly empty, possibly nested list of items.
    List(Vec<Item>),
}

impl Item {
    /// Constructs a byte-string item.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Constructs a list item.
    pub fn list(items: impl Into<Vec<Item>>) -> Self {
        Self::List(items.into())
    }

    /// The empty byte string, the canonical encoding of integer zero.
    pub const fn empty() -> Self {
        Self::Bytes(Vec::new())
    }

    /// The empty list.
    pub const fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    /// Constructs an item holding the minimal big-endian encoding of `value`.
    /// Zero encodes as the empty string.
    pub fn from_uint(value: U256) -> Self {
        Self::Bytes(value.to_be_bytes_trimmed_vec())
    }

    /// Constructs an item holding the minimal big-endian encoding of `value`.
    pub fn from_u64(value: u64) -> Self {
        Self::from_uint(U256::from(value))
    }

    /// Returns the byte payload, or [RlpError::UnexpectedList] for a list item.
    pub fn as_bytes(&self) -> RlpResult<&[u8]> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::List(_) => Err(RlpError::UnexpectedList),
        }
    }

    /// Returns the nested items, or [RlpError::UnexpectedString] for a byte item.
    pub fn as_list(&self) -> RlpResult<&[Item]> {
        match self {
            Self::List(items) => Ok(items),
            Self::Bytes(_) => Err(RlpError::UnexpectedString),
        }
    }

    /// Interprets the payload as a minimal big-endian unsigned integer.
    pub fn as_u256(&self) -> RlpResult<U256> {
        let bytes = self.as_bytes()?;
        if bytes.first() == Some(&0) {
            return Err(RlpError::NonMinimal);
        }
        U256::try_from_be_slice(bytes).ok_or(RlpError::Overflow)
    }

    /// Interprets the payload as a minimal big-endian `u64`.
    pub fn as_u64(&self) -> RlpResult<u64> {
        let value = self.as_u256()?;
        u64::try_from(value).map_err(|_| RlpError::Overflow)
    }

    /// Interprets the payload as exactly `N` bytes.
    pub fn as_fixed<const N: usize>(&self) -> RlpResult<[u8; N]> {
        let bytes = self.as_bytes()?;
        bytes.try_into().map_err(|_| RlpError::UnexpectedLength)
    }

    /// True for the empty byte string.
    pub fn is_empty_bytes(&self) -> bool {
        matches!(self, Self::Bytes(b) if b.is_empty())
    }
}
