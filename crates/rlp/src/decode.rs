//! RLP decoding: the strict inverse of [encode](crate::encode).

use crate::{Item, RlpError, RlpResult};
use alloy_primitives::{Address, Bytes, B256, B512, B64, U256};

/// Decodes a single top-level [Item] from `buf`, requiring the whole input to
/// be consumed.
pub fn decode(buf: &[u8]) -> RlpResult<Item> {
    let (item, consumed) = decode_prefixed(buf)?;
    if consumed != buf.len() {
        return Err(RlpError::TrailingBytes);
    }
    Ok(item)
}

/// Decodes one item from the front of `buf`, returning it together with the
/// number of bytes consumed.
fn decode_prefixed(buf: &[u8]) -> RlpResult<(Item, usize)> {
    let &prefix = buf.first().ok_or(RlpError::UnexpectedEof)?;
    match prefix {
        // Single byte, its own encoding.
        0x00..=0x7F => Ok((Item::Bytes(vec![prefix]), 1)),
        // Short string.
        0x80..=0xB7 => {
            let len = (prefix - 0x80) as usize;
            let payload = slice_payload(buf, 1, len)?;
            if len == 1 && payload[0] < 0x80 {
                return Err(RlpError::NonMinimal);
            }
            Ok((Item::Bytes(payload.to_vec()), 1 + len))
        }
        // Long string.
        0xB8..=0xBF => {
            let (len, header) = decode_long_length(buf, prefix - 0xB7)?;
            let payload = slice_payload(buf, header, len)?;
            Ok((Item::Bytes(payload.to_vec()), header + len))
        }
        // Short list.
        0xC0..=0xF7 => {
            let len = (prefix - 0xC0) as usize;
            let payload = slice_payload(buf, 1, len)?;
            Ok((Item::List(decode_list_payload(payload)?), 1 + len))
        }
        // Long list.
        0xF8..=0xFF => {
            let (len, header) = decode_long_length(buf, prefix - 0xF7)?;
            let payload = slice_payload(buf, header, len)?;
            Ok((Item::List(decode_list_payload(payload)?), header + len))
        }
    }
}

/// Reads a long-form length of `len_of_len` bytes, enforcing minimality.
/// Returns the payload length and the total header size.
fn decode_long_length(buf: &[u8], len_of_len: u8) -> RlpResult<(usize, usize)> {
    let len_of_len = len_of_len as usize;
    let be = slice_payload(buf, 1, len_of_len)?;
    if be[0] == 0 {
        return Err(RlpError::NonMinimal);
    }
    if len_of_len > core::mem::size_of::<usize>() {
        return Err(RlpError::Overflow);
    }
    let mut len = 0usize;
    for &byte in be {
        len = len << 8 | byte as usize;
    }
    if len < 56 {
        return Err(RlpError::UnderLong);
    }
    Ok((len, 1 + len_of_len))
}

/// Returns `buf[start..start + len]` or [RlpError::UnexpectedEof].
fn slice_payload(buf: &[u8], start: usize, len: usize) -> RlpResult<&[u8]> {
    buf.get(start..start + len).ok_or(RlpError::UnexpectedEof)
}

/// Decodes the concatenated children of a list payload. A child whose
/// announced length overruns the payload is an [RlpError::InvalidPrefix].
fn decode_list_payload(mut payload: &[u8]) -> RlpResult<Vec<Item>> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, consumed) = decode_prefixed(payload).map_err(|err| match err {
            RlpError::UnexpectedEof => RlpError::InvalidPrefix,
            other => other,
        })?;
        items.push(item);
        payload = &payload[consumed..];
    }
    Ok(items)
}

/// Types decodable from an [Item].
pub trait Decodable: Sized {
    /// Converts an [Item] into `Self`.
    fn from_rlp(item: &Item) -> RlpResult<Self>;

    /// Decodes `Self` from a full RLP byte stream.
    fn decode_bytes(buf: &[u8]) -> RlpResult<Self> {
        Self::from_rlp(&decode(buf)?)
    }
}

impl Decodable for Item {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        Ok(item.clone())
    }
}

impl Decodable for u64 {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_u64()
    }
}

impl Decodable for U256 {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_u256()
    }
}

impl Decodable for Bytes {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        Ok(Self::copy_from_slice(item.as_bytes()?))
    }
}

impl Decodable for B64 {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_fixed().map(Self::new)
    }
}

impl Decodable for B256 {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_fixed().map(Self::new)
    }
}

impl Decodable for B512 {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_fixed().map(Self::new)
    }
}

impl Decodable for Address {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_fixed().map(Self::new)
    }
}

impl Decodable for String {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        Self::from_utf8(item.as_bytes()?.to_vec()).map_err(|_| RlpError::Custom("invalid utf-8"))
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        item.as_list()?.iter().map(T::from_rlp).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode;
    use alloy_primitives::hex;
    use proptest::prelude::*;

    #[test]
    fn test_decode_strings() {
        assert_eq!(decode(&hex!("80")).unwrap(), Item::empty());
        assert_eq!(decode(&hex!("7f")).unwrap(), Item::bytes([0x7f]));
        assert_eq!(decode(&hex!("8180")).unwrap(), Item::bytes([0x80]));
        assert_eq!(decode(&hex!("83646f67")).unwrap(), Item::bytes(*b"dog"));
    }

    #[test]
    fn test_decode_lists() {
        assert_eq!(decode(&hex!("c0")).unwrap(), Item::empty_list());
        assert_eq!(
            decode(&hex!("c88363617483646f67")).unwrap(),
            Item::list(vec![Item::bytes(*b"cat"), Item::bytes(*b"dog")])
        );
    }

    #[test]
    fn test_reject_non_minimal_single_byte() {
        // 0x7f must encode as itself, not as a one-byte string.
        assert_eq!(decode(&hex!("817f")), Err(RlpError::NonMinimal));
    }

    #[test]
    fn test_reject_under_long() {
        // 3-byte payload announced through the long form.
        assert_eq!(decode(&hex!("b803646f67")), Err(RlpError::UnderLong));
    }

    #[test]
    fn test_reject_leading_zero_length() {
        let mut buf = vec![0xb9, 0x00, 0x38];
        buf.extend_from_slice(&[0u8; 56]);
        assert_eq!(decode(&buf), Err(RlpError::NonMinimal));
    }

    #[test]
    fn test_reject_truncation_and_trailing() {
        assert_eq!(decode(&hex!("83646f")), Err(RlpError::UnexpectedEof));
        assert_eq!(decode(&hex!("8080")), Err(RlpError::TrailingBytes));
        assert_eq!(decode(&[]), Err(RlpError::UnexpectedEof));
    }

    #[test]
    fn test_reject_overrunning_child() {
        // A list of length 1 whose single child announces 3 bytes.
        assert_eq!(decode(&hex!("c183")), Err(RlpError::InvalidPrefix));
    }

    fn arb_item() -> impl Strategy<Value = Item> {
        let leaf = prop::collection::vec(any::<u8>(), 0..64).prop_map(Item::Bytes);
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop::collection::vec(inner, 0..8).prop_map(Item::List)
        })
    }

    proptest! {
        #[test]
        fn test_roundtrip_item(item in arb_item()) {
            prop_assert_eq!(decode(&encode(&item)).unwrap(), item);
        }

        #[test]
        fn test_roundtrip_bytes(payload in prop::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode(&Item::bytes(payload.clone()));
            prop_assert_eq!(decode(&encoded).unwrap(), Item::bytes(payload));
        }
    }
}
