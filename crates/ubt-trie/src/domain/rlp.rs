//! # Minimal RLP Helpers
//!
//! Just enough RLP to encode and decode slim account records as the host
//! chain hands them over. Not a general-purpose RLP library.

use super::errors::TrieError;
use shared_types::Hash;
use sha3::{Digest, Keccak256};

/// Compute Keccak256 hash.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// RLP-encode a byte slice.
pub fn encode_bytes(out: &mut Vec<u8>, data: &[u8]) {
    if data.len() == 1 && data[0] < 0x80 {
        out.push(data[0]);
    } else if data.len() < 56 {
        out.push(0x80 + data.len() as u8);
        out.extend_from_slice(data);
    } else {
        let len_bytes = minimal_be(data.len() as u64);
        out.push(0xb7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
    }
}

/// RLP-encode an unsigned integer as a minimal big-endian byte string.
pub fn encode_uint(out: &mut Vec<u8>, value: u64) {
    if value == 0 {
        out.push(0x80);
    } else {
        let bytes = minimal_be(value);
        encode_bytes(out, &bytes);
    }
}

/// Wrap already-encoded items in an RLP list header.
pub fn encode_list(payload: Vec<u8>) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + 9);
    if payload.len() < 56 {
        result.push(0xc0 + payload.len() as u8);
    } else {
        let len_bytes = minimal_be(payload.len() as u64);
        result.push(0xf7 + len_bytes.len() as u8);
        result.extend_from_slice(&len_bytes);
    }
    result.extend(payload);
    result
}

fn minimal_be(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    bytes[start..].to_vec()
}

// =============================================================================
// DECODING
// =============================================================================

/// A borrowed RLP item: either a byte string or a list payload.
#[derive(Debug, PartialEq, Eq)]
pub enum Item<'a> {
    Bytes(&'a [u8]),
    List(&'a [u8]),
}

/// Decode the single item at the front of `data`, returning it and the
/// remaining bytes.
pub fn decode_item(data: &[u8]) -> Result<(Item<'_>, &[u8]), TrieError> {
    let first = *data.first().ok_or_else(|| malformed("empty input"))?;
    match first {
        0x00..=0x7f => Ok((Item::Bytes(&data[..1]), &data[1..])),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            slice_payload(&data[1..], len).map(|(p, rest)| (Item::Bytes(p), rest))
        }
        0xb8..=0xbf => {
            let (len, body) = long_length(&data[1..], first - 0xb7)?;
            slice_payload(body, len).map(|(p, rest)| (Item::Bytes(p), rest))
        }
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            slice_payload(&data[1..], len).map(|(p, rest)| (Item::List(p), rest))
        }
        0xf8..=0xff => {
            let (len, body) = long_length(&data[1..], first - 0xf7)?;
            slice_payload(body, len).map(|(p, rest)| (Item::List(p), rest))
        }
    }
}

/// Decode a list header and return its payload. Trailing bytes after the
/// list are rejected.
pub fn decode_list(data: &[u8]) -> Result<&[u8], TrieError> {
    match decode_item(data)? {
        (Item::List(payload), rest) if rest.is_empty() => Ok(payload),
        (Item::List(_), _) => Err(malformed("trailing bytes after list")),
        (Item::Bytes(_), _) => Err(malformed("expected list, found byte string")),
    }
}

/// Decode the next byte-string item from a list payload.
pub fn next_bytes<'a>(payload: &mut &'a [u8]) -> Result<&'a [u8], TrieError> {
    match decode_item(payload)? {
        (Item::Bytes(bytes), rest) => {
            *payload = rest;
            Ok(bytes)
        }
        (Item::List(_), _) => Err(malformed("expected byte string, found list")),
    }
}

/// Decode the next item as an unsigned integer.
pub fn next_uint(payload: &mut &[u8]) -> Result<u64, TrieError> {
    let bytes = next_bytes(payload)?;
    if bytes.len() > 8 {
        return Err(malformed("integer wider than 64 bits"));
    }
    if bytes.first() == Some(&0) {
        return Err(malformed("integer has leading zero"));
    }
    let mut value = 0u64;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    Ok(value)
}

fn long_length(data: &[u8], len_of_len: u8) -> Result<(usize, &[u8]), TrieError> {
    let len_of_len = len_of_len as usize;
    if data.len() < len_of_len {
        return Err(malformed("truncated length"));
    }
    let mut len = 0usize;
    for &b in &data[..len_of_len] {
        len = len
            .checked_mul(256)
            .and_then(|l| l.checked_add(b as usize))
            .ok_or_else(|| malformed("length overflow"))?;
    }
    if len < 56 {
        return Err(malformed("non-minimal long length"));
    }
    Ok((len, &data[len_of_len..]))
}

fn slice_payload(data: &[u8], len: usize) -> Result<(&[u8], &[u8]), TrieError> {
    if data.len() < len {
        return Err(malformed("truncated payload"));
    }
    Ok(data.split_at(len))
}

fn malformed(reason: &str) -> TrieError {
    TrieError::Decode {
        reason: format!("rlp: {reason}"),
    }
}
