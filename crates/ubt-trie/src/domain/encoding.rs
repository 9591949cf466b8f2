//! # Leaf Value Encodings
//!
//! Byte layouts for the values stored in trie leaves, plus the slim
//! account decoding used at the host boundary.
//!
//! ## Basic Data Leaf
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | version (0) |
//! | 1 | 4 | reserved |
//! | 5 | 3 | code size (big-endian) |
//! | 8 | 8 | nonce (big-endian) |
//! | 16 | 16 | balance (big-endian) |
//!
//! ## Code Chunk Leaf
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | leading pushdata length (0-31) |
//! | 1 | 31 | code bytes, zero padded |
//!
//! ## Storage Values
//!
//! Slot values cross the host boundary with leading zero bytes stripped;
//! readers zero-extend on the left. The all-zero value is never stored -
//! writing zero is a delete.

use super::errors::TrieError;
use super::rlp;
use primitive_types::U256;
use shared_types::{Hash, StorageValue, EMPTY_CODE_HASH, EMPTY_MPT_ROOT};

/// Code bytes carried per chunk leaf.
pub const CODE_CHUNK_SIZE: usize = 31;

/// Basic-data leaf version written by this implementation.
pub const BASIC_DATA_VERSION: u8 = 0;

/// An account as represented in the binary trie.
///
/// `code_hash == EMPTY_CODE_HASH` iff `code_size == 0`; constructors and
/// decoders reject the inconsistent combinations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UbtAccount {
    /// Account balance in base units.
    pub balance: U256,
    /// Transaction nonce.
    pub nonce: u64,
    /// Keccak256 hash of contract code. EMPTY_CODE_HASH for non-contracts.
    pub code_hash: Hash,
    /// Length of the contract code in bytes.
    pub code_size: u32,
}

impl UbtAccount {
    /// Create an account, enforcing code hash / code size consistency.
    pub fn new(balance: U256, nonce: u64, code_hash: Hash, code_size: u32) -> Result<Self, TrieError> {
        check_code_consistency(&code_hash, code_size)?;
        Ok(Self {
            balance,
            nonce,
            code_hash,
            code_size,
        })
    }

    /// An account without code.
    pub fn basic(balance: U256, nonce: u64) -> Self {
        Self {
            balance,
            nonce,
            code_hash: EMPTY_CODE_HASH,
            code_size: 0,
        }
    }

    /// Whether this account carries contract code.
    pub fn has_code(&self) -> bool {
        self.code_size > 0
    }
}

fn check_code_consistency(code_hash: &Hash, code_size: u32) -> Result<(), TrieError> {
    let empty = *code_hash == EMPTY_CODE_HASH;
    if empty != (code_size == 0) {
        return Err(TrieError::Encode {
            reason: format!(
                "code size {code_size} inconsistent with code hash {}",
                shared_types::short_hash(code_hash)
            ),
        });
    }
    Ok(())
}

/// Pack nonce, balance and code size into the basic-data leaf value.
///
/// Balances wider than 128 bits do not fit the layout and are rejected.
pub fn pack_basic_data(account: &UbtAccount) -> Result<[u8; 32], TrieError> {
    if account.balance.bits() > 128 {
        return Err(TrieError::Encode {
            reason: format!("balance {} exceeds 128 bits", account.balance),
        });
    }

    let mut value = [0u8; 32];
    value[0] = BASIC_DATA_VERSION;
    value[5..8].copy_from_slice(&account.code_size.to_be_bytes()[1..4]);
    value[8..16].copy_from_slice(&account.nonce.to_be_bytes());

    let mut balance = [0u8; 32];
    account.balance.to_big_endian(&mut balance);
    value[16..32].copy_from_slice(&balance[16..32]);

    Ok(value)
}

/// Unpack a basic-data leaf together with the code-hash leaf into an
/// account record.
pub fn unpack_account(basic_data: &[u8; 32], code_hash: Option<Hash>) -> Result<UbtAccount, TrieError> {
    if basic_data[0] != BASIC_DATA_VERSION {
        return Err(TrieError::Decode {
            reason: format!("unsupported basic data version {}", basic_data[0]),
        });
    }

    let code_size = u32::from_be_bytes([0, basic_data[5], basic_data[6], basic_data[7]]);
    let nonce = u64::from_be_bytes(basic_data[8..16].try_into().expect("fixed slice"));
    let balance = U256::from_big_endian(&basic_data[16..32]);
    let code_hash = code_hash.unwrap_or(EMPTY_CODE_HASH);

    check_code_consistency(&code_hash, code_size).map_err(|_| TrieError::Decode {
        reason: format!(
            "code size {code_size} inconsistent with code hash {}",
            shared_types::short_hash(&code_hash)
        ),
    })?;

    Ok(UbtAccount {
        balance,
        nonce,
        code_hash,
        code_size,
    })
}

/// Number of chunk leaves covering `code_size` bytes of code.
pub fn code_chunk_count(code_size: usize) -> u32 {
    ((code_size + CODE_CHUNK_SIZE - 1) / CODE_CHUNK_SIZE) as u32
}

/// Pack code chunk `chunk_id` of `code` into its leaf value, or `None`
/// when the chunk lies beyond the code.
pub fn pack_code_chunk(code: &[u8], chunk_id: u32) -> Option<[u8; 32]> {
    let start = chunk_id as usize * CODE_CHUNK_SIZE;
    if start >= code.len() {
        return None;
    }
    let end = (start + CODE_CHUNK_SIZE).min(code.len());

    let mut value = [0u8; 32];
    value[0] = leading_pushdata(code, start);
    value[1..1 + (end - start)].copy_from_slice(&code[start..end]);
    Some(value)
}

/// Count the leading bytes of the chunk starting at `chunk_start` that are
/// immediate data of a PUSH instruction beginning in an earlier chunk.
///
/// Truncated bytecode may end inside a PUSH immediate; the declared
/// immediate width is clamped to the remaining code.
fn leading_pushdata(code: &[u8], chunk_start: usize) -> u8 {
    if chunk_start == 0 {
        return 0;
    }

    let mut pos = 0usize;
    while pos < chunk_start && pos < code.len() {
        let opcode = code[pos];
        let push_size = if (0x60..=0x7f).contains(&opcode) {
            let declared = (opcode - 0x5f) as usize;
            declared.min(code.len().saturating_sub(pos + 1))
        } else {
            0
        };

        let next = pos + 1 + push_size;
        if next > chunk_start {
            return (next - chunk_start).min(CODE_CHUNK_SIZE) as u8;
        }
        pos = next;
    }
    0
}

/// Strip leading zero bytes from a storage value for the wire form.
pub fn strip_storage_value(value: &StorageValue) -> Vec<u8> {
    let start = value.iter().position(|&b| b != 0).unwrap_or(32);
    value[start..].to_vec()
}

/// Zero-extend a wire-form storage value back to 32 bytes. Inputs wider
/// than 32 bytes are rejected.
pub fn extend_storage_value(encoded: &[u8]) -> Result<StorageValue, TrieError> {
    if encoded.len() > 32 {
        return Err(TrieError::Decode {
            reason: format!("storage value of {} bytes exceeds a word", encoded.len()),
        });
    }
    let mut value = [0u8; 32];
    value[32 - encoded.len()..].copy_from_slice(encoded);
    Ok(value)
}

// =============================================================================
// SLIM ACCOUNTS
// =============================================================================

/// An account as the host MPT hands it over: slim-RLP decoded.
///
/// The slim form replaces the empty storage root and the empty code hash
/// with empty byte strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlimAccount {
    pub nonce: u64,
    pub balance: U256,
    /// MPT storage root. `EMPTY_MPT_ROOT` when the account has no storage.
    pub storage_root: Hash,
    pub code_hash: Hash,
}

impl SlimAccount {
    /// Whether the account has contract storage in the MPT.
    pub fn has_storage(&self) -> bool {
        self.storage_root != EMPTY_MPT_ROOT
    }

    /// Whether the account has contract code.
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

/// Decode a slim-RLP account: `[nonce, balance, storage_root, code_hash]`
/// with empty byte strings standing in for the empty root and hash.
pub fn decode_slim_account(data: &[u8]) -> Result<SlimAccount, TrieError> {
    let mut items = rlp::decode_list(data)?;

    let nonce = rlp::next_uint(&mut items)?;
    let balance_bytes = rlp::next_bytes(&mut items)?;
    if balance_bytes.len() > 32 {
        return Err(TrieError::Decode {
            reason: "balance wider than 256 bits".into(),
        });
    }
    let balance = U256::from_big_endian(balance_bytes);

    let storage_root = decode_slim_hash(rlp::next_bytes(&mut items)?, EMPTY_MPT_ROOT)?;
    let code_hash = decode_slim_hash(rlp::next_bytes(&mut items)?, EMPTY_CODE_HASH)?;

    if !items.is_empty() {
        return Err(TrieError::Decode {
            reason: "trailing fields in slim account".into(),
        });
    }

    Ok(SlimAccount {
        nonce,
        balance,
        storage_root,
        code_hash,
    })
}

/// Encode an account into its slim-RLP form.
pub fn encode_slim_account(account: &SlimAccount) -> Vec<u8> {
    let mut payload = Vec::with_capacity(80);
    rlp::encode_uint(&mut payload, account.nonce);

    if account.balance.is_zero() {
        rlp::encode_uint(&mut payload, 0);
    } else {
        let mut balance = [0u8; 32];
        account.balance.to_big_endian(&mut balance);
        let start = balance.iter().position(|&b| b != 0).unwrap_or(31);
        rlp::encode_bytes(&mut payload, &balance[start..]);
    }

    encode_slim_hash(&mut payload, &account.storage_root, &EMPTY_MPT_ROOT);
    encode_slim_hash(&mut payload, &account.code_hash, &EMPTY_CODE_HASH);
    rlp::encode_list(payload)
}

fn decode_slim_hash(bytes: &[u8], empty: Hash) -> Result<Hash, TrieError> {
    match bytes.len() {
        0 => Ok(empty),
        32 => Ok(bytes.try_into().expect("fixed slice")),
        n => Err(TrieError::Decode {
            reason: format!("hash field of {n} bytes"),
        }),
    }
}

fn encode_slim_hash(out: &mut Vec<u8>, hash: &Hash, empty: &Hash) {
    if hash == empty {
        rlp::encode_bytes(out, &[]);
    } else {
        rlp::encode_bytes(out, hash);
    }
}
