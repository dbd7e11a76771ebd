//! On-disk cache file encoding.
//!
//! Layout:
//!
//! ```text
//! [8]  magic "SFCACHE1"
//! [4]  format version, u32 LE
//! [4]  entry count, u32 LE
//! per entry:
//!   [2] key length, u16 LE
//!   [n] key bytes (UTF-8)
//!   [4] value length, u32 LE
//!   [m] value bytes
//! [32] SHA-256 over everything above
//! ```
//!
//! Any truncation, bad magic, or checksum mismatch is corruption; the caller
//! falls back to the backup chain.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::{CacheError, CacheResult};

const MAGIC: &[u8; 8] = b"SFCACHE1";
const FORMAT_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;

/// Serialize the full entry map. Entries are written in sorted key order so
/// identical content always produces identical bytes.
pub fn encode(entries: &HashMap<String, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();
    for key in keys {
        let value = &entries[key];
        out.extend_from_slice(&(key.len() as u16).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
    }

    let mut hasher = Sha256::new();
    hasher.update(&out);
    let digest = hasher.finalize();
    out.extend_from_slice(&digest);
    out
}

/// Parse a cache file. Returns `Corrupt` on any structural damage.
pub fn decode(bytes: &[u8]) -> CacheResult<HashMap<String, Vec<u8>>> {
    if bytes.len() < MAGIC.len() + 8 + CHECKSUM_LEN {
        return Err(CacheError::Corrupt("file too short".to_string()));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let mut hasher = Sha256::new();
    hasher.update(body);
    if hasher.finalize().as_slice() != checksum {
        return Err(CacheError::Corrupt("checksum mismatch".to_string()));
    }

    if &body[..MAGIC.len()] != MAGIC {
        return Err(CacheError::Corrupt("bad magic".to_string()));
    }
    let mut cursor = MAGIC.len();

    let version = read_u32(body, &mut cursor)?;
    if version != FORMAT_VERSION {
        return Err(CacheError::Corrupt(format!(
            "unsupported format version {version}"
        )));
    }

    let count = read_u32(body, &mut cursor)? as usize;
    let mut entries = HashMap::with_capacity(count);
    for _ in 0..count {
        let key_len = read_u16(body, &mut cursor)? as usize;
        let key_bytes = read_slice(body, &mut cursor, key_len)?;
        let key = String::from_utf8(key_bytes.to_vec())
            .map_err(|_| CacheError::Corrupt("key is not UTF-8".to_string()))?;

        let value_len = read_u32(body, &mut cursor)? as usize;
        let value = read_slice(body, &mut cursor, value_len)?.to_vec();
        entries.insert(key, value);
    }

    if cursor != body.len() {
        return Err(CacheError::Corrupt("trailing bytes after entries".to_string()));
    }
    Ok(entries)
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> CacheResult<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| CacheError::Corrupt("length overflow".to_string()))?;
    if end > bytes.len() {
        return Err(CacheError::Corrupt("truncated entry".to_string()));
    }
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> CacheResult<u16> {
    let slice = read_slice(bytes, cursor, 2)?;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> CacheResult<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
