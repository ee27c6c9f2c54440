//! Content digests

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Filename to content digest. `None` marks a file without content.
pub type FileHashes = BTreeMap<String, Option<String>>;

/// Calculate the SHA-256 digest of `data` as lowercase hex
pub fn hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex encoding utilities
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
