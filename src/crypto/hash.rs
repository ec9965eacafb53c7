/// SHA-256 hashing utilities for document anchoring.
///
/// All digests travel through the system as lowercase hex strings:
/// - Document hashes supplied by callers (Merkle leaves)
/// - Internal Merkle nodes (hash of the concatenated hex strings)
/// - Salted payloads submitted to the ledger
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AnchorError, Result};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash raw bytes with SHA-256, returning lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash the concatenation of two hex strings (as UTF-8 text).
pub fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh 32-byte salt, hex-encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// The value submitted on-chain for a single anchor: `H(hash || salt)`.
/// Publishing this does not reveal the document hash itself.
pub fn salted_hash(document_hash: &str, salt: &str) -> String {
    hash_pair(document_hash, salt)
}

/// Validate a caller-supplied document hash and normalize it to lowercase.
pub fn normalize_digest(candidate: &str) -> Result<String> {
    let trimmed = candidate.trim();
    if trimmed.len() != DIGEST_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AnchorError::InvalidInput(format!(
            "document hash must be {DIGEST_HEX_LEN} hex characters, got {:?}",
            candidate
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}
