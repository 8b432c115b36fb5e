//! Stable hashing over canonically serialized payloads.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::FitError;
use crate::serde::to_canonical_json_bytes;

/// Computes a stable hexadecimal hash for the provided serializable payload.
///
/// The payload is first rendered as canonical JSON so the digest depends only
/// on the semantic content, never on in-memory ordering of hash maps or the
/// process that produced it.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, FitError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}
