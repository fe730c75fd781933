// crates/network/src/upload/fingerprint.rs
//! Resumability fingerprint
//!
//! Hashes only a bounded prefix of the file together with its name and
//! size. Two files sharing name, size and prefix collide; the server stays
//! responsible for final integrity.

use super::chunk::UploadFile;
use sha2::{Digest, Sha256};
use std::io;

/// Hex SHA-256 over `prefix || 0 || name || 0 || size`
pub async fn fingerprint(file: &UploadFile, prefix_bytes: u64) -> io::Result<String> {
    let prefix = file.read_range(0, prefix_bytes.min(file.size())).await?;

    let mut hasher = Sha256::new();
    hasher.update(&prefix);
    hasher.update([0u8]);
    hasher.update(file.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(file.size().to_string().as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
