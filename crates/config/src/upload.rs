// crates/config/src/upload.rs
//! Chunked upload section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadSection {
    /// Bytes per chunk; the last chunk may be shorter
    pub chunk_size: u64,

    /// Chunks of one task in flight at once
    pub concurrent_chunks: usize,

    /// Leading bytes hashed into the resume fingerprint
    pub fingerprint_prefix_bytes: u64,

    pub check_path: String,
    pub chunk_path: String,
    pub merge_path: String,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            chunk_size: 2 * MIB,
            concurrent_chunks: 3,
            fingerprint_prefix_bytes: MIB,
            check_path: "/upload/check".to_string(),
            chunk_path: "/upload/chunk".to_string(),
            merge_path: "/upload/merge".to_string(),
        }
    }
}

impl ConfigSection for UploadSection {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.chunk_size, 64 * KIB, 512 * MIB, "upload.chunk_size"),
            Validator::in_range(self.concurrent_chunks, 1, 32, "upload.concurrent_chunks"),
            Validator::in_range(
                self.fingerprint_prefix_bytes,
                1,
                64 * MIB,
                "upload.fingerprint_prefix_bytes",
            ),
            Validator::endpoint(&self.check_path, "upload.check_path"),
            Validator::endpoint(&self.chunk_path, "upload.chunk_path"),
            Validator::endpoint(&self.merge_path, "upload.merge_path"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.chunk_size = other.chunk_size;
        self.concurrent_chunks = other.concurrent_chunks;
        self.fingerprint_prefix_bytes = other.fingerprint_prefix_bytes;
        self.check_path = other.check_path;
        self.chunk_path = other.chunk_path;
        self.merge_path = other.merge_path;
    }

    fn section_name(&self) -> &'static str {
        "upload"
    }
}
