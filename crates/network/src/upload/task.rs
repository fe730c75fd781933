// crates/network/src/upload/task.rs
//! Upload task state and its lifecycle

use super::chunk::{ChunkInfo, UploadFile};
use chrono::{DateTime, Utc};
use courier_resilience::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Opaque upload task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload lifecycle
///
/// ```text
/// pending -> uploading -> merging -> completed
///    ^           |           |
///    +-- pause --+           +--> failed
/// ```
///
/// `cancelled`, `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Merging,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_pause(self) -> bool {
        matches!(self, Self::Pending | Self::Uploading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manager-owned task record; callers only ever see [`TaskSnapshot`]s
#[derive(Debug)]
pub(crate) struct UploadTask {
    pub id: TaskId,
    pub file: UploadFile,
    pub chunk_size: u64,
    pub concurrent_chunks: usize,
    pub chunks: Vec<ChunkInfo>,
    pub uploaded: BTreeSet<usize>,
    pub failed: BTreeSet<usize>,
    pub status: TaskStatus,
    pub progress: f64,
    pub fingerprint: Option<String>,
    pub error: Option<String>,
    pub paused: bool,
    /// Replaced on resume so a paused run's token stays tripped
    pub cancel: CancellationToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(file: UploadFile, chunk_size: u64, concurrent_chunks: usize) -> Self {
        let id = TaskId::new();
        let chunks = ChunkInfo::split(id, &file, chunk_size);
        let now = Utc::now();

        Self {
            id,
            file,
            chunk_size,
            concurrent_chunks,
            chunks,
            uploaded: BTreeSet::new(),
            failed: BTreeSet::new(),
            status: TaskStatus::Pending,
            progress: 0.0,
            fingerprint: None,
            error: None,
            paused: false,
            cancel: CancellationToken::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Stamps every chunk with the resumability fingerprint
    pub fn set_fingerprint(&mut self, fingerprint: String) {
        for chunk in &mut self.chunks {
            chunk.fingerprint = Some(fingerprint.clone());
        }
        self.fingerprint = Some(fingerprint);
    }

    /// Seeds uploaded chunks from the server, ignoring unknown indices
    pub fn seed_uploaded(&mut self, indices: impl IntoIterator<Item = usize>) {
        let total = self.chunks.len();
        self.uploaded.extend(indices.into_iter().filter(|&i| i < total));
        self.recompute_progress();
    }

    pub fn mark_chunk_uploaded(&mut self, index: usize) {
        self.uploaded.insert(index);
        self.failed.remove(&index);
        self.recompute_progress();
    }

    pub fn mark_chunk_failed(&mut self, index: usize) {
        self.failed.insert(index);
        self.updated_at = Utc::now();
    }

    /// Chunk indices the server does not have yet, in order
    pub fn pending_chunks(&self) -> Vec<usize> {
        (0..self.chunks.len())
            .filter(|i| !self.uploaded.contains(i))
            .collect()
    }

    fn recompute_progress(&mut self) {
        self.progress = if self.chunks.is_empty() {
            0.0
        } else {
            self.uploaded.len() as f64 / self.chunks.len() as f64 * 100.0
        };
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            file_name: self.file.name().to_string(),
            file_size: self.file.size(),
            chunk_size: self.chunk_size,
            total_chunks: self.chunks.len(),
            uploaded_chunks: self.uploaded.iter().copied().collect(),
            failed_chunks: self.failed.iter().copied().collect(),
            status: self.status,
            progress: self.progress,
            fingerprint: self.fingerprint.clone(),
            error: self.error.clone(),
            paused: self.paused,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time copy of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: usize,
    pub uploaded_chunks: Vec<usize>,
    pub failed_chunks: Vec<usize>,
    pub status: TaskStatus,
    /// Percentage of chunks accepted by the server
    pub progress: f64,
    pub fingerprint: Option<String>,
    /// Message of the error that failed the task
    pub error: Option<String>,
    /// Pending because of a pause rather than waiting in the queue
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
