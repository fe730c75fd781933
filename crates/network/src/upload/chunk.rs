// crates/network/src/upload/chunk.rs
//! Upload sources and their split into chunks

use super::task::TaskId;
use bytes::Bytes;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file to upload
///
/// Path-backed files are read lazily, one range at a time.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    size: u64,
    source: FileSource,
}

impl UploadFile {
    /// Describes a file on disk from its metadata
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads `[start, end)`, clamped to the file size
    pub async fn read_range(&self, start: u64, end: u64) -> io::Result<Bytes> {
        let end = end.min(self.size);
        if start >= end {
            return Ok(Bytes::new());
        }

        match &self.source {
            FileSource::Memory(data) => Ok(data.slice(start as usize..end as usize)),
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// One contiguous byte range of a task's file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: usize,
    pub total_chunks: usize,
    pub start: u64,
    pub end: u64,
    pub file_size: u64,
    pub task_id: TaskId,
    pub file_name: String,
    /// Set once the task has computed it
    pub fingerprint: Option<String>,
}

impl ChunkInfo {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Splits `file` into `chunk_size` ranges; the last may be shorter
    ///
    /// Only the size is consulted. An empty file has no chunks.
    pub fn split(task_id: TaskId, file: &UploadFile, chunk_size: u64) -> Vec<ChunkInfo> {
        let ranges = split_ranges(file.size(), chunk_size);
        let total_chunks = ranges.len();

        ranges
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| ChunkInfo {
                index,
                total_chunks,
                start,
                end,
                file_size: file.size(),
                task_id,
                file_name: file.name().to_string(),
                fingerprint: None,
            })
            .collect()
    }
}

/// `[start, end)` ranges covering `0..size` without gap or overlap
pub fn split_ranges(size: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut ranges = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < size {
        let end = (start + chunk_size).min(size);
        ranges.push((start, end));
        start = end;
    }
    ranges
}
