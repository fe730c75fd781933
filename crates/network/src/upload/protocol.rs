// crates/network/src/upload/protocol.rs
//! Server side of the chunked upload: check, chunk and merge calls

use super::chunk::ChunkInfo;
use super::UploadConfig;
use crate::client::{HttpClient, RequestOptions};
use crate::error::{ErrorKind, NetworkError, NetworkResult};
use crate::transport::{MultipartField, RequestBody, Verb};
use bytes::Bytes;
use courier_resilience::CancellationToken;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
struct CheckBody {
    #[serde(rename = "uploadedChunks", default)]
    uploaded_chunks: Vec<usize>,
}

/// The check answer, bare or inside a `data` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CheckResponse {
    Wrapped { data: CheckBody },
    Bare(CheckBody),
}

impl CheckResponse {
    fn into_indices(self) -> Vec<usize> {
        match self {
            CheckResponse::Wrapped { data } => data.uploaded_chunks,
            CheckResponse::Bare(body) => body.uploaded_chunks,
        }
    }
}

fn options(cancel: &CancellationToken) -> RequestOptions {
    RequestOptions::new()
        .deduplicate(false)
        .enable_cache(false)
        .cancel_token(cancel.clone())
}

/// Asks which chunk indices the server already holds for `fingerprint`
pub(crate) async fn check_uploaded_chunks(
    client: &HttpClient,
    config: &UploadConfig,
    fingerprint: &str,
    file_name: &str,
    total_chunks: usize,
    cancel: &CancellationToken,
) -> NetworkResult<Vec<usize>> {
    let body = json!({
        "taskFingerprint": fingerprint,
        "fileName": file_name,
        "totalChunks": total_chunks,
    });
    let response = client
        .post(&config.check_path, Some(body), options(cancel))
        .await?;

    if response.body.is_empty() {
        return Ok(Vec::new());
    }
    response
        .json_body::<CheckResponse>()
        .map(CheckResponse::into_indices)
        .map_err(|e| {
            NetworkError::new(ErrorKind::Unknown, format!("Invalid check response: {}", e))
                .with_status(response.status)
        })
}

/// Uploads one chunk as a multipart form
pub(crate) async fn upload_chunk(
    client: &HttpClient,
    config: &UploadConfig,
    chunk: &ChunkInfo,
    data: Bytes,
    chunk_size: u64,
    cancel: &CancellationToken,
) -> NetworkResult<()> {
    let fingerprint = chunk.fingerprint.clone().unwrap_or_default();
    let fields = vec![
        MultipartField::file("file", chunk.file_name.clone(), data),
        MultipartField::text("fileId", chunk.task_id),
        MultipartField::text("fileName", &chunk.file_name),
        MultipartField::text("fileHash", fingerprint),
        MultipartField::text("chunkIndex", chunk.index),
        MultipartField::text("totalChunks", chunk.total_chunks),
        MultipartField::text("chunkSize", chunk_size),
        MultipartField::text("fileSize", chunk.file_size),
    ];

    client
        .send(
            Verb::Post,
            &config.chunk_path,
            RequestBody::Multipart(fields),
            options(cancel),
        )
        .await
        .map(|_| ())
}

/// Asks the server to assemble the uploaded chunks
pub(crate) async fn merge(
    client: &HttpClient,
    config: &UploadConfig,
    file_id: &str,
    file_name: &str,
    fingerprint: &str,
    total_chunks: usize,
    cancel: &CancellationToken,
) -> NetworkResult<()> {
    let body = json!({
        "fileId": file_id,
        "fileName": file_name,
        "fileHash": fingerprint,
        "totalChunks": total_chunks,
    });
    client
        .post(&config.merge_path, Some(body), options(cancel))
        .await
        .map(|_| ())
}
