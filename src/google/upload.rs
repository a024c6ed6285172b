//! Google resumable upload sessions.
//!
//! A session is opened with a metadata request that returns a session URI in
//! the `Location` header. Bytes are then `PUT` in chunks with `Content-Range`.
//! A `308` means more is expected and its `Range` header says how much the
//! server has committed. After any failed chunk the session is re-synced with
//! an empty `bytes */total` request so the next chunk starts where the server
//! left off, never from byte zero.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::GoogleClient;
use crate::error::{ApiError, ApiResult};
use crate::transfer::{ChunkOutcome, ChunkedUpload};

/// Chunk sizes must be multiples of 256 KiB.
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * CHUNK_ALIGNMENT;

const RESUME_INCOMPLETE: u16 = 308;

pub struct ResumableUpload {
    client: GoogleClient,
    session_uri: String,
    path: PathBuf,
    total: u64,
    committed: u64,
    chunk_size: u64,
    needs_resync: bool,
}

impl ResumableUpload {
    /// Start a session at `init_url` with the object's JSON metadata.
    pub async fn open(
        client: &GoogleClient,
        init_url: &str,
        metadata: &Value,
        path: &Path,
        mime_type: &str,
    ) -> ApiResult<Self> {
        let total = tokio::fs::metadata(path).await?.len();
        let request = client
            .request(Method::POST, init_url)
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total)
            .json(metadata);
        let response = client.send(request).await?;

        let session_uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::UnexpectedResponse(format!(
                    "{} did not return an upload session URI",
                    client.service()
                ))
            })?;

        debug!("Opened {} upload session for {:?}", client.service(), path);
        Ok(Self {
            client: client.clone(),
            session_uri,
            path: path.to_path_buf(),
            total,
            committed: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            needs_resync: false,
        })
    }

    /// Ask the server how much it has. Returns the final body if the upload
    /// had in fact completed.
    async fn resync(&mut self) -> ApiResult<Option<Value>> {
        let request = self
            .client
            .request(Method::PUT, &self.session_uri)
            .header(CONTENT_RANGE, format!("bytes */{}", self.total))
            .header(CONTENT_LENGTH, 0);
        let response = self.client.execute(request).await?;

        if response.status().as_u16() == RESUME_INCOMPLETE {
            self.committed = committed_bytes(response.headers());
            debug!("Resuming upload of {:?} at byte {}", self.path, self.committed);
            return Ok(None);
        }
        let response = self.client.check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn read_chunk(&self) -> ApiResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.committed)).await?;
        let mut buffer = Vec::with_capacity(self.chunk_size.min(self.total) as usize);
        file.take(self.chunk_size).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}

#[async_trait]
impl ChunkedUpload for ResumableUpload {
    fn total_bytes(&self) -> u64 {
        self.total
    }

    async fn next_chunk(&mut self) -> ApiResult<ChunkOutcome> {
        if self.needs_resync {
            if let Some(body) = self.resync().await? {
                self.needs_resync = false;
                return Ok(ChunkOutcome::Complete(body));
            }
            self.needs_resync = false;
        }

        let chunk = self.read_chunk().await?;
        let length = chunk.len() as u64;
        let range = content_range(self.committed, length, self.total);

        // Any failure past this point leaves the server offset unknown.
        self.needs_resync = true;
        let request = self
            .client
            .request(Method::PUT, &self.session_uri)
            .header(CONTENT_RANGE, range)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(chunk);
        let response = self.client.execute(request).await?;

        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            self.committed = committed_bytes(response.headers());
            self.needs_resync = false;
            return Ok(ChunkOutcome::InProgress {
                sent: self.committed,
                total: self.total,
            });
        }
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let body: Value = response.json().await?;
            self.committed = self.total;
            self.needs_resync = false;
            return Ok(ChunkOutcome::Complete(body));
        }

        Err(self
            .client
            .check(response)
            .await
            .err()
            .unwrap_or_else(|| {
                ApiError::UnexpectedResponse(format!("unexpected upload status {status}"))
            }))
    }
}

/// `Content-Range` for a chunk starting at `start`.
pub fn content_range(start: u64, length: u64, total: u64) -> String {
    if length == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", start, start + length - 1, total)
    }
}

/// Bytes committed according to a `Range: bytes=0-N` header. No header means
/// nothing has been stored yet.
pub fn committed_bytes(headers: &HeaderMap) -> u64 {
    headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_end)
        .map(|end| end + 1)
        .unwrap_or(0)
}

fn parse_range_end(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}
