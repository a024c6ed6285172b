//! Resumable transfer controller.
//!
//! Drives a [`ChunkedUpload`] until the destination hands back an identifier.
//! Retriable chunk failures go through one [`Backoff`] for the whole upload,
//! and the upload itself is responsible for resuming from the last committed
//! byte rather than from zero.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::retry::{Backoff, RetryEvent, RetryPolicy};

/// Result of pushing one chunk.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    InProgress { sent: u64, total: u64 },
    /// Final response body from the destination
    Complete(Value),
}

#[async_trait]
pub trait ChunkedUpload: Send {
    /// Total bytes to transfer.
    fn total_bytes(&self) -> u64;

    async fn next_chunk(&mut self) -> ApiResult<ChunkOutcome>;
}

#[derive(Debug)]
pub enum TransferEvent<'a> {
    Progress { sent: u64, total: u64 },
    Retry(&'a RetryEvent),
}

/// Sink for byte-level progress, implemented by the CLI's progress bar.
pub trait TransferProgress: Send + Sync {
    fn start(&self, label: &str, total: u64);
    fn update(&self, sent: u64);
    fn finish(&self);
}

/// Progress sink that discards everything.
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn start(&self, _label: &str, _total: u64) {}
    fn update(&self, _sent: u64) {}
    fn finish(&self) {}
}

pub fn no_progress() -> Arc<dyn TransferProgress> {
    Arc::new(NoProgress)
}

/// Upload to completion and return the identifier found under `id_field`.
pub async fn run_upload<O>(
    upload: &mut dyn ChunkedUpload,
    policy: RetryPolicy,
    id_field: &str,
    mut observer: O,
) -> ApiResult<String>
where
    O: FnMut(TransferEvent<'_>) + Send,
{
    let mut backoff = Backoff::new(policy);
    loop {
        match upload.next_chunk().await {
            Ok(ChunkOutcome::InProgress { sent, total }) => {
                observer(TransferEvent::Progress { sent, total });
            }
            Ok(ChunkOutcome::Complete(body)) => {
                if backoff.retries() > 0 {
                    debug!("Upload completed after {} retries", backoff.retries());
                }
                return extract_id(&body, id_field);
            }
            Err(err) => {
                let event = backoff.on_failure(err)?;
                observer(TransferEvent::Retry(&event));
                sleep(event.delay).await;
            }
        }
    }
}

fn extract_id(body: &Value, id_field: &str) -> ApiResult<String> {
    match body.get(id_field).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ApiError::UnexpectedResponse(format!(
            "upload finished without an {id_field:?} field: {body}"
        ))),
    }
}
