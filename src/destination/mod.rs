//! Destination archives: the video host and the file store.
//!
//! [`DestinationApi`] is the thin typed surface each service implements.
//! [`Archive`] layers the run-level behavior on top of it: retries,
//! idempotent container creation, trash preconditions and dry-run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::retry::{log_retry, retry, RetryPolicy};
use crate::transfer::{run_upload, ChunkedUpload, TransferEvent, TransferProgress};

/// Error reason returned when a playlist only accepts appended items.
pub const MANUAL_SORT_REQUIRED: &str = "manualSortRequired";

const DRY_RUN_PREFIX: &str = "dry-run:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    YouTube,
    GoogleDrive,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::GoogleDrive => "gdrive",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(Self::YouTube),
            "gdrive" | "google-drive" | "drive" => Ok(Self::GoogleDrive),
            other => Err(format!(
                "Unknown service '{other}'. Expected 'youtube' or 'gdrive'"
            )),
        }
    }
}

/// Everything a destination needs to describe an uploaded item.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    /// Video title, or file name on the file store
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub license: Option<String>,
    pub privacy: Option<String>,
    pub recording_date: Option<DateTime<Utc>>,
    pub mime_type: String,
}

#[async_trait]
pub trait DestinationApi: Send + Sync {
    fn kind(&self) -> DestinationKind;

    /// Cheap authenticated read used to fail fast on bad credentials.
    async fn validate_credentials(&self) -> ApiResult<()>;

    /// Container with exactly `name` under `parent`, if one exists.
    async fn find_container(&self, parent: Option<&str>, name: &str)
        -> ApiResult<Option<String>>;

    async fn create_container(&self, parent: Option<&str>, name: &str) -> ApiResult<String>;

    async fn is_trashed(&self, container_id: &str) -> ApiResult<bool>;

    /// Every item in a container, keyed by name. The first item wins when
    /// names repeat.
    async fn list_items(&self, container_id: &str) -> ApiResult<HashMap<String, String>>;

    /// Container that holds every item the account has uploaded, whatever
    /// else it was filed under.
    async fn uploads_container(&self) -> ApiResult<Option<String>> {
        Ok(None)
    }

    async fn begin_upload(
        &self,
        container_id: Option<&str>,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> ApiResult<Box<dyn ChunkedUpload>>;

    async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        item_id: &str,
        position: Option<u32>,
    ) -> ApiResult<()>;
}

/// Whether `id` was handed out by a dry run rather than by the destination.
pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(DRY_RUN_PREFIX)
}

fn placeholder(name: &str) -> String {
    format!("{DRY_RUN_PREFIX}{name}")
}

type ContainerKey = (Option<String>, String);

pub struct Archive {
    api: Arc<dyn DestinationApi>,
    policy: RetryPolicy,
    dry_run: bool,
    progress: Arc<dyn TransferProgress>,
    containers: Mutex<HashMap<ContainerKey, String>>,
    live: Mutex<HashSet<String>>,
    items: Mutex<HashMap<String, HashMap<String, String>>>,
    uploads: OnceCell<Option<String>>,
}

impl Archive {
    pub fn new(
        api: Arc<dyn DestinationApi>,
        policy: RetryPolicy,
        dry_run: bool,
        progress: Arc<dyn TransferProgress>,
    ) -> Self {
        Self {
            api,
            policy,
            dry_run,
            progress,
            containers: Mutex::new(HashMap::new()),
            live: Mutex::new(HashSet::new()),
            items: Mutex::new(HashMap::new()),
            uploads: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        self.api.kind()
    }

    pub async fn validate_credentials(&self) -> ApiResult<()> {
        let api = self.api.as_ref();
        retry(
            self.policy,
            || api.validate_credentials(),
            log_retry("Credential check"),
        )
        .await
    }

    /// Return the id of the container `name` under `parent`, creating it only
    /// when a lookup finds nothing.
    ///
    /// A create whose response was lost is retried as lookup-then-create, so
    /// the second attempt finds what the first one made.
    pub async fn ensure_container(&self, parent: Option<&str>, name: &str) -> ApiResult<String> {
        let key = (parent.map(str::to_string), name.to_string());
        if let Some(id) = self.containers.lock().await.get(&key) {
            return Ok(id.clone());
        }

        if let Some(parent) = parent {
            self.ensure_not_trashed(parent).await?;
        }

        let id = if parent.is_some_and(is_placeholder) {
            placeholder(name)
        } else {
            retry(
                self.policy,
                || self.lookup_or_create(parent, name),
                log_retry("Container lookup"),
            )
            .await?
        };

        self.containers.lock().await.insert(key, id.clone());
        Ok(id)
    }

    async fn lookup_or_create(&self, parent: Option<&str>, name: &str) -> ApiResult<String> {
        if let Some(id) = self.api.find_container(parent, name).await? {
            debug!("Found existing container '{}' ({})", name, id);
            return Ok(id);
        }
        if self.dry_run {
            info!("[dry-run] Would create container '{}'", name);
            return Ok(placeholder(name));
        }
        let id = self.api.create_container(parent, name).await?;
        info!("Created container '{}' ({})", name, id);
        Ok(id)
    }

    pub async fn is_trashed(&self, container_id: &str) -> ApiResult<bool> {
        if is_placeholder(container_id) {
            return Ok(false);
        }
        let api = self.api.as_ref();
        retry(
            self.policy,
            || api.is_trashed(container_id),
            log_retry("Trash check"),
        )
        .await
    }

    async fn ensure_not_trashed(&self, container_id: &str) -> ApiResult<()> {
        if self.live.lock().await.contains(container_id) {
            return Ok(());
        }
        if self.is_trashed(container_id).await? {
            return Err(ApiError::Trashed(container_id.to_string()));
        }
        self.live.lock().await.insert(container_id.to_string());
        Ok(())
    }

    /// Id of the item named `name` in a container.
    ///
    /// Each container is listed once per run; items this run places are added
    /// to the listing as they are uploaded.
    pub async fn find_item(&self, container_id: &str, name: &str) -> ApiResult<Option<String>> {
        if is_placeholder(container_id) {
            return Ok(None);
        }
        if let Some(listing) = self.items.lock().await.get(container_id) {
            return Ok(listing.get(name).cloned());
        }

        let api = self.api.as_ref();
        let listing = retry(
            self.policy,
            || api.list_items(container_id),
            log_retry("Item listing"),
        )
        .await?;
        debug!("Listed {} items in {}", listing.len(), container_id);
        let found = listing.get(name).cloned();
        self.items
            .lock()
            .await
            .entry(container_id.to_string())
            .or_insert(listing);
        Ok(found)
    }

    /// The account-wide uploads container, looked up once per run.
    pub async fn uploads_container(&self) -> ApiResult<Option<String>> {
        let api = self.api.as_ref();
        let policy = self.policy;
        self.uploads
            .get_or_try_init(|| {
                retry(
                    policy,
                    || api.uploads_container(),
                    log_retry("Uploads lookup"),
                )
            })
            .await
            .cloned()
    }

    async fn remember_item(&self, container_id: &str, name: &str, id: &str) {
        if let Some(listing) = self.items.lock().await.get_mut(container_id) {
            listing
                .entry(name.to_string())
                .or_insert_with(|| id.to_string());
        }
    }

    /// Put `item_id` at the top of a playlist.
    ///
    /// Playlists sorted by anything other than "manual" reject positioned
    /// inserts with `manualSortRequired`; those get one more insert without a
    /// position.
    pub async fn add_to_playlist(&self, playlist_id: &str, item_id: &str) -> ApiResult<()> {
        if self.kind() != DestinationKind::YouTube {
            return Err(ApiError::Unsupported(format!(
                "{} has no playlists",
                self.kind()
            )));
        }
        if self.dry_run {
            info!("[dry-run] Would add {} to playlist {}", item_id, playlist_id);
            return Ok(());
        }

        let api = self.api.as_ref();
        let positioned = retry(
            self.policy,
            || api.insert_playlist_item(playlist_id, item_id, Some(0)),
            log_retry("Playlist insert"),
        )
        .await;

        match positioned {
            Err(err) if err.has_reason(MANUAL_SORT_REQUIRED) => {
                warn!(
                    "Playlist {} is not manually sorted, appending {} instead",
                    playlist_id, item_id
                );
                retry(
                    self.policy,
                    || api.insert_playlist_item(playlist_id, item_id, None),
                    log_retry("Playlist insert"),
                )
                .await
            }
            other => other,
        }
    }

    /// Upload `path` into `container_id` and return the new item's id.
    pub async fn place_file(
        &self,
        container_id: Option<&str>,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> ApiResult<String> {
        if let Some(container) = container_id {
            self.ensure_not_trashed(container).await?;
        }
        if self.dry_run {
            info!("[dry-run] Would upload {:?} as '{}'", path, metadata.title);
            return Ok(placeholder(&metadata.title));
        }

        let api = self.api.as_ref();
        let mut upload = retry(
            self.policy,
            || api.begin_upload(container_id, path, metadata),
            log_retry("Upload session"),
        )
        .await?;

        let progress = self.progress.as_ref();
        progress.start(&metadata.title, upload.total_bytes());
        let result = run_upload(upload.as_mut(), self.policy, "id", |event| match event {
            TransferEvent::Progress { sent, .. } => progress.update(sent),
            TransferEvent::Retry(event) => warn!(
                "Chunk upload failed (attempt {}), resuming in {:.1}s: {}",
                event.attempt,
                event.delay.as_secs_f64(),
                event.error
            ),
        })
        .await;
        progress.finish();

        let id = result?;
        info!("Uploaded '{}' ({})", metadata.title, id);

        if let Some(container) = container_id {
            self.remember_item(container, &metadata.title, &id).await;
        }
        if let Some(Some(uploads)) = self.uploads.get() {
            self.remember_item(uploads, &metadata.title, &id).await;
        }
        Ok(id)
    }
}
