//! Google Drive v3 destination. Containers are folders, items are files.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::destination::{DestinationApi, DestinationKind, UploadMetadata};
use crate::error::{ApiError, ApiResult};
use crate::google::{GoogleClient, ResumableUpload};
use crate::transfer::ChunkedUpload;

pub const SERVICE: &str = "Google Drive";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
/// Alias Drive accepts for the top of "My Drive"
pub const ROOT_FOLDER: &str = "root";

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    trashed: bool,
}

pub struct DriveApi {
    client: GoogleClient,
}

impl DriveApi {
    pub fn new(client: GoogleClient) -> Self {
        Self { client }
    }

    async fn first_match(&self, query: &str) -> ApiResult<Option<String>> {
        let request = self
            .client
            .request(Method::GET, &format!("{API_BASE}/files"))
            .query(&[
                ("q", query),
                ("spaces", "drive"),
                ("fields", "files(id, name)"),
                ("pageSize", "10"),
            ]);
        let list: FileList = self.client.send_json(request).await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }
}

#[async_trait]
impl DestinationApi for DriveApi {
    fn kind(&self) -> DestinationKind {
        DestinationKind::GoogleDrive
    }

    async fn validate_credentials(&self) -> ApiResult<()> {
        let request = self
            .client
            .request(Method::GET, &format!("{API_BASE}/about"))
            .query(&[("fields", "user")]);
        let _: Value = self.client.send_json(request).await?;
        Ok(())
    }

    async fn find_container(&self, parent: Option<&str>, name: &str) -> ApiResult<Option<String>> {
        self.first_match(&folder_query(parent.unwrap_or(ROOT_FOLDER), name))
            .await
    }

    async fn create_container(&self, parent: Option<&str>, name: &str) -> ApiResult<String> {
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent.unwrap_or(ROOT_FOLDER)],
        });
        let request = self
            .client
            .request(Method::POST, &format!("{API_BASE}/files"))
            .query(&[("fields", "id")])
            .json(&body);
        let created: FileRef = self.client.send_json(request).await?;
        Ok(created.id)
    }

    async fn is_trashed(&self, container_id: &str) -> ApiResult<bool> {
        let url = format!("{API_BASE}/files/{}", urlencoding::encode(container_id));
        let request = self
            .client
            .request(Method::GET, &url)
            .query(&[("fields", "id,trashed")]);
        let file: FileRef = self.client.send_json(request).await?;
        Ok(file.trashed)
    }

    async fn list_items(&self, container_id: &str) -> ApiResult<HashMap<String, String>> {
        let query = files_query(container_id);
        let mut files = HashMap::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .request(Method::GET, &format!("{API_BASE}/files"))
                .query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("fields", "nextPageToken, files(id, name)"),
                    ("pageSize", PAGE_SIZE),
                ]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: FileList = self.client.send_json(request).await?;
            for file in page.files {
                files.entry(file.name).or_insert(file.id);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn begin_upload(
        &self,
        container_id: Option<&str>,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> ApiResult<Box<dyn ChunkedUpload>> {
        let body = json!({
            "name": metadata.title,
            "mimeType": metadata.mime_type,
            "parents": [container_id.unwrap_or(ROOT_FOLDER)],
        });
        let url = format!("{UPLOAD_URL}?uploadType=resumable&fields=id");
        let upload =
            ResumableUpload::open(&self.client, &url, &body, path, &metadata.mime_type).await?;
        Ok(Box::new(upload))
    }

    async fn insert_playlist_item(
        &self,
        _playlist_id: &str,
        _item_id: &str,
        _position: Option<u32>,
    ) -> ApiResult<()> {
        Err(ApiError::Unsupported(format!("{SERVICE} has no playlists")))
    }
}

/// Quote a value for a Drive `q` expression.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn folder_query(parent: &str, name: &str) -> String {
    format!(
        "{} in parents and mimeType = '{}' and name = {} and trashed = false",
        quote(parent),
        FOLDER_MIME_TYPE,
        quote(name)
    )
}

/// Files, not folders, directly inside `folder`.
pub fn files_query(folder: &str) -> String {
    format!(
        "{} in parents and mimeType != '{}' and trashed = false",
        quote(folder),
        FOLDER_MIME_TYPE
    )
}
