//! YouTube Data API v3 destination. Containers are playlists, items are
//! videos.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::destination::{DestinationApi, DestinationKind, UploadMetadata};
use crate::error::ApiResult;
use crate::google::{GoogleClient, ResumableUpload};
use crate::transfer::ChunkedUpload;

pub const SERVICE: &str = "YouTube";

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const PAGE_SIZE: &str = "50";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Playlist {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Channel {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

pub struct YouTubeApi {
    client: GoogleClient,
    /// Privacy status for new playlists
    playlist_privacy: String,
}

impl YouTubeApi {
    pub fn new(client: GoogleClient, playlist_privacy: impl Into<String>) -> Self {
        Self {
            client,
            playlist_privacy: playlist_privacy.into(),
        }
    }

    /// Fetch every page of a list endpoint.
    async fn list_all<T>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{API_BASE}{path}");
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .request(Method::GET, &url)
                .query(query)
                .query(&[("maxResults", PAGE_SIZE)]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: Page<T> = self.client.send_json(request).await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl DestinationApi for YouTubeApi {
    fn kind(&self) -> DestinationKind {
        DestinationKind::YouTube
    }

    async fn validate_credentials(&self) -> ApiResult<()> {
        let request = self
            .client
            .request(Method::GET, &format!("{API_BASE}/channels"))
            .query(&[("part", "id"), ("mine", "true")]);
        let _: Value = self.client.send_json(request).await?;
        Ok(())
    }

    async fn find_container(
        &self,
        _parent: Option<&str>,
        name: &str,
    ) -> ApiResult<Option<String>> {
        let playlists: Vec<Playlist> = self
            .list_all("/playlists", &[("part", "snippet"), ("mine", "true")])
            .await?;
        debug!("Found {} playlists", playlists.len());
        Ok(playlists
            .into_iter()
            .find(|p| p.snippet.title == name)
            .map(|p| p.id))
    }

    async fn create_container(&self, _parent: Option<&str>, name: &str) -> ApiResult<String> {
        let body = json!({
            "snippet": { "title": name },
            "status": { "privacyStatus": self.playlist_privacy },
        });
        let request = self
            .client
            .request(Method::POST, &format!("{API_BASE}/playlists"))
            .query(&[("part", part_for(&body).as_str())])
            .json(&body);
        let created: Created = self.client.send_json(request).await?;
        Ok(created.id)
    }

    async fn is_trashed(&self, _container_id: &str) -> ApiResult<bool> {
        // Playlists are deleted outright, never trashed.
        Ok(false)
    }

    async fn list_items(&self, container_id: &str) -> ApiResult<HashMap<String, String>> {
        let items: Vec<PlaylistItem> = self
            .list_all(
                "/playlistItems",
                &[("part", "snippet"), ("playlistId", container_id)],
            )
            .await?;
        debug!("Found {} videos in playlist {}", items.len(), container_id);
        Ok(videos_by_title(items))
    }

    /// The channel's uploads playlist lists every video it owns, including
    /// ones whose playlist inserts failed.
    async fn uploads_container(&self) -> ApiResult<Option<String>> {
        let channels: Vec<Channel> = self
            .list_all("/channels", &[("part", "contentDetails"), ("mine", "true")])
            .await?;
        Ok(channels
            .into_iter()
            .find_map(|c| c.content_details.related_playlists.uploads))
    }

    async fn begin_upload(
        &self,
        _container_id: Option<&str>,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> ApiResult<Box<dyn ChunkedUpload>> {
        let body = video_resource(metadata);
        let url = format!(
            "{UPLOAD_URL}?uploadType=resumable&part={}",
            urlencoding::encode(&part_for(&body))
        );
        let upload =
            ResumableUpload::open(&self.client, &url, &body, path, &metadata.mime_type).await?;
        Ok(Box::new(upload))
    }

    async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        item_id: &str,
        position: Option<u32>,
    ) -> ApiResult<()> {
        let body = playlist_item_resource(playlist_id, item_id, position);
        let request = self
            .client
            .request(Method::POST, &format!("{API_BASE}/playlistItems"))
            .query(&[("part", "snippet")])
            .json(&body);
        let _: Value = self.client.send_json(request).await?;
        Ok(())
    }
}

/// The `videos.insert` resource for an upload.
pub fn video_resource(metadata: &UploadMetadata) -> Value {
    let mut snippet = Map::new();
    snippet.insert("title".into(), json!(metadata.title));
    if let Some(description) = &metadata.description {
        snippet.insert("description".into(), json!(description));
    }
    if let Some(category) = &metadata.category_id {
        snippet.insert("categoryId".into(), json!(category));
    }

    let mut status = Map::new();
    if let Some(privacy) = &metadata.privacy {
        status.insert("privacyStatus".into(), json!(privacy));
    }
    if let Some(license) = &metadata.license {
        status.insert("license".into(), json!(license));
    }

    let mut body = Map::new();
    body.insert("snippet".into(), Value::Object(snippet));
    if !status.is_empty() {
        body.insert("status".into(), Value::Object(status));
    }
    if let Some(date) = metadata.recording_date {
        body.insert(
            "recordingDetails".into(),
            json!({ "recordingDate": date.to_rfc3339_opts(SecondsFormat::Millis, true) }),
        );
    }
    Value::Object(body)
}

fn videos_by_title(items: Vec<PlaylistItem>) -> HashMap<String, String> {
    let mut videos = HashMap::new();
    for item in items {
        let Some(video_id) = item.snippet.resource_id.and_then(|r| r.video_id) else {
            continue;
        };
        videos.entry(item.snippet.title).or_insert(video_id);
    }
    videos
}

/// The API wants `part` to list exactly the top-level keys being sent.
pub fn part_for(body: &Value) -> String {
    body.as_object()
        .map(|o| o.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}

fn playlist_item_resource(playlist_id: &str, video_id: &str, position: Option<u32>) -> Value {
    let mut snippet = json!({
        "playlistId": playlist_id,
        "resourceId": { "kind": "youtube#video", "videoId": video_id },
    });
    if let Some(position) = position {
        snippet["position"] = json!(position);
    }
    json!({ "snippet": snippet })
}
