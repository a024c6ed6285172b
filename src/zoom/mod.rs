//! Zoom cloud recording source.
//!
//! [`RecordingSource`] is the seam the sync pipeline talks to; [`ZoomClient`]
//! implements it against the Zoom REST API using server-to-server OAuth.

pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::token::{IssuedToken, TokenCache, TokenIssuer};

pub use types::{
    mime_type_for_extension, readiness_of, FileKind, Meeting, Participant, Readiness,
    RecordingFile,
};
use types::{ErrorBody, ParticipantsPage, RecordingsPage};

const ZOOM_API_BASE: &str = "https://api.zoom.us/v2";
const ZOOM_TOKEN_URL: &str = "https://zoom.us/oauth/token";
const PAGE_SIZE: u32 = 300;
const SERVICE: &str = "Zoom";

#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Meetings with cloud recordings that started between `from` and `to`.
    /// The API works in whole days, so callers must still filter precisely.
    async fn list_meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Vec<Meeting>>;

    async fn list_participants(&self, meeting: &Meeting) -> ApiResult<Vec<Participant>>;

    /// Download a recording file into `directory`, returning its path.
    async fn download_file(&self, file: &RecordingFile, directory: &Path) -> ApiResult<PathBuf>;

    /// Move every file of a meeting's recording to the trash.
    async fn trash_recording(&self, meeting: &Meeting) -> ApiResult<()>;

    /// Move one recording file to the trash.
    async fn trash_file(&self, meeting: &Meeting, file: &RecordingFile) -> ApiResult<()>;
}

/// Server-to-server OAuth app credentials.
#[derive(Debug, Clone)]
pub struct ZoomCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Account-credentials grant for a server-to-server app.
struct AccountCredentialsGrant {
    http: reqwest::Client,
    credentials: ZoomCredentials,
}

#[async_trait]
impl TokenIssuer for AccountCredentialsGrant {
    async fn issue(&self) -> ApiResult<IssuedToken> {
        let response = self
            .http
            .post(ZOOM_TOKEN_URL)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.credentials.account_id.as_str()),
            ])
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        let access_token = token.access_token.ok_or_else(|| {
            ApiError::UnexpectedResponse("Zoom token response has no access_token".to_string())
        })?;
        Ok(IssuedToken {
            access_token,
            expires_in: token.expires_in.map(Duration::from_secs),
        })
    }
}

pub struct ZoomClient {
    client: reqwest::Client,
    api_base: String,
    tokens: TokenCache,
}

impl ZoomClient {
    /// Exchange app credentials for a first bearer token. Later tokens are
    /// fetched as the current one nears expiry.
    pub async fn connect(credentials: &ZoomCredentials) -> ApiResult<Self> {
        let client = reqwest::Client::new();
        let tokens = TokenCache::new(AccountCredentialsGrant {
            http: client.clone(),
            credentials: credentials.clone(),
        });
        tokens.access_token().await?;

        info!("Authenticated with Zoom");
        Ok(Self::new(client, ZOOM_API_BASE, tokens))
    }

    pub fn new(client: reqwest::Client, api_base: &str, tokens: TokenCache) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl RecordingSource for ZoomClient {
    async fn list_meetings(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Vec<Meeting>> {
        let from_day = from.format("%Y-%m-%d").to_string();
        let to_day = to.format("%Y-%m-%d").to_string();
        let page_size = PAGE_SIZE.to_string();
        let mut meetings = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("/users/me/recordings"))
                .query(&[
                    ("from", from_day.as_str()),
                    ("to", to_day.as_str()),
                    ("page_size", page_size.as_str()),
                ]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("next_page_token", token)]);
            }

            let page: RecordingsPage = check(self.tokens.send(request).await?)
                .await?
                .json()
                .await?;
            debug!("Fetched {} recordings from Zoom", page.meetings.len());
            meetings.extend(page.meetings);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(meetings)
    }

    async fn list_participants(&self, meeting: &Meeting) -> ApiResult<Vec<Participant>> {
        let path = format!("/past_meetings/{}/participants", encode_uuid(&meeting.uuid));
        let page_size = PAGE_SIZE.to_string();
        let mut participants = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url(&path))
                .query(&[("page_size", page_size.as_str())]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("next_page_token", token)]);
            }

            let page: ParticipantsPage = check(self.tokens.send(request).await?)
                .await?
                .json()
                .await?;
            participants.extend(page.participants);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(participants)
    }

    async fn download_file(&self, file: &RecordingFile, directory: &Path) -> ApiResult<PathBuf> {
        let path = directory.join(local_file_name(file));
        let request = self.client.get(&file.download_url);
        let response = self.tokens.send(request).await?;
        let mut response = check(response).await?;

        let mut output = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            output.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        output.flush().await?;

        debug!("Downloaded {} bytes to {:?}", written, path);
        Ok(path)
    }

    async fn trash_recording(&self, meeting: &Meeting) -> ApiResult<()> {
        let path = format!("/meetings/{}/recordings", encode_uuid(&meeting.uuid));
        let request = self
            .client
            .delete(self.url(&path))
            .query(&[("action", "trash")]);
        expect_no_content(self.tokens.send(request).await?).await
    }

    async fn trash_file(&self, meeting: &Meeting, file: &RecordingFile) -> ApiResult<()> {
        let path = format!(
            "/meetings/{}/recordings/{}",
            encode_uuid(&meeting.uuid),
            urlencoding::encode(&file.id)
        );
        let request = self
            .client
            .delete(self.url(&path))
            .query(&[("action", "trash")]);
        expect_no_content(self.tokens.send(request).await?).await
    }
}

/// Meeting UUIDs that start with `/` or contain `//` must be encoded twice.
pub fn encode_uuid(uuid: &str) -> String {
    let once = urlencoding::encode(uuid).into_owned();
    if uuid.starts_with('/') || uuid.contains("//") {
        urlencoding::encode(&once).into_owned()
    } else {
        once
    }
}

/// File name for a download: the file id made path-safe, plus its extension.
pub fn local_file_name(file: &RecordingFile) -> String {
    let id: String = file
        .id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}.{}", id, file.extension())
}

async fn check(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, reasons) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) if !err.message.is_empty() => (err.message, vec![err.code.to_string()]),
        _ => (body, Vec::new()),
    };
    Err(ApiError::Http {
        service: SERVICE,
        status: status.as_u16(),
        message,
        reasons,
    })
}

async fn expect_no_content(response: Response) -> ApiResult<()> {
    let response = check(response).await?;
    if response.status() == StatusCode::NO_CONTENT {
        Ok(())
    } else {
        Err(ApiError::UnexpectedResponse(format!(
            "Zoom delete returned {} instead of 204",
            response.status()
        )))
    }
}
