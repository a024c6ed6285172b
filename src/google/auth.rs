//! Authorized-user credentials for Google APIs.
//!
//! The consent flow that produces these files happens elsewhere; this module
//! only reads the stored file and trades the refresh token for an access
//! token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{check_response, GoogleClient};
use crate::error::{ApiError, ApiResult};
use crate::token::{IssuedToken, TokenCache, TokenIssuer};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Refresh-token grant against the credentials' token endpoint.
struct RefreshGrant {
    http: reqwest::Client,
    credentials: AuthorizedUserCredentials,
}

#[async_trait]
impl TokenIssuer for RefreshGrant {
    async fn issue(&self) -> ApiResult<IssuedToken> {
        self.credentials.refresh(&self.http).await
    }
}

impl AuthorizedUserCredentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse credentials file {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Exchange the refresh token for a fresh access token.
    pub async fn refresh(&self, http: &reqwest::Client) -> ApiResult<IssuedToken> {
        debug!("Refreshing Google access token");
        let response = http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;
        let response = check_response("Google OAuth", response).await?;
        let body: RefreshResponse = response.json().await?;
        let access_token = body.access_token.ok_or_else(|| {
            ApiError::UnexpectedResponse("token refresh returned no access_token".to_string())
        })?;
        Ok(IssuedToken {
            access_token,
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }

    /// Build an authenticated client for `service`. The first token is
    /// fetched here so bad credentials fail before any work starts.
    pub async fn authorize(&self, service: &'static str) -> ApiResult<GoogleClient> {
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenCache::new(RefreshGrant {
            http: http.clone(),
            credentials: self.clone(),
        }));
        tokens.access_token().await?;
        Ok(GoogleClient::new(http, tokens, service))
    }
}
