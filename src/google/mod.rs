//! Shared plumbing for the Google destinations (YouTube and Drive).

pub mod auth;
pub mod upload;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::token::TokenCache;

pub use auth::AuthorizedUserCredentials;
pub use upload::ResumableUpload;

/// Authenticated HTTP client for one Google API.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    service: &'static str,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, service: &'static str) -> Self {
        Self {
            http,
            tokens,
            service,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// A bare request; the bearer token is attached when it is sent.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Send with the current token and return the response unchecked.
    pub async fn execute(&self, request: RequestBuilder) -> ApiResult<Response> {
        self.tokens.send(request).await
    }

    /// Send and map error statuses to [`ApiError`].
    pub async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = self.execute(request).await?;
        self.check(response).await
    }

    /// Send and decode a JSON response.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        Ok(self.send(request).await?.json().await?)
    }

    pub async fn check(&self, response: Response) -> ApiResult<Response> {
        check_response(self.service, response).await
    }
}

pub(crate) async fn check_response(service: &'static str, response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(parse_error_body(service, status.as_u16(), &body))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

/// Google error bodies look like
/// `{"error": {"code": 400, "message": "...", "errors": [{"reason": "..."}]}}`.
/// Anything else is kept verbatim as the message.
pub fn parse_error_body(service: &'static str, status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ApiError::Http {
            service,
            status,
            message: envelope.error.message,
            reasons: envelope
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .filter(|r| !r.is_empty())
                .collect(),
        },
        Err(_) => ApiError::http(service, status, body.trim()),
    }
}
