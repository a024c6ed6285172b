//! OAuth bearer tokens that are renewed before they run out.
//!
//! Zoom and Google both hand out access tokens that live about an hour, while
//! a sync of several large recordings can run much longer. [`TokenCache`]
//! keeps the current token, asks its [`TokenIssuer`] for a new one shortly
//! before expiry, and renews once more when a request comes back 401.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::ApiResult;

/// Renew this long before the issuer's stated expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the issuer does not state one.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Option<Duration>,
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> ApiResult<IssuedToken>;
}

struct CachedToken {
    value: String,
    renew_at: Instant,
}

pub struct TokenCache {
    issuer: Box<dyn TokenIssuer>,
    // Held across the renewal so concurrent callers wait for one refresh.
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(issuer: impl TokenIssuer + 'static) -> Self {
        Self {
            issuer: Box::new(issuer),
            current: Mutex::new(None),
        }
    }

    /// A token that is valid for at least [`REFRESH_MARGIN`], renewing if needed.
    pub async fn access_token(&self) -> ApiResult<String> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if Instant::now() < token.renew_at {
                return Ok(token.value.clone());
            }
            debug!("Access token expires soon, renewing");
        }

        let issued = self.issuer.issue().await?;
        let lifetime = issued.expires_in.unwrap_or(DEFAULT_LIFETIME);
        let value = issued.access_token;
        *current = Some(CachedToken {
            value: value.clone(),
            renew_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(value)
    }

    /// Drop the current token so the next call renews it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    /// Send `request` with the bearer token attached.
    ///
    /// A 401 renews the token and resends once, provided the request body can
    /// be replayed. The response is returned unchecked.
    pub async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let replay = request.try_clone();
        let token = self.access_token().await?;
        let response = request.bearer_auth(&token).send().await?;

        match replay {
            Some(replay) if response.status() == StatusCode::UNAUTHORIZED => {
                info!("Access token was rejected, renewing");
                self.invalidate().await;
                let token = self.access_token().await?;
                Ok(replay.bearer_auth(&token).send().await?)
            }
            _ => Ok(response),
        }
    }
}
