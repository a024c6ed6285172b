//! Bounded exponential backoff with full jitter.
//!
//! Every remote-mutating call goes through here. The engine never logs on its
//! own: each retry is handed to the caller as a [`RetryEvent`] so the caller
//! decides how to report it.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

/// A retriable failure and the delay chosen before the next attempt.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// 1-indexed count of retriable failures so far
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Retry state for one logical operation.
///
/// The budget is shared across every failure recorded on the same instance,
/// which is what a multi-chunk upload needs.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    retries: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Record a failure.
    ///
    /// Fatal errors come straight back. Retriable ones either yield the delay
    /// to wait before trying again or, once the budget is spent,
    /// [`ApiError::RetryExhausted`].
    pub fn on_failure(&mut self, error: ApiError) -> ApiResult<RetryEvent> {
        if !error.is_retriable() {
            return Err(error);
        }

        self.retries += 1;
        let message = error.to_string();
        if self.retries > self.policy.max_retries {
            return Err(ApiError::RetryExhausted {
                attempts: self.retries,
                last_error: message,
            });
        }

        Ok(RetryEvent {
            attempt: self.retries,
            delay: jitter_delay(self.retries),
            error: message,
        })
    }
}

/// Uniformly random delay in `[0, 2^retry)` seconds.
pub fn jitter_delay(retry: u32) -> Duration {
    let ceiling = 2f64.powi(retry.min(62) as i32);
    let seconds = rand::thread_rng().gen_range(0.0..ceiling);
    Duration::from_secs_f64(seconds)
}

/// Observer that reports each retry as a warning.
pub fn log_retry(action: &str) -> impl FnMut(&RetryEvent) + Send + '_ {
    move |event| {
        warn!(
            "{} failed (attempt {}), retrying in {:.1}s: {}",
            action,
            event.attempt,
            event.delay.as_secs_f64(),
            event.error
        );
    }
}

/// Run `op` until it succeeds, fails fatally, or the retry budget is spent.
pub async fn retry<T, F, Fut, O>(policy: RetryPolicy, mut op: F, mut observer: O) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
    O: FnMut(&RetryEvent),
{
    let mut backoff = Backoff::new(policy);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let event = backoff.on_failure(err)?;
                observer(&event);
                sleep(event.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_always_retriable_exhausts_after_max_plus_one_attempts() {
        let attempts = AtomicU32::new(0);
        let mut events = Vec::new();

        let result: ApiResult<()> = retry(
            RetryPolicy::default(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::http("YouTube", 503, "unavailable")) }
            },
            |event| events.push(event.clone()),
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
        assert_eq!(events.len(), DEFAULT_MAX_RETRIES as usize);
        match result {
            Err(ApiError::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, DEFAULT_MAX_RETRIES + 1);
                assert!(last_error.contains("unavailable"));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }

        for event in &events {
            let ceiling = Duration::from_secs(1 << event.attempt);
            assert!(event.delay < ceiling, "{:?} >= {:?}", event.delay, ceiling);
        }
        let numbered: Vec<u32> = events.iter().map(|e| e.attempt).collect();
        assert_eq!(numbered, (1..=DEFAULT_MAX_RETRIES).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_short_circuits() {
        let attempts = AtomicU32::new(0);
        let mut events = Vec::new();
        let start = tokio::time::Instant::now();

        let result: ApiResult<()> = retry(
            RetryPolicy::default(),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::http("YouTube", 403, "forbidden")) }
            },
            |event| events.push(event.clone()),
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(events.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(result, Err(ApiError::Http { status: 403, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = retry(
            RetryPolicy::new(3),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::Transport("connection reset".into()))
                    } else {
                        Ok("video-1")
                    }
                }
            },
            |_| {},
        )
        .await;

        assert_eq!(result.unwrap(), "video-1");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_tracks_budget() {
        let mut backoff = Backoff::new(RetryPolicy::new(2));
        assert!(backoff.on_failure(ApiError::Transport("a".into())).is_ok());
        let second = backoff.on_failure(ApiError::Transport("b".into())).unwrap();
        assert_eq!(backoff.retries(), 2);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.error, "Network error: b");

        let exhausted = backoff.on_failure(ApiError::Transport("c".into()));
        assert!(matches!(
            exhausted,
            Err(ApiError::RetryExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_backoff_passes_fatal_errors_through() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        let err = backoff
            .on_failure(ApiError::UnexpectedResponse("no id".into()))
            .unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedResponse(_)));
        assert_eq!(backoff.retries(), 0);
    }

    #[test]
    fn test_zero_retry_policy_fails_on_first_retriable() {
        let mut backoff = Backoff::new(RetryPolicy::new(0));
        let err = backoff
            .on_failure(ApiError::http("Zoom", 502, "bad gateway"))
            .unwrap_err();
        assert!(matches!(err, ApiError::RetryExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_jitter_delay_bounds() {
        for retry in 1..=10 {
            for _ in 0..50 {
                assert!(jitter_delay(retry) < Duration::from_secs(1 << retry));
            }
        }
    }
}
