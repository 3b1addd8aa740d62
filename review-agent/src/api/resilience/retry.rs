//! Retry policy with exponential backoff and Retry-After support

use crate::error::{SyncError, SyncResult};
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry behaviour for upstream write calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// No retries and no waiting
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Errors that may be retried by [`RetryPolicy`]
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
    /// Server-provided rate limit hint, if this is a 429
    fn rate_limit_delay(&self) -> Option<Option<Duration>>;
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        SyncError::is_retryable(self)
    }

    fn rate_limit_delay(&self) -> Option<Option<Duration>> {
        match self {
            SyncError::Upstream {
                status: 429,
                retry_after,
                ..
            } => Some(*retry_after),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff after a failed `attempt` (1-based): base * multiplier^(attempt-1), capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let millis = (self.config.base_delay.as_millis() as f64 * exp)
            .min(self.config.max_delay.as_millis() as f64);
        let mut delay = Duration::from_millis(millis.max(0.0) as u64);

        if self.config.jitter && !delay.is_zero() {
            let spread = delay.as_millis() as u64 / 4;
            if spread > 0 {
                let offset = rand::rng().random_range(0..=spread);
                delay += Duration::from_millis(offset);
            }
        }
        delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. A 429 waits for its Retry-After hint (or the backoff
    /// for that attempt) instead of the regular schedule.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> SyncResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("{} (attempt {}/{})", operation, attempt, max_attempts);

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !RetryableError::is_retryable(&err) {
                return Err(err);
            }

            warn!("{} attempt {} failed: {}", operation, attempt, err);

            if attempt >= max_attempts {
                return Err(err);
            }

            let wait = match err.rate_limit_delay() {
                Some(hint) => hint.unwrap_or_else(|| self.delay_for_attempt(attempt)),
                None => self.delay_for_attempt(attempt),
            };
            if !wait.is_zero() {
                debug!("{}: waiting {:?} before retry", operation, wait);
                tokio::time::sleep(wait).await;
            }
            attempt += 1;
        }
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            ..RetryConfig::disabled()
        })
    }

    fn rate_limited() -> SyncError {
        SyncError::Upstream {
            status: 429,
            message: "Too Many Requests".into(),
            retry_after: Some(Duration::ZERO),
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::new(RetryConfig::default());
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        });
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limit() {
        let calls = AtomicU32::new(0);
        let result = instant_policy(3)
            .execute("reply", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(rate_limited()) } else { Ok("ok") } }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = instant_policy(3)
            .execute("reply", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::UpstreamUnavailable("timeout".into())) }
            })
            .await;
        assert!(matches!(result, Err(SyncError::UpstreamUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_auth_failure() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = instant_policy(3)
            .execute("reply", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::AuthenticationFailed("expired".into())) }
            })
            .await;
        assert!(matches!(result, Err(SyncError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
