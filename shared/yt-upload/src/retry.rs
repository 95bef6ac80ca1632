//! Bounded retry with exponential backoff for transient server errors

use crate::{Result, UploadError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Server-side statuses that are safe to retry
pub const TRANSIENT_STATUSES: [u16; 4] = [500, 502, 503, 504];

fn is_transient(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// Retry policy parameterized by attempt budget, backoff, and a status predicate
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable: fn(u16) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            retryable: is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_predicate(mut self, retryable: fn(u16) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, error: &UploadError) -> bool {
        match error {
            UploadError::Api { status, .. } => (self.retryable)(*status),
            UploadError::Http(e) => e.status().map_or(false, |s| (self.retryable)(s.as_u16())),
            _ => false,
        }
    }

    /// Backoff before the retry that follows failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the budget runs out
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if self.is_retryable(&e) => {
                    let status = e.status().unwrap_or_default();

                    if attempt >= self.max_attempts {
                        return Err(UploadError::RetriesExhausted {
                            attempts: attempt,
                            status,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "⚠️  Server error {} during {}, retrying in {:?} (attempt {}/{})",
                        status, label, delay, attempt, self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
