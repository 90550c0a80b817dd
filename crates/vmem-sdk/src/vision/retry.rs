//! Timeouts and exponential backoff around any extractor.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::VisionExtractor;
use crate::config::RetryConfig;
use crate::error::ExtractionError;

/// Wraps an extractor with a per-attempt timeout and retries of retryable
/// failures.
pub struct RetryingExtractor<E> {
    inner: E,
    policy: RetryConfig,
    timeout: Duration,
}

impl<E: VisionExtractor> RetryingExtractor<E> {
    pub fn new(inner: E, policy: RetryConfig, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    /// Delay before retry number `retry` (0-based), with up to 10% jitter,
    /// never above `max_delay_ms`.
    fn compute_delay(&self, retry: u32) -> Duration {
        let max = self.policy.max_delay_ms as f64;
        let base = (self.policy.initial_delay_ms as f64
            * self.policy.backoff_multiplier.powi(retry as i32))
        .min(max);
        let jitter = base * rand::thread_rng().gen_range(0.0..=0.1);
        Duration::from_millis((base + jitter).min(max) as u64)
    }
}

#[async_trait]
impl<E: VisionExtractor> VisionExtractor for RetryingExtractor<E> {
    async fn extract(&self, image_path: &Path) -> Result<Value, ExtractionError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.timeout, self.inner.extract(image_path)).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(document) => {
                    if attempt > 1 {
                        info!(attempt, extractor = self.inner.name(), "Extraction succeeded after retry");
                    }
                    return Ok(document);
                }
                Err(error) if attempt < attempts && error.is_retryable() => {
                    let delay = self.compute_delay(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying extraction"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
