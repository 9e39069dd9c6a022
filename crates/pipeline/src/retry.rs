use extract::Extraction;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // No retries: a failed block is recorded and the run moves on.
        Self {
            max_retries: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

/// Re-runs a bounded call on transient failures (timeouts, model errors).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms)
    }

    /// Retry an extraction with exponential backoff.
    ///
    /// Returns the first non-transient outcome, or the last attempt's outcome
    /// once the retry budget is spent.
    pub async fn retry<F, Fut>(&self, operation_name: &str, mut f: F) -> Extraction
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Extraction>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let extraction = f().await;
            let failure = match extraction.failure {
                Some(kind) if kind.is_transient() => kind,
                _ => {
                    if attempt > 0 && extraction.is_success() {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Extraction succeeded after retries"
                        );
                    }
                    return extraction;
                }
            };

            attempt += 1;
            if attempt > self.max_retries {
                if self.max_retries > 0 {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        failure = %failure,
                        "Extraction failed after max retries"
                    );
                }
                return extraction;
            }

            warn!(
                operation = operation_name,
                attempt = attempt,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis(),
                failure = %failure,
                "Extraction failed, retrying"
            );

            sleep(backoff).await;

            backoff = std::cmp::min(backoff * 2, self.max_backoff);
        }
    }
}
