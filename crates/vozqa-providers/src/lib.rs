//! Answer generation providers.
//!
//! Each provider implements [`AnswerGenerator`]: text in, reply text out.
//! Transient failures are retried according to a [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use vozqa_core::config::GenerationConfig;
use vozqa_core::error::GenerationError;

pub mod google;

pub use google::GeminiGenerator;

/// The answer generator seam used by the pipeline.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Provider identifier (e.g. "google").
    fn id(&self) -> &str;

    /// Generate a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, GenerationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        provider = label,
                        attempt,
                        max_retries = self.max_retries,
                        ?delay,
                        %e,
                        "Generation request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
