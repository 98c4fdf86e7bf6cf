use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{ChatMessage, TextGenerationService};
use crate::errors::ServiceError;

/// Retry decorator for any text-generation service.
///
/// Retries rate limits (429), server errors (5xx) and transport failures with
/// exponential backoff: 1s, 2s, 4s ... Other errors are returned immediately.
pub struct Retrying<S> {
    inner: S,
    max_attempts: u32,
    base_delay: Duration,
}

impl<S> Retrying<S> {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(inner: S, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(16))
    }
}

#[async_trait]
impl<S: TextGenerationService> TextGenerationService for Retrying<S> {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "LLM call attempt {} failed ({}), retrying after {}ms...",
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
