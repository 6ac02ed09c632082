use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: translation quota exceeded")]
    QuotaExceeded { provider: String },

    #[error("{provider} error: HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: model still loading after {attempts} attempts")]
    NotReady { provider: String, attempts: u32 },

    #[error("{provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} request failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A single translation backend.
///
/// Quota bookkeeping lives in the engine; a provider only reports
/// [`ProviderError::QuotaExceeded`].
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider has the credentials it needs.
    fn is_available(&self) -> bool;

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(20))
    }
}
