//! Shared HTTP plumbing for remote providers
//!
//! Client construction with the per-call timeout, and the mapping from HTTP
//! failures to [`AgentError`] kinds that drives the retry policy.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use reqwest::StatusCode;

/// Network behaviour shared by every remote client
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    /// Per-call timeout
    pub timeout: Duration,

    /// Retries after the first attempt, for retryable failures only
    pub max_retries: u32,

    /// OpenAI-compatible API root
    pub openai_base_url: String,

    /// Google Generative Language API root
    pub gemini_base_url: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            openai_base_url: "https://api.openai.com/v1".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }
}

/// API keys for the supported providers
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub(crate) fn build_client(settings: &RuntimeSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))
}

/// Classify a non-success HTTP status
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> AgentError {
    let detail = format!("{provider} returned {status}: {}", truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

/// Classify a transport-level failure
pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> AgentError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AgentError::ProviderUnavailable(format!("{provider}: {err}"))
    } else {
        AgentError::Provider(format!("{provider}: {err}"))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
