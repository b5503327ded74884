//! Error types for client construction

use thiserror::Error;

/// Errors raised while setting up an [`crate::OpenRouterClient`].
///
/// Per-request failures are reported as `crumbs_core::ClientError` instead.
#[derive(Debug, Error)]
pub enum OpenRouterError {
    #[error("no OpenRouter API key configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, OpenRouterError>;
