//! The external analysis service seam.
//!
//! Implement [`CompletionClient`] to plug in a real chat-completion API or a
//! test stub. The engine shares one client across all concurrently
//! dispatched batches and never mutates it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ClientError;

/// Opaque request payload built by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One request to the external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: Prompt,
}

/// Chat-completion style text service.
///
/// Retries, rate limiting and authentication are the implementation's
/// concern; the engine issues each request exactly once.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the raw completion text for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ClientError>;
}
