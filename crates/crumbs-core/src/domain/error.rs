//! Error taxonomy for the analysis engine.
//!
//! Only [`AnalysisError`] ever reaches the caller. Dispatch failures and
//! parse issues are recovered locally and travel inside reports as data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the engine. Fatal, never retried.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Invalid batch size, timeout or tunable, or missing analyzer settings.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalysisError {
    pub(crate) fn config(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Failure reported by a [`crate::client::CompletionClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Http(String),

    #[error("service returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("service returned no completion text")]
    EmptyResponse,

    #[error("could not decode service response: {0}")]
    Decode(String),
}

/// Why a single batch produced no response text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("run deadline elapsed before the batch completed")]
    DeadlineExceeded,

    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}

/// A recoverable, per-record problem found while parsing a response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ParseIssue {
    /// No usable JSON payload, or an unparseable array element.
    #[error("malformed payload: {detail}")]
    MalformedPayload { detail: String },

    /// Well-formed JSON whose shape or values were rejected.
    #[error("invalid record: {detail}")]
    InvalidRecord { detail: String },

    /// The record names a commit that was not part of its batch.
    #[error("record references commit '{sha}' outside its batch")]
    UnknownCommit { sha: String },

    /// A second record for a commit already seen in the same batch.
    #[error("duplicate record for commit '{sha}'")]
    DuplicateRecord { sha: String },
}

impl ParseIssue {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidRecord {
            detail: detail.into(),
        }
    }
}

/// A [`ParseIssue`] tagged with the batch that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub batch_index: usize,
    pub issue: ParseIssue,
}
