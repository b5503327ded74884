//! The capability contract every analysis kind implements.
//!
//! Partitioning, dispatch and aggregation are written once against
//! [`Analyzer`]; the kinds differ only in prompt text and parsing rules.

use crate::batch::{partition_refs, AnalysisBatch};
use crate::client::Prompt;
use crate::config::EngineConfig;
use crate::domain::{AnalyzerKind, Commit, Result};
use crate::parse::ParsedBatch;

/// Placeholder replaced by the batch listing in every prompt template.
pub const COMMITS_PLACEHOLDER: &str = "{commits}";

/// One analysis kind.
pub trait Analyzer: Send + Sync {
    /// Typed per-commit record produced by [`Analyzer::parse_response`].
    type Record: Clone + Send + 'static;

    fn kind(&self) -> AnalyzerKind;

    /// `true` iff the external credentials and settings this kind needs are
    /// present. When `false` the engine skips dispatch and returns an empty
    /// report.
    fn is_available(&self) -> bool;

    /// Commits per external request. Must be positive.
    fn batch_size(&self) -> usize;

    /// Partitioning policy. Fixed-size positional batches unless overridden.
    fn partition<'c>(&self, commits: Vec<&'c Commit>) -> Result<Vec<AnalysisBatch<'c>>> {
        partition_refs(commits, self.batch_size())
    }

    /// Build the request payload for `batch`. Pure: no I/O, no side effects.
    fn build_prompt(&self, batch: &AnalysisBatch<'_>) -> Prompt;

    /// Decode a raw response. Never fails: malformed entries are discarded
    /// as issues, and records for commits outside `batch` are dropped.
    fn parse_response(&self, raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<Self::Record>;
}

/// Settings shared by the built-in analyzers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub available: bool,
    pub model: String,
    pub batch_size: usize,
    /// Prompt template containing [`COMMITS_PLACEHOLDER`].
    pub template: String,
}

impl AnalyzerSettings {
    pub fn from_config(config: &EngineConfig, kind: AnalyzerKind, template: &str) -> Self {
        Self {
            available: config.api_available,
            model: config.model.clone(),
            batch_size: config.batch_size(kind),
            template: template.to_string(),
        }
    }

    /// Availability gate: credentials present and a model to call.
    pub fn is_available(&self) -> bool {
        self.available && !self.model.trim().is_empty()
    }

    /// Substitute `listing` into the template.
    pub fn render(&self, listing: &str) -> Prompt {
        Prompt::new(self.template.replace(COMMITS_PLACEHOLDER, listing))
    }
}

/// One `[short-sha] headline` line per commit.
pub fn headline_listing(batch: &AnalysisBatch<'_>) -> String {
    batch
        .commits()
        .iter()
        .map(|c| format!("[{}] {}", c.short_sha(), c.headline()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A fuller per-commit block: header, stats, paths and body.
pub fn detailed_listing(batch: &AnalysisBatch<'_>) -> String {
    batch
        .commits()
        .iter()
        .map(|c| describe_commit(c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn describe_commit(commit: &Commit) -> String {
    let mut out = format!(
        "[{}] {}\n  type: {} | conventional: {} | +{} -{} in {} file(s)",
        commit.short_sha(),
        commit.headline(),
        commit.commit_type,
        commit.is_conventional,
        commit.stats.lines_added,
        commit.stats.lines_deleted,
        commit.stats.files_changed,
    );
    if !commit.changed_paths.is_empty() {
        out.push_str("\n  paths: ");
        out.push_str(&commit.changed_paths.join(", "));
    }
    if let Some(body) = &commit.body {
        out.push_str("\n  body: ");
        out.push_str(&body.replace('\n', " "));
    }
    out
}
