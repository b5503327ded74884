//! Engine configuration.
//!
//! Values arrive already resolved (from flags, environment or files) and are
//! consumed here as plain data. Every tunable is a public field so callers
//! and tests can see exactly what the engine runs with.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzers::risk::{BucketSpan, SensitiveArea};
use crate::domain::{AnalysisError, AnalyzerKind, Result};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether credentials for the external service are present.
    pub api_available: bool,
    /// Model identifier passed with every request.
    pub model: String,
    /// Batch size for kinds without an explicit override.
    pub default_batch_size: usize,
    /// Per-kind batch size overrides.
    pub batch_sizes: BTreeMap<AnalyzerKind, usize>,
    /// Upper bound for a single external call.
    pub request_timeout_ms: u64,
    /// Optional bound on a whole analyzer run; pending batches fail when it elapses.
    pub run_deadline_ms: Option<u64>,
    pub quality: QualityConfig,
    pub risk: RiskConfig,
    pub clustering: ClusterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let batch_sizes = BTreeMap::from([
            (AnalyzerKind::Sentiment, 5),
            (AnalyzerKind::Quality, 5),
            (AnalyzerKind::Risk, 5),
            (AnalyzerKind::Changelog, 10),
        ]);
        Self {
            api_available: false,
            model: DEFAULT_MODEL.to_string(),
            default_batch_size: 5,
            batch_sizes,
            request_timeout_ms: 60_000,
            run_deadline_ms: None,
            quality: QualityConfig::default(),
            risk: RiskConfig::default(),
            clustering: ClusterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Configuration for a service that is reachable with `model`.
    pub fn available(model: impl Into<String>) -> Self {
        Self {
            api_available: true,
            model: model.into(),
            ..Self::default()
        }
    }

    /// Batch size for `kind`. Clustering uses its chunk size.
    pub fn batch_size(&self, kind: AnalyzerKind) -> usize {
        if kind == AnalyzerKind::Clustering {
            return self.clustering.chunk_size;
        }
        self.batch_sizes
            .get(&kind)
            .copied()
            .unwrap_or(self.default_batch_size)
    }

    pub fn with_batch_size(mut self, kind: AnalyzerKind, size: usize) -> Self {
        if kind == AnalyzerKind::Clustering {
            self.clustering.chunk_size = size;
        } else {
            self.batch_sizes.insert(kind, size);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 {
            return Err(AnalysisError::config("default_batch_size must be positive"));
        }
        if let Some((kind, _)) = self.batch_sizes.iter().find(|(_, size)| **size == 0) {
            return Err(AnalysisError::config(format!(
                "batch size for {kind} must be positive"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(AnalysisError::config("request_timeout_ms must be positive"));
        }
        if self.run_deadline_ms == Some(0) {
            return Err(AnalysisError::config("run_deadline_ms must be positive"));
        }
        if self.api_available && self.model.trim().is_empty() {
            return Err(AnalysisError::config(
                "a model identifier is required when the API is available",
            ));
        }
        self.quality.validate()?;
        self.risk.validate()?;
        self.clustering.validate()
    }
}

/// Summary sizes for the quality report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// How many of the most frequent issues to surface.
    pub top_issues: usize,
    /// How many of the lowest-scoring commits to surface.
    pub lowest_scores: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            top_issues: 5,
            lowest_scores: 5,
        }
    }
}

impl QualityConfig {
    fn validate(&self) -> Result<()> {
        if self.top_issues == 0 || self.lowest_scores == 0 {
            return Err(AnalysisError::config(
                "quality summary sizes must be positive",
            ));
        }
        Ok(())
    }
}

/// An extra path pattern for the risk pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPatternConfig {
    /// Case-insensitive regular expression matched against changed paths.
    pub pattern: String,
    pub area: SensitiveArea,
}

/// Risk heuristic overlay tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Score increment applied to pre-filter-flagged commits, capped at 1.0.
    pub boost: f64,
    /// Maximum number of unflagged commits sampled into LLM analysis.
    pub max_unflagged_samples: usize,
    /// Granularity of the risk timeline.
    pub bucket: BucketSpan,
    /// Patterns appended to the built-in sensitive-path table.
    pub extra_patterns: Vec<PathPatternConfig>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            boost: 0.2,
            max_unflagged_samples: 40,
            bucket: BucketSpan::Week,
            extra_patterns: Vec::new(),
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.boost) {
            return Err(AnalysisError::config("risk boost must lie in [0.0, 1.0]"));
        }
        Ok(())
    }
}

/// Cluster merge engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Collections larger than this are split into time-windowed chunks.
    pub chunk_threshold: usize,
    /// Maximum commits per chunk once chunking applies.
    pub chunk_size: usize,
    /// Maximum time span covered by one chunk.
    pub window_days: i64,
    /// Clusters with fewer members are demoted to the unclustered remainder.
    pub min_cluster_size: usize,
    /// Overlap coefficient at or above which two clusters merge.
    pub overlap_threshold: f64,
    /// Token Jaccard similarity of name+description at or above which two clusters merge.
    pub name_similarity: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 200,
            chunk_size: 150,
            window_days: 30,
            min_cluster_size: 2,
            overlap_threshold: 0.5,
            name_similarity: 0.6,
        }
    }
}

impl ClusterConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(self.window_days)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_threshold == 0 || self.chunk_size == 0 {
            return Err(AnalysisError::config(
                "clustering chunk_threshold and chunk_size must be positive",
            ));
        }
        if self.window_days <= 0 {
            return Err(AnalysisError::config("clustering window_days must be positive"));
        }
        if self.min_cluster_size == 0 {
            return Err(AnalysisError::config("min_cluster_size must be positive"));
        }
        for (name, value) in [
            ("overlap_threshold", self.overlap_threshold),
            ("name_similarity", self.name_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) || value == 0.0 {
                return Err(AnalysisError::config(format!(
                    "clustering {name} must lie in (0.0, 1.0]"
                )));
            }
        }
        Ok(())
    }
}
