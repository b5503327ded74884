//! Closed sets of analysis kinds, records and reports.
//!
//! Each analyzer owns its own record and report schema; these enums tag them
//! so downstream consumers can handle every kind without introspection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analyzers::changelog::{ChangelogEntry, ChangelogReport};
use crate::analyzers::cluster::{ClusterMembership, ClusteringResult};
use crate::analyzers::quality::{QualityReport, QualityScore};
use crate::analyzers::risk::{RiskAssessment, RiskReport};
use crate::analyzers::sentiment::{SentimentReport, SentimentResult};
use crate::domain::error::{DispatchError, ParseDiagnostic};

/// The analysis kinds the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Sentiment,
    Quality,
    Risk,
    Changelog,
    Clustering,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::Sentiment,
        AnalyzerKind::Quality,
        AnalyzerKind::Risk,
        AnalyzerKind::Changelog,
        AnalyzerKind::Clustering,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Quality => "quality",
            Self::Risk => "risk",
            Self::Changelog => "changelog",
            Self::Clustering => "clustering",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed per-commit result, tagged by the analyzer that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "record")]
pub enum AnalysisRecord {
    Sentiment(SentimentResult),
    Quality(QualityScore),
    Risk(RiskAssessment),
    Changelog(ChangelogEntry),
    ClusterMembership(ClusterMembership),
}

impl AnalysisRecord {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Self::Sentiment(_) => AnalyzerKind::Sentiment,
            Self::Quality(_) => AnalyzerKind::Quality,
            Self::Risk(_) => AnalyzerKind::Risk,
            Self::Changelog(_) => AnalyzerKind::Changelog,
            Self::ClusterMembership(_) => AnalyzerKind::Clustering,
        }
    }
}

macro_rules! impl_record_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnalysisRecord {
                fn from(record: $ty) -> Self {
                    Self::$variant(record)
                }
            }
        )*
    };
}

impl_record_from!(
    Sentiment(SentimentResult),
    Quality(QualityScore),
    Risk(RiskAssessment),
    Changelog(ChangelogEntry),
    ClusterMembership(ClusterMembership),
);

/// A batch that produced no response text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub commit_count: usize,
    pub error: DispatchError,
}

/// Dispatch and parse bookkeeping for one analyzer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub batches_total: usize,
    pub batches_failed: usize,
    pub records_accepted: usize,
    pub failures: Vec<BatchFailure>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl RunStats {
    /// Fraction of batches that failed dispatch, `0.0` when nothing ran.
    pub fn failure_fraction(&self) -> f64 {
        if self.batches_total == 0 {
            return 0.0;
        }
        self.batches_failed as f64 / self.batches_total as f64
    }

    pub fn batches_succeeded(&self) -> usize {
        self.batches_total - self.batches_failed
    }

    /// Number of parse diagnostics recorded across all successful batches.
    pub fn records_discarded(&self) -> usize {
        self.diagnostics.len()
    }
}

/// The aggregated, immutable result of one analyzer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "report")]
pub enum AnalysisReport {
    Sentiment(SentimentReport),
    Quality(QualityReport),
    Risk(RiskReport),
    Changelog(ChangelogReport),
    Clustering(ClusteringResult),
}

impl AnalysisReport {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Self::Sentiment(_) => AnalyzerKind::Sentiment,
            Self::Quality(_) => AnalyzerKind::Quality,
            Self::Risk(_) => AnalyzerKind::Risk,
            Self::Changelog(_) => AnalyzerKind::Changelog,
            Self::Clustering(_) => AnalyzerKind::Clustering,
        }
    }

    pub fn stats(&self) -> &RunStats {
        match self {
            Self::Sentiment(r) => r.stats(),
            Self::Quality(r) => r.stats(),
            Self::Risk(r) => r.stats(),
            Self::Changelog(r) => r.stats(),
            Self::Clustering(r) => r.stats(),
        }
    }

    /// Per-commit records held by the report, tagged by kind.
    ///
    /// Clustering reports hold final clusters rather than provisional
    /// memberships and therefore yield none.
    pub fn records(&self) -> Vec<AnalysisRecord> {
        match self {
            Self::Sentiment(r) => r.results().iter().cloned().map(Into::into).collect(),
            Self::Quality(r) => r.scores().iter().cloned().map(Into::into).collect(),
            Self::Risk(r) => r.assessments().iter().cloned().map(Into::into).collect(),
            Self::Changelog(r) => r.entries().iter().cloned().map(Into::into).collect(),
            Self::Clustering(_) => Vec::new(),
        }
    }

    /// `true` when the report holds no records (or no clusters).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Sentiment(r) => r.results().is_empty(),
            Self::Quality(r) => r.scores().is_empty(),
            Self::Risk(r) => r.assessments().is_empty(),
            Self::Changelog(r) => r.entries().is_empty(),
            Self::Clustering(r) => r.clusters().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_fraction_of_empty_run_is_zero() {
        assert_eq!(RunStats::default().failure_fraction(), 0.0);
    }

    #[test]
    fn test_failure_fraction() {
        let stats = RunStats {
            batches_total: 4,
            batches_failed: 1,
            ..RunStats::default()
        };
        assert!((stats.failure_fraction() - 0.25).abs() < f64::EPSILON);
        assert_eq!(stats.batches_succeeded(), 3);
    }

    #[test]
    fn test_record_tagging() {
        let record: AnalysisRecord = ChangelogEntry {
            sha: "abc".to_string(),
            category: crate::analyzers::changelog::ChangeCategory::Fixed,
            description: "fix".to_string(),
            impact: crate::analyzers::changelog::Impact::Patch,
            breaking: false,
        }
        .into();
        assert_eq!(record.kind(), AnalyzerKind::Changelog);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "changelog");
        assert_eq!(json["record"]["sha"], "abc");
    }

    #[test]
    fn test_analyzer_kind_serde_names() {
        let json = serde_json::to_string(&AnalyzerKind::Changelog).unwrap();
        assert_eq!(json, "\"changelog\"");
        let kind: AnalyzerKind = serde_json::from_str("\"clustering\"").unwrap();
        assert_eq!(kind, AnalyzerKind::Clustering);
    }
}
