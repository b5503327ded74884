//! Crumbs Core: batched LLM analysis of git commit histories
//!
//! The engine partitions commits into batches, dispatches every batch
//! concurrently to a chat-completion service, parses the model-authored
//! responses and aggregates them into typed reports.
//!
//! ## Key Components
//!
//! - `AnalysisEngine`: runs analyzers through the shared pipeline
//! - `Analyzer`: the contract every analysis kind implements
//! - `Dispatcher`: concurrent fan-out with per-batch failure isolation
//! - `RiskOverlay`: path pre-filter and score boost around risk analysis
//! - `ClusterMergeEngine`: folds per-chunk clusters into a global result
//!
//! The external service sits behind `CompletionClient`; this crate never
//! performs network I/O itself.

pub mod aggregate;
pub mod analyzer;
pub mod analyzers;
pub mod batch;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod parse;
pub mod telemetry;

pub use aggregate::{aggregate, AnalysisRun};
pub use analyzer::{Analyzer, AnalyzerSettings, COMMITS_PLACEHOLDER};
pub use analyzers::changelog::{
    ChangeCategory, ChangelogAnalyzer, ChangelogEntry, ChangelogReport, Impact,
};
pub use analyzers::cluster::{
    Cluster, ClusterAnalyzer, ClusterMembership, ClusterMergeEngine, ClusterPhase,
    ClusteringResult, DateRange,
};
pub use analyzers::quality::{Grade, QualityAnalyzer, QualityReport, QualityScore};
pub use analyzers::risk::{
    BucketSpan, PathClassifier, Prefilter, RiskAnalyzer, RiskAssessment, RiskBucket, RiskLevel,
    RiskOverlay, RiskReport, SensitiveArea,
};
pub use analyzers::sentiment::{Sentiment, SentimentAnalyzer, SentimentReport, SentimentResult};
pub use batch::{partition, partition_refs, partition_time_windows, AnalysisBatch};
pub use client::{CompletionClient, CompletionRequest, Prompt};
pub use config::{
    ClusterConfig, EngineConfig, PathPatternConfig, QualityConfig, RiskConfig, DEFAULT_MODEL,
};
pub use dispatch::{BatchOutcome, Dispatcher};
pub use domain::{
    AnalysisError, AnalysisRecord, AnalysisReport, AnalyzerKind, BatchFailure, ClientError,
    Commit, CommitStats, CommitType, DispatchError, ParseDiagnostic, ParseIssue, Result,
    RunStats,
};
pub use engine::AnalysisEngine;
pub use metrics::{MetricsSnapshot, METRICS};
pub use parse::ParsedBatch;
pub use telemetry::{init_tracing, LogFormat};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
