//! The analysis engine facade.
//!
//! [`AnalysisEngine`] owns the dispatcher and configuration and runs any
//! [`Analyzer`] through the same pipeline:
//!
//! ```text
//! availability gate -> partition -> build prompts -> dispatch -> parse -> aggregate
//! ```
//!
//! The risk and clustering entry points wrap that pipeline with their
//! heuristic overlay and merge engine respectively.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::{aggregate, AnalysisRun};
use crate::analyzer::Analyzer;
use crate::analyzers::changelog::{ChangelogAnalyzer, ChangelogReport};
use crate::analyzers::cluster::{ClusterAnalyzer, ClusterMergeEngine, ClusteringResult};
use crate::analyzers::quality::{QualityAnalyzer, QualityReport};
use crate::analyzers::risk::{RiskAnalyzer, RiskReport};
use crate::analyzers::sentiment::{SentimentAnalyzer, SentimentReport};
use crate::client::CompletionClient;
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::domain::{AnalysisError, AnalysisReport, AnalyzerKind, Commit, Result};
use crate::obs;

pub struct AnalysisEngine {
    config: EngineConfig,
    dispatcher: Dispatcher,
}

impl AnalysisEngine {
    /// Validate `config` and bind it to `client`.
    pub fn new(client: Arc<dyn CompletionClient>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(client, config.model.clone())
            .with_request_timeout(config.request_timeout())
            .with_run_deadline(config.run_deadline());
        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `analyzer` over every commit.
    pub async fn run<A>(&self, analyzer: &A, commits: &[Commit]) -> Result<AnalysisRun<A::Record>>
    where
        A: Analyzer + ?Sized,
    {
        self.run_refs(analyzer, commits.iter().collect()).await
    }

    /// Run `analyzer` over a pre-selected subset of commits.
    ///
    /// An unavailable analyzer yields an empty run without any dispatch. A
    /// zero batch size is rejected even then.
    pub async fn run_refs<A>(
        &self,
        analyzer: &A,
        commits: Vec<&Commit>,
    ) -> Result<AnalysisRun<A::Record>>
    where
        A: Analyzer + ?Sized,
    {
        let kind = analyzer.kind();
        if analyzer.batch_size() == 0 {
            return Err(AnalysisError::config(format!(
                "batch size for {kind} must be a positive integer"
            )));
        }
        if !analyzer.is_available() {
            obs::emit_analysis_skipped(kind);
            return Ok(AnalysisRun::empty());
        }

        let span = obs::analysis_span(Uuid::new_v4(), kind);
        self.execute(analyzer, commits).instrument(span).await
    }

    async fn execute<A>(&self, analyzer: &A, commits: Vec<&Commit>) -> Result<AnalysisRun<A::Record>>
    where
        A: Analyzer + ?Sized,
    {
        let kind = analyzer.kind();
        let started = Instant::now();
        let commit_count = commits.len();
        let batches = analyzer.partition(commits)?;
        obs::emit_analysis_started(kind, commit_count, batches.len());

        let outcomes = self.dispatcher.dispatch(&batches, analyzer).await;
        let run = aggregate(analyzer, &batches, outcomes);

        obs::emit_analysis_finished(kind, &run.stats, started.elapsed().as_millis() as u64);
        Ok(run)
    }

    pub async fn analyze_sentiment(&self, commits: &[Commit]) -> Result<SentimentReport> {
        let analyzer = SentimentAnalyzer::from_config(&self.config);
        let run = self.run(&analyzer, commits).await?;
        Ok(SentimentReport::from_run(run))
    }

    pub async fn analyze_quality(&self, commits: &[Commit]) -> Result<QualityReport> {
        let analyzer = QualityAnalyzer::from_config(&self.config);
        let run = self.run(&analyzer, commits).await?;
        Ok(QualityReport::from_run(run, &self.config.quality))
    }

    /// Risk with the path pre-filter, sampling and post-adjustment applied.
    pub async fn analyze_risk(&self, commits: &[Commit]) -> Result<RiskReport> {
        let analyzer = RiskAnalyzer::from_config(&self.config)?;
        if !analyzer.is_available() {
            obs::emit_analysis_skipped(AnalyzerKind::Risk);
            return Ok(RiskReport::empty(analyzer.bucket()));
        }

        let overlay = analyzer.overlay();
        let prefilter = overlay.prefilter(commits);
        let selected = overlay.select(commits, &prefilter);
        tracing::debug!(
            flagged = prefilter.flagged_count(),
            selected = selected.len(),
            total = commits.len(),
            "risk pre-filter applied"
        );

        let mut run = self.run_refs(&analyzer, selected).await?;
        run.records = run
            .records
            .into_iter()
            .map(|assessment| {
                let areas = prefilter.areas_for(&assessment.sha);
                overlay.adjust(assessment, areas)
            })
            .collect();

        let flagged = commits
            .iter()
            .enumerate()
            .filter(|(pos, _)| prefilter.is_flagged(*pos))
            .map(|(_, c)| c.sha.clone())
            .collect();
        Ok(RiskReport::from_run(run, commits, flagged, analyzer.bucket()))
    }

    pub async fn analyze_changelog(&self, commits: &[Commit]) -> Result<ChangelogReport> {
        let analyzer = ChangelogAnalyzer::from_config(&self.config);
        let run = self.run(&analyzer, commits).await?;
        Ok(ChangelogReport::from_run(run))
    }

    /// Provisional clustering per chunk, then a global merge.
    ///
    /// Commits of failed chunks end up unclustered.
    pub async fn cluster_commits(&self, commits: &[Commit]) -> Result<ClusteringResult> {
        let analyzer = ClusterAnalyzer::from_config(&self.config);
        if !analyzer.is_available() {
            obs::emit_analysis_skipped(AnalyzerKind::Clustering);
            return Ok(ClusteringResult::empty());
        }

        let run = self.run(&analyzer, commits).await?;
        let mut merge = ClusterMergeEngine::new(commits, analyzer.config().clone());
        merge.add_provisional(run.records)?;
        merge.finalize(run.stats)
    }

    /// Run one analysis kind and wrap its report.
    pub async fn analyze(&self, kind: AnalyzerKind, commits: &[Commit]) -> Result<AnalysisReport> {
        let report = match kind {
            AnalyzerKind::Sentiment => AnalysisReport::Sentiment(self.analyze_sentiment(commits).await?),
            AnalyzerKind::Quality => AnalysisReport::Quality(self.analyze_quality(commits).await?),
            AnalyzerKind::Risk => AnalysisReport::Risk(self.analyze_risk(commits).await?),
            AnalyzerKind::Changelog => AnalysisReport::Changelog(self.analyze_changelog(commits).await?),
            AnalyzerKind::Clustering => AnalysisReport::Clustering(self.cluster_commits(commits).await?),
        };
        Ok(report)
    }

    /// Run several kinds concurrently, one report per distinct kind in
    /// request order. Batch failures in one kind never affect another.
    pub async fn analyze_all(
        &self,
        commits: &[Commit],
        kinds: &[AnalyzerKind],
    ) -> Result<Vec<AnalysisReport>> {
        let mut distinct: Vec<AnalyzerKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !distinct.contains(kind) {
                distinct.push(*kind);
            }
        }

        let reports = join_all(distinct.iter().map(|kind| self.analyze(*kind, commits))).await;
        reports.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{LogCapture, ScriptedClient};

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig {
            request_timeout_ms: 0,
            ..EngineConfig::available("m")
        };
        let result = AnalysisEngine::new(Arc::new(ScriptedClient::new()), config);
        assert!(matches!(result, Err(AnalysisError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unavailable_engine_makes_no_calls() {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let client = Arc::new(ScriptedClient::new().otherwise("[]"));
        let engine = AnalysisEngine::new(client.clone(), EngineConfig::default()).unwrap();
        let commits = vec![Commit::from_message("abcdef0", "feat: x", "d", "d@x", chrono::Utc::now())];

        let reports = engine
            .analyze_all(&commits, &AnalyzerKind::ALL)
            .await
            .unwrap();

        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(AnalysisReport::is_empty));
        assert_eq!(client.call_count(), 0);
        assert_eq!(logs.count("analysis.skipped"), 5);
        assert!(!logs.contains("analysis.started"));
    }

    #[tokio::test]
    async fn test_analyze_all_deduplicates_kinds() {
        let client = Arc::new(ScriptedClient::new().otherwise("[]"));
        let engine = AnalysisEngine::new(client, EngineConfig::available("m")).unwrap();

        let reports = engine
            .analyze_all(&[], &[AnalyzerKind::Quality, AnalyzerKind::Risk, AnalyzerKind::Quality])
            .await
            .unwrap();

        let kinds: Vec<AnalyzerKind> = reports.iter().map(AnalysisReport::kind).collect();
        assert_eq!(kinds, vec![AnalyzerKind::Quality, AnalyzerKind::Risk]);
    }
}
