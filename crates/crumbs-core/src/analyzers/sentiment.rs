//! Commit message sentiment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::AnalysisRun;
use crate::analyzer::{headline_listing, Analyzer, AnalyzerSettings};
use crate::analyzers::{mean, most_common};
use crate::batch::AnalysisBatch;
use crate::client::Prompt;
use crate::config::EngineConfig;
use crate::domain::{AnalyzerKind, RunStats};
use crate::parse::{lenient, non_empty, parse_commit_records, CommitKeyed, ParsedBatch};

pub const DEFAULT_TEMPLATE: &str = r#"Analyze the sentiment of these git commit messages. For each commit, determine:
1. sentiment: "positive", "neutral", or "negative"
2. confidence: 0.0 to 1.0 (how confident you are)
3. tone: a single word describing the tone (e.g., "enthusiastic", "frustrated", "routine", "celebratory", "apologetic")
4. summary: a brief 5-10 word interpretation of the commit's intent

Commit messages:
{commits}

Respond ONLY with a valid JSON array, one object per commit, no markdown or explanation:
[{"sha": "...", "sentiment": "...", "confidence": 0.0, "tone": "...", "summary": "..."}]"#;

/// Number of tones listed in a [`SentimentReport`].
const TOP_TONES: usize = 5;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    /// Unrecognised labels map to [`Sentiment::Neutral`].
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment of one commit message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sha: String,
    pub sentiment: Sentiment,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    pub tone: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    #[serde(alias = "commit", alias = "hash", alias = "id")]
    sha: String,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    confidence: Option<f64>,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl CommitKeyed for RawSentiment {
    fn commit_id(&self) -> &str {
        &self.sha
    }
}

pub struct SentimentAnalyzer {
    settings: AnalyzerSettings,
}

impl SentimentAnalyzer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            settings: AnalyzerSettings::from_config(
                config,
                AnalyzerKind::Sentiment,
                DEFAULT_TEMPLATE,
            ),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.settings.template = template.into();
        self
    }
}

impl Analyzer for SentimentAnalyzer {
    type Record = SentimentResult;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Sentiment
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    fn build_prompt(&self, batch: &AnalysisBatch<'_>) -> Prompt {
        self.settings.render(&headline_listing(batch))
    }

    fn parse_response(&self, raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<SentimentResult> {
        parse_commit_records(raw, batch, |record: RawSentiment, commit| {
            Ok(SentimentResult {
                sha: commit.sha.clone(),
                sentiment: record
                    .sentiment
                    .as_deref()
                    .map(Sentiment::parse)
                    .unwrap_or_default(),
                confidence: record.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                tone: non_empty(record.tone)
                    .map(|t| t.to_ascii_lowercase())
                    .unwrap_or_else(|| "unknown".to_string()),
                summary: non_empty(record.summary).unwrap_or_default(),
            })
        })
    }
}

/// Aggregated sentiment for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentReport {
    results: Vec<SentimentResult>,
    counts: BTreeMap<Sentiment, usize>,
    average_confidence: f64,
    top_tones: Vec<(String, usize)>,
    stats: RunStats,
}

impl SentimentReport {
    pub fn from_run(run: AnalysisRun<SentimentResult>) -> Self {
        let AnalysisRun {
            records: results,
            stats,
        } = run;

        let mut counts: BTreeMap<Sentiment, usize> =
            Sentiment::ALL.iter().map(|s| (*s, 0)).collect();
        for result in &results {
            *counts.entry(result.sentiment).or_default() += 1;
        }

        Self {
            average_confidence: mean(results.iter().map(|r| r.confidence)),
            top_tones: most_common(results.iter().map(|r| r.tone.as_str()), TOP_TONES),
            counts,
            results,
            stats,
        }
    }

    pub fn empty() -> Self {
        Self::from_run(AnalysisRun::empty())
    }

    pub fn results(&self) -> &[SentimentResult] {
        &self.results
    }

    pub fn count(&self, sentiment: Sentiment) -> usize {
        self.counts.get(&sentiment).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<Sentiment, usize> {
        &self.counts
    }

    pub fn average_confidence(&self) -> f64 {
        self.average_confidence
    }

    pub fn top_tones(&self) -> &[(String, usize)] {
        &self.top_tones
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}
