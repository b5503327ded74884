//! Commit message quality scoring.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::AnalysisRun;
use crate::analyzer::{detailed_listing, Analyzer, AnalyzerSettings};
use crate::analyzers::{mean, most_common};
use crate::batch::AnalysisBatch;
use crate::client::Prompt;
use crate::config::{EngineConfig, QualityConfig};
use crate::domain::{AnalyzerKind, RunStats};
use crate::parse::{lenient, non_empty, parse_commit_records, CommitKeyed, ParsedBatch};

pub const DEFAULT_TEMPLATE: &str = r#"Rate the quality of each git commit message below on a 0-10 scale.
Consider clarity (is the change understandable?), specificity (does it say what changed and why?),
conventional-commit usage and whether the message matches the size of the change.

Commits:
{commits}

Respond ONLY with a valid JSON array, one object per commit:
[{"sha": "...", "overall_score": 7.5, "clarity": 8, "specificity": 7, "issues": ["..."], "suggestion": "..."}]"#;

/// Highest score a commit message can receive.
pub const MAX_SCORE: f64 = 10.0;

/// Letter grade for an average quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// A ≥ 9, B ≥ 8, C ≥ 7, D ≥ 6, otherwise F.
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::A
        } else if score >= 8.0 {
            Self::B
        } else if score >= 7.0 {
            Self::C
        } else if score >= 6.0 {
            Self::D
        } else {
            Self::F
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality score of one commit message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub sha: String,
    /// Overall score in `[0, 10]`.
    pub overall_score: f64,
    pub clarity: Option<f64>,
    pub specificity: Option<f64>,
    pub issues: Vec<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuality {
    #[serde(alias = "commit", alias = "hash", alias = "id")]
    sha: String,
    #[serde(default, alias = "score", deserialize_with = "lenient::f64_opt")]
    overall_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    clarity: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    specificity: Option<f64>,
    #[serde(default, alias = "problems", deserialize_with = "lenient::string_list")]
    issues: Vec<String>,
    #[serde(default, alias = "improvement")]
    suggestion: Option<String>,
}

impl CommitKeyed for RawQuality {
    fn commit_id(&self) -> &str {
        &self.sha
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, MAX_SCORE)
}

pub struct QualityAnalyzer {
    settings: AnalyzerSettings,
}

impl QualityAnalyzer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            settings: AnalyzerSettings::from_config(config, AnalyzerKind::Quality, DEFAULT_TEMPLATE),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.settings.template = template.into();
        self
    }
}

impl Analyzer for QualityAnalyzer {
    type Record = QualityScore;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Quality
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    fn build_prompt(&self, batch: &AnalysisBatch<'_>) -> Prompt {
        self.settings.render(&detailed_listing(batch))
    }

    fn parse_response(&self, raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<QualityScore> {
        parse_commit_records(raw, batch, |record: RawQuality, commit| {
            let overall = record
                .overall_score
                .ok_or_else(|| "missing overall_score".to_string())?;
            Ok(QualityScore {
                sha: commit.sha.clone(),
                overall_score: clamp_score(overall),
                clarity: record.clarity.map(clamp_score),
                specificity: record.specificity.map(clamp_score),
                issues: record.issues,
                suggestion: non_empty(record.suggestion),
            })
        })
    }
}

/// Aggregated quality scores for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    scores: Vec<QualityScore>,
    average_score: f64,
    grade: Option<Grade>,
    top_issues: Vec<(String, usize)>,
    lowest: Vec<QualityScore>,
    stats: RunStats,
}

impl QualityReport {
    pub fn from_run(run: AnalysisRun<QualityScore>, config: &QualityConfig) -> Self {
        let AnalysisRun {
            records: scores,
            stats,
        } = run;

        let average_score = mean(scores.iter().map(|s| s.overall_score));
        let grade = (!scores.is_empty()).then(|| Grade::from_score(average_score));
        let top_issues = most_common(
            scores.iter().flat_map(|s| s.issues.iter().map(String::as_str)),
            config.top_issues,
        );

        // stable sort keeps input order among equal scores
        let mut lowest = scores.clone();
        lowest.sort_by(|a, b| a.overall_score.total_cmp(&b.overall_score));
        lowest.truncate(config.lowest_scores);

        Self {
            scores,
            average_score,
            grade,
            top_issues,
            lowest,
            stats,
        }
    }

    pub fn empty(config: &QualityConfig) -> Self {
        Self::from_run(AnalysisRun::empty(), config)
    }

    pub fn scores(&self) -> &[QualityScore] {
        &self.scores
    }

    /// Mean overall score, `0.0` when empty.
    pub fn average_score(&self) -> f64 {
        self.average_score
    }

    /// Grade of the average score; `None` when nothing was scored.
    pub fn grade(&self) -> Option<Grade> {
        self.grade
    }

    pub fn top_issues(&self) -> &[(String, usize)] {
        &self.top_issues
    }

    pub fn lowest(&self) -> &[QualityScore] {
        &self.lowest
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}
