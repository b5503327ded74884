//! Risk assessment with a path-based heuristic overlay.
//!
//! The overlay wraps the generic dispatch path in three stages:
//!
//! 1. [`RiskOverlay::prefilter`] flags commits whose changed paths match the
//!    sensitive-path table.
//! 2. [`RiskOverlay::select`] keeps every flagged commit and an evenly
//!    strided sample of the rest; only those are sent to the model.
//! 3. [`RiskOverlay::adjust`] boosts the model score of flagged commits by a
//!    fixed increment, capped at 1.0, and recomputes the level.
//!
//! The boost is always computed from [`RiskAssessment::raw_score`], so
//! adjusting an already adjusted record changes nothing.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::aggregate::AnalysisRun;
use crate::analyzer::{detailed_listing, Analyzer, AnalyzerSettings};
use crate::analyzers::mean;
use crate::batch::AnalysisBatch;
use crate::client::Prompt;
use crate::config::{EngineConfig, PathPatternConfig, RiskConfig};
use crate::domain::{AnalysisError, AnalyzerKind, Commit, Result, RunStats};
use crate::parse::{lenient, parse_commit_records, CommitKeyed, ParsedBatch};

pub const DEFAULT_TEMPLATE: &str = r#"Assess the risk each git commit below introduces to the codebase.
Consider the areas touched (authentication, payments, data migrations, secrets, access control,
configuration), the size of the change and whether the message explains it.

Commits:
{commits}

Respond ONLY with a valid JSON array, one object per commit:
[{"sha": "...", "risk_score": 0.0, "risk_level": "low|medium|high|critical", "affected_areas": ["..."], "reasons": ["..."]}]"#;

/// Area of the codebase the pre-filter treats as sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveArea {
    Authentication,
    Payment,
    Migration,
    Secrets,
    AccessControl,
    Configuration,
}

impl SensitiveArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Payment => "payment",
            Self::Migration => "migration",
            Self::Secrets => "secrets",
            Self::AccessControl => "access_control",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for SensitiveArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in sensitive-path table, matched case-insensitively.
const BUILTIN_PATTERNS: &[(&str, SensitiveArea)] = &[
    (
        r"(^|[/_.-])(auth|authn|authenticat\w*|login|logout|sessions?|oauth2?|sso|jwt|passwords?)([/_.-]|$)",
        SensitiveArea::Authentication,
    ),
    (
        r"(^|[/_.-])(pay|payments?|payouts?|billing|checkout|invoices?|stripe|charges?|subscriptions?)([/_.-]|$)",
        SensitiveArea::Payment,
    ),
    (
        r"(^|/)(migrations?|migrate|schema)([/_.-]|$)|\.sql$",
        SensitiveArea::Migration,
    ),
    (
        r"(^|[/_.-])(secrets?|credentials?|keys?|tokens?|vault)([/_.-]|$)|\.(pem|key|p12|pfx)$|(^|/)\.env(\.|$)",
        SensitiveArea::Secrets,
    ),
    (
        r"(^|[/_.-])(acl|rbac|permissions?|roles?|polic(y|ies)|authz|access)([/_.-]|$)",
        SensitiveArea::AccessControl,
    ),
    (
        r"(^|/)(config|configs|settings|conf)([/_.-]|$)|\.(ya?ml|toml|ini|cfg|conf)$|(^|/)dockerfile$",
        SensitiveArea::Configuration,
    ),
];

/// Classifies changed paths against the sensitive-path table.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    rules: Vec<(Regex, SensitiveArea)>,
}

impl PathClassifier {
    /// The built-in table only.
    pub fn builtin() -> Result<Self> {
        Self::with_patterns(&[])
    }

    /// The built-in table followed by `extra` patterns.
    pub fn with_patterns(extra: &[PathPatternConfig]) -> Result<Self> {
        let builtin = BUILTIN_PATTERNS
            .iter()
            .map(|(pattern, area)| (pattern.to_string(), *area));
        let extra = extra.iter().map(|p| (p.pattern.clone(), p.area));

        let rules = builtin
            .chain(extra)
            .map(|(pattern, area)| {
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (regex, area))
                    .map_err(|err| {
                        AnalysisError::config(format!("invalid risk path pattern '{pattern}': {err}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Sensitive areas touched by `commit`, deduplicated, in table order.
    pub fn classify(&self, commit: &Commit) -> Vec<SensitiveArea> {
        let mut areas = Vec::new();
        for (regex, area) in &self.rules {
            if areas.contains(area) {
                continue;
            }
            if commit.changed_paths.iter().any(|path| regex.is_match(path)) {
                areas.push(*area);
            }
        }
        areas
    }
}

/// Risk level bands over `[0, 1]`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// critical ≥ 0.8, high ≥ 0.6, medium ≥ 0.3, otherwise low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Midpoint of the level's score band.
    pub fn midpoint(self) -> f64 {
        match self {
            Self::Low => 0.15,
            Self::Medium => 0.45,
            Self::High => 0.7,
            Self::Critical => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub sha: String,
    /// Score reported by the model, clamped to `[0, 1]`.
    pub raw_score: f64,
    /// Score after the heuristic overlay; equals `raw_score` when not boosted.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub affected_areas: Vec<String>,
    pub reasons: Vec<String>,
    /// Pre-filter matches for this commit.
    pub sensitive_areas: Vec<SensitiveArea>,
    pub boosted: bool,
}

#[derive(Debug, Deserialize)]
struct RawRisk {
    #[serde(alias = "commit", alias = "hash", alias = "id")]
    sha: String,
    #[serde(default, alias = "score", deserialize_with = "lenient::f64_opt")]
    risk_score: Option<f64>,
    #[serde(default, alias = "level")]
    risk_level: Option<String>,
    #[serde(default, alias = "areas", deserialize_with = "lenient::string_list")]
    affected_areas: Vec<String>,
    #[serde(default, alias = "risk_factors", alias = "reason", deserialize_with = "lenient::string_list")]
    reasons: Vec<String>,
}

impl CommitKeyed for RawRisk {
    fn commit_id(&self) -> &str {
        &self.sha
    }
}

impl RawRisk {
    fn into_assessment(self, sha: String) -> std::result::Result<RiskAssessment, String> {
        let level = match self.risk_level.as_deref() {
            Some(label) => Some(
                RiskLevel::parse(label).ok_or_else(|| format!("unknown risk_level '{label}'"))?,
            ),
            None => None,
        };
        let (score, level) = match (self.risk_score, level) {
            (Some(score), Some(level)) => (score.clamp(0.0, 1.0), level),
            (Some(score), None) => {
                let score = score.clamp(0.0, 1.0);
                (score, RiskLevel::from_score(score))
            }
            (None, Some(level)) => (level.midpoint(), level),
            (None, None) => return Err("missing both risk_score and risk_level".to_string()),
        };
        Ok(RiskAssessment {
            sha,
            raw_score: score,
            risk_score: score,
            risk_level: level,
            affected_areas: self.affected_areas,
            reasons: self.reasons,
            sensitive_areas: Vec::new(),
            boosted: false,
        })
    }
}

/// Pre-filter result for a commit collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prefilter {
    areas: Vec<Vec<SensitiveArea>>,
    by_sha: HashMap<String, usize>,
}

impl Prefilter {
    /// Sensitive areas for the commit at input `position`.
    pub fn areas_at(&self, position: usize) -> &[SensitiveArea] {
        self.areas.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn areas_for(&self, sha: &str) -> &[SensitiveArea] {
        self.by_sha
            .get(sha)
            .map(|pos| self.areas_at(*pos))
            .unwrap_or(&[])
    }

    pub fn is_flagged(&self, position: usize) -> bool {
        !self.areas_at(position).is_empty()
    }

    pub fn flagged_count(&self) -> usize {
        self.areas.iter().filter(|a| !a.is_empty()).count()
    }
}

/// Heuristic stages layered around the risk analyzer.
#[derive(Debug, Clone)]
pub struct RiskOverlay {
    classifier: PathClassifier,
    boost: f64,
    max_unflagged_samples: usize,
}

impl RiskOverlay {
    pub fn new(classifier: PathClassifier, boost: f64, max_unflagged_samples: usize) -> Self {
        Self {
            classifier,
            boost,
            max_unflagged_samples,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        Ok(Self::new(
            PathClassifier::with_patterns(&config.extra_patterns)?,
            config.boost,
            config.max_unflagged_samples,
        ))
    }

    pub fn boost(&self) -> f64 {
        self.boost
    }

    /// Classify every commit.
    pub fn prefilter(&self, commits: &[Commit]) -> Prefilter {
        let areas = commits.iter().map(|c| self.classifier.classify(c)).collect();
        let by_sha = commits
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.sha.clone(), pos))
            .collect();
        Prefilter { areas, by_sha }
    }

    /// Every flagged commit plus up to `max_unflagged_samples` unflagged
    /// commits taken at an even stride, in input order.
    pub fn select<'c>(&self, commits: &'c [Commit], prefilter: &Prefilter) -> Vec<&'c Commit> {
        let unflagged: Vec<usize> = (0..commits.len())
            .filter(|pos| !prefilter.is_flagged(*pos))
            .collect();
        let mut keep = vec![false; commits.len()];
        for pos in (0..commits.len()).filter(|pos| prefilter.is_flagged(*pos)) {
            keep[pos] = true;
        }
        for pos in stride_sample(&unflagged, self.max_unflagged_samples) {
            keep[pos] = true;
        }
        commits
            .iter()
            .zip(keep)
            .filter_map(|(commit, keep)| keep.then_some(commit))
            .collect()
    }

    /// Apply the post-adjustment for a commit matching `areas`.
    ///
    /// Unflagged commits pass through with `risk_score == raw_score`.
    pub fn adjust(&self, mut assessment: RiskAssessment, areas: &[SensitiveArea]) -> RiskAssessment {
        if areas.is_empty() {
            return assessment;
        }
        assessment.risk_score = (assessment.raw_score + self.boost).min(1.0);
        assessment.risk_level = RiskLevel::from_score(assessment.risk_score);
        assessment.sensitive_areas = areas.to_vec();
        assessment.boosted = true;
        for area in areas {
            let name = area.as_str();
            if !assessment
                .affected_areas
                .iter()
                .any(|a| a.eq_ignore_ascii_case(name))
            {
                assessment.affected_areas.push(name.to_string());
            }
        }
        assessment
    }
}

/// `limit` items from `items` at an even stride; all of them if they fit.
fn stride_sample(items: &[usize], limit: usize) -> Vec<usize> {
    if items.len() <= limit {
        return items.to_vec();
    }
    (0..limit).map(|i| items[i * items.len() / limit]).collect()
}

/// Granularity of the risk timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSpan {
    Day,
    #[default]
    Week,
    Month,
}

impl BucketSpan {
    /// Start date of the bucket containing `at`. Weeks start on Monday.
    pub fn bucket_start(self, at: DateTime<Utc>) -> NaiveDate {
        let date = at.date_naive();
        match self {
            Self::Day => date,
            Self::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

/// Average risk over one timeline bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBucket {
    pub start: NaiveDate,
    pub average_score: f64,
    pub commits: usize,
}

pub struct RiskAnalyzer {
    settings: AnalyzerSettings,
    overlay: RiskOverlay,
    bucket: BucketSpan,
}

impl RiskAnalyzer {
    /// Fails when an extra path pattern is not a valid regular expression.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            settings: AnalyzerSettings::from_config(config, AnalyzerKind::Risk, DEFAULT_TEMPLATE),
            overlay: RiskOverlay::from_config(&config.risk)?,
            bucket: config.risk.bucket,
        })
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.settings.template = template.into();
        self
    }

    pub fn overlay(&self) -> &RiskOverlay {
        &self.overlay
    }

    pub fn bucket(&self) -> BucketSpan {
        self.bucket
    }
}

impl Analyzer for RiskAnalyzer {
    type Record = RiskAssessment;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Risk
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

    fn parse_response(&self, raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<RiskAssessment> {
        parse_commit_records(raw, batch, |record: RawRisk, commit| {
            record.into_assessment(commit.sha.clone())
        })
    }
}

/// Aggregated risk for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    assessments: Vec<RiskAssessment>,
    by_level: BTreeMap<RiskLevel, Vec<String>>,
    area_counts: BTreeMap<String, usize>,
    bucket: BucketSpan,
    timeline: Vec<RiskBucket>,
    flagged: Vec<String>,
    stats: RunStats,
}

impl RiskReport {
    /// Build the report from adjusted assessments.
    ///
    /// `commits` supplies timestamps for the timeline; `flagged` lists the
    /// pre-filter matches in input order.
    pub fn from_run(
        run: AnalysisRun<RiskAssessment>,
        commits: &[Commit],
        flagged: Vec<String>,
        bucket: BucketSpan,
    ) -> Self {
        let AnalysisRun {
            records: assessments,
            stats,
        } = run;

        let mut by_level: BTreeMap<RiskLevel, Vec<String>> =
            RiskLevel::ALL.iter().map(|l| (*l, Vec::new())).collect();
        let mut area_counts: BTreeMap<String, usize> = BTreeMap::new();
        for assessment in &assessments {
            by_level
                .entry(assessment.risk_level)
                .or_default()
                .push(assessment.sha.clone());

            let mut areas: Vec<String> = assessment
                .affected_areas
                .iter()
                .map(|a| a.trim().to_ascii_lowercase())
                .chain(assessment.sensitive_areas.iter().map(|a| a.as_str().to_string()))
                .filter(|a| !a.is_empty())
                .collect();
            areas.sort();
            areas.dedup();
            for area in areas {
                *area_counts.entry(area).or_default() += 1;
            }
        }

        let timestamps: HashMap<&str, DateTime<Utc>> =
            commits.iter().map(|c| (c.sha.as_str(), c.timestamp)).collect();
        let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for assessment in &assessments {
            if let Some(at) = timestamps.get(assessment.sha.as_str()) {
                buckets
                    .entry(bucket.bucket_start(*at))
                    .or_default()
                    .push(assessment.risk_score);
            }
        }
        let timeline = buckets
            .into_iter()
            .map(|(start, scores)| RiskBucket {
                start,
                commits: scores.len(),
                average_score: mean(scores),
            })
            .collect();

        Self {
            assessments,
            by_level,
            area_counts,
            bucket,
            timeline,
            flagged,
            stats,
        }
    }

    pub fn empty(bucket: BucketSpan) -> Self {
        Self::from_run(AnalysisRun::empty(), &[], Vec::new(), bucket)
    }

    pub fn assessments(&self) -> &[RiskAssessment] {
        &self.assessments
    }

    pub fn assessment(&self, sha: &str) -> Option<&RiskAssessment> {
        self.assessments.iter().find(|a| a.sha == sha)
    }

    /// Shas at `level`, in report order.
    pub fn at_level(&self, level: RiskLevel) -> &[String] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn area_counts(&self) -> &BTreeMap<String, usize> {
        &self.area_counts
    }

    pub fn bucket(&self) -> BucketSpan {
        self.bucket
    }

    pub fn timeline(&self) -> &[RiskBucket] {
        &self.timeline
    }

    /// Commits flagged by the path pre-filter.
    pub fn flagged(&self) -> &[String] {
        &self.flagged
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}
