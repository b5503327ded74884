//! Changelog entry generation and version-bump suggestion.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::AnalysisRun;
use crate::analyzer::{detailed_listing, Analyzer, AnalyzerSettings};
use crate::batch::AnalysisBatch;
use crate::client::Prompt;
use crate::config::EngineConfig;
use crate::domain::{AnalyzerKind, Commit, CommitType, RunStats};
use crate::parse::{lenient, non_empty, parse_commit_records, CommitKeyed, ParsedBatch};

pub const DEFAULT_TEMPLATE: &str = r#"Write a user-facing changelog entry for each git commit below.
Classify each entry as added, changed, fixed, removed, deprecated, security or other, rate its
semantic-versioning impact (major, minor or patch) and say whether it breaks compatibility.

Commits:
{commits}

Respond ONLY with a valid JSON array, one object per commit:
[{"sha": "...", "category": "added", "description": "...", "impact": "minor", "breaking": false}]"#;

/// Keep-a-changelog section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Added,
    Changed,
    Fixed,
    Removed,
    Deprecated,
    Security,
    Other,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 7] = [
        ChangeCategory::Added,
        ChangeCategory::Changed,
        ChangeCategory::Fixed,
        ChangeCategory::Removed,
        ChangeCategory::Deprecated,
        ChangeCategory::Security,
        ChangeCategory::Other,
    ];

    pub fn parse(label: &str) -> Option<Self> {
        let category = match label.trim().to_ascii_lowercase().as_str() {
            "added" | "add" | "feature" | "features" => Self::Added,
            "changed" | "change" | "improved" => Self::Changed,
            "fixed" | "fix" | "bugfix" => Self::Fixed,
            "removed" | "remove" => Self::Removed,
            "deprecated" | "deprecate" => Self::Deprecated,
            "security" => Self::Security,
            "other" | "misc" => Self::Other,
            _ => return None,
        };
        Some(category)
    }

    /// Section a conventional commit type lands in by default.
    pub fn from_commit_type(commit_type: CommitType) -> Self {
        match commit_type {
            CommitType::Feat => Self::Added,
            CommitType::Fix => Self::Fixed,
            CommitType::Perf | CommitType::Refactor | CommitType::Style => Self::Changed,
            CommitType::Revert => Self::Removed,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Fixed => "fixed",
            Self::Removed => "removed",
            Self::Deprecated => "deprecated",
            Self::Security => "security",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic-versioning impact, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Patch,
    Minor,
    Major,
}

impl Impact {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "patch" => Some(Self::Patch),
            "minor" => Some(Self::Minor),
            "major" => Some(Self::Major),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Changelog line for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub sha: String,
    pub category: ChangeCategory,
    pub description: String,
    pub impact: Impact,
    pub breaking: bool,
}

#[derive(Debug, Deserialize)]
struct RawChangelog {
    #[serde(alias = "commit", alias = "hash", alias = "id")]
    sha: String,
    #[serde(default, alias = "type", alias = "section")]
    category: Option<String>,
    #[serde(default, alias = "summary", alias = "entry")]
    description: Option<String>,
    #[serde(default, alias = "semver", alias = "bump")]
    impact: Option<String>,
    #[serde(default, alias = "breaking_change", deserialize_with = "lenient::bool_opt")]
    breaking: Option<bool>,
}

impl CommitKeyed for RawChangelog {
    fn commit_id(&self) -> &str {
        &self.sha
    }
}

/// `true` for a `type!:` header or a `BREAKING CHANGE` footer.
fn commit_signals_breaking(commit: &Commit) -> bool {
    let bang = commit
        .headline()
        .split_once(':')
        .is_some_and(|(prefix, _)| prefix.ends_with('!') && !prefix.contains(' '));
    bang || commit.message.contains("BREAKING CHANGE") || commit.message.contains("BREAKING-CHANGE")
}

impl RawChangelog {
    fn into_entry(self, commit: &Commit) -> Result<ChangelogEntry, String> {
        let description =
            non_empty(self.description).ok_or_else(|| "missing description".to_string())?;
        let category = self
            .category
            .as_deref()
            .and_then(ChangeCategory::parse)
            .unwrap_or_else(|| ChangeCategory::from_commit_type(commit.commit_type));
        let breaking = self
            .breaking
            .unwrap_or_else(|| commit_signals_breaking(commit));
        let impact = if breaking {
            Impact::Major
        } else {
            self.impact
                .as_deref()
                .and_then(Impact::parse)
                .unwrap_or(match commit.commit_type {
                    CommitType::Feat => Impact::Minor,
                    _ => Impact::Patch,
                })
        };
        Ok(ChangelogEntry {
            sha: commit.sha.clone(),
            category,
            description,
            impact,
            breaking,
        })
    }
}

pub struct ChangelogAnalyzer {
    settings: AnalyzerSettings,
}

impl ChangelogAnalyzer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            settings: AnalyzerSettings::from_config(
                config,
                AnalyzerKind::Changelog,
                DEFAULT_TEMPLATE,
            ),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.settings.template = template.into();
        self
    }
}

impl Analyzer for ChangelogAnalyzer {
    type Record = ChangelogEntry;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Changelog
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

    fn parse_response(&self, raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<ChangelogEntry> {
        parse_commit_records(raw, batch, |record: RawChangelog, commit| {
            record.into_entry(commit)
        })
    }
}

/// Changelog for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogReport {
    entries: Vec<ChangelogEntry>,
    category_counts: BTreeMap<ChangeCategory, usize>,
    breaking_count: usize,
    suggested_bump: Option<Impact>,
    overview: String,
    stats: RunStats,
}

impl ChangelogReport {
    pub fn from_run(run: AnalysisRun<ChangelogEntry>) -> Self {
        let AnalysisRun { records: entries, stats } = run;

        let mut category_counts = BTreeMap::new();
        for entry in &entries {
            *category_counts.entry(entry.category).or_insert(0) += 1;
        }
        let breaking_count = entries.iter().filter(|e| e.breaking).count();
        let suggested_bump = entries.iter().map(|e| e.impact).max();
        let overview = overview(entries.len(), &category_counts, breaking_count, suggested_bump);

        Self {
            entries,
            category_counts,
            breaking_count,
            suggested_bump,
            overview,
            stats,
        }
    }

    pub fn empty() -> Self {
        Self::from_run(AnalysisRun::empty())
    }

    pub fn entries(&self) -> &[ChangelogEntry] {
        &self.entries
    }

    /// Entries grouped by section, each group in report order.
    pub fn grouped(&self) -> BTreeMap<ChangeCategory, Vec<&ChangelogEntry>> {
        let mut groups: BTreeMap<ChangeCategory, Vec<&ChangelogEntry>> = BTreeMap::new();
        for entry in &self.entries {
            groups.entry(entry.category).or_default().push(entry);
        }
        groups
    }

    pub fn category_count(&self, category: ChangeCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn breaking_count(&self) -> usize {
        self.breaking_count
    }

    /// Highest impact across all entries; `None` when there are none.
    pub fn suggested_bump(&self) -> Option<Impact> {
        self.suggested_bump
    }

    pub fn overview(&self) -> &str {
        &self.overview
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}

fn overview(
    total: usize,
    counts: &BTreeMap<ChangeCategory, usize>,
    breaking: usize,
    bump: Option<Impact>,
) -> String {
    let Some(bump) = bump else {
        return "No changes.".to_string();
    };
    let sections = counts
        .iter()
        .map(|(category, n)| format!("{n} {category}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{total} changes: {sections}; {breaking} breaking. Suggested bump: {bump}.")
}
