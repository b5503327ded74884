//! Commit model consumed read-only by the analysis engine.
//!
//! Commits are produced by the repository-reading collaborator. The engine
//! only borrows them; nothing in this crate mutates a [`Commit`] once built.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Conventional-commit type of a commit header.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    Feat,
    Fix,
    Docs,
    Style,
    Refactor,
    Perf,
    Test,
    Build,
    Ci,
    Chore,
    Revert,
    #[default]
    Unknown,
}

impl CommitType {
    pub const ALL: [CommitType; 12] = [
        CommitType::Feat,
        CommitType::Fix,
        CommitType::Docs,
        CommitType::Style,
        CommitType::Refactor,
        CommitType::Perf,
        CommitType::Test,
        CommitType::Build,
        CommitType::Ci,
        CommitType::Chore,
        CommitType::Revert,
        CommitType::Unknown,
    ];

    /// Parse a header type token. Unrecognised tokens map to `Unknown`.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "feat" => Self::Feat,
            "fix" => Self::Fix,
            "docs" => Self::Docs,
            "style" => Self::Style,
            "refactor" => Self::Refactor,
            "perf" => Self::Perf,
            "test" => Self::Test,
            "build" => Self::Build,
            "ci" => Self::Ci,
            "chore" => Self::Chore,
            "revert" => Self::Revert,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Docs => "docs",
            Self::Style => "style",
            Self::Refactor => "refactor",
            Self::Perf => "perf",
            Self::Test => "test",
            Self::Build => "build",
            Self::Ci => "ci",
            Self::Chore => "chore",
            Self::Revert => "revert",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line and file statistics for a single commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
}

impl CommitStats {
    pub fn new(lines_added: u64, lines_deleted: u64, files_changed: u64) -> Self {
        Self {
            lines_added,
            lines_deleted,
            files_changed,
        }
    }

    /// Lines added plus lines deleted.
    pub fn total_changes(&self) -> u64 {
        self.lines_added + self.lines_deleted
    }

    /// Size category: `small` (≤10), `medium` (≤50), `large` (≤200), `xlarge`.
    pub fn size_bucket(&self) -> &'static str {
        match self.total_changes() {
            0..=10 => "small",
            11..=50 => "medium",
            51..=200 => "large",
            _ => "xlarge",
        }
    }
}

/// A parsed git commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Full content hash.
    pub sha: String,
    /// Full commit message as written.
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub stats: CommitStats,
    /// Repository-relative paths touched by the commit.
    pub changed_paths: Vec<String>,
    pub commit_type: CommitType,
    pub scope: Option<String>,
    /// First message line, minus any conventional `type(scope):` prefix.
    pub subject: String,
    pub body: Option<String>,
    pub co_authors: Vec<String>,
    /// `Phase N` tag found in the message, if any.
    pub phase: Option<u32>,
    pub is_conventional: bool,
}

impl Commit {
    /// Build a commit from its raw message, deriving the conventional
    /// header fields, body, co-author trailers and phase tag.
    pub fn from_message(
        sha: impl Into<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        author_email: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        let parsed = ParsedMessage::parse(&message);
        Self {
            sha: sha.into(),
            author: author.into(),
            author_email: author_email.into(),
            timestamp,
            stats: CommitStats::default(),
            changed_paths: Vec::new(),
            commit_type: parsed.commit_type,
            scope: parsed.scope,
            subject: parsed.subject,
            body: parsed.body,
            co_authors: extract_co_authors(&message),
            phase: detect_phase(&message),
            is_conventional: parsed.is_conventional,
            message,
        }
    }

    pub fn with_stats(mut self, stats: CommitStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_changed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Eight-character abbreviation used in prompts.
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }

    /// First line of the raw message.
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedMessage {
    commit_type: CommitType,
    scope: Option<String>,
    subject: String,
    body: Option<String>,
    is_conventional: bool,
}

impl ParsedMessage {
    fn parse(message: &str) -> Self {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Self {
                commit_type: CommitType::Unknown,
                scope: None,
                subject: String::new(),
                body: None,
                is_conventional: false,
            };
        }

        let mut lines = trimmed.lines();
        let first_line = lines.next().unwrap_or("").trim();

        let (commit_type, scope, subject, is_conventional) =
            match conventional_header().captures(first_line) {
                Some(caps) => {
                    let commit_type = CommitType::parse(&caps["type"]);
                    (
                        commit_type,
                        caps.name("scope").map(|m| m.as_str().to_string()),
                        caps["subject"].trim().to_string(),
                        commit_type != CommitType::Unknown,
                    )
                }
                None => (CommitType::Unknown, None, first_line.to_string(), false),
            };

        let mut body_lines: Vec<&str> = Vec::new();
        for line in lines {
            if body_lines.is_empty() && line.trim().is_empty() {
                continue;
            }
            if co_author_trailer().is_match(line) {
                break;
            }
            body_lines.push(line);
        }
        while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
            body_lines.pop();
        }

        Self {
            commit_type,
            scope,
            subject,
            body: (!body_lines.is_empty()).then(|| body_lines.join("\n")),
            is_conventional,
        }
    }
}

fn conventional_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<type>[a-z]+)(?:\((?P<scope>[^)]+)\))?:\s*(?P<subject>.+)$")
            .expect("conventional header pattern is valid")
    })
}

fn co_author_trailer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^Co-Authored-By:\s*(.+)$").expect("co-author pattern is valid")
    })
}

fn phase_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Phase\s+(\d+)").expect("phase pattern is valid"))
}

fn extract_co_authors(message: &str) -> Vec<String> {
    co_author_trailer()
        .captures_iter(message)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

fn detect_phase(message: &str) -> Option<u32> {
    phase_reference()
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_conventional_header_with_scope() {
        let commit = Commit::from_message(
            "abc123",
            "feat(auth): add login functionality",
            "dev",
            "dev@example.com",
            ts(),
        );
        assert_eq!(commit.commit_type, CommitType::Feat);
        assert_eq!(commit.scope.as_deref(), Some("auth"));
        assert_eq!(commit.subject, "add login functionality");
        assert!(commit.is_conventional);
    }

    #[test]
    fn test_unknown_type_is_not_conventional() {
        let commit = Commit::from_message("a", "wip: stuff", "dev", "d@x", ts());
        assert_eq!(commit.commit_type, CommitType::Unknown);
        assert_eq!(commit.subject, "stuff");
        assert!(!commit.is_conventional);
    }

    #[test]
    fn test_plain_message_keeps_first_line_as_subject() {
        let commit = Commit::from_message("a", "Update README\n\nMore words", "dev", "d@x", ts());
        assert_eq!(commit.subject, "Update README");
        assert_eq!(commit.body.as_deref(), Some("More words"));
    }

    #[test]
    fn test_body_stops_at_co_author_trailer() {
        let msg = "fix: race in watcher\n\nFirst line\nSecond line\n\nCo-Authored-By: Ada <ada@example.com>\nco-authored-by: Bob <bob@example.com>";
        let commit = Commit::from_message("a", msg, "dev", "d@x", ts());
        assert_eq!(commit.body.as_deref(), Some("First line\nSecond line"));
        assert_eq!(
            commit.co_authors,
            vec!["Ada <ada@example.com>", "Bob <bob@example.com>"]
        );
    }

    #[test]
    fn test_phase_detection() {
        let commit = Commit::from_message("a", "feat: Phase 3 wiring", "dev", "d@x", ts());
        assert_eq!(commit.phase, Some(3));
        let commit = Commit::from_message("a", "feat: wiring", "dev", "d@x", ts());
        assert_eq!(commit.phase, None);
    }

    #[test]
    fn test_empty_message() {
        let commit = Commit::from_message("a", "   ", "dev", "d@x", ts());
        assert_eq!(commit.commit_type, CommitType::Unknown);
        assert!(commit.subject.is_empty());
        assert!(commit.body.is_none());
    }

    #[test]
    fn test_size_buckets() {
        assert_eq!(CommitStats::new(5, 5, 1).size_bucket(), "small");
        assert_eq!(CommitStats::new(30, 20, 1).size_bucket(), "medium");
        assert_eq!(CommitStats::new(150, 50, 3).size_bucket(), "large");
        assert_eq!(CommitStats::new(150, 51, 3).size_bucket(), "xlarge");
    }

    #[test]
    fn test_short_sha() {
        let commit = Commit::from_message("abcdef0123456789", "x", "dev", "d@x", ts());
        assert_eq!(commit.short_sha(), "abcdef01");
        let commit = Commit::from_message("abc", "x", "dev", "d@x", ts());
        assert_eq!(commit.short_sha(), "abc");
    }
}
