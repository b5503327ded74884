//! Commit batch partitioning.
//!
//! Batches are contiguous, ordered views over borrowed commits. Concatenating
//! the batches returned by any partitioner reproduces its input exactly.

use chrono::Duration;

use crate::domain::{AnalysisError, Commit, Result};

/// Minimum length of an abbreviated identifier accepted as a prefix match.
pub const MIN_PREFIX_LEN: usize = 7;

/// An ordered, contiguous group of commits submitted as one request.
#[derive(Debug, Clone)]
pub struct AnalysisBatch<'a> {
    index: usize,
    commits: Vec<&'a Commit>,
}

impl<'a> AnalysisBatch<'a> {
    pub fn new(index: usize, commits: Vec<&'a Commit>) -> Self {
        Self { index, commits }
    }

    /// Position of this batch in its partition.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn commits(&self) -> &[&'a Commit] {
        &self.commits
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Resolve a model-reported identifier to a commit of this batch.
    ///
    /// Exact matches win. Otherwise the identifier must be at least
    /// [`MIN_PREFIX_LEN`] characters and prefix exactly one commit sha.
    pub fn resolve(&self, id: &str) -> Option<&'a Commit> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        if let Some(exact) = self.commits.iter().find(|c| c.sha.eq_ignore_ascii_case(id)) {
            return Some(*exact);
        }
        if id.len() < MIN_PREFIX_LEN {
            return None;
        }
        let needle = id.to_ascii_lowercase();
        let mut matches = self
            .commits
            .iter()
            .filter(|c| c.sha.to_ascii_lowercase().starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(*only),
            _ => None,
        }
    }
}

fn check_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(AnalysisError::config("batch_size must be a positive integer"));
    }
    Ok(())
}

/// Split `commits` by position into batches of at most `batch_size`.
///
/// The final batch may be smaller. Empty input yields no batches.
pub fn partition(commits: &[Commit], batch_size: usize) -> Result<Vec<AnalysisBatch<'_>>> {
    partition_refs(commits.iter().collect(), batch_size)
}

/// [`partition`] over an already selected subset of commits.
pub fn partition_refs(commits: Vec<&Commit>, batch_size: usize) -> Result<Vec<AnalysisBatch<'_>>> {
    check_size(batch_size)?;
    Ok(commits
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| AnalysisBatch::new(index, chunk.to_vec()))
        .collect())
}

/// Split `commits` into contiguous time-windowed chunks.
///
/// A chunk closes when the next commit lies more than `window` away from the
/// chunk's first commit, or when the chunk holds `max_len` commits. Input
/// order is preserved; commits are not re-sorted.
pub fn partition_time_windows<'a, I>(
    commits: I,
    max_len: usize,
    window: Duration,
) -> Result<Vec<AnalysisBatch<'a>>>
where
    I: IntoIterator<Item = &'a Commit>,
{
    check_size(max_len)?;
    if window <= Duration::zero() {
        return Err(AnalysisError::config("time window must be positive"));
    }

    let mut batches = Vec::new();
    let mut current: Vec<&'a Commit> = Vec::new();
    for commit in commits {
        if let Some(first) = current.first() {
            let span = (commit.timestamp - first.timestamp).abs();
            if current.len() >= max_len || span > window {
                batches.push(AnalysisBatch::new(batches.len(), std::mem::take(&mut current)));
            }
        }
        current.push(commit);
    }
    if !current.is_empty() {
        batches.push(AnalysisBatch::new(batches.len(), current));
    }
    Ok(batches)
}
