//! Semantic clustering of commits into features.
//!
//! Unlike the per-commit analyzers, clustering needs whole-collection
//! reasoning. The analyzer only proposes provisional clusters per chunk;
//! [`ClusterMergeEngine`] folds them into the final [`ClusteringResult`]:
//!
//! ```text
//! Unclustered --add_provisional--> ProvisionallyClustered --finalize--> Finalized
//! ```
//!
//! A commit may end up in several clusters. That is recorded explicitly in
//! [`ClusteringResult::overlap`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::analyzer::{headline_listing, Analyzer, AnalyzerSettings};
use crate::batch::{partition_refs, partition_time_windows, AnalysisBatch};
use crate::client::Prompt;
use crate::config::{ClusterConfig, EngineConfig};
use crate::domain::{AnalysisError, AnalyzerKind, Commit, CommitType, ParseIssue, Result, RunStats};
use crate::parse::{extract_payload, lenient, non_empty, Extracted, JsonPayload, ParsedBatch};

pub const DEFAULT_TEMPLATE: &str = r#"Group the git commits below into features: sets of commits that together
implement, fix or refactor one coherent piece of functionality. A commit may belong to more than one
feature. Leave commits that fit no feature out of every cluster.

Commits:
{commits}

Respond ONLY with a valid JSON object:
{"clusters": [{"id": "c1", "name": "...", "description": "...", "type": "feat", "commits": ["sha", "..."]}], "unclustered": ["sha"]}"#;

/// Length of the hex digest prefix used in cluster ids.
const CLUSTER_ID_HEX_LEN: usize = 12;

/// One provisional cluster proposed by a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMembership {
    /// Label the model gave the cluster within its chunk.
    pub label: String,
    pub name: String,
    pub description: String,
    /// Type hint reported by the model.
    pub commit_type: Option<CommitType>,
    /// Full shas of the batch commits in the cluster, deduplicated.
    pub members: Vec<String>,
    /// Index of the chunk that proposed the cluster.
    #[serde(default)]
    pub chunk: usize,
}

#[derive(Debug, Deserialize)]
struct RawCluster {
    #[serde(default, alias = "id", alias = "cluster_id")]
    label: Option<Value>,
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default, alias = "summary")]
    description: Option<String>,
    #[serde(default, alias = "type")]
    commit_type: Option<String>,
    #[serde(
        default,
        alias = "members",
        alias = "shas",
        deserialize_with = "lenient::string_list"
    )]
    commits: Vec<String>,
}

/// Record candidates of a clustering response: the `clusters` array when
/// present, otherwise the generic unwrapping.
fn cluster_items(payload: JsonPayload) -> Vec<Value> {
    match payload {
        JsonPayload::Object(mut map) => match map.remove("clusters") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                map.insert("clusters".to_string(), other);
                JsonPayload::Object(map).into_items()
            }
            None if map.is_empty() => Vec::new(),
            None => JsonPayload::Object(map).into_items(),
        },
        array => array.into_items(),
    }
}

fn parse_clusters(raw: &str, batch: &AnalysisBatch<'_>) -> ParsedBatch<ClusterMembership> {
    let Extracted { payload, issues } = extract_payload(raw);
    let mut parsed = ParsedBatch::from_issues(issues);
    let Some(mut payload) = payload else {
        return parsed;
    };

    if let JsonPayload::Object(map) = &mut payload {
        if let Some(listed) = map.remove("unclustered") {
            check_unclustered(listed, batch, &mut parsed.issues);
        }
    }

    for (position, item) in cluster_items(payload).into_iter().enumerate() {
        let cluster: RawCluster = match serde_json::from_value(item) {
            Ok(cluster) => cluster,
            Err(err) => {
                parsed.issues.push(ParseIssue::invalid(err.to_string()));
                continue;
            }
        };
        let Some(name) = non_empty(cluster.name) else {
            parsed.issues.push(ParseIssue::invalid("cluster without a name"));
            continue;
        };

        let mut members: Vec<String> = Vec::new();
        for id in &cluster.commits {
            match batch.resolve(id) {
                Some(commit) if !members.contains(&commit.sha) => members.push(commit.sha.clone()),
                Some(_) => {}
                None => parsed.issues.push(ParseIssue::UnknownCommit { sha: id.clone() }),
            }
        }
        if members.is_empty() {
            parsed.issues.push(ParseIssue::invalid(format!(
                "cluster '{name}' has no members in this batch"
            )));
            continue;
        }

        let label = match cluster.label {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("{}-{position}", batch.index()),
        };
        parsed.records.push(ClusterMembership {
            label,
            name,
            description: non_empty(cluster.description).unwrap_or_default(),
            commit_type: cluster
                .commit_type
                .as_deref()
                .map(CommitType::parse)
                .filter(|t| *t != CommitType::Unknown),
            members,
            chunk: batch.index(),
        });
    }
    parsed
}

/// The explicit leftover list carries no data of its own; the final
/// unclustered set is derived from membership. Its ids must still belong
/// to the batch.
fn check_unclustered(listed: Value, batch: &AnalysisBatch<'_>, issues: &mut Vec<ParseIssue>) {
    match lenient::string_list(listed) {
        Ok(ids) => issues.extend(
            ids.into_iter()
                .filter(|id| batch.resolve(id).is_none())
                .map(|sha| ParseIssue::UnknownCommit { sha }),
        ),
        Err(err) => issues.push(ParseIssue::invalid(format!("unclustered: {err}"))),
    }
}

pub struct ClusterAnalyzer {
    settings: AnalyzerSettings,
    config: ClusterConfig,
}

impl ClusterAnalyzer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            settings: AnalyzerSettings::from_config(
                config,
                AnalyzerKind::Clustering,
                DEFAULT_TEMPLATE,
            ),
            config: config.clustering.clone(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.settings.template = template.into();
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

impl Analyzer for ClusterAnalyzer {
    type Record = ClusterMembership;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Clustering
    }

    fn is_available(&self) -> bool {
        self.settings.is_available()
    }

    fn batch_size(&self) -> usize {
        self.config.chunk_size
    }

    /// The whole collection as one batch, or time-windowed chunks once it
    /// exceeds `chunk_threshold` commits.
    fn partition<'c>(&self, commits: Vec<&'c Commit>) -> Result<Vec<AnalysisBatch<'c>>> {
        if commits.len() > self.config.chunk_threshold {
            partition_time_windows(commits, self.config.chunk_size, self.config.window())
        } else {
            let whole = commits.len().max(1);
            partition_refs(commits, whole)
        }
    }

    fn build_prompt(&self, batch: &AnalysisBatch<'_>) -> Prompt {
        self.settings.render(&headline_listing(batch))
    }

    fn parse_response(
        &self,
        raw: &str,
        batch: &AnalysisBatch<'_>,
    ) -> ParsedBatch<ClusterMembership> {
        parse_clusters(raw, batch)
    }
}

/// Earliest and latest member timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A final feature cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// `cl-` plus a digest prefix of the sorted member shas.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Member shas in input order.
    pub commits: Vec<String>,
    pub date_range: DateRange,
    pub total_lines_changed: u64,
    pub dominant_type: CommitType,
    /// Number of provisional clusters folded into this one.
    pub merged_from: usize,
}

/// Deterministic cluster id for a member set.
pub fn cluster_id<S: AsRef<str>>(shas: &[S]) -> String {
    let mut sorted: Vec<&str> = shas.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    let digest = Sha256::digest(sorted.join("\n").as_bytes());
    let hex = hex::encode(digest);
    format!("cl-{}", &hex[..CLUSTER_ID_HEX_LEN])
}

/// Clusters, leftovers and the multi-membership map of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    clusters: Vec<Cluster>,
    unclustered: Vec<String>,
    overlap: BTreeMap<String, Vec<String>>,
    stats: RunStats,
}

impl ClusteringResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Final clusters ordered by their earliest member.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Commits that belong to no cluster, in input order.
    pub fn unclustered(&self) -> &[String] {
        &self.unclustered
    }

    /// Every clustered commit mapped to the ids of all clusters it is in.
    pub fn overlap(&self) -> &BTreeMap<String, Vec<String>> {
        &self.overlap
    }

    pub fn clusters_for(&self, sha: &str) -> &[String] {
        self.overlap.get(sha).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Commits that belong to more than one cluster.
    pub fn shared_commits(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.overlap
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(sha, ids)| (sha.as_str(), ids.as_slice()))
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}

/// Where a [`ClusterMergeEngine`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPhase {
    Unclustered,
    ProvisionallyClustered,
    Finalized,
}

#[derive(Debug, Clone)]
struct Provisional {
    name: String,
    description: String,
    /// Input positions of the members.
    members: BTreeSet<usize>,
    /// Chunks whose proposals were folded in.
    chunks: BTreeSet<usize>,
    merged_from: usize,
}

impl Provisional {
    fn absorb(&mut self, other: Provisional) {
        self.members.extend(other.members);
        self.chunks.extend(other.chunks);
        self.merged_from += other.merged_from;
    }

    fn tokens(&self) -> BTreeSet<String> {
        tokenize(&format!("{} {}", self.name, self.description))
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Most common type among `commits`, ties broken by declaration order.
fn dominant_type(commits: &[&Commit]) -> CommitType {
    let mut counts: HashMap<CommitType, usize> = HashMap::new();
    for commit in commits {
        *counts.entry(commit.commit_type).or_default() += 1;
    }
    let mut best = CommitType::Unknown;
    let mut best_count = 0;
    for commit_type in CommitType::ALL {
        let count = counts.get(&commit_type).copied().unwrap_or(0);
        if count > best_count {
            best = commit_type;
            best_count = count;
        }
    }
    best
}

/// Folds provisional clusters from every chunk into final clusters.
#[derive(Debug)]
pub struct ClusterMergeEngine<'c> {
    commits: &'c [Commit],
    positions: HashMap<&'c str, usize>,
    config: ClusterConfig,
    phase: ClusterPhase,
    provisional: Vec<Provisional>,
}

impl<'c> ClusterMergeEngine<'c> {
    pub fn new(commits: &'c [Commit], config: ClusterConfig) -> Self {
        let positions = commits
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.sha.as_str(), pos))
            .collect();
        Self {
            commits,
            positions,
            config,
            phase: ClusterPhase::Unclustered,
            provisional: Vec::new(),
        }
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    /// Record provisional clusters, in chunk order. Members not present in
    /// the collection are ignored; a cluster left empty is skipped.
    pub fn add_provisional<I>(&mut self, memberships: I) -> Result<()>
    where
        I: IntoIterator<Item = ClusterMembership>,
    {
        if self.phase == ClusterPhase::Finalized {
            return Err(AnalysisError::config(
                "cannot add provisional clusters after finalization",
            ));
        }
        for membership in memberships {
            let members: BTreeSet<usize> = membership
                .members
                .iter()
                .filter_map(|sha| self.positions.get(sha.as_str()).copied())
                .collect();
            if members.is_empty() {
                continue;
            }
            self.provisional.push(Provisional {
                name: membership.name,
                description: membership.description,
                members,
                chunks: BTreeSet::from([membership.chunk]),
                merged_from: 1,
            });
        }
        self.phase = ClusterPhase::ProvisionallyClustered;
        Ok(())
    }

    /// Merge, demote and build the final result.
    pub fn finalize(&mut self, stats: RunStats) -> Result<ClusteringResult> {
        match self.phase {
            ClusterPhase::ProvisionallyClustered => {}
            ClusterPhase::Unclustered => {
                return Err(AnalysisError::config(
                    "cannot finalize clustering before provisional clusters are recorded",
                ))
            }
            ClusterPhase::Finalized => {
                return Err(AnalysisError::config("clustering is already finalized"))
            }
        }

        let mut working = std::mem::take(&mut self.provisional);
        self.merge_to_fixpoint(&mut working);
        working.retain(|c| c.members.len() >= self.config.min_cluster_size);
        working.sort_by_key(|c| c.members.first().copied());

        let clusters: Vec<Cluster> = working.into_iter().map(|c| self.build(c)).collect();

        let mut overlap: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for cluster in &clusters {
            for sha in &cluster.commits {
                overlap.entry(sha.clone()).or_default().push(cluster.id.clone());
            }
        }
        let unclustered = self
            .commits
            .iter()
            .filter(|c| !overlap.contains_key(&c.sha))
            .map(|c| c.sha.clone())
            .collect();

        self.phase = ClusterPhase::Finalized;
        tracing::debug!(
            clusters = clusters.len(),
            shared = overlap.values().filter(|ids| ids.len() > 1).count(),
            "clustering finalized"
        );
        Ok(ClusteringResult {
            clusters,
            unclustered,
            overlap,
            stats,
        })
    }

    /// Clusters proposed by the same chunk are distinct features, so only
    /// clusters with disjoint source chunks are candidates.
    fn should_merge(&self, a: &Provisional, b: &Provisional) -> bool {
        if !a.chunks.is_disjoint(&b.chunks) {
            return false;
        }
        let shared = a.members.intersection(&b.members).count();
        let smaller = a.members.len().min(b.members.len());
        if smaller > 0 && shared as f64 / smaller as f64 >= self.config.overlap_threshold {
            return true;
        }
        let name_a = normalize_name(&a.name);
        if !name_a.is_empty() && name_a == normalize_name(&b.name) {
            return true;
        }
        jaccard(&a.tokens(), &b.tokens()) >= self.config.name_similarity
    }

    /// Merge pairs until no pair qualifies. The earlier cluster absorbs the
    /// later one and keeps its name and description.
    fn merge_to_fixpoint(&self, clusters: &mut Vec<Provisional>) {
        'restart: loop {
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    if self.should_merge(&clusters[i], &clusters[j]) {
                        let later = clusters.remove(j);
                        clusters[i].absorb(later);
                        continue 'restart;
                    }
                }
            }
            break;
        }
    }

    fn build(&self, provisional: Provisional) -> Cluster {
        let members: Vec<&Commit> = provisional
            .members
            .iter()
            .map(|pos| &self.commits[*pos])
            .collect();
        let shas: Vec<String> = members.iter().map(|c| c.sha.clone()).collect();
        let start = members.iter().map(|c| c.timestamp).min();
        let end = members.iter().map(|c| c.timestamp).max();
        let date_range = match (start, end) {
            (Some(start), Some(end)) => DateRange { start, end },
            _ => DateRange {
                start: DateTime::<Utc>::MIN_UTC,
                end: DateTime::<Utc>::MIN_UTC,
            },
        };
        Cluster {
            id: cluster_id(&shas),
            name: provisional.name,
            description: provisional.description,
            total_lines_changed: members.iter().map(|c| c.stats.total_changes()).sum(),
            dominant_type: dominant_type(&members),
            commits: shas,
            date_range,
            merged_from: provisional.merged_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::partition;
    use crate::domain::CommitStats;
    use chrono::{Duration, TimeZone};

    fn commits(n: usize) -> Vec<Commit> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let message = if i % 3 == 0 { "fix: x" } else { "feat: y" };
                Commit::from_message(format!("{i:02}abcdef0123"), message, "d", "d@x", base + Duration::hours(i as i64))
                    .with_stats(CommitStats::new(10, 5, 1))
            })
            .collect()
    }

    fn membership(
        chunk: usize,
        name: &str,
        description: &str,
        members: &[&Commit],
    ) -> ClusterMembership {
        ClusterMembership {
            label: name.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            commit_type: None,
            members: members.iter().map(|c| c.sha.clone()).collect(),
            chunk,
        }
    }

    fn finalize(commits: &[Commit], memberships: Vec<ClusterMembership>) -> ClusteringResult {
        let mut engine = ClusterMergeEngine::new(commits, ClusterConfig::default());
        engine.add_provisional(memberships).unwrap();
        engine.finalize(RunStats::default()).unwrap()
    }

    #[test]
    fn test_parse_clusters_object() {
        let commits = commits(4);
        let batch = partition(&commits, 10).unwrap().remove(0);
        let raw = r#"Sure:
{"clusters": [
  {"id": 1, "name": "Login flow", "description": "auth", "type": "feat", "commits": ["00abcdef", "01abcdef", "01abcdef", "deadbeef00"]},
  {"id": "c2", "name": "Ghost", "commits": ["ffffffff"]},
  {"description": "nameless", "commits": ["02abcdef"]}
], "unclustered": ["03abcdef"]}"#;

        let parsed = parse_clusters(raw, &batch);

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.label, "1");
        assert_eq!(record.commit_type, Some(CommitType::Feat));
        assert_eq!(record.members, vec![commits[0].sha.clone(), commits[1].sha.clone()]);
        assert_eq!(record.chunk, 0);
        // deadbeef00, ffffffff, the empty Ghost cluster and the nameless one
        assert_eq!(parsed.issues.len(), 4);
    }

    #[test]
    fn test_parse_bare_array_of_clusters() {
        let commits = commits(2);
        let batch = partition(&commits, 10).unwrap().remove(0);
        let raw = r#"[{"name": "Docs", "members": ["00abcdef0123"]}]"#;
        let parsed = parse_clusters(raw, &batch);
        assert_eq!(parsed.records[0].label, "0-0");
    }

    #[test]
    fn test_partition_whole_collection_under_threshold() {
        let commits = commits(12);
        let analyzer = ClusterAnalyzer::from_config(&EngineConfig::available("m"));
        let batches = analyzer.partition(commits.iter().collect()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 12);
        assert!(analyzer.partition(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_partition_chunks_above_threshold() {
        let commits = commits(12);
        let mut config = EngineConfig::available("m");
        config.clustering.chunk_threshold = 10;
        config.clustering.chunk_size = 5;
        let analyzer = ClusterAnalyzer::from_config(&config);
        let sizes: Vec<usize> = analyzer
            .partition(commits.iter().collect())
            .unwrap()
            .iter()
            .map(AnalysisBatch::len)
            .collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn test_overlapping_clusters_merge() {
        let c = commits(6);
        let result = finalize(
            &c,
            vec![
                membership(0, "Search indexing", "build the index", &[&c[0], &c[1], &c[2]]),
                membership(0, "Query parser", "parse user queries", &[&c[4], &c[5]]),
                // chunk two re-proposes most of the first cluster
                membership(1, "Indexer", "incremental updates", &[&c[1], &c[2], &c[3]]),
            ],
        );

        assert_eq!(result.clusters().len(), 2);
        let merged = &result.clusters()[0];
        assert_eq!(merged.name, "Search indexing");
        assert_eq!(merged.merged_from, 2);
        assert_eq!(
            merged.commits,
            vec![c[0].sha.clone(), c[1].sha.clone(), c[2].sha.clone(), c[3].sha.clone()]
        );
        assert_eq!(merged.total_lines_changed, 60);
        assert_eq!(merged.date_range.start, c[0].timestamp);
        assert_eq!(merged.date_range.end, c[3].timestamp);
        assert_eq!(merged.dominant_type, CommitType::Feat);
        assert!(result.unclustered().is_empty());
    }

    #[test]
    fn test_equivalent_names_merge() {
        let c = commits(4);
        let result = finalize(
            &c,
            vec![
                membership(0, "Dark mode", "theme work", &[&c[0], &c[1]]),
                membership(1, "dark-mode", "", &[&c[2], &c[3]]),
            ],
        );
        assert_eq!(result.clusters().len(), 1);
        assert_eq!(result.clusters()[0].commits.len(), 4);
    }

    #[test]
    fn test_multi_membership_is_explicit() {
        let c = commits(5);
        let result = finalize(
            &c,
            vec![
                membership(0, "Login flow", "session handling", &[&c[0], &c[1], &c[2]]),
                membership(0, "Payment processing", "stripe checkout", &[&c[2], &c[3], &c[4]]),
            ],
        );

        assert_eq!(result.clusters().len(), 2);
        let shared = &c[2].sha;
        let ids = result.clusters_for(shared);
        assert_eq!(ids.len(), 2);
        for id in ids {
            let cluster = result.cluster(id).unwrap();
            assert_eq!(cluster.commits.iter().filter(|s| *s == shared).count(), 1);
        }
        assert_eq!(result.shared_commits().count(), 1);
        assert_eq!(result.clusters_for(&c[0].sha).len(), 1);
    }

    #[test]
    fn test_parse_flags_unknown_unclustered_ids() {
        let commits = commits(3);
        let batch = partition(&commits, 10).unwrap().remove(0);
        let raw = r#"{"clusters": [{"name": "Docs", "commits": ["00abcdef", "01abcdef"]}],
 "unclustered": ["02abcdef", "0badc0de"]}"#;

        let parsed = parse_clusters(raw, &batch);

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.issues,
            vec![ParseIssue::UnknownCommit {
                sha: "0badc0de".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_leftovers_only() {
        let commits = commits(2);
        let batch = partition(&commits, 10).unwrap().remove(0);
        let parsed = parse_clusters(r#"{"unclustered": ["00abcdef", "01abcdef"]}"#, &batch);
        assert!(parsed.records.is_empty());
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn test_same_chunk_clusters_never_merge() {
        let c = commits(4);
        let result = finalize(
            &c,
            vec![
                membership(0, "Login form", "", &[&c[0], &c[1]]),
                membership(0, "Session storage", "", &[&c[1], &c[2], &c[3]]),
                membership(0, "login form", "validation", &[&c[2], &c[3]]),
            ],
        );

        assert_eq!(result.clusters().len(), 3);
        assert!(result.clusters().iter().all(|cluster| cluster.merged_from == 1));
        assert_eq!(result.clusters_for(&c[1].sha).len(), 2);
    }

    #[test]
    fn test_merged_cluster_keeps_its_source_chunks() {
        let c = commits(6);
        let result = finalize(
            &c,
            vec![
                membership(0, "Search indexing", "", &[&c[0], &c[1], &c[2]]),
                membership(0, "Search ranking", "", &[&c[3], &c[4]]),
                // overlaps both chunk-0 clusters; only the first absorbs it
                membership(1, "Search indexing", "", &[&c[2], &c[3], &c[4], &c[5]]),
            ],
        );

        let names: Vec<&str> = result.clusters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Search indexing", "Search ranking"]);
        assert_eq!(result.clusters()[0].merged_from, 2);
        assert_eq!(result.clusters()[0].commits.len(), 6);
        assert_eq!(result.clusters()[1].merged_from, 1);
    }

    #[test]
    fn test_small_clusters_are_demoted() {
        let c = commits(5);
        let result = finalize(
            &c,
            vec![
                membership(0, "Release tooling", "ci scripts", &[&c[0], &c[1]]),
                membership(1, "Typo", "", &[&c[1]]),
                membership(0, "Lonely", "", &[&c[3]]),
            ],
        );

        assert_eq!(result.clusters().len(), 1);
        assert_eq!(result.clusters()[0].merged_from, 2);
        // Typo folds into the first cluster by overlap; Lonely is demoted
        assert_eq!(
            result.unclustered(),
            &[c[2].sha.clone(), c[3].sha.clone(), c[4].sha.clone()]
        );
    }

    #[test]
    fn test_clusters_ordered_by_earliest_member() {
        let c = commits(6);
        let result = finalize(
            &c,
            vec![
                membership(0, "Exporter", "csv output", &[&c[4], &c[5]]),
                membership(0, "Importer", "json input", &[&c[0], &c[1]]),
            ],
        );
        let names: Vec<&str> = result.clusters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Importer", "Exporter"]);
    }

    #[test]
    fn test_cluster_id_is_order_independent() {
        let a = cluster_id(&["b", "a", "c"]);
        let b = cluster_id(&["c", "b", "a"]);
        assert_eq!(a, b);
        assert!(a.starts_with("cl-"));
        assert_eq!(a.len(), 3 + CLUSTER_ID_HEX_LEN);
        assert_ne!(a, cluster_id(&["a", "b"]));
    }

    #[test]
    fn test_phase_order_is_enforced() {
        let c = commits(2);
        let mut engine = ClusterMergeEngine::new(&c, ClusterConfig::default());
        assert_eq!(engine.phase(), ClusterPhase::Unclustered);
        assert!(matches!(
            engine.finalize(RunStats::default()),
            Err(AnalysisError::Configuration(_))
        ));

        engine.add_provisional(Vec::new()).unwrap();
        assert_eq!(engine.phase(), ClusterPhase::ProvisionallyClustered);
        let result = engine.finalize(RunStats::default()).unwrap();
        assert_eq!(result.unclustered().len(), 2);
        assert_eq!(engine.phase(), ClusterPhase::Finalized);

        assert!(engine.add_provisional(Vec::new()).is_err());
        assert!(engine.finalize(RunStats::default()).is_err());
    }

    #[test]
    fn test_dominant_type_ties_follow_declaration_order() {
        let c = vec![
            Commit::from_message("a", "fix: one", "d", "d@x", Utc::now()),
            Commit::from_message("b", "feat: two", "d", "d@x", Utc::now()),
        ];
        let refs: Vec<&Commit> = c.iter().collect();
        assert_eq!(dominant_type(&refs), CommitType::Feat);
    }
}
