//! Merge per-batch outcomes into one analyzer run.

use crate::analyzer::Analyzer;
use crate::batch::AnalysisBatch;
use crate::dispatch::BatchOutcome;
use crate::domain::{BatchFailure, ParseDiagnostic, RunStats};
use crate::metrics::METRICS;
use crate::obs;

/// Flattened records of one run plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRun<R> {
    /// Records in batch-index order, then response order within a batch.
    pub records: Vec<R>,
    pub stats: RunStats,
}

impl<R> AnalysisRun<R> {
    /// A run that dispatched nothing.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            stats: RunStats::default(),
        }
    }
}

/// Parse every successful outcome with `analyzer` and collect the records.
///
/// Outcomes are processed in batch-index order regardless of the order they
/// arrive in, so completion order never affects record order. Failed batches
/// are recorded in [`RunStats::failures`]; parse issues become diagnostics.
pub fn aggregate<A>(
    analyzer: &A,
    batches: &[AnalysisBatch<'_>],
    mut outcomes: Vec<BatchOutcome>,
) -> AnalysisRun<A::Record>
where
    A: Analyzer + ?Sized,
{
    let kind = analyzer.kind();
    outcomes.sort_by_key(BatchOutcome::batch_index);

    let mut run = AnalysisRun::empty();
    run.stats.batches_total = batches.len();

    for outcome in outcomes {
        let Some(batch) = batches.get(outcome.batch_index()) else {
            continue;
        };
        match outcome {
            BatchOutcome::Success { raw, .. } => {
                let parsed = analyzer.parse_response(&raw, batch);
                for issue in parsed.issues {
                    obs::emit_record_discarded(kind, batch.index(), &issue);
                    METRICS.inc_records_discarded();
                    run.stats.diagnostics.push(ParseDiagnostic {
                        batch_index: batch.index(),
                        issue,
                    });
                }
                run.stats.records_accepted += parsed.records.len();
                run.records.extend(parsed.records);
            }
            BatchOutcome::Failure { error, .. } => {
                obs::emit_batch_failed(kind, batch.index(), &error);
                METRICS.inc_batches_failed();
                run.stats.batches_failed += 1;
                run.stats.failures.push(BatchFailure {
                    batch_index: batch.index(),
                    commit_count: batch.len(),
                    error,
                });
            }
        }
    }

    METRICS.add_records_accepted(run.stats.records_accepted as u64);
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::partition;
    use crate::client::Prompt;
    use crate::domain::{AnalyzerKind, Commit, DispatchError, ParseIssue};
    use crate::parse::ParsedBatch;
    use chrono::Utc;

    /// Accepts one record per line of the response: the line itself.
    struct LineAnalyzer;

    impl Analyzer for LineAnalyzer {
        type Record = String;

        fn kind(&self) -> AnalyzerKind {
            AnalyzerKind::Sentiment
        }

        fn is_available(&self) -> bool {
            true
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn build_prompt(&self, batch: &AnalysisBatch<'_>) -> Prompt {
            Prompt::new(format!("batch {}", batch.index()))
        }

        fn parse_response(&self, raw: &str, _batch: &AnalysisBatch<'_>) -> ParsedBatch<String> {
            let mut parsed = ParsedBatch::default();
            for line in raw.lines() {
                if line == "bad" {
                    parsed.issues.push(ParseIssue::invalid("bad line"));
                } else {
                    parsed.records.push(line.to_string());
                }
            }
            parsed
        }
    }

    fn commits(n: usize) -> Vec<Commit> {
        (0..n)
            .map(|i| Commit::from_message(format!("{i:040}"), "chore: x", "a", "a@x", Utc::now()))
            .collect()
    }

    #[test]
    fn test_records_follow_batch_order_not_arrival_order() {
        let commits = commits(6);
        let batches = partition(&commits, 2).unwrap();
        let outcomes = vec![
            BatchOutcome::Success {
                batch_index: 2,
                raw: "e\nf".to_string(),
            },
            BatchOutcome::Success {
                batch_index: 0,
                raw: "a\nb".to_string(),
            },
            BatchOutcome::Success {
                batch_index: 1,
                raw: "c\nbad\nd".to_string(),
            },
        ];

        let run = aggregate(&LineAnalyzer, &batches, outcomes);

        assert_eq!(run.records, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(run.stats.batches_total, 3);
        assert_eq!(run.stats.batches_failed, 0);
        assert_eq!(run.stats.records_accepted, 6);
        assert_eq!(run.stats.diagnostics.len(), 1);
        assert_eq!(run.stats.diagnostics[0].batch_index, 1);
    }

    #[test]
    fn test_failed_batch_contributes_nothing() {
        let commits = commits(5);
        let batches = partition(&commits, 2).unwrap();
        let outcomes = vec![
            BatchOutcome::Success {
                batch_index: 0,
                raw: "a".to_string(),
            },
            BatchOutcome::Failure {
                batch_index: 1,
                error: DispatchError::Timeout { after_ms: 10 },
            },
            BatchOutcome::Success {
                batch_index: 2,
                raw: "c".to_string(),
            },
        ];

        let run = aggregate(&LineAnalyzer, &batches, outcomes);

        assert_eq!(run.records, vec!["a", "c"]);
        assert_eq!(run.stats.batches_failed, 1);
        assert_eq!(run.stats.failures[0].batch_index, 1);
        assert_eq!(run.stats.failures[0].commit_count, 2);
        assert!((run.stats.failure_fraction() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_with_no_valid_records_is_still_processed() {
        let commits = commits(1);
        let batches = partition(&commits, 2).unwrap();
        let outcomes = vec![BatchOutcome::Success {
            batch_index: 0,
            raw: "bad".to_string(),
        }];

        let run = aggregate(&LineAnalyzer, &batches, outcomes);

        assert!(run.records.is_empty());
        assert_eq!(run.stats.batches_failed, 0);
        assert_eq!(run.stats.batches_succeeded(), 1);
        assert_eq!(run.stats.records_discarded(), 1);
    }
}
