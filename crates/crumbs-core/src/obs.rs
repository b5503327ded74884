//! Structured observability hooks for analyzer runs.
//!
//! Every run gets a UUID and a `crumbs.analysis` span; lifecycle events are
//! emitted as structured fields so they can be filtered by `event`.

use std::fmt::Display;

use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::domain::{AnalyzerKind, RunStats};

/// Span covering one analyzer run. Attach with `tracing::Instrument`.
pub fn analysis_span(run_id: Uuid, kind: AnalyzerKind) -> Span {
    tracing::info_span!("crumbs.analysis", run_id = %run_id, kind = %kind)
}

/// Emit event: dispatch is about to start.
pub fn emit_analysis_started(kind: AnalyzerKind, commits: usize, batches: usize) {
    info!(
        event = "analysis.started",
        kind = %kind,
        commits = commits,
        batches = batches,
    );
}

/// Emit event: the analyzer is unavailable and the run degrades to empty.
pub fn emit_analysis_skipped(kind: AnalyzerKind) {
    info!(
        event = "analysis.skipped",
        kind = %kind,
        "analyzer unavailable (no credentials); returning empty report"
    );
}

/// Emit event: one batch failed dispatch (warning level).
pub fn emit_batch_failed(kind: AnalyzerKind, batch_index: usize, error: &dyn Display) {
    warn!(
        event = "batch.failed",
        kind = %kind,
        batch_index = batch_index,
        error = %error,
    );
}

/// Emit event: one record or payload was discarded while parsing.
pub fn emit_record_discarded(kind: AnalyzerKind, batch_index: usize, issue: &dyn Display) {
    debug!(
        event = "record.discarded",
        kind = %kind,
        batch_index = batch_index,
        issue = %issue,
    );
}

/// Emit event: the run finished and its report was built.
pub fn emit_analysis_finished(kind: AnalyzerKind, stats: &RunStats, duration_ms: u64) {
    info!(
        event = "analysis.finished",
        kind = %kind,
        duration_ms = duration_ms,
        batches_total = stats.batches_total,
        batches_failed = stats.batches_failed,
        records_accepted = stats.records_accepted,
        records_discarded = stats.records_discarded(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::LogCapture;

    #[test]
    fn test_events_carry_the_run_span() {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let run_id = Uuid::new_v4();

        let span = analysis_span(run_id, AnalyzerKind::Risk);
        let entered = span.enter();
        emit_analysis_started(AnalyzerKind::Risk, 3, 1);
        emit_analysis_finished(AnalyzerKind::Risk, &RunStats::default(), 1);
        drop(entered);

        assert_eq!(logs.count(&run_id.to_string()), 2);
        assert!(logs.contains("crumbs.analysis"));
        assert!(logs.contains("commits=3"));
        assert!(logs.contains("records_accepted=0"));
    }

    #[test]
    fn test_failures_are_warnings_and_discards_are_debug() {
        let logs = LogCapture::new();
        let _guard = logs.install();

        emit_batch_failed(AnalyzerKind::Quality, 2, &"connection reset");
        emit_record_discarded(AnalyzerKind::Quality, 0, &"unknown commit deadbeef");
        emit_analysis_skipped(AnalyzerKind::Changelog);

        let lines: Vec<String> = logs.contents().lines().map(str::to_string).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("WARN") && lines[0].contains("batch_index=2"));
        assert!(lines[0].contains("connection reset"));
        assert!(lines[1].contains("DEBUG") && lines[1].contains("record.discarded"));
        assert!(lines[2].contains("INFO") && lines[2].contains("analysis.skipped"));
    }
}
