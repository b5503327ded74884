//! Domain model for commit analysis.

pub mod commit;
pub mod error;
pub mod record;

pub use commit::{Commit, CommitStats, CommitType};
pub use error::{AnalysisError, ClientError, DispatchError, ParseDiagnostic, ParseIssue, Result};
pub use record::{AnalysisRecord, AnalysisReport, AnalyzerKind, BatchFailure, RunStats};
