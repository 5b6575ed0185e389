//! Apply-run reporting: per-operation outcomes plus run-level summary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diff::OperationKind;

/// Outcome of a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum OperationStatus {
    /// The mutation was issued and accepted.
    Applied,
    /// Dry run: the mutation would have been issued.
    Planned,
    /// Nothing to do (already satisfied, or the run was cancelled first).
    Skipped(String),
    /// The database rejected the operation or was unreachable.
    Failed(String),
}

impl OperationStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, OperationStatus::Failed(_))
    }
}

/// One operation's report line.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub collection: String,
    pub kind: OperationKind,
    /// Human-readable effect (predicted effect in dry runs).
    pub action: String,
    #[serde(flatten)]
    pub status: OperationStatus,
    pub duration_ms: u64,
}

/// Full result of one apply run, machine- and human-renderable.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<OperationOutcome>,
    /// False as soon as any single operation failed.
    pub success: bool,
    pub dry_run: bool,
    /// True when a cancellation signal cut the run short.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Applied))
    }

    pub fn planned(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Planned))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| s.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.status.is_failure())
    }

    fn count(&self, predicate: impl Fn(&OperationStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(&outcome.status)).count()
    }
}
