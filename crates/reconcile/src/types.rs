//! Core types shared by the planner and executor.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The operation the planner chose for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// No prior state entry: the resource will be created.
    Create,
    /// Prior entry with a different content hash, in-place update supported.
    Update,
    /// Prior entry with a different content hash, but the provider forbids
    /// in-place update: delete the old physical resource, then create.
    Replace,
    /// Present in prior state, absent from the desired graph.
    Delete,
    /// Prior entry with a matching content hash: nothing to do.
    NoOp,
}

impl OpKind {
    /// Display label for the operation kind.
    pub fn label(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Replace => "replace",
            OpKind::Delete => "delete",
            OpKind::NoOp => "no-op",
        }
    }

    /// Short symbol for plan listings.
    pub fn symbol(&self) -> &'static str {
        match self {
            OpKind::Create => "+",
            OpKind::Update => "~",
            OpKind::Replace => "±",
            OpKind::Delete => "-",
            OpKind::NoOp => "○",
        }
    }

    /// Whether this operation touches the provider at all.
    pub fn is_change(&self) -> bool {
        !matches!(self, OpKind::NoOp)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an operation was skipped instead of attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A dependency's operation failed; this resource was never attempted.
    DependencyFailed { dependency: String },
    /// Dispatch stopped after a cancellation request was observed.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a single resource operation.
#[derive(Debug)]
pub enum OpOutcome {
    /// The operation completed and state was updated.
    Done,
    /// The operation was attempted and failed, or was rejected up front.
    Failed(Error),
    /// The operation was never attempted.
    Skipped(SkipReason),
}

impl OpOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OpOutcome::Done)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OpOutcome::Failed(_))
    }
}

/// The per-resource result line of a run.
#[derive(Debug)]
pub struct OpRecord {
    pub name: String,
    pub kind: OpKind,
    pub outcome: OpOutcome,
}

/// Options for executing a plan.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of worker threads for independent branches.
    pub jobs: usize,
    /// Deadline applied to each provider operation.
    pub op_timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            op_timeout: Duration::from_secs(60),
        }
    }
}

/// Aggregate counts over a run's operation records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Add one record to the counts.
    pub fn add_record(&mut self, record: &OpRecord) {
        match &record.outcome {
            OpOutcome::Done => match record.kind {
                OpKind::Create => self.created += 1,
                OpKind::Update => self.updated += 1,
                OpKind::Replace => self.replaced += 1,
                OpKind::Delete => self.deleted += 1,
                OpKind::NoOp => self.unchanged += 1,
            },
            OpOutcome::Failed(_) => self.failed += 1,
            OpOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Total number of actual changes made.
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Total number of resources accounted for.
    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.failed + self.skipped
    }

    /// Whether the run completed without failures.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Everything a run produced: one record per resource, in schedule order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub records: Vec<OpRecord>,
}

impl RunReport {
    /// Aggregate counts over all records.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in &self.records {
            summary.add_record(record);
        }
        summary
    }

    /// Records that failed, in schedule order.
    pub fn failures(&self) -> impl Iterator<Item = &OpRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    /// Find the record for a resource.
    pub fn record(&self, name: &str) -> Option<&OpRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| !r.outcome.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_kind_and_outcome() {
        let mut summary = RunSummary::default();
        summary.add_record(&OpRecord {
            name: "a".into(),
            kind: OpKind::Create,
            outcome: OpOutcome::Done,
        });
        summary.add_record(&OpRecord {
            name: "b".into(),
            kind: OpKind::NoOp,
            outcome: OpOutcome::Done,
        });
        summary.add_record(&OpRecord {
            name: "c".into(),
            kind: OpKind::Update,
            outcome: OpOutcome::Failed(Error::provider("c", "rejected")),
        });
        summary.add_record(&OpRecord {
            name: "d".into(),
            kind: OpKind::Create,
            outcome: OpOutcome::Skipped(SkipReason::DependencyFailed {
                dependency: "c".into(),
            }),
        });

        assert_eq!(summary.created, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_changes(), 1);
        assert!(!summary.is_success());
    }
}
