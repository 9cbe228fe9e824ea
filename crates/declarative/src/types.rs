//! Result types for reconciliation passes

use crate::association::AssociationReport;
use crate::diff::{AssociationDelta, Operation};
use crate::model::{AssociationKind, ResourceAddress};
use crate::record::Subject;
use serde::{Deserialize, Serialize};

/// Result of applying one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Entity was created
    Created,
    /// Entity fields or association members were changed
    Modified,
    /// Entity was deleted and recreated
    Replaced,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Replaced | Self::Removed
        )
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.replaced += other.replaced;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// What a reconciliation pass would do for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePlan {
    pub address: ResourceAddress,
    pub subject: Subject,
    /// Remote id, unknown until the first create
    pub id: Option<String>,
    pub operation: Operation,
    /// Non-empty member deltas, computed against recorded state
    pub members: Vec<(AssociationKind, AssociationDelta)>,
}

impl ResourcePlan {
    pub fn is_change(&self) -> bool {
        self.operation.is_change() || !self.members.is_empty()
    }
}

/// What a reconciliation pass did for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub address: ResourceAddress,
    pub result: ApplyResult,
    pub operation: Operation,
    pub members: Vec<AssociationReport>,
    /// A re-plan after apply found nothing left to do
    pub converged: bool,
}

/// What a refresh found for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Record updated; names of fields and association kinds that drifted
    Refreshed { drifted: Vec<String> },
    /// Remote entity no longer exists; the record was removed
    Gone,
}
