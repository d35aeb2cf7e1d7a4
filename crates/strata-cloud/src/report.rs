//! Per-resource results of apply and destroy runs

use crate::action::ActionType;
use crate::export::OutputReport;
use serde::{Deserialize, Serialize};
use strata_core::{Properties, ResourceKind};

/// Lifecycle of a resource within one run
///
/// `Pending -> ResolvingInputs -> Applying -> Applied | Failed`, or
/// `Pending -> Skipped` when an upstream resource failed or the run stopped.
/// `RolledBack` and `Deleted` follow `Applied` during rollback, pruning and
/// destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceStatus {
    Pending,
    ResolvingInputs,
    Applying,
    Applied,
    Failed,
    Skipped,
    RolledBack,
    Deleted,
}

impl ResourceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ResourceStatus::Pending | ResourceStatus::ResolvingInputs | ResourceStatus::Applying
        )
    }

    /// Whether the run may move a resource from `self` to `next`
    pub fn can_become(&self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Pending, ResolvingInputs)
                | (Pending, Skipped)
                | (Pending, Deleted)
                | (Pending, Failed)
                | (ResolvingInputs, Applying)
                | (ResolvingInputs, Applied)
                | (ResolvingInputs, Failed)
                | (Applying, Applied)
                | (Applying, Failed)
                | (Applied, RolledBack)
                | (Applied, Deleted)
        )
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::ResolvingInputs => "resolving inputs",
            ResourceStatus::Applying => "applying",
            ResourceStatus::Applied => "applied",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Skipped => "skipped",
            ResourceStatus::RolledBack => "rolled back",
            ResourceStatus::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// What happened to one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: String,

    pub kind: ResourceKind,

    pub status: ResourceStatus,

    /// Action the engine chose, once inputs were resolved
    pub action: Option<ActionType>,

    /// Outputs available to dependents; empty unless applied
    #[serde(default)]
    pub outputs: Properties,

    /// Provider or resolution error of a failed resource
    pub error: Option<String>,

    /// Why a skipped resource never ran
    pub skipped_because: Option<String>,

    /// Provider attempts made, retries included
    #[serde(default)]
    pub attempts: u32,
}

impl ResourceReport {
    pub fn new(id: impl Into<String>, kind: ResourceKind, status: ResourceStatus) -> Self {
        Self {
            id: id.into(),
            kind,
            status,
            action: None,
            outputs: Properties::new(),
            error: None,
            skipped_because: None,
            attempts: 0,
        }
    }

    /// Whether a provider call changed something for this resource
    pub fn changed(&self) -> bool {
        self.action.is_some_and(|a| a.is_change())
            && matches!(
                self.status,
                ResourceStatus::Applied | ResourceStatus::RolledBack | ResourceStatus::Deleted
            )
    }
}

/// Result of an apply run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub stack: String,

    /// One entry per declared resource, in declaration order
    pub resources: Vec<ResourceReport>,

    /// Recorded resources no longer declared, deleted after a successful run
    #[serde(default)]
    pub pruned: Vec<ResourceReport>,

    /// Recorded resources no longer declared, kept because the run did not
    /// succeed
    #[serde(default)]
    pub kept_orphans: Vec<String>,

    pub outputs: OutputReport,

    /// Whether applied resources were undone after a failure
    pub rolled_back: bool,

    /// Whether cancellation was requested during the run
    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    /// A run succeeds only if no resource failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.resources
            .iter()
            .chain(&self.pruned)
            .all(|r| !matches!(r.status, ResourceStatus::Failed | ResourceStatus::Skipped))
    }

    pub fn get(&self, id: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<ResourceStatus> {
        self.get(id).map(|r| r.status)
    }

    pub fn with_status(&self, status: ResourceStatus) -> Vec<&ResourceReport> {
        self.resources.iter().filter(|r| r.status == status).collect()
    }

    pub fn summary(&self) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for report in &self.resources {
            match report.status {
                ResourceStatus::Applied if report.changed() => summary.changed += 1,
                ResourceStatus::Applied => summary.unchanged += 1,
                ResourceStatus::Failed => summary.failed += 1,
                ResourceStatus::Skipped => summary.skipped += 1,
                ResourceStatus::RolledBack => summary.rolled_back += 1,
                _ => {}
            }
        }
        summary.deleted = self
            .pruned
            .iter()
            .filter(|r| r.status == ResourceStatus::Deleted)
            .count();
        summary
    }
}

/// Counts of resources by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
    pub deleted: usize,
}

impl std::fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed, {} unchanged, {} failed, {} skipped",
            self.changed, self.unchanged, self.failed, self.skipped
        )?;
        if self.rolled_back > 0 {
            write!(f, ", {} rolled back", self.rolled_back)?;
        }
        if self.deleted > 0 {
            write!(f, ", {} deleted", self.deleted)?;
        }
        Ok(())
    }
}

/// Result of a destroy run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroyReport {
    /// One entry per recorded resource, in deletion order
    pub resources: Vec<ResourceReport>,

    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl DestroyReport {
    pub fn is_success(&self) -> bool {
        self.resources.iter().all(|r| r.status == ResourceStatus::Deleted)
    }

    pub fn get(&self, id: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn deleted(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.status == ResourceStatus::Deleted)
            .count()
    }
}
