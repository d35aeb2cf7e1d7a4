//! Planned actions for resources

use crate::state::StateRecord;
use serde::{Deserialize, Serialize};
use strata_core::{Properties, ResourceKind};

/// Represents a planned action for a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Resource identifier
    pub resource_id: String,

    pub kind: ResourceKind,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Description of the action
    pub description: String,

    /// Input names whose resolved values differ from the recorded ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_inputs: Vec<String>,

    /// Upstream resources that will change first, so this resource's
    /// resolved inputs cannot be known until they are applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_upstream: Vec<String>,
}

impl Action {
    pub fn new(
        resource_id: impl Into<String>,
        kind: ResourceKind,
        action_type: ActionType,
    ) -> Self {
        let resource_id = resource_id.into();
        let description = format!("{} {} '{}'", action_type.verb(), kind, resource_id);
        Self {
            resource_id,
            kind,
            action_type,
            description,
            changed_inputs: Vec::new(),
            pending_upstream: Vec::new(),
        }
    }

    pub fn with_changed_inputs(mut self, changed: Vec<String>) -> Self {
        if !changed.is_empty() {
            self.description = format!("{} ({} changed)", self.description, changed.join(", "));
        }
        self.changed_inputs = changed;
        self
    }

    pub fn with_pending_upstream(mut self, pending: Vec<String>) -> Self {
        if !pending.is_empty() {
            self.description = format!("{} (after {})", self.description, pending.join(", "));
        }
        self.pending_upstream = pending;
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete the recorded object and create a new one, because the kind changed
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl ActionType {
    fn verb(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Replace => "replace",
            ActionType::Delete => "delete",
            ActionType::NoOp => "keep",
        }
    }

    pub fn is_change(&self) -> bool {
        *self != ActionType::NoOp
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Decide what to do with a resource whose inputs resolved to `inputs`.
///
/// Returns the action and the names of the inputs that changed.
pub fn diff_against(
    previous: Option<&StateRecord>,
    kind: &ResourceKind,
    inputs: &Properties,
) -> (ActionType, Vec<String>) {
    match previous {
        None => (ActionType::Create, Vec::new()),
        Some(record) if record.kind != *kind => {
            (ActionType::Replace, changed_keys(&record.inputs, inputs))
        }
        Some(record) => {
            let changed = changed_keys(&record.inputs, inputs);
            if changed.is_empty() {
                (ActionType::NoOp, changed)
            } else {
                (ActionType::Update, changed)
            }
        }
    }
}

/// Names present in either map whose values differ, in name order
pub fn changed_keys(previous: &Properties, next: &Properties) -> Vec<String> {
    let mut changed: Vec<String> = next
        .iter()
        .filter(|(name, value)| previous.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(
        previous
            .keys()
            .filter(|name| !next.contains_key(*name))
            .cloned(),
    );
    changed.sort();
    changed
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Actions in the order they would be applied, deletions of
    /// undeclared resources last
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type.is_change());
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    pub fn get(&self, resource_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.resource_id == resource_id)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}
