//! Plan and apply result types for resource convergence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents a planned action for a declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action (e.g., "create-network")
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource kind (e.g., "vpc", "docdb-cluster", "s3-bucket")
    pub resource_kind: String,

    /// Logical name of the resource
    pub logical_id: String,

    /// Description of the action
    pub description: String,

    /// Some inputs are only known after upstream resources are applied;
    /// the final decision is made at dispatch time
    #[serde(default)]
    pub deferred: bool,

    /// Additional details about the action
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        resource_kind: impl Into<String>,
        logical_id: impl Into<String>,
    ) -> Self {
        let resource_kind = resource_kind.into();
        let logical_id = logical_id.into();
        Self {
            id: format!("{}-{}", action_type, logical_id),
            description: format!("{} {} ({})", action_type, logical_id, resource_kind),
            action_type,
            resource_kind,
            logical_id,
            deferred: false,
            details: BTreeMap::new(),
        }
    }

    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete the existing resource and create a new one (kind changed)
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
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

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
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

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn creates(&self) -> Vec<&Action> {
        self.actions_by_type(ActionType::Create)
    }

    pub fn updates(&self) -> Vec<&Action> {
        self.actions_by_type(ActionType::Update)
    }

    pub fn replaces(&self) -> Vec<&Action> {
        self.actions_by_type(ActionType::Replace)
    }

    pub fn deletes(&self) -> Vec<&Action> {
        self.actions_by_type(ActionType::Delete)
    }

    pub fn unchanged(&self) -> Vec<&Action> {
        self.actions_by_type(ActionType::NoOp)
    }

    /// Action planned for a logical id
    pub fn action_for(&self, logical_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.logical_id == logical_id)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.creates().len(),
            update: self.updates().len(),
            replace: self.replaces().len(),
            delete: self.deletes().len(),
            no_change: self.unchanged().len(),
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

/// Final status of a node in an apply run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    /// Never dispatched because the run was cancelled
    Cancelled,
}

/// Result of a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    /// Logical name of the resource
    pub logical_id: String,

    /// Resource kind
    pub kind: String,

    /// Action that was taken (or attempted)
    pub action: ActionType,

    pub status: OutcomeStatus,

    /// Provider identity after the action, if any
    pub provider_identity: Option<String>,

    /// Number of provider call attempts (0 for no-op)
    pub attempts: u32,

    /// Error message if failed
    pub error: Option<String>,

    pub finished_at: DateTime<Utc>,
}

impl NodeOutcome {
    pub fn succeeded(
        logical_id: impl Into<String>,
        kind: impl Into<String>,
        action: ActionType,
        provider_identity: Option<String>,
        attempts: u32,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind: kind.into(),
            action,
            status: OutcomeStatus::Succeeded,
            provider_identity,
            attempts,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        logical_id: impl Into<String>,
        kind: impl Into<String>,
        action: ActionType,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind: kind.into(),
            action,
            status: OutcomeStatus::Failed,
            provider_identity: None,
            attempts,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn cancelled(
        logical_id: impl Into<String>,
        kind: impl Into<String>,
        action: ActionType,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind: kind.into(),
            action,
            status: OutcomeStatus::Cancelled,
            provider_identity: None,
            attempts: 0,
            error: Some("apply cancelled before dispatch".to_string()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Result of applying a declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Per-node outcomes in completion order
    pub outcomes: Vec<NodeOutcome>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: NodeOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn extend(&mut self, other: ApplyResult) {
        self.outcomes.extend(other.outcomes);
        self.duration_ms += other.duration_ms;
    }

    fn succeeded_with(&self, action: ActionType) -> Vec<&NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success() && o.action == action)
            .collect()
    }

    pub fn created(&self) -> Vec<&NodeOutcome> {
        self.succeeded_with(ActionType::Create)
    }

    pub fn updated(&self) -> Vec<&NodeOutcome> {
        self.succeeded_with(ActionType::Update)
    }

    pub fn replaced(&self) -> Vec<&NodeOutcome> {
        self.succeeded_with(ActionType::Replace)
    }

    pub fn deleted(&self) -> Vec<&NodeOutcome> {
        self.succeeded_with(ActionType::Delete)
    }

    pub fn unchanged(&self) -> Vec<&NodeOutcome> {
        self.succeeded_with(ActionType::NoOp)
    }

    pub fn failed(&self) -> Vec<&NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .collect()
    }

    pub fn cancelled(&self) -> Vec<&NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Cancelled)
            .collect()
    }

    pub fn outcome(&self, logical_id: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.logical_id == logical_id)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(NodeOutcome::is_success)
    }

    /// Process exit status for the run
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn summary(&self) -> ApplySummary {
        ApplySummary {
            created: self.created().len(),
            updated: self.updated().len() + self.replaced().len(),
            deleted: self.deleted().len(),
            unchanged: self.unchanged().len(),
            failed: self.failed().len(),
            cancelled: self.cancelled().len(),
        }
    }
}

/// Counts of an apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl std::fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged, {} failed",
            self.created, self.updated, self.deleted, self.unchanged, self.failed
        )?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_summary() {
        let plan = Plan::new(vec![
            Action::new(ActionType::Create, "vpc", "network"),
            Action::new(ActionType::NoOp, "docdb-cluster", "database"),
            Action::new(ActionType::Update, "s3-bucket", "frontend").deferred(true),
            Action::new(ActionType::Delete, "s3-object", "old-config"),
        ]);

        assert!(plan.has_changes);
        let summary = plan.summary();
        assert_eq!(summary.create, 1);
        assert_eq!(summary.update, 1);
        assert_eq!(summary.delete, 1);
        assert_eq!(summary.no_change, 1);
        assert_eq!(
            summary.to_string(),
            "1 to create, 1 to update, 0 to replace, 1 to delete, 1 unchanged"
        );
        assert!(plan.action_for("frontend").unwrap().deferred);
        assert_eq!(plan.action_for("network").unwrap().id, "create-network");
    }

    #[test]
    fn test_noop_plan_has_no_changes() {
        let plan = Plan::new(vec![Action::new(ActionType::NoOp, "vpc", "network")]);
        assert!(!plan.has_changes);
        assert!(!Plan::empty().has_changes);
    }

    #[test]
    fn test_apply_result_status() {
        let mut result = ApplyResult::new();
        result.push(NodeOutcome::succeeded(
            "network",
            "vpc",
            ActionType::Create,
            Some("vpc-1".to_string()),
            1,
        ));
        assert!(result.is_success());
        assert_eq!(result.exit_code(), 0);

        result.push(NodeOutcome::failed(
            "database",
            "docdb-cluster",
            ActionType::Create,
            "permanent provider error: quota",
            1,
        ));
        result.push(NodeOutcome::cancelled("backend", "apprunner-service", ActionType::Create));

        assert!(!result.is_success());
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.created().len(), 1);
        assert_eq!(result.failed().len(), 1);
        assert_eq!(result.cancelled().len(), 1);
        assert_eq!(
            result.summary().to_string(),
            "1 created, 0 updated, 0 deleted, 0 unchanged, 1 failed, 1 cancelled"
        );
    }
}
