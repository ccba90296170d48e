//! Execution state machine data model.
//!
//! An execution is a long-running operation modeled as an ordered list of
//! named steps over a fixed parameter set. The engine crate owns all
//! instances and mutates them only through its own operations; these types
//! carry the state and the creation-time validation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::Environment;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Status of a long-running execution.
///
/// `Completed` and `Failed` are terminal. `CredentialsExpired` is the
/// recoverable pause state entered when the operator's credentials lapse
/// mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    CredentialsExpired,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::CredentialsExpired => "credentials_expired",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Paused => "paused",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Caller-supplied step descriptor used at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name, unique within the owning execution.
    pub name: String,
}

impl StepSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One named unit of work within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Unique within the owning execution; key into the results map.
    pub name: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque payload, set only on completion.
    pub result: Option<Value>,
    /// Failure message, set only on failure.
    pub error: Option<String>,
}

impl ExecutionStep {
    /// A freshly created, not-yet-started step.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// Validate a creation-time step list: non-empty, names unique.
pub fn validate_steps(steps: &[StepSpec]) -> Result<(), CoreError> {
    if steps.is_empty() {
        return Err(CoreError::Validation(
            "An execution requires at least one step".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::with_capacity(steps.len());
    for spec in steps {
        if spec.name.is_empty() {
            return Err(CoreError::Validation(
                "Step names must not be empty".to_string(),
            ));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate step name: \"{}\"",
                spec.name
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Execution state
// ---------------------------------------------------------------------------

/// Full state of one long-running execution.
///
/// Invariant: `current_step_idx <= steps.len()`, with equality only when the
/// execution has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub id: Uuid,
    /// Free-form label for the kind of operation; not interpreted here.
    pub execution_type: String,
    pub environment: Environment,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    /// Opaque parameter bag passed through to step logic.
    pub params: Value,
    /// Ordered steps, fixed at creation time.
    pub steps: Vec<ExecutionStep>,
    /// Index of the step currently active or about to resume.
    pub current_step_idx: usize,
    /// Per-step results keyed by step name; append-only.
    pub results: HashMap<String, Value>,
    /// When credential validity was last actually checked.
    pub credential_check_time: DateTime<Utc>,
}

impl ExecutionState {
    /// Allocate a fresh `Pending` execution with all steps pending.
    pub fn new(
        execution_type: impl Into<String>,
        environment: Environment,
        params: Value,
        steps: &[StepSpec],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_type: execution_type.into(),
            environment,
            started_at: now,
            last_updated_at: now,
            status: ExecutionStatus::Pending,
            params,
            steps: steps
                .iter()
                .map(|spec| ExecutionStep::pending(&spec.name))
                .collect(),
            current_step_idx: 0,
            results: HashMap::new(),
            credential_check_time: now,
        }
    }

    /// The step at `current_step_idx`, if the execution has not run past the
    /// end of its step list.
    pub fn current_step(&self) -> Option<&ExecutionStep> {
        self.steps.get(self.current_step_idx)
    }

    /// Mutable access to the active step.
    pub fn current_step_mut(&mut self) -> Option<&mut ExecutionStep> {
        self.steps.get_mut(self.current_step_idx)
    }

    /// Record a mutation timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = now;
    }

    /// The row shape returned by execution listings.
    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            id: self.id,
            execution_type: self.execution_type.clone(),
            environment: self.environment,
            status: self.status,
            started_at: self.started_at,
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Condensed execution listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: Uuid,
    pub execution_type: String,
    pub environment: Environment,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
