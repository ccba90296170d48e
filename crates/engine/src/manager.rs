//! Execution manager: the keyed store and the state machine operations.
//!
//! The registry lock is held only for insert/lookup; every mutation happens
//! under the per-execution mutex, so different executions proceed fully in
//! parallel while no two callers can advance the same one concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use orgrun_core::execution::validate_steps;
use orgrun_core::{
    CoreError, CredentialValidator, Environment, ExecutionState, ExecutionStatus,
    ExecutionSummary, StepSpec, StepStatus,
};

use crate::config::EngineConfig;

/// Errors returned by the execution state machine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No execution is registered under this id.
    #[error("Execution not found: {0}")]
    NotFound(Uuid),

    /// The credential provider reports no valid credentials for the
    /// execution's environment.
    #[error("No valid credentials for {0}")]
    InvalidCredentials(Environment),

    /// The operation is not valid in the execution's current status.
    #[error("Execution is {actual}, expected {expected}")]
    WrongStatus {
        expected: ExecutionStatus,
        actual: ExecutionStatus,
    },

    /// The creation-time step list was malformed.
    #[error(transparent)]
    Steps(#[from] CoreError),
}

/// Outcome of a successful [`ExecutionManager::complete_step`] call,
/// distinguishing "more steps remain" from the terminal completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAdvance {
    /// The next step was marked running.
    NextStarted { step: String },
    /// The final step finished and the execution is now complete.
    ExecutionCompleted,
}

#[derive(Default)]
struct Registry {
    executions: HashMap<Uuid, Arc<Mutex<ExecutionState>>>,
    /// Insertion order for stable listings.
    order: Vec<Uuid>,
}

/// Owns all execution state and drives the state machine.
///
/// Instantiable: independent managers hold independent stores, so tests can
/// run orchestrators side by side.
pub struct ExecutionManager {
    credentials: Arc<dyn CredentialValidator>,
    check_interval: chrono::Duration,
    registry: RwLock<Registry>,
}

impl ExecutionManager {
    pub fn new(credentials: Arc<dyn CredentialValidator>, config: EngineConfig) -> Self {
        let check_interval = chrono::Duration::from_std(config.credential_check_interval)
            .expect("credential check interval out of range");
        Self {
            credentials,
            check_interval,
            registry: RwLock::new(Registry::default()),
        }
    }

    fn entry(&self, execution_id: Uuid) -> Result<Arc<Mutex<ExecutionState>>, EngineError> {
        self.registry
            .read()
            .expect("execution registry lock poisoned")
            .executions
            .get(&execution_id)
            .cloned()
            .ok_or(EngineError::NotFound(execution_id))
    }

    /// Create a new execution in `Pending` with all steps pending.
    ///
    /// Fails loudly when no valid credentials exist for `environment` or the
    /// step list is malformed; no state is created in either case.
    pub fn create_execution(
        &self,
        execution_type: &str,
        environment: Environment,
        params: Value,
        steps: &[StepSpec],
    ) -> Result<Uuid, EngineError> {
        validate_steps(steps)?;
        if !self.credentials.are_credentials_valid(environment) {
            return Err(EngineError::InvalidCredentials(environment));
        }

        let state = ExecutionState::new(execution_type, environment, params, steps, Utc::now());
        let execution_id = state.id;

        let mut registry = self.registry.write().expect("execution registry lock poisoned");
        registry
            .executions
            .insert(execution_id, Arc::new(Mutex::new(state)));
        registry.order.push(execution_id);
        drop(registry);

        tracing::info!(
            execution_id = %execution_id,
            execution_type,
            environment = %environment,
            "Created execution",
        );
        Ok(execution_id)
    }

    /// Start a pending execution: re-validates credentials and marks the
    /// first step running.
    ///
    /// An invalid credential check transitions the execution to
    /// `CredentialsExpired` (the only way a created run can fail to start).
    pub fn start_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let entry = self.entry(execution_id)?;
        let mut state = entry.lock().expect("execution lock poisoned");

        if state.status != ExecutionStatus::Pending {
            return Err(EngineError::WrongStatus {
                expected: ExecutionStatus::Pending,
                actual: state.status,
            });
        }

        let now = Utc::now();
        if !self.credentials.are_credentials_valid(state.environment) {
            state.status = ExecutionStatus::CredentialsExpired;
            state.touch(now);
            tracing::warn!(
                execution_id = %execution_id,
                "Credentials invalid at start; execution marked expired",
            );
            return Err(EngineError::InvalidCredentials(state.environment));
        }

        state.status = ExecutionStatus::Running;
        state.touch(now);
        if let Some(step) = state.current_step_mut() {
            step.status = StepStatus::Running;
            step.started_at = Some(now);
        }

        tracing::info!(execution_id = %execution_id, "Started execution");
        Ok(())
    }

    /// Observe credential validity for an execution, throttled.
    ///
    /// Within the configured window this reports the last known validity
    /// without calling the credential provider: `true` while running, `false`
    /// while expired. A real check that comes back invalid pauses a running
    /// execution (`CredentialsExpired`, active step `Paused`). This path
    /// never advances `current_step_idx`.
    pub fn check_credentials(&self, execution_id: Uuid) -> Result<bool, EngineError> {
        let entry = self.entry(execution_id)?;
        let mut state = entry.lock().expect("execution lock poisoned");

        let now = Utc::now();
        let since_last = now.signed_duration_since(state.credential_check_time);
        if since_last < self.check_interval {
            match state.status {
                ExecutionStatus::Running => {
                    tracing::debug!(execution_id = %execution_id, "Credential check throttled");
                    return Ok(true);
                }
                ExecutionStatus::CredentialsExpired => {
                    tracing::debug!(execution_id = %execution_id, "Credential check throttled");
                    return Ok(false);
                }
                // Other statuses get a live answer even inside the window.
                _ => {}
            }
        }

        tracing::debug!(execution_id = %execution_id, "Performing credential check");
        let valid = self.credentials.are_credentials_valid(state.environment);
        state.credential_check_time = now;

        if !valid && state.status == ExecutionStatus::Running {
            state.status = ExecutionStatus::CredentialsExpired;
            state.touch(now);
            if let Some(step) = state.current_step_mut() {
                if step.status == StepStatus::Running {
                    step.status = StepStatus::Paused;
                }
            }
            tracing::warn!(
                execution_id = %execution_id,
                "Credentials expired; execution paused",
            );
        }

        Ok(valid)
    }

    /// Resume an execution paused by credential expiry.
    ///
    /// Valid only from `CredentialsExpired`; this is not a generic retry.
    /// Resuming never rewinds `current_step_idx` or discards results.
    pub fn resume_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let entry = self.entry(execution_id)?;
        let mut state = entry.lock().expect("execution lock poisoned");

        if state.status != ExecutionStatus::CredentialsExpired {
            return Err(EngineError::WrongStatus {
                expected: ExecutionStatus::CredentialsExpired,
                actual: state.status,
            });
        }
        if !self.credentials.are_credentials_valid(state.environment) {
            return Err(EngineError::InvalidCredentials(state.environment));
        }

        let now = Utc::now();
        state.status = ExecutionStatus::Running;
        state.touch(now);
        state.credential_check_time = now;
        if let Some(step) = state.current_step_mut() {
            if step.status == StepStatus::Paused {
                step.status = StepStatus::Running;
            }
        }

        tracing::info!(execution_id = %execution_id, "Resumed execution");
        Ok(())
    }

    /// Complete the active step, storing its result under the step's name.
    ///
    /// Advances to the next step when one remains; otherwise transitions the
    /// execution to `Completed` and returns
    /// [`StepAdvance::ExecutionCompleted`].
    pub fn complete_step(
        &self,
        execution_id: Uuid,
        result: Option<Value>,
    ) -> Result<StepAdvance, EngineError> {
        let entry = self.entry(execution_id)?;
        let mut state = entry.lock().expect("execution lock poisoned");

        if state.status != ExecutionStatus::Running {
            return Err(EngineError::WrongStatus {
                expected: ExecutionStatus::Running,
                actual: state.status,
            });
        }

        let now = Utc::now();
        let idx = state.current_step_idx;
        if idx >= state.steps.len() {
            state.status = ExecutionStatus::Completed;
            return Ok(StepAdvance::ExecutionCompleted);
        }

        let step = &mut state.steps[idx];
        step.status = StepStatus::Completed;
        step.completed_at = Some(now);
        step.result = result.clone();
        let step_name = step.name.clone();
        if let Some(value) = result {
            state.results.insert(step_name.clone(), value);
        }

        state.current_step_idx += 1;
        state.touch(now);
        tracing::info!(
            execution_id = %execution_id,
            step = %step_name,
            "Completed step",
        );

        if state.current_step_idx < state.steps.len() {
            let next_idx = state.current_step_idx;
            let next = &mut state.steps[next_idx];
            next.status = StepStatus::Running;
            next.started_at = Some(now);
            let next_name = next.name.clone();
            tracing::info!(
                execution_id = %execution_id,
                step = %next_name,
                "Started step",
            );
            Ok(StepAdvance::NextStarted { step: next_name })
        } else {
            state.status = ExecutionStatus::Completed;
            tracing::info!(execution_id = %execution_id, "Completed execution");
            Ok(StepAdvance::ExecutionCompleted)
        }
    }

    /// Mark the active step failed and the whole execution `Failed`.
    ///
    /// Idempotent against unknown ids and terminal executions: failure
    /// reporting on a stale handle must not crash the caller.
    pub fn fail_step(&self, execution_id: Uuid, error: &str) {
        let Ok(entry) = self.entry(execution_id) else {
            tracing::warn!(
                execution_id = %execution_id,
                "fail_step on unknown execution ignored",
            );
            return;
        };
        let mut state = entry.lock().expect("execution lock poisoned");

        if state.status.is_terminal() {
            tracing::warn!(
                execution_id = %execution_id,
                status = %state.status,
                "fail_step on terminal execution ignored",
            );
            return;
        }

        if let Some(step) = state.current_step_mut() {
            step.status = StepStatus::Failed;
            step.error = Some(error.to_string());
        }
        state.status = ExecutionStatus::Failed;
        state.touch(Utc::now());

        tracing::error!(execution_id = %execution_id, error, "Execution failed");
    }

    /// Read-only snapshot of one execution.
    pub fn get_execution(&self, execution_id: Uuid) -> Option<ExecutionState> {
        let entry = self
            .registry
            .read()
            .expect("execution registry lock poisoned")
            .executions
            .get(&execution_id)
            .cloned()?;
        let state = entry.lock().expect("execution lock poisoned");
        Some(state.clone())
    }

    /// List all known executions in insertion order, optionally filtered by
    /// status.
    pub fn list_executions(&self, status: Option<ExecutionStatus>) -> Vec<ExecutionSummary> {
        let registry = self.registry.read().expect("execution registry lock poisoned");
        registry
            .order
            .iter()
            .filter_map(|id| {
                let state = registry
                    .executions
                    .get(id)?
                    .lock()
                    .expect("execution lock poisoned");
                match status {
                    Some(want) if state.status != want => None,
                    _ => Some(state.summary()),
                }
            })
            .collect()
    }
}
