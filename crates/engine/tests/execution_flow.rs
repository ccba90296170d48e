//! Integration tests for the execution state machine.
//!
//! Drives full lifecycles against a counting fake credential validator:
//! create/start/complete flows, mid-run credential expiry with pause and
//! resume, check throttling, and failure reporting on stale handles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use orgrun_core::{CredentialValidator, Environment, ExecutionStatus, StepSpec, StepStatus};
use orgrun_engine::{EngineConfig, EngineError, ExecutionManager, StepAdvance};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Credential validator with a switchable answer and a call counter.
struct FakeValidator {
    valid: AtomicBool,
    calls: AtomicUsize,
}

impl FakeValidator {
    fn new(valid: bool) -> Arc<Self> {
        Arc::new(Self {
            valid: AtomicBool::new(valid),
            calls: AtomicUsize::new(0),
        })
    }

    fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialValidator for FakeValidator {
    fn are_credentials_valid(&self, _environment: Environment) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.valid.load(Ordering::SeqCst)
    }
}

fn manager_with(valid: bool, check_interval: Duration) -> (Arc<FakeValidator>, ExecutionManager) {
    let validator = FakeValidator::new(valid);
    let config = EngineConfig {
        credential_check_interval: check_interval,
    };
    let manager = ExecutionManager::new(validator.clone(), config);
    (validator, manager)
}

fn three_steps() -> Vec<StepSpec> {
    vec![StepSpec::new("a"), StepSpec::new("b"), StepSpec::new("c")]
}

fn create(manager: &ExecutionManager) -> Uuid {
    manager
        .create_execution(
            "org_scan",
            Environment::Com,
            json!({"parent": null}),
            &three_steps(),
        )
        .expect("creation should succeed with valid credentials")
}

// ---------------------------------------------------------------------------
// Creation and startup
// ---------------------------------------------------------------------------

/// A fresh execution is pending with all steps pending; starting it marks
/// the first step running.
#[test]
fn create_and_start() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::Pending);
    assert_eq!(state.current_step_idx, 0);
    assert!(state.steps.iter().all(|s| s.status == StepStatus::Pending));

    manager.start_execution(id).unwrap();
    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.steps[0].status, StepStatus::Running);
    assert!(state.steps[0].started_at.is_some());
}

/// Creation is refused outright when no valid credentials exist.
#[test]
fn create_with_invalid_credentials_fails_loudly() {
    let (_validator, manager) = manager_with(false, Duration::from_secs(300));
    let err = manager
        .create_execution("org_scan", Environment::Gov, json!({}), &three_steps())
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidCredentials(Environment::Gov));
    assert!(manager.list_executions(None).is_empty());
}

/// A malformed step list is a caller programming error.
#[test]
fn create_with_duplicate_steps_rejected() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let steps = vec![StepSpec::new("a"), StepSpec::new("a")];
    let err = manager
        .create_execution("org_scan", Environment::Com, json!({}), &steps)
        .unwrap_err();
    assert!(matches!(err, EngineError::Steps(_)));
}

/// Starting an unknown id is a typed not-found, with no state created.
#[test]
fn start_unknown_execution() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = Uuid::new_v4();
    assert_eq!(
        manager.start_execution(id).unwrap_err(),
        EngineError::NotFound(id)
    );
}

/// Credentials lapsing between create and start moves the execution to
/// credentials-expired; this is the only way a created run fails to start.
#[test]
fn start_with_expired_credentials() {
    let (validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);

    validator.set_valid(false);
    let err = manager.start_execution(id).unwrap_err();
    assert_eq!(err, EngineError::InvalidCredentials(Environment::Com));

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::CredentialsExpired);
}

// ---------------------------------------------------------------------------
// Step advancement
// ---------------------------------------------------------------------------

/// Completing a step records its result under the step name and starts the
/// next one; completing the last step yields the terminal completion signal.
#[test]
fn complete_steps_through_to_completion() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    let advance = manager.complete_step(id, Some(json!({"x": 1}))).unwrap();
    assert_eq!(
        advance,
        StepAdvance::NextStarted {
            step: "b".to_string()
        }
    );

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.current_step_idx, 1);
    assert_eq!(state.steps[0].status, StepStatus::Completed);
    assert!(state.steps[0].completed_at.is_some());
    assert_eq!(state.steps[1].status, StepStatus::Running);
    assert_eq!(state.results["a"], json!({"x": 1}));

    manager.complete_step(id, None).unwrap();
    let advance = manager.complete_step(id, Some(json!({"done": true}))).unwrap();
    assert_eq!(advance, StepAdvance::ExecutionCompleted);

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.current_step_idx, state.steps.len());
    // Step "b" completed with no payload, so only "a" and "c" have results.
    assert_eq!(state.results.len(), 2);
    assert!(!state.results.contains_key("b"));
}

/// The step index never decreases across completions.
#[test]
fn step_index_is_monotonic() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    let mut last_idx = 0;
    loop {
        let state = manager.get_execution(id).unwrap();
        assert!(state.current_step_idx >= last_idx);
        last_idx = state.current_step_idx;
        if manager.complete_step(id, None).unwrap() == StepAdvance::ExecutionCompleted {
            break;
        }
    }
    assert_eq!(last_idx, 2);
}

/// Completing a step of a non-running execution is a typed wrong-status
/// error, including after completion.
#[test]
fn complete_step_requires_running() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);

    let err = manager.complete_step(id, None).unwrap_err();
    assert_eq!(
        err,
        EngineError::WrongStatus {
            expected: ExecutionStatus::Running,
            actual: ExecutionStatus::Pending,
        }
    );

    manager.start_execution(id).unwrap();
    for _ in 0..3 {
        let _ = manager.complete_step(id, None).unwrap();
    }
    let err = manager.complete_step(id, None).unwrap_err();
    assert_eq!(
        err,
        EngineError::WrongStatus {
            expected: ExecutionStatus::Running,
            actual: ExecutionStatus::Completed,
        }
    );
}

// ---------------------------------------------------------------------------
// Credential expiry, pause, resume
// ---------------------------------------------------------------------------

/// Mid-run expiry pauses the active step; resume picks up exactly where the
/// run left off, keeping earlier results.
#[test]
fn pause_and_resume_midway() {
    let (validator, manager) = manager_with(true, Duration::ZERO);
    let id = create(&manager);
    manager.start_execution(id).unwrap();
    manager.complete_step(id, Some(json!({"x": 1}))).unwrap();

    validator.set_valid(false);
    assert!(!manager.check_credentials(id).unwrap());

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::CredentialsExpired);
    assert_eq!(state.steps[1].status, StepStatus::Paused);

    validator.set_valid(true);
    manager.resume_execution(id).unwrap();

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::Running);
    // Step "b" resumes; the run is not rewound to "a".
    assert_eq!(state.current_step_idx, 1);
    assert_eq!(state.steps[1].status, StepStatus::Running);
    assert_eq!(state.steps[0].status, StepStatus::Completed);
    assert_eq!(state.results["a"], json!({"x": 1}));
}

/// Resume is refused while credentials are still invalid, and the execution
/// stays paused.
#[test]
fn resume_refused_while_credentials_invalid() {
    let (validator, manager) = manager_with(true, Duration::ZERO);
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    validator.set_valid(false);
    manager.check_credentials(id).unwrap();

    let err = manager.resume_execution(id).unwrap_err();
    assert_eq!(err, EngineError::InvalidCredentials(Environment::Com));
    assert_eq!(
        manager.get_execution(id).unwrap().status,
        ExecutionStatus::CredentialsExpired
    );
}

/// Resume is a typed no-op from any status other than credentials-expired.
#[test]
fn resume_requires_expired_status() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    let err = manager.resume_execution(id).unwrap_err();
    assert_eq!(
        err,
        EngineError::WrongStatus {
            expected: ExecutionStatus::CredentialsExpired,
            actual: ExecutionStatus::Running,
        }
    );

    let unknown = Uuid::new_v4();
    assert_eq!(
        manager.resume_execution(unknown).unwrap_err(),
        EngineError::NotFound(unknown)
    );
}

// ---------------------------------------------------------------------------
// Check throttling
// ---------------------------------------------------------------------------

/// Within the throttle window, repeated checks report the last known
/// validity without calling the provider.
#[test]
fn check_is_throttled_within_window() {
    let (validator, manager) = manager_with(true, Duration::from_secs(3600));
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    let calls_before = validator.call_count();
    assert!(manager.check_credentials(id).unwrap());
    assert!(manager.check_credentials(id).unwrap());
    assert_eq!(validator.call_count(), calls_before);

    // Throttling also preserves a stale answer: flipping the provider to
    // invalid is not observed inside the window.
    validator.set_valid(false);
    assert!(manager.check_credentials(id).unwrap());
    assert_eq!(
        manager.get_execution(id).unwrap().status,
        ExecutionStatus::Running
    );
}

/// With a zero window every check is live.
#[test]
fn zero_window_forces_live_checks() {
    let (validator, manager) = manager_with(true, Duration::ZERO);
    let id = create(&manager);
    manager.start_execution(id).unwrap();

    let calls_before = validator.call_count();
    manager.check_credentials(id).unwrap();
    manager.check_credentials(id).unwrap();
    assert_eq!(validator.call_count(), calls_before + 2);
}

// ---------------------------------------------------------------------------
// Failure reporting
// ---------------------------------------------------------------------------

/// Failing a step records the message and terminates the execution.
#[test]
fn fail_step_terminates_execution() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let id = create(&manager);
    manager.start_execution(id).unwrap();
    manager.complete_step(id, None).unwrap();

    manager.fail_step(id, "role assumption denied in 222333444555");

    let state = manager.get_execution(id).unwrap();
    assert_eq!(state.status, ExecutionStatus::Failed);
    assert_eq!(state.steps[1].status, StepStatus::Failed);
    assert_eq!(
        state.steps[1].error.as_deref(),
        Some("role assumption denied in 222333444555")
    );
    // Earlier work is untouched.
    assert_eq!(state.steps[0].status, StepStatus::Completed);
}

/// Failure reporting on a stale or unknown handle never panics and never
/// disturbs terminal state.
#[test]
fn fail_step_is_idempotent_on_stale_handles() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    manager.fail_step(Uuid::new_v4(), "late failure from a dead worker");

    let id = create(&manager);
    manager.start_execution(id).unwrap();
    for _ in 0..3 {
        let _ = manager.complete_step(id, None).unwrap();
    }
    manager.fail_step(id, "raced with completion");
    assert_eq!(
        manager.get_execution(id).unwrap().status,
        ExecutionStatus::Completed
    );
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Listings come back in insertion order and filter by status.
#[test]
fn list_executions_orders_and_filters() {
    let (_validator, manager) = manager_with(true, Duration::from_secs(300));
    let first = create(&manager);
    let second = create(&manager);
    let third = create(&manager);
    manager.start_execution(second).unwrap();

    let all = manager.list_executions(None);
    assert_eq!(
        all.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![first, second, third]
    );

    let running = manager.list_executions(Some(ExecutionStatus::Running));
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, second);

    assert!(manager
        .list_executions(Some(ExecutionStatus::Failed))
        .is_empty());
}

/// Independent managers hold independent stores.
#[test]
fn managers_are_isolated() {
    let (_v1, first) = manager_with(true, Duration::from_secs(300));
    let (_v2, second) = manager_with(true, Duration::from_secs(300));

    let id = create(&first);
    assert!(first.get_execution(id).is_some());
    assert!(second.get_execution(id).is_none());
    assert!(second.list_executions(None).is_empty());
}
