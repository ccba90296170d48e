//! Execution state machine for long-running, credential-aware operations.
//!
//! An [`ExecutionManager`] owns a keyed in-process store of executions and
//! drives each one through its ordered steps, pausing when the operator's
//! delegated credentials expire and resuming without losing progress.

pub mod config;
pub mod manager;

pub use config::EngineConfig;
pub use manager::{EngineError, ExecutionManager, StepAdvance};
