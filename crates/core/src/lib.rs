//! Domain types for the orgrun orchestrator.
//!
//! This crate holds the pure data model shared by the execution engine and
//! the cloud layer: the execution state machine's types, the organization
//! traversal result tree, environment/partition identifiers, and the
//! credential-validation seam. It has no internal dependencies and performs
//! no I/O.

pub mod credentials;
pub mod error;
pub mod execution;
pub mod traversal;
pub mod types;

pub use credentials::CredentialValidator;
pub use error::CoreError;
pub use execution::{
    ExecutionState, ExecutionStatus, ExecutionStep, ExecutionSummary, StepSpec, StepStatus,
};
pub use traversal::{AccountOutcome, OrgRunResult, RegionOutcome, VisitStatus};
pub use types::{Environment, Partition};
