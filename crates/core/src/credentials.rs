//! Credential-validation seam.
//!
//! The execution engine never refreshes credentials itself; it only observes
//! whether the delegated credentials for an environment are still usable.
//! The concrete provider lives in the cloud layer.

use crate::types::Environment;

/// Answers "are my delegated credentials for this environment still valid?".
pub trait CredentialValidator: Send + Sync {
    /// Whether live (unexpired) credentials exist for `environment`.
    fn are_credentials_valid(&self, environment: Environment) -> bool;
}
