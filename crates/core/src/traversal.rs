//! Organization traversal result tree.
//!
//! Every account visited gets exactly one [`AccountOutcome`], and every
//! region under it exactly one [`RegionOutcome`], regardless of success or
//! failure elsewhere in the walk. The tree is produced fresh on every run
//! and owned by the caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome classification for one visited node or for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    Success,
    Error,
}

/// Outcome of visiting one region within an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionOutcome {
    pub status: VisitStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl RegionOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            status: VisitStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: VisitStatus::Error,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of visiting one account, including its per-region outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOutcome {
    pub status: VisitStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub regions: HashMap<String, RegionOutcome>,
}

impl AccountOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            status: VisitStatus::Success,
            result: Some(result),
            error: None,
            regions: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: VisitStatus::Error,
            result: None,
            error: Some(error.into()),
            regions: HashMap::new(),
        }
    }

    /// The entry recorded when the delegated role could not be assumed;
    /// the account is skipped but the walk continues.
    pub fn role_assumption_failed() -> Self {
        Self::failure("Failed to assume role")
    }
}

/// Result of one full organization visit, with run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgRunResult {
    pub status: VisitStatus,
    /// Wall-clock seconds, recorded regardless of outcome.
    pub time_elapsed: f64,
    /// Set only when the run could not start (no partial tree in that case).
    pub error: Option<String>,
    pub accounts: HashMap<String, AccountOutcome>,
}

impl OrgRunResult {
    pub fn success(accounts: HashMap<String, AccountOutcome>, time_elapsed: f64) -> Self {
        Self {
            status: VisitStatus::Success,
            time_elapsed,
            error: None,
            accounts,
        }
    }

    pub fn failure(error: impl Into<String>, time_elapsed: f64) -> Self {
        Self {
            status: VisitStatus::Error,
            time_elapsed,
            error: Some(error.into()),
            accounts: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
