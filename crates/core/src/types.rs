//! Environment and partition identifiers.
//!
//! An [`Environment`] names one of the isolated credential contexts the
//! orchestrator can authenticate against; each maps to exactly one cloud
//! [`Partition`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named credential/authentication context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// The commercial partition.
    Com,
    /// The GovCloud partition.
    Gov,
}

impl Environment {
    /// All known environments, in declaration order.
    pub const ALL: [Environment; 2] = [Environment::Com, Environment::Gov];

    /// The cloud partition this environment authenticates against.
    pub fn partition(self) -> Partition {
        match self {
            Environment::Com => Partition::Aws,
            Environment::Gov => Partition::AwsUsGov,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Com => write!(f, "com"),
            Environment::Gov => write!(f, "gov"),
        }
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "com" => Ok(Environment::Com),
            "gov" => Ok(Environment::Gov),
            other => Err(CoreError::Validation(format!(
                "Unknown environment: \"{other}\""
            ))),
        }
    }
}

/// A cloud partition, as it appears in ARNs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "aws-us-gov")]
    AwsUsGov,
}

impl Partition {
    /// The partition segment used in ARNs.
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Aws => "aws",
            Partition::AwsUsGov => "aws-us-gov",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
