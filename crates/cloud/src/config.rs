//! Per-environment connection profiles.

use orgrun_core::Environment;

/// Connection profile for one credential environment.
///
/// Each environment pins a home region and the regional STS endpoint used
/// for credential calls (the global endpoint does not exist in the GovCloud
/// partition).
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentProfile {
    /// Home region for sessions in this environment.
    pub region: &'static str,
    /// Regional STS endpoint for credential validation and refresh.
    pub sts_endpoint: &'static str,
}

impl EnvironmentProfile {
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Com => Self {
                region: "us-east-1",
                sts_endpoint: "https://sts.us-east-1.amazonaws.com",
            },
            Environment::Gov => Self {
                region: "us-gov-west-1",
                sts_endpoint: "https://sts.us-gov-west-1.amazonaws.com",
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
