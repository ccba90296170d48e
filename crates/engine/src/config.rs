use std::time::Duration;

/// Default minimum interval between two real credential checks.
pub const DEFAULT_CREDENTIAL_CHECK_INTERVAL_SECS: u64 = 300;

/// Execution engine configuration loaded from environment variables.
///
/// All fields have defaults suitable for production use.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum time between two real credential-validity checks for the same
    /// execution. Within this window `check_credentials` reports the last
    /// known validity without calling the credential provider. This is a soft
    /// rate limit, not a correctness mechanism; set it to zero to force a
    /// live answer on every check.
    pub credential_check_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credential_check_interval: Duration::from_secs(
                DEFAULT_CREDENTIAL_CHECK_INTERVAL_SECS,
            ),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `CREDENTIAL_CHECK_INTERVAL_SECS` | `300`   |
    pub fn from_env() -> Self {
        let secs: u64 = std::env::var("CREDENTIAL_CHECK_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_CREDENTIAL_CHECK_INTERVAL_SECS.to_string())
            .parse()
            .expect("CREDENTIAL_CHECK_INTERVAL_SECS must be a valid u64");

        Self {
            credential_check_interval: Duration::from_secs(secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
