//! SSM command dispatch collaborator.
//!
//! Invoked from within step bodies, never by the state machine itself: one
//! dispatch per unit of work, a status probe, and a polling wait that treats
//! `Success`, `Failed`, `Cancelled`, and `TimedOut` as terminal.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use orgrun_core::Environment;

use crate::credentials::CredentialStore;
use crate::error::{render_sdk_error, CloudError};

/// Default wall-clock budget for one dispatched command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default cadence for status polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle states reported for a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Cancelled,
    TimedOut,
    Failed,
    Cancelling,
    Unknown,
}

impl CommandStatus {
    /// Parse the provider's status string; anything unrecognized is
    /// `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "Pending" => CommandStatus::Pending,
            "InProgress" => CommandStatus::InProgress,
            "Delayed" => CommandStatus::Delayed,
            "Success" => CommandStatus::Success,
            "Cancelled" => CommandStatus::Cancelled,
            "TimedOut" => CommandStatus::TimedOut,
            "Failed" => CommandStatus::Failed,
            "Cancelling" => CommandStatus::Cancelling,
            _ => CommandStatus::Unknown,
        }
    }

    /// Whether this status ends the command's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Success
                | CommandStatus::Failed
                | CommandStatus::Cancelled
                | CommandStatus::TimedOut
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "Pending",
            CommandStatus::InProgress => "InProgress",
            CommandStatus::Delayed => "Delayed",
            CommandStatus::Success => "Success",
            CommandStatus::Cancelled => "Cancelled",
            CommandStatus::TimedOut => "TimedOut",
            CommandStatus::Failed => "Failed",
            CommandStatus::Cancelling => "Cancelling",
            CommandStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Run document chosen from the command text.
pub fn document_for(command: &str) -> &'static str {
    if command.trim_start().starts_with("powershell") {
        "AWS-RunPowerShellScript"
    } else {
        "AWS-RunShellScript"
    }
}

/// Report for one dispatched command, terminal or in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command_id: String,
    pub instance_id: String,
    pub status: CommandStatus,
    pub status_details: String,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl CommandOutcome {
    fn failure(command_id: &str, instance_id: &str, message: String) -> Self {
        Self {
            command_id: command_id.to_string(),
            instance_id: instance_id.to_string(),
            status: CommandStatus::Failed,
            status_details: message.clone(),
            output: String::new(),
            error: message,
            exit_code: -1,
        }
    }

    fn timed_out(command_id: &str, instance_id: &str) -> Self {
        Self {
            command_id: command_id.to_string(),
            instance_id: instance_id.to_string(),
            status: CommandStatus::TimedOut,
            status_details: "Timed out waiting for command completion".to_string(),
            output: String::new(),
            error: "Command execution timed out".to_string(),
            exit_code: -1,
        }
    }
}

/// Dispatches remote commands through SSM on behalf of step bodies.
pub struct SsmRunner {
    credentials: Arc<CredentialStore>,
}

impl SsmRunner {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    fn client(
        &self,
        environment: Environment,
        region: &str,
    ) -> Result<aws_sdk_ssm::Client, CloudError> {
        let session = self
            .credentials
            .create_session(environment)
            .ok_or(CloudError::NoCredentials(environment))?;
        Ok(session.ssm(region))
    }

    /// Send a command to one instance; returns the dispatch id.
    pub async fn send_command(
        &self,
        environment: Environment,
        region: &str,
        instance_id: &str,
        command: &str,
        comment: &str,
        timeout: Duration,
    ) -> Result<String, CloudError> {
        let ssm = self.client(environment, region)?;

        tracing::info!(
            instance_id = %instance_id,
            region = %region,
            "Sending command",
        );
        let resp = ssm
            .send_command()
            .instance_ids(instance_id)
            .document_name(document_for(command))
            .comment(comment)
            .timeout_seconds(timeout.as_secs() as i32)
            .parameters("commands", vec![command.to_string()])
            .send()
            .await
            .map_err(|err| CloudError::Dispatch(render_sdk_error(&err)))?;

        let command_id = resp
            .command()
            .and_then(|command| command.command_id())
            .ok_or_else(|| {
                CloudError::Dispatch("Dispatch response carried no command id".to_string())
            })?
            .to_string();

        tracing::info!(command_id = %command_id, "Command sent");
        Ok(command_id)
    }

    /// Probe the current status of a dispatched command.
    ///
    /// Infrastructure failures fold into a `Failed` outcome rather than
    /// propagating; a status probe on a stale handle must not crash the
    /// caller.
    pub async fn get_command_status(
        &self,
        environment: Environment,
        region: &str,
        command_id: &str,
        instance_id: &str,
    ) -> CommandOutcome {
        let ssm = match self.client(environment, region) {
            Ok(ssm) => ssm,
            Err(err) => return CommandOutcome::failure(command_id, instance_id, err.to_string()),
        };

        match ssm
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance_id)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp
                    .status()
                    .map(|status| CommandStatus::parse(status.as_str()))
                    .unwrap_or(CommandStatus::Unknown);
                tracing::debug!(command_id = %command_id, status = %status, "Command status");
                CommandOutcome {
                    command_id: command_id.to_string(),
                    instance_id: instance_id.to_string(),
                    status,
                    status_details: resp.status_details().unwrap_or_default().to_string(),
                    output: resp.standard_output_content().unwrap_or_default().to_string(),
                    error: resp.standard_error_content().unwrap_or_default().to_string(),
                    exit_code: resp.response_code(),
                }
            }
            Err(err) => {
                let message = render_sdk_error(&err);
                tracing::error!(
                    command_id = %command_id,
                    error = %message,
                    "Failed to get command status",
                );
                CommandOutcome::failure(command_id, instance_id, message)
            }
        }
    }

    /// Poll until the command reaches a terminal status or the deadline
    /// passes; the deadline produces a synthetic `TimedOut` outcome.
    pub async fn wait_for_completion(
        &self,
        environment: Environment,
        region: &str,
        command_id: &str,
        instance_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> CommandOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            let outcome = self
                .get_command_status(environment, region, command_id, instance_id)
                .await;
            if outcome.status.is_terminal() {
                tracing::info!(
                    command_id = %command_id,
                    status = %outcome.status,
                    "Command completed",
                );
                return outcome;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    command_id = %command_id,
                    "Timed out waiting for command completion",
                );
                return CommandOutcome::timed_out(command_id, instance_id);
            }
            tracing::debug!(
                command_id = %command_id,
                status = %outcome.status,
                "Command still running",
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
