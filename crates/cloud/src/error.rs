use aws_smithy_types::error::display::DisplayErrorContext;

use orgrun_core::Environment;

/// Errors from the AWS-facing layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloudError {
    /// No live credentials exist for the environment.
    #[error("No valid credentials for environment {0}")]
    NoCredentials(Environment),

    #[error("Credential validation failed: {0}")]
    CredentialValidation(String),

    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),

    /// Already-temporary credentials cannot be refreshed without a role;
    /// they must come from the operator's identity provider.
    #[error("Cannot refresh temporary credentials without a role to assume")]
    TemporaryCredentials,

    #[error("Failed to enumerate organization accounts: {0}")]
    Organizations(String),

    #[error("Failed to enumerate regions: {0}")]
    Regions(String),

    #[error("Failed to describe instances: {0}")]
    Inventory(String),

    #[error("Command dispatch failed: {0}")]
    Dispatch(String),
}

/// Render an SDK error with its full source chain.
pub(crate) fn render_sdk_error<E: std::error::Error>(err: &E) -> String {
    format!("{}", DisplayErrorContext(err))
}
