//! AWS-facing layer for the orgrun orchestrator.
//!
//! Provides the collaborators the execution engine depends on:
//! an in-memory credential store (the credential provider), the
//! session/role-switch layer, the organization traversal engine with
//! pluggable visitors, an EC2 instance inventory visitor, and the SSM
//! command dispatch boundary.

pub mod config;
pub mod credentials;
pub mod error;
pub mod inventory;
pub mod org;
pub mod session;
pub mod ssm;

pub use config::EnvironmentProfile;
pub use credentials::{AwsCredentials, CredentialStore};
pub use error::CloudError;
pub use inventory::{describe_instances, InstanceInventory, InstanceSummary};
pub use org::{
    get_accounts, get_regions, role_arn, switch_role, visit_accounts, visit_organization,
    walk_organization, OrgVisitor, RoleBroker, DEFAULT_ORG_ROLE,
};
pub use session::AwsSession;
pub use ssm::{CommandOutcome, CommandStatus, SsmRunner};
