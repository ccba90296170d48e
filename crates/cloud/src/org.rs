//! Organization traversal engine.
//!
//! Enumerates the account hierarchy (optionally scoped to a sub-tree),
//! assumes the delegated role in each account, and drives a caller-supplied
//! [`OrgVisitor`] over every account and every (account, region) pair.
//! Every node's outcome is recorded independently: a denied role or a
//! visitor failure in one account never aborts its siblings or the walk.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use serde_json::Value;

use orgrun_core::{AccountOutcome, Environment, OrgRunResult, Partition, RegionOutcome};

use crate::credentials::CredentialStore;
use crate::error::{render_sdk_error, CloudError};
use crate::session::AwsSession;

/// Session name attached to assumed-role sessions.
pub const ROLE_SESSION_NAME: &str = "orgrun-visitor";

/// Role assumed in member accounts unless the caller names another.
pub const DEFAULT_ORG_ROLE: &str = "OrganizationAccountAccessRole";

/// Build the IAM role ARN for a delegated role in a member account.
pub fn role_arn(partition: Partition, account_id: &str, role_name: &str) -> String {
    format!(
        "arn:{}:iam::{}:role/{}",
        partition.as_str(),
        account_id,
        role_name
    )
}

/// Keep the operator-relevant `us-` geography; the GovCloud region class is
/// included only on request.
fn filter_us_regions(names: impl IntoIterator<Item = String>, include_gov: bool) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| name.starts_with("us-") && (include_gov || !name.contains("gov")))
        .collect()
}

/// Visitor invoked once per account and once per (account, region) pair.
///
/// The same traversal skeleton serves inventory, scanning, and bulk
/// operations; implementations return an opaque payload that is recorded in
/// the result tree, or any error, which is recorded in place of it.
#[async_trait]
pub trait OrgVisitor: Send + Sync {
    async fn visit_account(&self, session: &AwsSession, account_id: &str)
        -> anyhow::Result<Value>;

    async fn visit_region(
        &self,
        session: &AwsSession,
        region: &str,
        account_id: &str,
    ) -> anyhow::Result<Value>;
}

/// Produces a narrowed session for one target account, or `None` when the
/// account cannot be entered.
#[async_trait]
pub trait RoleBroker: Send + Sync {
    async fn assume(&self, account_id: &str) -> Option<AwsSession>;
}

/// STS-backed broker bound to a base session and a delegated role name.
struct StsRoleBroker<'a> {
    session: &'a AwsSession,
    role_name: &'a str,
    partition: Partition,
}

#[async_trait]
impl RoleBroker for StsRoleBroker<'_> {
    async fn assume(&self, account_id: &str) -> Option<AwsSession> {
        switch_role(self.session, account_id, self.role_name, self.partition).await
    }
}

/// Exchange the base session's identity for temporary credentials in the
/// target account.
///
/// Returns `None` (never an error) when the exchange is denied or the
/// target is unreachable; this is the per-account failure-isolation point.
pub async fn switch_role(
    session: &AwsSession,
    account_id: &str,
    role_name: &str,
    partition: Partition,
) -> Option<AwsSession> {
    let arn = role_arn(partition, account_id, role_name);
    tracing::debug!(role_arn = %arn, "Assuming role");

    let resp = match session
        .sts()
        .assume_role()
        .role_arn(&arn)
        .role_session_name(ROLE_SESSION_NAME)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(
                account_id = %account_id,
                error = %render_sdk_error(&err),
                "Failed to assume role",
            );
            return None;
        }
    };

    let issued = resp.credentials()?;
    let expires_after = std::time::SystemTime::try_from(issued.expiration().clone()).ok();
    let credentials = Credentials::new(
        issued.access_key_id(),
        issued.secret_access_key(),
        Some(issued.session_token().to_string()),
        expires_after,
        "orgrun-assumed-role",
    );
    let region = session.region().cloned()?;
    Some(AwsSession::new(credentials, region))
}

/// Enumerate account ids in the organization, optionally scoped under a
/// parent node; all pages are flattened into one list.
pub async fn get_accounts(
    org: &aws_sdk_organizations::Client,
    parent_id: Option<&str>,
) -> Result<Vec<String>, CloudError> {
    let mut account_ids = Vec::new();

    if let Some(parent_id) = parent_id {
        let mut pages = org
            .list_accounts_for_parent()
            .parent_id(parent_id)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| CloudError::Organizations(render_sdk_error(&err)))?;
            account_ids.extend(
                page.accounts()
                    .iter()
                    .filter_map(|account| account.id().map(str::to_string)),
            );
        }
    } else {
        let mut pages = org.list_accounts().into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| CloudError::Organizations(render_sdk_error(&err)))?;
            account_ids.extend(
                page.accounts()
                    .iter()
                    .filter_map(|account| account.id().map(str::to_string)),
            );
        }
    }

    tracing::debug!(count = account_ids.len(), "Enumerated organization accounts");
    Ok(account_ids)
}

/// Enumerate candidate regions for the session's partition, filtered to the
/// operator's geography. `include_restricted` toggles the GovCloud class.
pub async fn get_regions(
    session: &AwsSession,
    include_restricted: bool,
) -> Result<Vec<String>, CloudError> {
    tracing::debug!("Enumerating candidate regions");
    let resp = session
        .ec2(None)
        .describe_regions()
        .send()
        .await
        .map_err(|err| CloudError::Regions(render_sdk_error(&err)))?;

    let names = resp
        .regions()
        .iter()
        .filter_map(|region| region.region_name().map(str::to_string));
    Ok(filter_us_regions(names, include_restricted))
}

/// Walk every account under `parent_id` (or the whole organization),
/// visiting each account and each of its regions.
pub async fn walk_organization<V: OrgVisitor>(
    session: &AwsSession,
    org: &aws_sdk_organizations::Client,
    role_name: &str,
    visitor: &V,
    partition: Partition,
    parent_id: Option<&str>,
) -> Result<HashMap<String, AccountOutcome>, CloudError> {
    tracing::debug!("Walking organization");
    let include_restricted = partition == Partition::AwsUsGov;
    let regions = get_regions(session, include_restricted).await?;
    let accounts = get_accounts(org, parent_id).await?;

    let broker = StsRoleBroker {
        session,
        role_name,
        partition,
    };
    Ok(visit_accounts(&broker, &accounts, &regions, visitor).await)
}

/// Fan out over already-enumerated accounts and regions.
///
/// Every account gets exactly one outcome entry: a role-assumption failure
/// is recorded and the walk continues; visitor failures are caught at the
/// smallest scope (per account, per region) and recorded in place.
pub async fn visit_accounts<V: OrgVisitor>(
    broker: &dyn RoleBroker,
    accounts: &[String],
    regions: &[String],
    visitor: &V,
) -> HashMap<String, AccountOutcome> {
    let mut results = HashMap::with_capacity(accounts.len());

    for account_id in accounts {
        let Some(assumed) = broker.assume(account_id).await else {
            tracing::warn!(account_id = %account_id, "Failed to switch role; skipping account");
            results.insert(account_id.clone(), AccountOutcome::role_assumption_failed());
            continue;
        };

        tracing::info!(account_id = %account_id, "Visiting account");
        let mut outcome = match visitor.visit_account(&assumed, account_id).await {
            Ok(value) => AccountOutcome::success(value),
            Err(err) => {
                tracing::error!(
                    account_id = %account_id,
                    error = %err,
                    "Account visitor failed",
                );
                AccountOutcome::failure(err.to_string())
            }
        };

        for region in regions {
            tracing::info!(account_id = %account_id, region = %region, "Visiting region");
            let region_outcome = match visitor.visit_region(&assumed, region, account_id).await {
                Ok(value) => RegionOutcome::success(value),
                Err(err) => {
                    tracing::error!(
                        account_id = %account_id,
                        region = %region,
                        error = %err,
                        "Region visitor failed",
                    );
                    RegionOutcome::failure(err.to_string())
                }
            };
            outcome.regions.insert(region.clone(), region_outcome);
        }

        results.insert(account_id.clone(), outcome);
    }

    results
}

/// Top-level entry point: establish the base session for `environment`,
/// walk the organization, and record wall-clock elapsed time regardless of
/// outcome.
///
/// A failure to even start (no session, enumeration error) produces a
/// top-level error with an empty tree rather than a partial one.
pub async fn visit_organization<V: OrgVisitor>(
    credentials: &CredentialStore,
    environment: Environment,
    visitor: &V,
    role_name: &str,
    parent_id: Option<&str>,
) -> OrgRunResult {
    tracing::info!(environment = %environment, "Starting organization visit");
    let started = Instant::now();

    let outcome = run_visit(credentials, environment, visitor, role_name, parent_id).await;
    let elapsed = started.elapsed().as_secs_f64();

    let result = match outcome {
        Ok(accounts) => OrgRunResult::success(accounts, elapsed),
        Err(err) => {
            tracing::error!(
                environment = %environment,
                error = %err,
                "Organization visit failed",
            );
            OrgRunResult::failure(err.to_string(), elapsed)
        }
    };

    tracing::info!(
        environment = %environment,
        time_elapsed = result.time_elapsed,
        "Organization visit finished",
    );
    result
}

async fn run_visit<V: OrgVisitor>(
    credentials: &CredentialStore,
    environment: Environment,
    visitor: &V,
    role_name: &str,
    parent_id: Option<&str>,
) -> Result<HashMap<String, AccountOutcome>, CloudError> {
    let partition = environment.partition();
    let session = credentials
        .create_session(environment)
        .ok_or(CloudError::NoCredentials(environment))?;
    let org = session.organizations();
    walk_organization(&session, &org, role_name, visitor, partition, parent_id).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
