//! EC2 instance inventory visitor.
//!
//! A concrete [`OrgVisitor`] for the discovery use case: per account it
//! resolves the assumed identity, per region it enumerates instances into
//! condensed [`InstanceSummary`] rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use aws_sdk_ec2::types::Instance;

use crate::error::{render_sdk_error, CloudError};
use crate::org::OrgVisitor;
use crate::session::AwsSession;

/// Condensed per-instance row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub state: Option<String>,
    pub platform: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    /// Value of the `Name` tag, when present.
    pub name: Option<String>,
}

impl InstanceSummary {
    /// Extract the row shape from a full SDK instance description.
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            instance_id: instance.instance_id().unwrap_or_default().to_string(),
            state: instance
                .state()
                .and_then(|state| state.name())
                .map(|name| name.as_str().to_string()),
            platform: instance.platform_details().map(str::to_string),
            private_ip: instance.private_ip_address().map(str::to_string),
            public_ip: instance.public_ip_address().map(str::to_string),
            name: instance
                .tags()
                .iter()
                .find(|tag| tag.key() == Some("Name"))
                .and_then(|tag| tag.value())
                .map(str::to_string),
        }
    }
}

/// Enumerate EC2 instances in one region, optionally narrowed to specific
/// instance ids; all pages are flattened.
pub async fn describe_instances(
    session: &AwsSession,
    region: &str,
    instance_ids: Option<Vec<String>>,
) -> Result<Vec<InstanceSummary>, CloudError> {
    let ec2 = session.ec2(Some(region));
    let mut pages = ec2
        .describe_instances()
        .set_instance_ids(instance_ids)
        .into_paginator()
        .send();

    let mut instances = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|err| CloudError::Inventory(render_sdk_error(&err)))?;
        for reservation in page.reservations() {
            instances.extend(
                reservation
                    .instances()
                    .iter()
                    .map(InstanceSummary::from_instance),
            );
        }
    }

    tracing::info!(region = %region, count = instances.len(), "Described instances");
    Ok(instances)
}

/// Inventory visitor over the organization traversal engine.
#[derive(Debug, Default)]
pub struct InstanceInventory;

#[async_trait]
impl OrgVisitor for InstanceInventory {
    async fn visit_account(
        &self,
        session: &AwsSession,
        account_id: &str,
    ) -> anyhow::Result<Value> {
        let identity = session.sts().get_caller_identity().send().await?;
        Ok(serde_json::json!({
            "account": account_id,
            "arn": identity.arn(),
        }))
    }

    async fn visit_region(
        &self,
        session: &AwsSession,
        region: &str,
        _account_id: &str,
    ) -> anyhow::Result<Value> {
        let instances = describe_instances(session, region, None).await?;
        Ok(serde_json::to_value(instances)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
