use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Role as returned by the role listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleSummary {
    pub role_name: String,
    pub role_arn: String,
}

/// IAM calls used by the permission inventory
#[async_trait]
pub trait IamApi: Send + Sync {
    /// Every role in the account, all pages
    async fn list_roles(&self) -> anyhow::Result<Vec<RoleSummary>>;

    /// Names of managed policies attached to the role
    async fn list_attached_role_policies(&self, role_name: &str) -> anyhow::Result<Vec<String>>;

    /// Names of inline policies embedded in the role
    async fn list_role_policies(&self, role_name: &str) -> anyhow::Result<Vec<String>>;
}

/// Policy names attached to a role.
///
/// `has_redshift_access` and `has_workgroup_access` are never derived from the
/// policy documents and stay `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RolePolicies {
    pub attached_policies: Vec<String>,
    pub inline_policies: Vec<String>,
    pub has_redshift_access: bool,
    pub has_workgroup_access: bool,
}

/// A role whose name matched the Bedrock filters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BedrockRole {
    pub role_name: String,
    pub role_arn: String,
    pub policies: RolePolicies,
}

/// Bedrock-related roles found for one workgroup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionInventory {
    pub bedrock_roles: Vec<BedrockRole>,
    pub potential_issues: Vec<String>,
}

/// Case-insensitive substring match against any of the filters
pub fn role_matches(role_name: &str, filters: &[String]) -> bool {
    let lowered = role_name.to_lowercase();
    filters.iter().any(|f| lowered.contains(&f.to_lowercase()))
}

/// Inventory the Bedrock-related roles and their policy names.
///
/// The workgroup ARN is only used for logging; roles are selected by name.
pub async fn inventory_permissions(api: &dyn IamApi, workgroup_arn: &str, filters: &[String]) -> PermissionInventory {
    let mut inventory = PermissionInventory::default();
    info!("Checking IAM roles related to {}", workgroup_arn);

    let roles = match api.list_roles().await {
        Ok(roles) => roles,
        Err(e) => {
            error!("Error checking IAM permissions: {:#}", e);
            inventory.potential_issues.push(format!("IAM check failed: {:#}", e));
            return inventory;
        }
    };

    for role in roles.into_iter().filter(|r| role_matches(&r.role_name, filters)) {
        debug!("Bedrock-related role: {}", role.role_name);
        let policies = role_policies(api, &role.role_name).await;
        inventory.bedrock_roles.push(BedrockRole {
            role_name: role.role_name,
            role_arn: role.role_arn,
            policies,
        });
    }

    info!("Found {} Bedrock-related roles", inventory.bedrock_roles.len());
    inventory
}

async fn role_policies(api: &dyn IamApi, role_name: &str) -> RolePolicies {
    let mut policies = RolePolicies::default();

    match api.list_attached_role_policies(role_name).await {
        Ok(names) => policies.attached_policies = names,
        Err(e) => error!("Error getting attached policies for role {}: {:#}", role_name, e),
    }

    match api.list_role_policies(role_name).await {
        Ok(names) => policies.inline_policies = names,
        Err(e) => error!("Error getting inline policies for role {}: {:#}", role_name, e),
    }

    policies
}
