use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Redshift Serverless namespace as seen by the diagnostic
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NamespaceInfo {
    pub namespace_id: Option<String>,
    pub namespace_name: Option<String>,
    pub namespace_arn: Option<String>,
    pub db_name: Option<String>,
    pub status: Option<String>,
}

/// Redshift Serverless workgroup bound to a namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkgroupInfo {
    pub workgroup_name: String,
    pub workgroup_id: Option<String>,
    pub workgroup_arn: Option<String>,
    pub namespace_name: Option<String>,
    pub status: Option<String>,
}

/// Control-plane calls used by the diagnostic
#[async_trait]
pub trait ServerlessApi: Send + Sync {
    /// Look up a namespace by name. `Ok(None)` means the response carried no namespace.
    async fn get_namespace(&self, namespace_name: &str) -> anyhow::Result<Option<NamespaceInfo>>;

    /// All namespaces visible to the caller
    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceInfo>>;

    /// All workgroups visible to the caller
    async fn list_workgroups(&self) -> anyhow::Result<Vec<WorkgroupInfo>>;

    /// Workgroup details by name
    async fn get_workgroup(&self, workgroup_name: &str) -> anyhow::Result<Option<WorkgroupInfo>>;
}

/// Last `/` segment of a namespace ARN
pub fn extract_namespace_id(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Resolve a namespace by name, falling back to a scan of the namespace listing
/// for a matching namespace id. Returns `None` when neither lookup finds it.
pub async fn resolve_namespace(api: &dyn ServerlessApi, namespace_id: &str) -> Option<NamespaceInfo> {
    match api.get_namespace(namespace_id).await {
        Ok(Some(namespace)) => return Some(namespace),
        Ok(None) => warn!("get_namespace returned no namespace for {}", namespace_id),
        Err(e) => error!("Error getting namespace {}: {:#}", namespace_id, e),
    }

    match api.list_namespaces().await {
        Ok(namespaces) => {
            let found = namespaces
                .into_iter()
                .find(|ns| ns.namespace_id.as_deref() == Some(namespace_id));

            match &found {
                Some(ns) => info!("Found namespace by ID: {}", ns.namespace_name.as_deref().unwrap_or("<unnamed>")),
                None => error!("Namespace {} not found in list either", namespace_id),
            }
            found
        }
        Err(e) => {
            error!("Error listing namespaces: {:#}", e);
            None
        }
    }
}

/// Workgroups whose namespace name equals `namespace_name`, with details fetched
/// for each. Any API failure yields an empty list.
pub async fn workgroups_for_namespace(api: &dyn ServerlessApi, namespace_name: &str) -> Vec<WorkgroupInfo> {
    match collect_workgroups(api, namespace_name).await {
        Ok(workgroups) => workgroups,
        Err(e) => {
            error!("Error getting workgroups for namespace {}: {:#}", namespace_name, e);
            Vec::new()
        }
    }
}

async fn collect_workgroups(api: &dyn ServerlessApi, namespace_name: &str) -> anyhow::Result<Vec<WorkgroupInfo>> {
    let mut workgroups = Vec::new();

    for summary in api.list_workgroups().await? {
        if summary.namespace_name.as_deref() != Some(namespace_name) {
            continue;
        }

        debug!("Fetching workgroup details: {}", summary.workgroup_name);
        let detailed = api.get_workgroup(&summary.workgroup_name).await?;
        workgroups.push(detailed.unwrap_or(summary));
    }

    Ok(workgroups)
}
