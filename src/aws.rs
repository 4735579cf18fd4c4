use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockagent::types::{
    IngestionJobSortBy, IngestionJobSortByAttribute, KnowledgeBase, SortOrder,
};
use aws_sdk_bedrockagent::Client as BedrockAgentClient;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_redshiftdata::types::Field;
use aws_sdk_redshiftdata::Client as RedshiftDataClient;
use aws_sdk_redshiftserverless::types::{Namespace, Workgroup};
use aws_sdk_redshiftserverless::Client as RedshiftServerlessClient;
use aws_sdk_sts::Client as StsClient;
use tracing::{debug, info};

use crate::connectivity::{Cell, StatementApi, StatementStatus};
use crate::error::AwsError;
use crate::iam_inventory::{IamApi, RoleSummary};
use crate::knowledge_base::{
    IngestionJob, KnowledgeBaseApi, KnowledgeBaseDetail, KnowledgeBaseKind, QueryEngine, StorageKind,
};
use crate::namespace::{NamespaceInfo, ServerlessApi, WorkgroupInfo};

const KB_TYPE_SQL: &str = "SQL";
const QUERY_ENGINE_SERVERLESS: &str = "SERVERLESS";
const STORAGE_TYPE_RDS: &str = "RDS";

/// AWS clients for every service the diagnostic reads
#[derive(Debug, Clone)]
pub struct AwsManager {
    pub serverless_client: RedshiftServerlessClient,
    pub data_client: RedshiftDataClient,
    pub iam_client: IamClient,
    pub bedrock_agent_client: BedrockAgentClient,
    pub sts_client: StsClient,
    region: String,
}

impl AwsManager {
    /// Build clients from the default credential chain
    pub async fn new(region: Option<String>, profile: Option<String>) -> Result<Self> {
        info!("Initializing AWS manager with region: {:?}, profile: {:?}", region, profile);

        let mut config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region_name) = region {
            config_loader = config_loader.region(Region::new(region_name.clone()));
        }

        if let Some(ref profile_name) = profile {
            config_loader = config_loader.profile_name(profile_name);
        }

        let config = config_loader.load().await;

        let region_name = config
            .region()
            .map(|r| r.as_ref().to_string())
            .context("No AWS region configured")?;

        debug!("AWS clients initialized successfully");

        Ok(Self::from_sdk_config(&config, region_name))
    }

    /// Clients without credentials, for tests
    pub fn offline(region: &str) -> Self {
        let config = aws_config::SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .build();

        Self::from_sdk_config(&config, region.to_string())
    }

    fn from_sdk_config(config: &aws_config::SdkConfig, region: String) -> Self {
        Self {
            serverless_client: RedshiftServerlessClient::new(config),
            data_client: RedshiftDataClient::new(config),
            iam_client: IamClient::new(config),
            bedrock_agent_client: BedrockAgentClient::new(config),
            sts_client: StsClient::new(config),
            region,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Account id of the caller, through STS GetCallerIdentity
    pub async fn resolve_account_id(&self) -> crate::error::Result<String> {
        let response = self
            .sts_client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AwsError::AuthenticationFailed {
                message: format!("{}", aws_sdk_sts::error::DisplayErrorContext(&e)),
            })?;

        let account_id = response.account().ok_or_else(|| AwsError::AccountLookupFailed {
            message: "GetCallerIdentity returned no account".to_string(),
        })?;

        info!("Resolved AWS account: {}", account_id);
        Ok(account_id.to_string())
    }
}

fn namespace_info(ns: &Namespace) -> NamespaceInfo {
    NamespaceInfo {
        namespace_id: ns.namespace_id().map(str::to_string),
        namespace_name: ns.namespace_name().map(str::to_string),
        namespace_arn: ns.namespace_arn().map(str::to_string),
        db_name: ns.db_name().map(str::to_string),
        status: ns.status().map(|s| s.as_str().to_string()),
    }
}

fn workgroup_info(wg: &Workgroup) -> WorkgroupInfo {
    WorkgroupInfo {
        workgroup_name: wg.workgroup_name().unwrap_or_default().to_string(),
        workgroup_id: wg.workgroup_id().map(str::to_string),
        workgroup_arn: wg.workgroup_arn().map(str::to_string),
        namespace_name: wg.namespace_name().map(str::to_string),
        status: wg.status().map(|s| s.as_str().to_string()),
    }
}

#[async_trait]
impl ServerlessApi for AwsManager {
    async fn get_namespace(&self, namespace_name: &str) -> Result<Option<NamespaceInfo>> {
        let response = self
            .serverless_client
            .get_namespace()
            .namespace_name(namespace_name)
            .send()
            .await
            .with_context(|| format!("GetNamespace {}", namespace_name))?;

        Ok(response.namespace().map(namespace_info))
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>> {
        let mut namespaces = Vec::new();
        let mut paginator = self.serverless_client.list_namespaces().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListNamespaces")?;
            namespaces.extend(page.namespaces().iter().map(namespace_info));
        }

        Ok(namespaces)
    }

    async fn list_workgroups(&self) -> Result<Vec<WorkgroupInfo>> {
        let mut workgroups = Vec::new();
        let mut paginator = self.serverless_client.list_workgroups().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListWorkgroups")?;
            workgroups.extend(page.workgroups().iter().map(workgroup_info));
        }

        Ok(workgroups)
    }

    async fn get_workgroup(&self, workgroup_name: &str) -> Result<Option<WorkgroupInfo>> {
        let response = self
            .serverless_client
            .get_workgroup()
            .workgroup_name(workgroup_name)
            .send()
            .await
            .with_context(|| format!("GetWorkgroup {}", workgroup_name))?;

        Ok(response.workgroup().map(workgroup_info))
    }
}

/// Typed Data API field to a result cell
pub fn field_to_cell(field: &Field) -> Cell {
    match field {
        Field::LongValue(v) => Cell::Long(*v),
        Field::DoubleValue(v) => Cell::Double(*v),
        Field::StringValue(v) => Cell::Text(v.clone()),
        Field::BooleanValue(v) => Cell::Bool(*v),
        Field::IsNull(_) => Cell::Null,
        _ => Cell::Other,
    }
}

#[async_trait]
impl StatementApi for AwsManager {
    async fn execute_statement(&self, workgroup_name: &str, database: &str, sql: &str) -> Result<String> {
        let response = self
            .data_client
            .execute_statement()
            .workgroup_name(workgroup_name)
            .database(database)
            .sql(sql)
            .send()
            .await
            .with_context(|| format!("ExecuteStatement on {}/{}", workgroup_name, database))?;

        let id = response.id().context("ExecuteStatement returned no statement id")?;
        debug!("Submitted statement {}", id);
        Ok(id.to_string())
    }

    async fn describe_statement(&self, statement_id: &str) -> Result<StatementStatus> {
        let response = self
            .data_client
            .describe_statement()
            .id(statement_id)
            .send()
            .await
            .with_context(|| format!("DescribeStatement {}", statement_id))?;

        Ok(StatementStatus {
            status: response.status().map(|s| s.as_str().to_string()).unwrap_or_default(),
            error: response.error().map(str::to_string),
        })
    }

    async fn get_statement_result(&self, statement_id: &str) -> Result<Vec<Vec<Cell>>> {
        let mut rows = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .data_client
                .get_statement_result()
                .id(statement_id)
                .set_next_token(next_token.clone())
                .send()
                .await
                .with_context(|| format!("GetStatementResult {}", statement_id))?;

            rows.extend(
                response
                    .records()
                    .iter()
                    .map(|record| record.iter().map(field_to_cell).collect::<Vec<_>>()),
            );

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl IamApi for AwsManager {
    async fn list_roles(&self) -> Result<Vec<RoleSummary>> {
        let mut roles = Vec::new();
        let mut paginator = self.iam_client.list_roles().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListRoles")?;
            roles.extend(page.roles().iter().map(|role| RoleSummary {
                role_name: role.role_name().to_string(),
                role_arn: role.arn().to_string(),
            }));
        }

        Ok(roles)
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut paginator = self
            .iam_client
            .list_attached_role_policies()
            .role_name(role_name)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.with_context(|| format!("ListAttachedRolePolicies {}", role_name))?;
            names.extend(
                page.attached_policies()
                    .iter()
                    .filter_map(|policy| policy.policy_name().map(str::to_string)),
            );
        }

        Ok(names)
    }

    async fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut paginator = self
            .iam_client
            .list_role_policies()
            .role_name(role_name)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.with_context(|| format!("ListRolePolicies {}", role_name))?;
            names.extend(page.policy_names().iter().cloned());
        }

        Ok(names)
    }
}

fn knowledge_base_detail(kb: &KnowledgeBase) -> KnowledgeBaseDetail {
    let kind = kb.knowledge_base_configuration().map(|config| {
        if config.r#type().as_str() != KB_TYPE_SQL {
            return KnowledgeBaseKind::Other(config.r#type().as_str().to_string());
        }

        let query_engine = config
            .sql_knowledge_base_configuration()
            .and_then(|sql| sql.redshift_configuration())
            .and_then(|redshift| redshift.query_engine_configuration())
            .map(|engine| {
                if engine.r#type().as_str() == QUERY_ENGINE_SERVERLESS {
                    QueryEngine::Serverless {
                        workgroup_arn: engine
                            .serverless_configuration()
                            .map(|serverless| serverless.workgroup_arn().to_string()),
                    }
                } else {
                    QueryEngine::Other(engine.r#type().as_str().to_string())
                }
            });

        KnowledgeBaseKind::Sql { query_engine }
    });

    let storage = kb.storage_configuration().map(|storage| {
        if storage.r#type().as_str() == STORAGE_TYPE_RDS {
            StorageKind::Rds {
                resource_arn: storage.rds_configuration().map(|rds| rds.resource_arn().to_string()),
            }
        } else {
            StorageKind::Other(storage.r#type().as_str().to_string())
        }
    });

    KnowledgeBaseDetail {
        knowledge_base_id: kb.knowledge_base_id().to_string(),
        name: Some(kb.name().to_string()),
        status: Some(kb.status().as_str().to_string()),
        kind,
        storage,
    }
}

#[async_trait]
impl KnowledgeBaseApi for AwsManager {
    async fn list_knowledge_bases(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut paginator = self.bedrock_agent_client.list_knowledge_bases().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListKnowledgeBases")?;
            ids.extend(
                page.knowledge_base_summaries()
                    .iter()
                    .map(|summary| summary.knowledge_base_id().to_string()),
            );
        }

        Ok(ids)
    }

    async fn get_knowledge_base(&self, knowledge_base_id: &str) -> Result<Option<KnowledgeBaseDetail>> {
        let response = self
            .bedrock_agent_client
            .get_knowledge_base()
            .knowledge_base_id(knowledge_base_id)
            .send()
            .await
            .with_context(|| format!("GetKnowledgeBase {}", knowledge_base_id))?;

        Ok(response.knowledge_base().map(knowledge_base_detail))
    }

    async fn list_data_sources(&self, knowledge_base_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut paginator = self
            .bedrock_agent_client
            .list_data_sources()
            .knowledge_base_id(knowledge_base_id)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.with_context(|| format!("ListDataSources {}", knowledge_base_id))?;
            ids.extend(
                page.data_source_summaries()
                    .iter()
                    .map(|summary| summary.data_source_id().to_string()),
            );
        }

        Ok(ids)
    }

    async fn list_ingestion_jobs(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        max_results: i32,
    ) -> Result<Vec<IngestionJob>> {
        let sort_by = IngestionJobSortBy::builder()
            .attribute(IngestionJobSortByAttribute::StartedAt)
            .order(SortOrder::Descending)
            .build()?;

        let response = self
            .bedrock_agent_client
            .list_ingestion_jobs()
            .knowledge_base_id(knowledge_base_id)
            .data_source_id(data_source_id)
            .sort_by(sort_by)
            .max_results(max_results)
            .send()
            .await
            .with_context(|| format!("ListIngestionJobs {}/{}", knowledge_base_id, data_source_id))?;

        Ok(response
            .ingestion_job_summaries()
            .iter()
            .map(|summary| IngestionJob {
                ingestion_job_id: summary.ingestion_job_id().to_string(),
                data_source_id: summary.data_source_id().to_string(),
                status: summary.status().as_str().to_string(),
                started_at: Some(summary.started_at().to_string()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_manager_keeps_region() {
        let manager = AwsManager::offline("eu-central-1");
        assert_eq!(manager.region(), "eu-central-1");
    }

    #[test]
    fn test_field_to_cell() {
        assert_eq!(field_to_cell(&Field::LongValue(42)), Cell::Long(42));
        assert_eq!(field_to_cell(&Field::StringValue("orders".to_string())), Cell::Text("orders".to_string()));
        assert_eq!(field_to_cell(&Field::BooleanValue(true)), Cell::Bool(true));
        assert_eq!(field_to_cell(&Field::IsNull(true)), Cell::Null);
        assert_eq!(field_to_cell(&Field::DoubleValue(1.5)), Cell::Double(1.5));
    }

    #[test]
    fn test_workgroup_info_from_sdk() {
        let wg = Workgroup::builder()
            .workgroup_name("wg-a")
            .workgroup_arn("arn:aws:redshift-serverless:us-west-2:1:workgroup/uuid")
            .namespace_name("alpha")
            .build();

        let info = workgroup_info(&wg);
        assert_eq!(info.workgroup_name, "wg-a");
        assert_eq!(info.namespace_name.as_deref(), Some("alpha"));
        assert!(info.workgroup_arn.unwrap().ends_with("workgroup/uuid"));
    }

    #[test]
    fn test_namespace_info_from_sdk() {
        let ns = Namespace::builder()
            .namespace_id("9e7060fb")
            .namespace_name("analytics")
            .db_name("dev")
            .build();

        let info = namespace_info(&ns);
        assert_eq!(info.namespace_id.as_deref(), Some("9e7060fb"));
        assert_eq!(info.db_name.as_deref(), Some("dev"));
        assert_eq!(info.status, None);
    }
}
