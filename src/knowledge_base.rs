use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const FAILED_STATUS: &str = "FAILED";

/// Query engine behind a SQL knowledge base
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QueryEngine {
    Serverless { workgroup_arn: Option<String> },
    Other(String),
}

/// Knowledge base configuration shapes relevant to workgroup matching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum KnowledgeBaseKind {
    Sql { query_engine: Option<QueryEngine> },
    Other(String),
}

/// Storage configuration shapes relevant to workgroup matching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StorageKind {
    Rds { resource_arn: Option<String> },
    Other(String),
}

/// Full knowledge base description, reduced to what the diagnostic reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBaseDetail {
    pub knowledge_base_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub kind: Option<KnowledgeBaseKind>,
    pub storage: Option<StorageKind>,
}

/// Ingestion job summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionJob {
    pub ingestion_job_id: String,
    pub data_source_id: String,
    pub status: String,
    pub started_at: Option<String>,
}

impl IngestionJob {
    pub fn is_failed(&self) -> bool {
        self.status == FAILED_STATUS
    }
}

/// Bedrock Agent calls used by the reverse lookup
#[async_trait]
pub trait KnowledgeBaseApi: Send + Sync {
    /// Ids of every knowledge base, all pages
    async fn list_knowledge_bases(&self) -> anyhow::Result<Vec<String>>;

    async fn get_knowledge_base(&self, knowledge_base_id: &str) -> anyhow::Result<Option<KnowledgeBaseDetail>>;

    /// Ids of the knowledge base's data sources
    async fn list_data_sources(&self, knowledge_base_id: &str) -> anyhow::Result<Vec<String>>;

    /// Most recent ingestion jobs first, at most `max_results`
    async fn list_ingestion_jobs(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        max_results: i32,
    ) -> anyhow::Result<Vec<IngestionJob>>;
}

/// Knowledge base that points at the diagnosed workgroup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencingKnowledgeBase {
    pub knowledge_base_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub data_sources_count: usize,
    pub recent_ingestion_jobs: Vec<IngestionJob>,
}

impl ReferencingKnowledgeBase {
    pub fn failed_jobs(&self) -> impl Iterator<Item = &IngestionJob> {
        self.recent_ingestion_jobs.iter().filter(|job| job.is_failed())
    }
}

/// Whether the knowledge base is wired to `workgroup_arn`.
///
/// A SQL knowledge base with a serverless query engine is decided by that
/// engine's workgroup alone; everything else falls through to the RDS storage
/// resource ARN.
pub fn uses_workgroup(detail: &KnowledgeBaseDetail, workgroup_arn: &str) -> bool {
    if let Some(KnowledgeBaseKind::Sql {
        query_engine: Some(QueryEngine::Serverless { workgroup_arn: engine_arn }),
    }) = &detail.kind
    {
        return engine_arn.as_deref() == Some(workgroup_arn);
    }

    match &detail.storage {
        Some(StorageKind::Rds { resource_arn }) => resource_arn.as_deref() == Some(workgroup_arn),
        _ => false,
    }
}

/// Knowledge bases referencing the workgroup, with their data source count and
/// recent ingestion jobs. Individual call failures are logged and skipped.
pub async fn find_referencing_knowledge_bases(
    api: &dyn KnowledgeBaseApi,
    workgroup_arn: &str,
    ingestion_job_limit: i32,
) -> Vec<ReferencingKnowledgeBase> {
    let ids = match api.list_knowledge_bases().await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Error getting Knowledge Bases: {:#}", e);
            return Vec::new();
        }
    };

    let mut knowledge_bases = Vec::new();

    for kb_id in ids {
        let detail = match api.get_knowledge_base(&kb_id).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                warn!("Knowledge base {} returned no details", kb_id);
                continue;
            }
            Err(e) => {
                error!("Error getting Knowledge Base {}: {:#}", kb_id, e);
                continue;
            }
        };

        if !uses_workgroup(&detail, workgroup_arn) {
            debug!("Knowledge base {} does not use {}", kb_id, workgroup_arn);
            continue;
        }

        info!("Knowledge base {} uses workgroup {}", kb_id, workgroup_arn);

        let data_sources = match api.list_data_sources(&kb_id).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Error listing data sources for {}: {:#}", kb_id, e);
                Vec::new()
            }
        };

        let mut recent_ingestion_jobs = Vec::new();
        for ds_id in &data_sources {
            match api.list_ingestion_jobs(&kb_id, ds_id, ingestion_job_limit).await {
                Ok(jobs) => recent_ingestion_jobs.extend(jobs),
                Err(e) => error!("Error listing ingestion jobs for {}/{}: {:#}", kb_id, ds_id, e),
            }
        }

        knowledge_bases.push(ReferencingKnowledgeBase {
            knowledge_base_id: kb_id,
            name: detail.name,
            status: detail.status,
            data_sources_count: data_sources.len(),
            recent_ingestion_jobs,
        });
    }

    knowledge_bases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{job, rds_kb, serverless_kb, FakeKnowledgeBases};

    const WG: &str = "arn:aws:redshift-serverless:us-west-2:111122223333:workgroup/wg-1";

    #[test]
    fn test_uses_workgroup_serverless_sql() {
        assert!(uses_workgroup(&serverless_kb("kb", Some(WG)), WG));
        assert!(!uses_workgroup(&serverless_kb("kb", Some("arn:other")), WG));
        assert!(!uses_workgroup(&serverless_kb("kb", None), WG));
    }

    #[test]
    fn test_serverless_engine_decides_before_storage() {
        let mut kb = serverless_kb("kb", Some("arn:other"));
        kb.storage = Some(StorageKind::Rds { resource_arn: Some(WG.to_string()) });
        assert!(!uses_workgroup(&kb, WG));
    }

    #[test]
    fn test_uses_workgroup_rds_storage() {
        assert!(uses_workgroup(&rds_kb("kb", WG), WG));

        let provisioned = KnowledgeBaseDetail {
            knowledge_base_id: "kb".to_string(),
            name: None,
            status: None,
            kind: Some(KnowledgeBaseKind::Sql {
                query_engine: Some(QueryEngine::Other("PROVISIONED".to_string())),
            }),
            storage: Some(StorageKind::Rds { resource_arn: Some(WG.to_string()) }),
        };
        assert!(uses_workgroup(&provisioned, WG));

        let vector = KnowledgeBaseDetail {
            kind: Some(KnowledgeBaseKind::Other("VECTOR".to_string())),
            storage: Some(StorageKind::Other("OPENSEARCH_SERVERLESS".to_string())),
            ..provisioned
        };
        assert!(!uses_workgroup(&vector, WG));
    }

    #[tokio::test]
    async fn test_find_referencing_knowledge_bases() {
        let api = FakeKnowledgeBases::default()
            .with_knowledge_base(serverless_kb("kb-1", Some(WG)), vec![
                ("ds-1", vec![job("j1", "ds-1", "COMPLETE"), job("j2", "ds-1", "FAILED")]),
                ("ds-2", vec![]),
            ])
            .with_knowledge_base(serverless_kb("kb-2", Some("arn:other")), vec![("ds-3", vec![])]);

        let kbs = find_referencing_knowledge_bases(&api, WG, 5).await;

        assert_eq!(kbs.len(), 1);
        assert_eq!(kbs[0].knowledge_base_id, "kb-1");
        assert_eq!(kbs[0].data_sources_count, 2);
        assert_eq!(kbs[0].recent_ingestion_jobs.len(), 2);
        assert_eq!(kbs[0].failed_jobs().count(), 1);
        assert_eq!(api.job_limits(), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_find_skips_unreadable_knowledge_base() {
        let api = FakeKnowledgeBases::default()
            .with_knowledge_base(serverless_kb("kb-1", Some(WG)), vec![("ds-1", vec![])])
            .with_knowledge_base(rds_kb("kb-2", WG), vec![("ds-2", vec![job("j", "ds-2", "COMPLETE")])])
            .with_unreadable("kb-1");

        let kbs = find_referencing_knowledge_bases(&api, WG, 5).await;

        let ids: Vec<_> = kbs.iter().map(|kb| kb.knowledge_base_id.as_str()).collect();
        assert_eq!(ids, vec!["kb-2"]);
        assert_eq!(kbs[0].recent_ingestion_jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_ingestion_job_failure_leaves_source_without_jobs() {
        let api = FakeKnowledgeBases::default()
            .with_knowledge_base(serverless_kb("kb-1", Some(WG)), vec![
                ("ds-1", vec![job("j1", "ds-1", "FAILED")]),
                ("ds-2", vec![job("j2", "ds-2", "COMPLETE")]),
            ])
            .with_failing_jobs("ds-1");

        let kbs = find_referencing_knowledge_bases(&api, WG, 5).await;

        assert_eq!(kbs.len(), 1);
        assert_eq!(kbs[0].data_sources_count, 2);
        let jobs: Vec<_> = kbs[0].recent_ingestion_jobs.iter().map(|j| j.ingestion_job_id.as_str()).collect();
        assert_eq!(jobs, vec!["j2"]);
        assert_eq!(kbs[0].failed_jobs().count(), 0);
        assert_eq!(api.job_limits(), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_empty() {
        let api = FakeKnowledgeBases::failing();
        assert!(find_referencing_knowledge_bases(&api, WG, 5).await.is_empty());
    }
}
