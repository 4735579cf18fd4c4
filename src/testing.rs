//! In-memory stand-ins for the AWS-facing traits, shared by the unit tests.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::connectivity::{Cell, Sleeper, StatementApi, StatementStatus};
use crate::iam_inventory::{IamApi, RoleSummary};
use crate::knowledge_base::{IngestionJob, KnowledgeBaseApi, KnowledgeBaseDetail, KnowledgeBaseKind, QueryEngine, StorageKind};
use crate::namespace::{NamespaceInfo, ServerlessApi, WorkgroupInfo};

pub fn job(id: &str, data_source_id: &str, status: &str) -> IngestionJob {
    IngestionJob {
        ingestion_job_id: id.to_string(),
        data_source_id: data_source_id.to_string(),
        status: status.to_string(),
        started_at: None,
    }
}

pub fn serverless_kb(id: &str, workgroup_arn: Option<&str>) -> KnowledgeBaseDetail {
    KnowledgeBaseDetail {
        knowledge_base_id: id.to_string(),
        name: Some(format!("{}-name", id)),
        status: Some("ACTIVE".to_string()),
        kind: Some(KnowledgeBaseKind::Sql {
            query_engine: Some(QueryEngine::Serverless {
                workgroup_arn: workgroup_arn.map(str::to_string),
            }),
        }),
        storage: None,
    }
}

pub fn rds_kb(id: &str, resource_arn: &str) -> KnowledgeBaseDetail {
    KnowledgeBaseDetail {
        knowledge_base_id: id.to_string(),
        name: Some(format!("{}-name", id)),
        status: Some("ACTIVE".to_string()),
        kind: Some(KnowledgeBaseKind::Other("VECTOR".to_string())),
        storage: Some(StorageKind::Rds {
            resource_arn: Some(resource_arn.to_string()),
        }),
    }
}

#[derive(Default)]
pub struct FakeServerless {
    namespaces: Vec<NamespaceInfo>,
    workgroups: Vec<WorkgroupInfo>,
    fail: bool,
}

impl FakeServerless {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, id: &str, name: &str, db_name: Option<&str>) -> Self {
        self.namespaces.push(NamespaceInfo {
            namespace_id: Some(id.to_string()),
            namespace_name: Some(name.to_string()),
            namespace_arn: Some(format!("arn:aws:redshift-serverless:us-west-2:111122223333:namespace/{}", id)),
            db_name: db_name.map(str::to_string),
            status: Some("AVAILABLE".to_string()),
        });
        self
    }

    pub fn with_workgroup(mut self, workgroup_name: &str, namespace_name: &str) -> Self {
        self.workgroups.push(WorkgroupInfo {
            workgroup_name: workgroup_name.to_string(),
            workgroup_id: Some(format!("{}-id", workgroup_name)),
            workgroup_arn: None,
            namespace_name: Some(namespace_name.to_string()),
            status: Some("AVAILABLE".to_string()),
        });
        self
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail {
            Err(anyhow!("AccessDeniedException: not authorized"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ServerlessApi for FakeServerless {
    async fn get_namespace(&self, namespace_name: &str) -> anyhow::Result<Option<NamespaceInfo>> {
        self.check()?;
        self.namespaces
            .iter()
            .find(|ns| ns.namespace_name.as_deref() == Some(namespace_name))
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow!("ResourceNotFoundException: namespace {} not found", namespace_name))
    }

    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceInfo>> {
        self.check()?;
        Ok(self.namespaces.clone())
    }

    async fn list_workgroups(&self) -> anyhow::Result<Vec<WorkgroupInfo>> {
        self.check()?;
        Ok(self.workgroups.clone())
    }

    async fn get_workgroup(&self, workgroup_name: &str) -> anyhow::Result<Option<WorkgroupInfo>> {
        self.check()?;
        Ok(self.workgroups.iter().find(|w| w.workgroup_name == workgroup_name).cloned())
    }
}

enum StatementMode {
    Healthy,
    FailIdentity(String),
    FailCount(String),
    FailSample(String),
    HangCount,
    HangSample,
    IdentityStatus(String),
    NeverFinishing,
    Unreachable(String),
}

/// Routes statements by their SQL text and answers describe calls accordingly
pub struct FakeStatements {
    mode: StatementMode,
    table_count: i64,
    tables: Vec<String>,
    failing_databases: Vec<String>,
    submitted: Mutex<HashMap<String, (String, String)>>,
    executed: Mutex<Vec<String>>,
    describe_calls: AtomicU32,
}

impl FakeStatements {
    fn with_mode(mode: StatementMode) -> Self {
        Self {
            mode,
            table_count: 0,
            tables: Vec::new(),
            failing_databases: Vec::new(),
            submitted: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            describe_calls: AtomicU32::new(0),
        }
    }

    pub fn healthy(table_count: i64, tables: &[&str]) -> Self {
        let mut fake = Self::with_mode(StatementMode::Healthy);
        fake.table_count = table_count;
        fake.tables = tables.iter().map(|t| t.to_string()).collect();
        fake
    }

    pub fn failing_identity(message: &str) -> Self {
        Self::with_mode(StatementMode::FailIdentity(message.to_string()))
    }

    pub fn failing_count(message: &str) -> Self {
        Self::with_mode(StatementMode::FailCount(message.to_string()))
    }

    pub fn failing_sample(table_count: i64, message: &str) -> Self {
        let mut fake = Self::with_mode(StatementMode::FailSample(message.to_string()));
        fake.table_count = table_count;
        fake
    }

    /// Table count never leaves STARTED
    pub fn hanging_count() -> Self {
        Self::with_mode(StatementMode::HangCount)
    }

    /// Table name sample never leaves STARTED
    pub fn hanging_sample(table_count: i64) -> Self {
        let mut fake = Self::with_mode(StatementMode::HangSample);
        fake.table_count = table_count;
        fake
    }

    /// Identity query reports `status` verbatim; later stages finish with no tables
    pub fn identity_status(status: &str) -> Self {
        Self::with_mode(StatementMode::IdentityStatus(status.to_string()))
    }

    pub fn never_finishing() -> Self {
        Self::with_mode(StatementMode::NeverFinishing)
    }

    pub fn unreachable(message: &str) -> Self {
        Self::with_mode(StatementMode::Unreachable(message.to_string()))
    }

    /// Identity queries against these databases end in FAILED
    pub fn with_failing_databases(mut self, databases: &[&str]) -> Self {
        self.failing_databases = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn describe_calls(&self) -> u32 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, statement_id: &str) -> anyhow::Result<(String, String)> {
        self.submitted
            .lock()
            .unwrap()
            .get(statement_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown statement {}", statement_id))
    }
}

fn is_identity(sql: &str) -> bool {
    sql.contains("current_database")
}

fn is_count(sql: &str) -> bool {
    sql.contains("COUNT(*)")
}

fn is_sample(sql: &str) -> bool {
    sql.contains("SELECT table_name")
}

fn finished(status: &str, error: Option<String>) -> StatementStatus {
    StatementStatus {
        status: status.to_string(),
        error,
    }
}

#[async_trait]
impl StatementApi for FakeStatements {
    async fn execute_statement(&self, _workgroup_name: &str, database: &str, sql: &str) -> anyhow::Result<String> {
        if let StatementMode::Unreachable(message) = &self.mode {
            return Err(anyhow!("{}", message));
        }

        let mut executed = self.executed.lock().unwrap();
        executed.push(sql.to_string());
        let id = format!("stmt-{}", executed.len());
        self.submitted
            .lock()
            .unwrap()
            .insert(id.clone(), (database.to_string(), sql.to_string()));
        Ok(id)
    }

    async fn describe_statement(&self, statement_id: &str) -> anyhow::Result<StatementStatus> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);

        if let StatementMode::NeverFinishing = self.mode {
            return Ok(finished("STARTED", None));
        }

        let (database, sql) = self.lookup(statement_id)?;

        if is_identity(&sql) && self.failing_databases.contains(&database) {
            return Ok(finished("FAILED", Some(format!("database \"{}\" does not exist", database))));
        }

        let status = match &self.mode {
            StatementMode::FailIdentity(message) if is_identity(&sql) => finished("FAILED", Some(message.clone())),
            StatementMode::FailCount(message) if is_count(&sql) => finished("FAILED", Some(message.clone())),
            StatementMode::FailSample(message) if is_sample(&sql) => finished("FAILED", Some(message.clone())),
            StatementMode::HangCount if is_count(&sql) => finished("STARTED", None),
            StatementMode::HangSample if is_sample(&sql) => finished("STARTED", None),
            StatementMode::IdentityStatus(status) if is_identity(&sql) => {
                finished(status, Some("Query was cancelled by user".to_string()))
            }
            _ => finished("FINISHED", None),
        };
        Ok(status)
    }

    async fn get_statement_result(&self, statement_id: &str) -> anyhow::Result<Vec<Vec<Cell>>> {
        let (database, sql) = self.lookup(statement_id)?;

        if is_count(&sql) {
            return Ok(vec![vec![Cell::Long(self.table_count)]]);
        }
        if is_sample(&sql) {
            return Ok(self.tables.iter().map(|t| vec![Cell::Text(t.clone())]).collect());
        }
        Ok(vec![vec![Cell::Text(database), Cell::Text("admin".to_string())]])
    }
}

/// Records requested waits without sleeping
#[derive(Default)]
pub struct InstantSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn ticks(&self) -> usize {
        self.waits.lock().unwrap().len()
    }

    pub fn total(&self) -> Duration {
        self.waits.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct FakeIam {
    roles: Vec<(RoleSummary, Vec<String>, Vec<String>)>,
    fail: bool,
}

impl FakeIam {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role_name: &str, attached: &[&str], inline: &[&str]) -> Self {
        self.roles.push((
            RoleSummary {
                role_name: role_name.to_string(),
                role_arn: format!("arn:aws:iam::111122223333:role/{}", role_name),
            },
            attached.iter().map(|p| p.to_string()).collect(),
            inline.iter().map(|p| p.to_string()).collect(),
        ));
        self
    }

    fn role(&self, role_name: &str) -> anyhow::Result<&(RoleSummary, Vec<String>, Vec<String>)> {
        self.roles
            .iter()
            .find(|(r, _, _)| r.role_name == role_name)
            .ok_or_else(|| anyhow!("NoSuchEntity: role {}", role_name))
    }
}

#[async_trait]
impl IamApi for FakeIam {
    async fn list_roles(&self) -> anyhow::Result<Vec<RoleSummary>> {
        if self.fail {
            return Err(anyhow!("AccessDenied: iam:ListRoles"));
        }
        Ok(self.roles.iter().map(|(r, _, _)| r.clone()).collect())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.role(role_name)?.1.clone())
    }

    async fn list_role_policies(&self, role_name: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.role(role_name)?.2.clone())
    }
}

#[derive(Default)]
pub struct FakeKnowledgeBases {
    knowledge_bases: Vec<(KnowledgeBaseDetail, Vec<(String, Vec<IngestionJob>)>)>,
    fail: bool,
    unreadable: Vec<String>,
    failing_job_sources: Vec<String>,
    job_limits: Mutex<Vec<i32>>,
}

impl FakeKnowledgeBases {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_knowledge_base(mut self, detail: KnowledgeBaseDetail, data_sources: Vec<(&str, Vec<IngestionJob>)>) -> Self {
        let data_sources = data_sources
            .into_iter()
            .map(|(id, jobs)| (id.to_string(), jobs))
            .collect();
        self.knowledge_bases.push((detail, data_sources));
        self
    }

    /// GetKnowledgeBase errors for this id
    pub fn with_unreadable(mut self, knowledge_base_id: &str) -> Self {
        self.unreadable.push(knowledge_base_id.to_string());
        self
    }

    /// ListIngestionJobs errors for this data source
    pub fn with_failing_jobs(mut self, data_source_id: &str) -> Self {
        self.failing_job_sources.push(data_source_id.to_string());
        self
    }

    /// `max_results` of every ingestion job listing, in call order
    pub fn job_limits(&self) -> Vec<i32> {
        self.job_limits.lock().unwrap().clone()
    }

    fn entry(&self, knowledge_base_id: &str) -> Option<&(KnowledgeBaseDetail, Vec<(String, Vec<IngestionJob>)>)> {
        self.knowledge_bases
            .iter()
            .find(|(kb, _)| kb.knowledge_base_id == knowledge_base_id)
    }
}

#[async_trait]
impl KnowledgeBaseApi for FakeKnowledgeBases {
    async fn list_knowledge_bases(&self) -> anyhow::Result<Vec<String>> {
        if self.fail {
            return Err(anyhow!("AccessDeniedException: bedrock:ListKnowledgeBases"));
        }
        Ok(self.knowledge_bases.iter().map(|(kb, _)| kb.knowledge_base_id.clone()).collect())
    }

    async fn get_knowledge_base(&self, knowledge_base_id: &str) -> anyhow::Result<Option<KnowledgeBaseDetail>> {
        if self.unreadable.iter().any(|id| id == knowledge_base_id) {
            return Err(anyhow!("AccessDeniedException: bedrock:GetKnowledgeBase on {}", knowledge_base_id));
        }
        Ok(self.entry(knowledge_base_id).map(|(kb, _)| kb.clone()))
    }

    async fn list_data_sources(&self, knowledge_base_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .entry(knowledge_base_id)
            .map(|(_, sources)| sources.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_ingestion_jobs(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        max_results: i32,
    ) -> anyhow::Result<Vec<IngestionJob>> {
        self.job_limits.lock().unwrap().push(max_results);
        if self.failing_job_sources.iter().any(|id| id == data_source_id) {
            return Err(anyhow!("ThrottlingException: rate exceeded for {}", data_source_id));
        }
        let jobs = self
            .entry(knowledge_base_id)
            .and_then(|(_, sources)| sources.iter().find(|(id, _)| id == data_source_id))
            .map(|(_, jobs)| jobs.iter().take(max_results.max(0) as usize).cloned().collect())
            .unwrap_or_default();
        Ok(jobs)
    }
}
