use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::comparison::Comparison;
use crate::config::Config;
use crate::connectivity::{ConnectivityProbe, ConnectivityTest, PollPolicy, Sleeper, StatementApi, TokioSleeper};
use crate::iam_inventory::{inventory_permissions, IamApi, PermissionInventory};
use crate::knowledge_base::{find_referencing_knowledge_bases, KnowledgeBaseApi, ReferencingKnowledgeBase};
use crate::namespace::{extract_namespace_id, resolve_namespace, workgroups_for_namespace, NamespaceInfo, ServerlessApi, WorkgroupInfo};

pub const ISSUE_NAMESPACE_NOT_FOUND: &str = "Cannot retrieve namespace details";
pub const ISSUE_NO_WORKGROUPS: &str = "No workgroups found for this namespace";

/// Settings the orchestrator runs with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticSettings {
    pub region: String,
    pub account_id: String,
    pub candidate_databases: Vec<String>,
    pub role_name_filters: Vec<String>,
    pub poll_policy: PollPolicy,
    pub schema: String,
    pub sample_table_limit: u32,
    pub ingestion_job_limit: i32,
}

impl DiagnosticSettings {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            candidate_databases: vec!["dev".to_string(), "test".to_string(), "prod".to_string()],
            role_name_filters: vec!["bedrock".to_string(), "knowledge".to_string()],
            poll_policy: PollPolicy::default(),
            schema: "public".to_string(),
            sample_table_limit: 5,
            ingestion_job_limit: 5,
        }
    }

    /// Build the settings from the loaded configuration and a resolved account id
    pub fn from_config(config: &Config, account_id: impl Into<String>) -> Self {
        Self {
            region: config.aws.region.clone(),
            account_id: account_id.into(),
            candidate_databases: config.probe.candidate_databases.clone(),
            role_name_filters: config.iam.role_name_filters.clone(),
            poll_policy: PollPolicy::new(
                config.probe.max_attempts,
                Duration::from_millis(config.probe.poll_interval_ms),
            ),
            schema: config.probe.schema.clone(),
            sample_table_limit: config.probe.sample_table_limit,
            ingestion_job_limit: config.knowledge_base.ingestion_job_limit,
        }
    }

    /// Databases to try for a namespace, its own database first, without repeats
    pub fn databases_for(&self, namespace: &NamespaceInfo) -> Vec<String> {
        let mut databases: Vec<String> = Vec::new();
        let preferred = namespace.db_name.iter().filter(|db| !db.is_empty());

        for db in preferred.chain(self.candidate_databases.iter()) {
            if !databases.contains(db) {
                databases.push(db.clone());
            }
        }
        databases
    }

    /// ARN reported by the API, or the region/account/name form when absent
    pub fn workgroup_arn(&self, workgroup: &WorkgroupInfo) -> String {
        match &workgroup.workgroup_arn {
            Some(arn) if !arn.is_empty() => arn.clone(),
            _ => format!(
                "arn:aws:redshift-serverless:{}:{}:workgroup/{}",
                self.region, self.account_id, workgroup.workgroup_name
            ),
        }
    }
}

/// External services the orchestrator talks to
#[derive(Clone)]
pub struct DiagnosticClients {
    pub serverless: Arc<dyn ServerlessApi>,
    pub statements: Arc<dyn StatementApi>,
    pub iam: Arc<dyn IamApi>,
    pub knowledge_bases: Arc<dyn KnowledgeBaseApi>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl DiagnosticClients {
    pub fn new(
        serverless: Arc<dyn ServerlessApi>,
        statements: Arc<dyn StatementApi>,
        iam: Arc<dyn IamApi>,
        knowledge_bases: Arc<dyn KnowledgeBaseApi>,
    ) -> Self {
        Self {
            serverless,
            statements,
            iam,
            knowledge_bases,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}

/// Aggregated findings for one namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub namespace_arn: String,
    pub namespace_id: String,
    pub namespace_details: Option<NamespaceInfo>,
    pub workgroups: Vec<WorkgroupInfo>,
    pub connectivity_tests: Vec<ConnectivityTest>,
    pub iam_permissions: BTreeMap<String, PermissionInventory>,
    pub knowledge_bases: Vec<ReferencingKnowledgeBase>,
    pub issues_found: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Diagnosis {
    pub fn new(namespace_arn: &str) -> Self {
        Self {
            namespace_arn: namespace_arn.to_string(),
            namespace_id: extract_namespace_id(namespace_arn).to_string(),
            ..Self::default()
        }
    }

    /// The namespace lookup succeeded, so every metric below is a real count
    pub fn is_resolved(&self) -> bool {
        self.namespace_details.is_some()
    }

    pub fn has_connectivity(&self) -> bool {
        self.connectivity_tests.iter().any(|t| t.connectivity)
    }

    pub fn passed_tests(&self) -> usize {
        self.connectivity_tests.iter().filter(|t| t.connectivity).count()
    }

    pub fn total_tables(&self) -> u64 {
        self.connectivity_tests.iter().map(|t| t.tables_count).sum()
    }

    pub fn bedrock_role_count(&self) -> usize {
        self.iam_permissions.values().map(|p| p.bedrock_roles.len()).sum()
    }

    pub fn failed_ingestion_jobs(&self) -> usize {
        self.knowledge_bases.iter().map(|kb| kb.failed_jobs().count()).sum()
    }

    /// Populate issues and recommendations from the collected facts.
    /// `schema` is the schema the connectivity probe inspected.
    pub fn analyze_issues(&mut self, schema: &str) {
        let has_connection = self.has_connectivity();
        let has_tables = self
            .connectivity_tests
            .iter()
            .any(|t| t.connectivity && t.tables_count > 0);

        if !has_connection {
            self.add_finding(
                "No working database connections found",
                "Check if workgroups are running and databases exist",
            );
        }

        if !has_tables {
            self.add_finding(
                &format!("No tables found in {} schema", schema),
                &format!("Ensure your data is loaded into the {} schema", schema),
            );
        }

        if self.bedrock_role_count() == 0 {
            self.add_finding(
                "No Bedrock-related IAM roles found",
                "Create IAM roles for Bedrock Knowledge Base access",
            );
        }

        if self.knowledge_bases.is_empty() {
            self.add_finding(
                "No Knowledge Bases found using this workgroup",
                "Verify Knowledge Base configuration points to correct workgroup",
            );
        } else {
            let failed = self.failed_ingestion_jobs();
            if failed > 0 {
                self.add_finding(
                    &format!("Found {} failed ingestion jobs", failed),
                    "Check ingestion job failure reasons and fix underlying issues",
                );
            }
        }
    }

    fn add_finding(&mut self, issue: &str, recommendation: &str) {
        self.issues_found.push(issue.to_string());
        self.recommendations.push(recommendation.to_string());
    }
}

/// Runs the per-namespace diagnosis and the two-namespace comparison
pub struct RedshiftKbDiagnostic {
    clients: DiagnosticClients,
    settings: DiagnosticSettings,
}

impl RedshiftKbDiagnostic {
    pub fn new(clients: DiagnosticClients, settings: DiagnosticSettings) -> Self {
        info!("Initialized diagnostic tool for region: {}", settings.region);
        info!("Account ID: {}", settings.account_id);
        Self { clients, settings }
    }

    pub fn settings(&self) -> &DiagnosticSettings {
        &self.settings
    }

    /// Full diagnosis of one namespace
    pub async fn diagnose(&self, namespace_arn: &str) -> Diagnosis {
        let start_time = Instant::now();
        let mut diagnosis = Diagnosis::new(namespace_arn);
        info!("Diagnosing namespace: {}", diagnosis.namespace_id);

        let Some(namespace) = resolve_namespace(self.clients.serverless.as_ref(), &diagnosis.namespace_id).await else {
            diagnosis.issues_found.push(ISSUE_NAMESPACE_NOT_FOUND.to_string());
            return diagnosis;
        };

        let namespace_name = namespace
            .namespace_name
            .clone()
            .unwrap_or_else(|| diagnosis.namespace_id.clone());
        let databases = self.settings.databases_for(&namespace);
        diagnosis.namespace_details = Some(namespace);

        diagnosis.workgroups = workgroups_for_namespace(self.clients.serverless.as_ref(), &namespace_name).await;
        if diagnosis.workgroups.is_empty() {
            warn!("No workgroups found for namespace {}", namespace_name);
            diagnosis.issues_found.push(ISSUE_NO_WORKGROUPS.to_string());
            return diagnosis;
        }

        let probe = ConnectivityProbe::new(
            self.clients.statements.as_ref(),
            self.clients.sleeper.as_ref(),
            &self.settings.poll_policy,
        )
        .with_schema(&self.settings.schema)
        .with_sample_limit(self.settings.sample_table_limit);

        for workgroup in &diagnosis.workgroups {
            for db_name in &databases {
                let test = probe.probe(&workgroup.workgroup_name, db_name).await;
                let connected = test.connectivity;
                diagnosis.connectivity_tests.push(test);

                if connected {
                    break;
                }
            }
        }

        for workgroup in &diagnosis.workgroups {
            let wg_arn = self.settings.workgroup_arn(workgroup);

            let inventory =
                inventory_permissions(self.clients.iam.as_ref(), &wg_arn, &self.settings.role_name_filters).await;
            diagnosis.iam_permissions.insert(workgroup.workgroup_name.clone(), inventory);

            let kbs = find_referencing_knowledge_bases(
                self.clients.knowledge_bases.as_ref(),
                &wg_arn,
                self.settings.ingestion_job_limit,
            )
            .await;
            diagnosis.knowledge_bases.extend(kbs);
        }

        diagnosis.analyze_issues(&self.settings.schema);

        info!(
            "Diagnosis of {} finished in {} with {} issues",
            diagnosis.namespace_id,
            humantime::format_duration(Duration::from_secs(start_time.elapsed().as_secs())),
            diagnosis.issues_found.len()
        );
        diagnosis
    }

    /// Diagnose both namespaces, one after the other, and compare them
    pub async fn compare_namespaces(&self, working_arn: &str, broken_arn: &str) -> Comparison {
        info!("Starting namespace comparison...");
        let working = self.diagnose(working_arn).await;
        let broken = self.diagnose(broken_arn).await;
        Comparison::from_diagnoses(working, broken)
    }
}
