use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

const IDENTITY_QUERY: &str = "SELECT current_database(), current_user;";

/// A single typed cell from a Data API result row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Long(i64),
    Double(f64),
    Text(String),
    Bool(bool),
    Null,
    Other,
}

impl Cell {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Cell::Long(v) => Some((*v).max(0) as u64),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Status snapshot returned by a describe call
#[derive(Debug, Clone, PartialEq)]
pub struct StatementStatus {
    pub status: String,
    pub error: Option<String>,
}

/// Redshift Data API calls used by the connectivity probe
#[async_trait]
pub trait StatementApi: Send + Sync {
    /// Submit a statement; returns the statement id
    async fn execute_statement(&self, workgroup_name: &str, database: &str, sql: &str) -> anyhow::Result<String>;

    async fn describe_statement(&self, statement_id: &str) -> anyhow::Result<StatementStatus>;

    async fn get_statement_result(&self, statement_id: &str) -> anyhow::Result<Vec<Vec<Cell>>>;
}

/// Wait primitive for the polling loop
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded, fixed-interval polling policy for submitted statements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub success_statuses: Vec<String>,
    pub failure_statuses: Vec<String>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
            success_statuses: vec!["FINISHED".to_string()],
            failure_statuses: vec!["FAILED".to_string(), "ABORTED".to_string()],
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Self::default()
        }
    }

    fn is_success(&self, status: &str) -> bool {
        self.success_statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
    }

    fn is_failure(&self, status: &str) -> bool {
        self.failure_statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
    }
}

/// Expected, recoverable outcomes of running a statement
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    #[error("Statement failed: {0}")]
    Failed(String),

    #[error("Statement timeout after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("{0}")]
    Api(String),
}

impl StatementError {
    fn api(err: anyhow::Error) -> Self {
        StatementError::Api(format!("{:#}", err))
    }
}

/// Result of probing one workgroup/database pair
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectivityTest {
    pub workgroup_name: String,
    pub database_name: String,
    pub connectivity: bool,
    pub error: Option<String>,
    pub tables_count: u64,
    pub schemas: Vec<String>,
    pub sample_tables: Vec<String>,
}

impl ConnectivityTest {
    fn new(workgroup_name: &str, database_name: &str) -> Self {
        Self {
            workgroup_name: workgroup_name.to_string(),
            database_name: database_name.to_string(),
            ..Self::default()
        }
    }
}

/// Submit-then-poll connectivity probe against the Redshift Data API
pub struct ConnectivityProbe<'a> {
    api: &'a dyn StatementApi,
    sleeper: &'a dyn Sleeper,
    policy: &'a PollPolicy,
    schema: &'a str,
    sample_limit: u32,
}

impl<'a> ConnectivityProbe<'a> {
    pub fn new(api: &'a dyn StatementApi, sleeper: &'a dyn Sleeper, policy: &'a PollPolicy) -> Self {
        Self {
            api,
            sleeper,
            policy,
            schema: "public",
            sample_limit: 5,
        }
    }

    pub fn with_schema(mut self, schema: &'a str) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_sample_limit(mut self, sample_limit: u32) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    /// Probe a workgroup/database pair. Never fails: every problem ends up in
    /// the returned record's `error` field.
    pub async fn probe(&self, workgroup_name: &str, database_name: &str) -> ConnectivityTest {
        let mut test = ConnectivityTest::new(workgroup_name, database_name);
        info!("Testing connectivity to workgroup: {}, database: {}", workgroup_name, database_name);

        let statement_id = match self.api.execute_statement(workgroup_name, database_name, IDENTITY_QUERY).await {
            Ok(id) => id,
            Err(e) => {
                error!("Database connectivity test failed: {:#}", e);
                test.error = Some(format!("{:#}", e));
                return test;
            }
        };

        match self.wait_for_statement(&statement_id).await {
            Ok(()) => test.connectivity = true,
            Err(StatementError::Failed(reason)) => {
                test.error = Some(reason);
                return test;
            }
            Err(e) => {
                error!("Database connectivity test failed: {}", e);
                test.error = Some(e.to_string());
                return test;
            }
        }

        if let Err(e) = self.inspect_schema(&mut test).await {
            error!("Error getting schema info: {}", e);
            test.error = Some(e.to_string());
        }

        test
    }

    async fn inspect_schema(&self, test: &mut ConnectivityTest) -> Result<(), StatementError> {
        let count_sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '{}';",
            self.schema
        );
        let rows = self.run_query(&test.workgroup_name, &test.database_name, &count_sql).await?;
        test.schemas.push(self.schema.to_string());

        if let Some(count) = rows.first().and_then(|row| row.first()).and_then(Cell::as_count) {
            test.tables_count = count;
        }

        if test.tables_count > 0 {
            let sample_sql = format!(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = '{}' LIMIT {};",
                self.schema, self.sample_limit
            );
            let rows = self.run_query(&test.workgroup_name, &test.database_name, &sample_sql).await?;
            test.sample_tables = rows
                .iter()
                .filter_map(|row| row.first().and_then(Cell::as_text).map(str::to_string))
                .collect();
        }

        Ok(())
    }

    async fn run_query(&self, workgroup_name: &str, database_name: &str, sql: &str) -> Result<Vec<Vec<Cell>>, StatementError> {
        let statement_id = self
            .api
            .execute_statement(workgroup_name, database_name, sql)
            .await
            .map_err(StatementError::api)?;

        self.wait_for_statement(&statement_id).await?;

        self.api
            .get_statement_result(&statement_id)
            .await
            .map_err(StatementError::api)
    }

    /// Poll until the statement reaches a terminal status or the policy runs out
    pub async fn wait_for_statement(&self, statement_id: &str) -> Result<(), StatementError> {
        for attempt in 1..=self.policy.max_attempts {
            let status = self
                .api
                .describe_statement(statement_id)
                .await
                .map_err(StatementError::api)?;
            debug!("Statement {} status {} (attempt {}/{})", statement_id, status.status, attempt, self.policy.max_attempts);

            if self.policy.is_success(&status.status) {
                return Ok(());
            }
            if self.policy.is_failure(&status.status) {
                return Err(StatementError::Failed(
                    status.error.unwrap_or_else(|| "Unknown error".to_string()),
                ));
            }

            self.sleeper.sleep(self.policy.interval).await;
        }

        Err(StatementError::Timeout {
            attempts: self.policy.max_attempts,
        })
    }
}
