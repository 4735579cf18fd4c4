use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{ConfigError, Result};
use crate::logging::LoggingConfig;
use crate::report_manager::ReportManagerConfig;

const ENV_PREFIX: &str = "REDSHIFT_KB_DOCTOR";

/// Main configuration structure for redshift-kb-doctor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AWS configuration
    pub aws: AwsConfig,

    /// Namespaces to compare
    pub targets: TargetsConfig,

    /// Connectivity probe configuration
    pub probe: ProbeConfig,

    /// IAM inventory configuration
    pub iam: IamConfig,

    /// Knowledge base lookup configuration
    pub knowledge_base: KnowledgeBaseConfig,

    /// Report output configuration
    pub report: ReportManagerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// AWS region of the namespaces
    pub region: String,

    /// AWS profile
    pub profile: Option<String>,

    /// Account id used to build workgroup ARNs; looked up through STS when unset
    pub account_id: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            profile: None,
            account_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Namespace whose Knowledge Base ingestion works
    pub working_namespace_arn: String,

    /// Namespace whose Knowledge Base ingestion fails
    pub broken_namespace_arn: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            working_namespace_arn:
                "arn:aws:redshift-serverless:us-west-2:533267284022:namespace/9e7060fb-2754-41e4-8274-d50d95cbca1e"
                    .to_string(),
            broken_namespace_arn:
                "arn:aws:redshift-serverless:us-west-2:533267284022:namespace/6e551b08-89e7-44e2-858f-8a445171f5b3"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Databases tried after the namespace's own database
    pub candidate_databases: Vec<String>,

    /// Status checks per statement before giving up
    pub max_attempts: u32,

    /// Delay between status checks in milliseconds
    pub poll_interval_ms: u64,

    /// Schema whose tables are counted
    pub schema: String,

    /// Number of table names sampled
    pub sample_table_limit: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            candidate_databases: vec!["dev".to_string(), "test".to_string(), "prod".to_string()],
            max_attempts: 30,
            poll_interval_ms: 1000,
            schema: "public".to_string(),
            sample_table_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    /// Case-insensitive substrings that mark a role as Bedrock-related
    pub role_name_filters: Vec<String>,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            role_name_filters: vec!["bedrock".to_string(), "knowledge".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Ingestion jobs fetched per data source
    pub ingestion_job_limit: i32,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self { ingestion_job_limit: 5 }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| invalid(&format!("{}_{}", ENV_PREFIX, name), format!("cannot parse '{}'", value)).into())
}

impl Config {
    /// Load configuration from file (defaults when the file is absent), then apply
    /// environment overrides. Validation is left to the caller so command-line
    /// overrides can still correct loaded values.
    pub async fn load(config_path: Option<&str>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => PathBuf::from(path),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            Self::from_file(&config_file).await?
        } else {
            if config_path.is_some() {
                tracing::warn!("Config file {:?} not found, using defaults", config_file);
            }
            Self::default()
        };

        config.apply_env_overrides()?;

        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(region) = env_var("AWS_REGION") {
            self.aws.region = region;
        }

        if let Some(profile) = env_var("AWS_PROFILE") {
            self.aws.profile = Some(profile);
        }

        if let Some(account_id) = env_var("ACCOUNT_ID") {
            self.aws.account_id = Some(account_id);
        }

        if let Some(arn) = env_var("WORKING_ARN") {
            self.targets.working_namespace_arn = arn;
        }

        if let Some(arn) = env_var("BROKEN_ARN") {
            self.targets.broken_namespace_arn = arn;
        }

        if let Some(value) = env_var("MAX_ATTEMPTS") {
            self.probe.max_attempts = parse_env("MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = env_var("POLL_INTERVAL_MS") {
            self.probe.poll_interval_ms = parse_env("POLL_INTERVAL_MS", &value)?;
        }

        if let Some(level) = env_var("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Some(dir) = env_var("OUTPUT_DIR") {
            self.report.output_directory = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        fs::write(config_path, content).await?;
        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or_else(|| invalid("config_path", "could not determine config directory"))?;

        Ok(config_dir.join("redshift-kb-doctor").join("config.json"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.aws.region.trim().is_empty() {
            return Err(invalid("aws.region", "must not be empty").into());
        }

        for arn in [&self.targets.working_namespace_arn, &self.targets.broken_namespace_arn] {
            validate_namespace_arn(arn)?;
        }

        if self.targets.working_namespace_arn == self.targets.broken_namespace_arn {
            tracing::warn!("Working and broken namespace ARNs are identical");
        }

        if self.probe.max_attempts == 0 {
            return Err(invalid("probe.max_attempts", "must be greater than 0").into());
        }

        if self.probe.poll_interval_ms == 0 {
            return Err(invalid("probe.poll_interval_ms", "must be greater than 0").into());
        }

        if u64::from(self.probe.max_attempts) * self.probe.poll_interval_ms > 300_000 {
            tracing::warn!(
                "Each statement may wait up to {}s before timing out",
                u64::from(self.probe.max_attempts) * self.probe.poll_interval_ms / 1000
            );
        }

        if self.probe.schema.trim().is_empty() || self.probe.schema.contains('\'') {
            return Err(invalid("probe.schema", "must be a plain schema name").into());
        }

        if self.iam.role_name_filters.iter().all(|f| f.trim().is_empty()) {
            return Err(invalid("iam.role_name_filters", "at least one non-empty filter is required").into());
        }

        if !(1..=100).contains(&self.knowledge_base.ingestion_job_limit) {
            return Err(invalid("knowledge_base.ingestion_job_limit", "must be between 1 and 100").into());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging.level",
                format!("'{}' must be one of: {}", self.logging.level, valid_levels.join(", ")),
            )
            .into());
        }

        Ok(())
    }

    /// Print configuration summary for debugging
    pub fn print_summary(&self) {
        tracing::info!("Configuration Summary:");
        tracing::info!("  AWS Region: {}", self.aws.region);
        tracing::info!("  AWS Profile: {:?}", self.aws.profile);
        tracing::info!("  Working namespace: {}", self.targets.working_namespace_arn);
        tracing::info!("  Broken namespace: {}", self.targets.broken_namespace_arn);
        tracing::info!("  Poll: {} x {}ms", self.probe.max_attempts, self.probe.poll_interval_ms);
        tracing::info!("  Log Level: {}", self.logging.level);
    }

    /// Get list of all supported environment variables
    pub fn get_env_variables_help() -> Vec<(&'static str, &'static str)> {
        vec![
            ("REDSHIFT_KB_DOCTOR_AWS_REGION", "AWS region of the namespaces"),
            ("REDSHIFT_KB_DOCTOR_AWS_PROFILE", "AWS profile to use"),
            ("REDSHIFT_KB_DOCTOR_ACCOUNT_ID", "Account id used to build workgroup ARNs"),
            ("REDSHIFT_KB_DOCTOR_WORKING_ARN", "ARN of the namespace that works"),
            ("REDSHIFT_KB_DOCTOR_BROKEN_ARN", "ARN of the namespace that fails"),
            ("REDSHIFT_KB_DOCTOR_MAX_ATTEMPTS", "Status checks per statement"),
            ("REDSHIFT_KB_DOCTOR_POLL_INTERVAL_MS", "Delay between status checks (ms)"),
            ("REDSHIFT_KB_DOCTOR_LOG_LEVEL", "Log level (trace/debug/info/warn/error)"),
            ("REDSHIFT_KB_DOCTOR_OUTPUT_DIR", "Directory for report files"),
        ]
    }
}

/// A namespace ARN must carry a non-empty last `/` segment
pub fn validate_namespace_arn(arn: &str) -> Result<()> {
    match arn.rsplit_once('/') {
        Some((prefix, id)) if !prefix.is_empty() && !id.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidArn { arn: arn.to_string() }.into()),
    }
}
