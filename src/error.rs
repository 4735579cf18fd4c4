use thiserror::Error;

/// Main error type for redshift-kb-doctor
///
/// Only failures that stop the whole run end up here. Per-call API failures are
/// logged and degraded to empty results by the diagnostic modules.
#[derive(Error, Debug, Clone)]
pub enum DoctorError {
    #[error("Configuration error: {0}")]
    Config(ConfigError),

    #[error("AWS error: {0}")]
    Aws(AwsError),

    #[error("Report error: {0}")]
    Report(ReportError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("Anyhow error: {0}")]
    Anyhow(String),
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid namespace ARN: {arn}")]
    InvalidArn { arn: String },
}

/// AWS-related errors
#[derive(Error, Debug, Clone)]
pub enum AwsError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Could not determine account id: {message}")]
    AccountLookupFailed { message: String },
}

/// Report output errors
#[derive(Error, Debug, Clone)]
pub enum ReportError {
    #[error("Failed to write report to {path}: {message}")]
    WriteFailed { path: String, message: String },
}

/// Result type alias for redshift-kb-doctor operations
pub type Result<T> = std::result::Result<T, DoctorError>;

impl From<ConfigError> for DoctorError {
    fn from(err: ConfigError) -> Self {
        DoctorError::Config(err)
    }
}

impl From<AwsError> for DoctorError {
    fn from(err: AwsError) -> Self {
        DoctorError::Aws(err)
    }
}

impl From<ReportError> for DoctorError {
    fn from(err: ReportError) -> Self {
        DoctorError::Report(err)
    }
}

impl From<std::io::Error> for DoctorError {
    fn from(err: std::io::Error) -> Self {
        DoctorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DoctorError {
    fn from(err: serde_json::Error) -> Self {
        DoctorError::Json(err.to_string())
    }
}

impl From<toml::de::Error> for DoctorError {
    fn from(err: toml::de::Error) -> Self {
        DoctorError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for DoctorError {
    fn from(err: toml::ser::Error) -> Self {
        DoctorError::Toml(err.to_string())
    }
}

impl From<anyhow::Error> for DoctorError {
    fn from(err: anyhow::Error) -> Self {
        DoctorError::Anyhow(err.to_string())
    }
}

impl DoctorError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DoctorError::Config(_) => ErrorSeverity::High,
            DoctorError::Aws(_) => ErrorSeverity::High,
            DoctorError::Report(_) => ErrorSeverity::Medium,
            DoctorError::Io(_) => ErrorSeverity::Medium,
            _ => ErrorSeverity::Low,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            DoctorError::Aws(AwsError::AuthenticationFailed { .. }) => {
                "AWS authentication failed. Check your AWS credentials or profile.".to_string()
            }
            DoctorError::Aws(AwsError::AccountLookupFailed { .. }) => {
                "Could not determine the AWS account id. Set aws.account_id in the config or check STS access.".to_string()
            }
            DoctorError::Config(ConfigError::InvalidArn { arn }) => {
                format!("'{}' does not look like a namespace ARN (expected .../namespace/<id>).", arn)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::High => "HIGH",
        }
    }
}
