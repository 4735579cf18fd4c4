use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::comparison::Comparison;
use crate::diagnostic::Diagnosis;
use crate::error::{ReportError, Result};

const WIDE_RULE: usize = 80;
const NARROW_RULE: usize = 40;

/// Machine-readable projection of a comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub working_issues: Vec<String>,
    pub broken_issues: Vec<String>,
    pub key_differences: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ReportSummary {
    pub fn from_comparison(comparison: &Comparison) -> Self {
        Self {
            working_issues: comparison.working_namespace.issues_found.clone(),
            broken_issues: comparison.broken_namespace.issues_found.clone(),
            key_differences: comparison.key_differences.clone(),
            recommendations: comparison.recommendations.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Full comparison as written to the optional JSON report file
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport<'a> {
    pub report_id: String,
    pub generated_at: DateTime<Local>,
    pub summary: ReportSummary,
    pub comparison: &'a Comparison,
}

/// Render the plain-text comparison report
pub fn render_report(comparison: &Comparison, generated_at: DateTime<Local>) -> String {
    let mut report: Vec<String> = Vec::new();
    report.push("=".repeat(WIDE_RULE));
    report.push("REDSHIFT SERVERLESS KNOWLEDGE BASE DIAGNOSTIC REPORT".to_string());
    report.push("=".repeat(WIDE_RULE));
    report.push(format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")));
    report.push(String::new());

    push_namespace_summary(&mut report, "WORKING NAMESPACE ANALYSIS", &comparison.working_namespace);
    push_namespace_summary(&mut report, "BROKEN NAMESPACE ANALYSIS", &comparison.broken_namespace);

    push_bullets(&mut report, "KEY DIFFERENCES", comparison.key_differences.iter().map(String::as_str));
    push_bullets(
        &mut report,
        "ISSUES FOUND IN BROKEN NAMESPACE",
        comparison.broken_namespace.issues_found.iter().map(String::as_str),
    );
    push_bullets(&mut report, "RECOMMENDATIONS", comparison.merged_recommendations().into_iter());

    report.push("DETAILED CONNECTIVITY RESULTS".to_string());
    report.push("-".repeat(NARROW_RULE));
    for (label, diagnosis) in [("Working", &comparison.working_namespace), ("Broken", &comparison.broken_namespace)] {
        report.push(format!("\n{} Namespace:", label));
        push_connectivity_details(&mut report, diagnosis);
    }

    report.push(String::new());
    report.push("=".repeat(WIDE_RULE));

    report.join("\n")
}

/// Render the plain-text report for a single namespace
pub fn render_diagnosis(diagnosis: &Diagnosis, generated_at: DateTime<Local>) -> String {
    let mut report: Vec<String> = Vec::new();
    report.push("=".repeat(WIDE_RULE));
    report.push("REDSHIFT SERVERLESS NAMESPACE DIAGNOSIS".to_string());
    report.push("=".repeat(WIDE_RULE));
    report.push(format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")));
    report.push(String::new());

    push_namespace_summary(&mut report, "NAMESPACE ANALYSIS", diagnosis);
    push_bullets(&mut report, "ISSUES FOUND", diagnosis.issues_found.iter().map(String::as_str));
    push_bullets(&mut report, "RECOMMENDATIONS", diagnosis.recommendations.iter().map(String::as_str));

    report.push("DETAILED CONNECTIVITY RESULTS".to_string());
    report.push("-".repeat(NARROW_RULE));
    push_connectivity_details(&mut report, diagnosis);

    report.push(String::new());
    report.push("=".repeat(WIDE_RULE));

    report.join("\n")
}

fn push_namespace_summary(report: &mut Vec<String>, title: &str, diagnosis: &Diagnosis) {
    report.push(title.to_string());
    report.push("-".repeat(NARROW_RULE));
    report.push(format!("ARN: {}", diagnosis.namespace_arn));
    report.push(format!("Workgroups: {}", diagnosis.workgroups.len()));
    report.push(format!(
        "Connectivity Tests: {}/{} passed",
        diagnosis.passed_tests(),
        diagnosis.connectivity_tests.len()
    ));
    report.push(format!("Total Tables: {}", diagnosis.total_tables()));
    report.push(format!("Knowledge Bases: {}", diagnosis.knowledge_bases.len()));
    report.push(String::new());
}

fn push_bullets<'a>(report: &mut Vec<String>, title: &str, items: impl Iterator<Item = &'a str>) {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        return;
    }

    report.push(title.to_string());
    report.push("-".repeat(NARROW_RULE));
    for item in items {
        report.push(format!("• {}", item));
    }
    report.push(String::new());
}

fn push_connectivity_details(report: &mut Vec<String>, diagnosis: &Diagnosis) {
    for test in &diagnosis.connectivity_tests {
        let status = if test.connectivity { "✓" } else { "✗" };
        report.push(format!("  {} {}/{}", status, test.workgroup_name, test.database_name));

        if let Some(error) = &test.error {
            report.push(format!("    Error: {}", error));
        }
        if test.tables_count > 0 {
            report.push(format!("    Tables: {}", test.tables_count));
            if !test.sample_tables.is_empty() {
                report.push(format!("    Sample: {}", test.sample_tables.join(", ")));
            }
        }
    }
}

/// Report manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportManagerConfig {
    pub output_directory: PathBuf,
    pub file_prefix: String,
    pub save_json: bool,
}

impl Default for ReportManagerConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            file_prefix: "redshift_kb_diagnostic_report".to_string(),
            save_json: false,
        }
    }
}

/// Writes rendered reports to timestamped files
pub struct ReportManager {
    config: ReportManagerConfig,
}

impl ReportManager {
    pub fn new() -> Self {
        Self {
            config: ReportManagerConfig::default(),
        }
    }

    pub fn with_config(config: ReportManagerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportManagerConfig {
        &self.config
    }

    /// `<prefix>_<YYYYmmdd_HHMMSS>.<extension>`
    pub fn generate_filename(&self, generated_at: DateTime<Local>, extension: &str) -> String {
        format!(
            "{}_{}.{}",
            self.config.file_prefix,
            generated_at.format("%Y%m%d_%H%M%S"),
            extension
        )
    }

    /// Save the text report; returns the written path
    pub async fn save_text(&self, report: &str, generated_at: DateTime<Local>) -> Result<PathBuf> {
        let path = self.config.output_directory.join(self.generate_filename(generated_at, "txt"));
        self.write(&path, report).await?;
        Ok(path)
    }

    /// Save the full comparison as JSON when enabled; returns the written path
    pub async fn save_json(&self, comparison: &Comparison, generated_at: DateTime<Local>) -> Result<Option<PathBuf>> {
        if !self.config.save_json {
            return Ok(None);
        }

        let report = ComparisonReport {
            report_id: Uuid::new_v4().to_string(),
            generated_at,
            summary: ReportSummary::from_comparison(comparison),
            comparison,
        };
        debug!("Generated report with ID: {}", report.report_id);

        let content = serde_json::to_string_pretty(&report)?;
        let path = self.config.output_directory.join(self.generate_filename(generated_at, "json"));
        self.write(&path, &content).await?;
        Ok(Some(path))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        let to_report_error = |e: std::io::Error| ReportError::WriteFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        fs::create_dir_all(&self.config.output_directory)
            .await
            .map_err(to_report_error)?;
        fs::write(path, content).await.map_err(to_report_error)?;

        info!("Report saved to: {}", path.display());
        Ok(())
    }
}

impl Default for ReportManager {
    fn default() -> Self {
        Self::new()
    }
}
