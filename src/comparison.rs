use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diagnostic::Diagnosis;

/// Side-by-side result of diagnosing a working and a broken namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comparison {
    pub working_namespace: Diagnosis,
    pub broken_namespace: Diagnosis,
    pub key_differences: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Comparison {
    /// Apply the comparison rules. Each rule fires only when the working
    /// namespace strictly dominates the broken one on its metric.
    ///
    /// When either namespace could not be resolved its metrics are absent rather
    /// than zero, so no rule is applied.
    pub fn from_diagnoses(working: Diagnosis, broken: Diagnosis) -> Self {
        let mut comparison = Self {
            working_namespace: working,
            broken_namespace: broken,
            key_differences: Vec::new(),
            recommendations: Vec::new(),
        };

        if !comparison.working_namespace.is_resolved() || !comparison.broken_namespace.is_resolved() {
            warn!("Skipping namespace comparison: at least one namespace could not be resolved");
            return comparison;
        }

        comparison.compare_connectivity();
        comparison.compare_data_availability();
        comparison.compare_iam_setup();
        comparison.compare_knowledge_bases();

        info!("Comparison found {} key differences", comparison.key_differences.len());
        comparison
    }

    fn compare_connectivity(&mut self) {
        let working = self.working_namespace.has_connectivity();
        let broken = self.broken_namespace.has_connectivity();

        if working && !broken {
            self.add_difference(
                "Working namespace has database connectivity, broken namespace does not".to_string(),
                "Check if broken namespace workgroups are running and accessible",
            );
        }
    }

    fn compare_data_availability(&mut self) {
        let working = self.working_namespace.total_tables();
        let broken = self.broken_namespace.total_tables();

        if working > broken {
            self.add_difference(
                format!("Working namespace has {} tables, broken namespace has {}", working, none_or(broken)),
                "Load data into the broken namespace's public schema",
            );
        }
    }

    fn compare_iam_setup(&mut self) {
        let working = self.working_namespace.bedrock_role_count();
        let broken = self.broken_namespace.bedrock_role_count();

        if working > broken {
            self.add_difference(
                format!("Working namespace has {} Bedrock roles, broken has {}", working, broken),
                "Ensure broken namespace has proper IAM roles for Bedrock access",
            );
        }
    }

    fn compare_knowledge_bases(&mut self) {
        let working = self.working_namespace.knowledge_bases.len();
        let broken = self.broken_namespace.knowledge_bases.len();

        if working > broken {
            self.add_difference(
                format!("Working namespace has {} Knowledge Bases, broken has {}", working, none_or(broken as u64)),
                "Create Knowledge Base configuration for broken namespace",
            );
        }
    }

    fn add_difference(&mut self, difference: String, recommendation: &str) {
        self.key_differences.push(difference);
        self.recommendations.push(recommendation.to_string());
    }

    /// Comparison recommendations followed by the broken namespace's own,
    /// first occurrence wins
    pub fn merged_recommendations(&self) -> Vec<&str> {
        let mut merged: Vec<&str> = Vec::new();
        for rec in self.recommendations.iter().chain(self.broken_namespace.recommendations.iter()) {
            if !merged.contains(&rec.as_str()) {
                merged.push(rec);
            }
        }
        merged
    }
}

fn none_or(count: u64) -> String {
    if count == 0 {
        "none".to_string()
    } else {
        count.to_string()
    }
}
