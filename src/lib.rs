//! Diagnose why a Bedrock Knowledge Base ingests from one Redshift Serverless
//! namespace and not from another.

pub mod aws;
pub mod comparison;
pub mod config;
pub mod connectivity;
pub mod diagnostic;
pub mod error;
pub mod iam_inventory;
pub mod knowledge_base;
pub mod logging;
pub mod namespace;
pub mod report_manager;

#[cfg(test)]
pub(crate) mod testing;

pub use comparison::Comparison;
pub use config::Config;
pub use diagnostic::{Diagnosis, DiagnosticClients, DiagnosticSettings, RedshiftKbDiagnostic};
pub use error::{DoctorError, Result};
