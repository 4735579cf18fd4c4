use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use redshift_kb_doctor::aws::AwsManager;
use redshift_kb_doctor::config::{validate_namespace_arn, Config};
use redshift_kb_doctor::logging::{init_logging, log_error};
use redshift_kb_doctor::report_manager::{render_diagnosis, render_report, ReportManager, ReportSummary};
use redshift_kb_doctor::{DiagnosticClients, DiagnosticSettings, DoctorError, RedshiftKbDiagnostic};

#[derive(Parser)]
#[command(name = "redshift-kb-doctor")]
#[command(about = "Compare a working and a broken Redshift Serverless namespace for Bedrock Knowledge Base ingestion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// ARN of the namespace whose Knowledge Base ingestion works
    #[arg(long, global = true)]
    working: Option<String>,

    /// ARN of the namespace whose Knowledge Base ingestion fails
    #[arg(long, global = true)]
    broken: Option<String>,

    /// AWS region
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// AWS profile
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory for report files
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Print only the JSON summary on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose both namespaces and compare them (default)
    Compare,

    /// Diagnose a single namespace
    Diagnose {
        /// Namespace ARN
        arn: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Validate current configuration
    Validate,

    /// Generate example configuration file
    Generate {
        /// Output file path (defaults to standard config directory)
        #[arg(long)]
        output: Option<String>,

        /// Configuration format (json, toml)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Show environment variable help
    EnvHelp,
}

impl Cli {
    /// Flags win over the config file and the environment
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(arn) = &self.working {
            config.targets.working_namespace_arn = arn.clone();
        }
        if let Some(arn) = &self.broken {
            config.targets.broken_namespace_arn = arn.clone();
        }
        if let Some(region) = &self.region {
            config.aws.region = region.clone();
        }
        if let Some(profile) = &self.profile {
            config.aws.profile = Some(profile.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_directory = dir.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let _log_guard = init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting redshift-kb-doctor v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        None | Some(Commands::Compare) => handle_compare(&config, cli.json).await,
        Some(Commands::Diagnose { ref arn }) => handle_diagnose(&config, arn, cli.json).await,
        Some(Commands::Config { ref action }) => handle_config(action, &config).await,
    };

    if let Err(e) = &result {
        match e.downcast_ref::<DoctorError>() {
            Some(doctor_error) => {
                log_error(doctor_error);
                eprintln!("❌ {}", doctor_error.user_message());
            }
            None => {
                error!("Error during diagnosis: {:#}", e);
                eprintln!("❌ {:#}", e);
            }
        }
    }

    result
}

async fn build_diagnostic(config: &Config) -> Result<RedshiftKbDiagnostic> {
    let aws = AwsManager::new(Some(config.aws.region.clone()), config.aws.profile.clone())
        .await
        .context("Failed to initialize AWS clients")?;

    let account_id = match &config.aws.account_id {
        Some(account_id) => account_id.clone(),
        None => aws.resolve_account_id().await?,
    };

    let settings = DiagnosticSettings::from_config(config, account_id);
    let aws = Arc::new(aws);
    let clients = DiagnosticClients::new(aws.clone(), aws.clone(), aws.clone(), aws);

    Ok(RedshiftKbDiagnostic::new(clients, settings))
}

async fn handle_compare(config: &Config, json_only: bool) -> Result<()> {
    config.validate()?;
    let doctor = build_diagnostic(config).await?;

    let comparison = doctor
        .compare_namespaces(
            &config.targets.working_namespace_arn,
            &config.targets.broken_namespace_arn,
        )
        .await;

    let generated_at = Local::now();
    let report = render_report(&comparison, generated_at);
    let summary = ReportSummary::from_comparison(&comparison);

    let manager = ReportManager::with_config(config.report.clone());
    let report_path = manager.save_text(&report, generated_at).await?;
    let json_path = manager.save_json(&comparison, generated_at).await?;

    if json_only {
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    println!("{}", report);
    println!("\n📄 Report saved to: {}", report_path.display());
    if let Some(path) = json_path {
        println!("📄 JSON report saved to: {}", path.display());
    }

    println!("\n{}", "=".repeat(80));
    println!("JSON SUMMARY");
    println!("{}", "=".repeat(80));
    println!("{}", summary.to_json()?);

    Ok(())
}

async fn handle_diagnose(config: &Config, arn: &str, json_only: bool) -> Result<()> {
    config.validate()?;
    validate_namespace_arn(arn)?;
    let doctor = build_diagnostic(config).await?;

    let diagnosis = doctor.diagnose(arn).await;

    let summary = serde_json::json!({
        "namespace_id": diagnosis.namespace_id,
        "issues": diagnosis.issues_found,
        "recommendations": diagnosis.recommendations,
    });
    let summary = serde_json::to_string_pretty(&summary)?;

    if json_only {
        println!("{}", summary);
        return Ok(());
    }

    let generated_at = Local::now();
    let report = render_diagnosis(&diagnosis, generated_at);
    let report_path = ReportManager::with_config(config.report.clone())
        .save_text(&report, generated_at)
        .await?;

    println!("{}", report);
    println!("\n📄 Report saved to: {}", report_path.display());
    println!("\n{}", summary);

    Ok(())
}

async fn handle_config(action: &ConfigCommands, config: &Config) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            info!("Showing current configuration");
            println!("⚙️  Current Configuration:");
            println!();
            println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
        }

        ConfigCommands::Validate => {
            info!("Validating configuration");
            println!("⚙️  Configuration Validation:");

            match config.validate() {
                Ok(()) => {
                    println!("✅ Configuration is valid");
                    config.print_summary();
                }
                Err(e) => {
                    println!("❌ Configuration validation failed:");
                    println!("   {}", e);
                    return Err(e.into());
                }
            }
        }

        ConfigCommands::Generate { output, format } => {
            let extension = match format.as_str() {
                "json" | "toml" => format.as_str(),
                other => anyhow::bail!("Unsupported configuration format: {}", other),
            };

            let path = match output {
                Some(path) => PathBuf::from(path),
                None => Config::default_config_path()?.with_extension(extension),
            };

            Config::default().save(&path).await?;
            println!("✅ Example configuration written to {}", path.display());
        }

        ConfigCommands::EnvHelp => {
            println!("🌍 Environment Variables:");
            for (name, description) in Config::get_env_variables_help() {
                println!("  {:<38} {}", name, description);
            }
        }
    }

    Ok(())
}
