//! IAM Policy Component CLI
//!
//! Deploys and removes a single AWS IAM managed policy, keeping component
//! state in a local JSON file. Credentials come from the standard AWS
//! provider chain; nothing is hardcoded.
//!
//! # Usage
//! ```bash
//! # Create or update the policy described in inputs.json
//! iam-policy deploy --inputs inputs.json
//!
//! # Override the name and document from flags
//! iam-policy deploy --name read-buckets --policy-file policy.json
//!
//! # Delete the policy and clear state
//! iam-policy remove
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use aws_iam_policy::{
    AwsConnector, JsonFileStore, PolicyComponent, PolicyDocument, PolicyInputs, ProviderContext,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "iam-policy")]
#[command(about = "Declarative AWS IAM policy component", long_about = None)]
#[command(version)]
struct Cli {
    /// Path of the component state file
    #[arg(long, env = "IAM_POLICY_STATE", default_value = ".iam-policy/state.json")]
    state: PathBuf,

    /// Default region when inputs do not set one
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Named AWS profile for credentials
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the policy
    Deploy {
        /// JSON file with inputs (region, policy, name, description, path)
        #[arg(long)]
        inputs: Option<PathBuf>,

        /// Policy name (changing it recreates the policy)
        #[arg(long)]
        name: Option<String>,

        /// Policy description
        #[arg(long)]
        description: Option<String>,

        /// IAM path for the policy
        #[arg(long)]
        path: Option<String>,

        /// File containing the policy document
        #[arg(long)]
        policy_file: Option<PathBuf>,
    },

    /// Delete the policy and clear state
    Remove,

    /// Print the persisted state
    Show,
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json)?;

    let context = ProviderContext {
        region: cli.region.clone(),
        profile: cli.profile.clone(),
    };

    let store = JsonFileStore::new(&cli.state);
    let mut component = PolicyComponent::new(store, AwsConnector::new(context.clone()), context);

    match cli.command {
        Commands::Deploy {
            inputs,
            name,
            description,
            path,
            policy_file,
        } => {
            let base = match inputs {
                Some(file) => read_inputs(&file)?,
                None => PolicyInputs::default(),
            };

            let policy = match policy_file {
                Some(file) => Some(PolicyDocument::Serialized(
                    std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read policy file {}", file.display()))?,
                )),
                None => None,
            };

            let overrides = PolicyInputs {
                region: None,
                policy,
                name,
                description,
                path,
            };

            let outputs = component
                .deploy(base.merge(overrides))
                .await
                .context("Deploy failed")?;

            println!("{}", serde_json::to_string_pretty(&outputs)?);
            info!(arn = %outputs.arn, version = %outputs.version, "Deploy complete");
        }

        Commands::Remove => {
            let action = component
                .remove(PolicyInputs::default())
                .await
                .context("Remove failed")?;

            println!("{{}}");
            info!(action = ?action, "Remove complete");
        }

        Commands::Show => {
            let state = component.state().await.context("Failed to load state")?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn read_inputs(file: &Path) -> Result<PolicyInputs> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read inputs file {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse inputs file {}", file.display()))
}
