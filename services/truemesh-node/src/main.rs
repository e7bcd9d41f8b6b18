//! TrueMesh Node
//!
//! Runs provider-verification workflows against the provenance ledger and
//! inspects the resulting chain.
//!
//! # Usage
//!
//! ```bash
//! # Run 20 synthetic provider registrations and print a summary
//! truemesh-node run --workflows 20
//!
//! # Persist to sled and inspect afterwards
//! truemesh-node --storage sled --data-dir ./data run --workflows 5
//! truemesh-node --storage sled --data-dir ./data verify
//! truemesh-node --storage sled --data-dir ./data history P1
//!
//! # Environment overrides
//! TRUEMESH__LEDGER__DIFFICULTY=2 truemesh-node info
//! ```

mod config;
mod node;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LoggingConfig, NodeConfig, StorageBackend};
use crate::node::Node;

// =============================================================================
// CLI Arguments
// =============================================================================

/// TrueMesh node - provider verification workflows with a provenance ledger
#[derive(Parser, Debug)]
#[command(name = "truemesh-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "TRUEMESH_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TRUEMESH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "TRUEMESH_LOG_FORMAT")]
    log_format: Option<String>,

    /// Proof-of-work difficulty in leading zero bits
    #[arg(long)]
    difficulty: Option<u32>,

    /// Storage backend
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,

    /// Database directory for the sled backend
    #[arg(long, env = "TRUEMESH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run workflows for synthetic providers, mine and verify
    Run {
        /// Number of workflows to submit
        #[arg(short, long, default_value_t = 10)]
        workflows: usize,

        /// Pipeline to run instead of the configured default
        #[arg(long)]
        pipeline: Option<String>,
    },

    /// Verify the stored chain
    Verify,

    /// Print the recorded transactions of a subject
    History {
        /// Subject (provider) id
        subject: String,
    },

    /// Print chain summary
    Info,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut node_config = NodeConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(level) = args.log_level {
        node_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        node_config.logging.format = format;
    }
    if let Some(difficulty) = args.difficulty {
        node_config.ledger.difficulty = difficulty;
    }
    if let Some(storage) = args.storage {
        node_config.node.storage = storage;
    }
    if let Some(data_dir) = args.data_dir {
        node_config.node.data_dir = data_dir;
    }

    init_logging(&node_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting TrueMesh node"
    );

    let node = Node::start(&node_config).await?;

    match args.command {
        Command::Run {
            workflows,
            pipeline,
        } => {
            let summary = node.run_workflows(workflows, pipeline.as_deref()).await?;
            print_json(&summary)?;
            if !summary.chain.ok {
                anyhow::bail!("chain verification failed after run");
            }
        }
        Command::Verify => {
            let report = node.ledger.verify_chain().await;
            print_json(&report)?;
            if !report.ok {
                anyhow::bail!(
                    "chain invalid at block {}",
                    report
                        .first_invalid_index
                        .map_or_else(|| "?".to_string(), |i| i.to_string())
                );
            }
        }
        Command::History { subject } => {
            print_json(&node.history(&subject).await?)?;
        }
        Command::Info => {
            print_json(&node.ledger.chain_info().await)?;
        }
    }

    node.flush().await?;
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging. Logs go to stderr; stdout carries JSON output.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        _ => {
            subscriber
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
