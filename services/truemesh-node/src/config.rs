//! Node Configuration
//!
//! Layered the same way for every deployment: built-in defaults,
//! `config/default` and `config/local`, an optional file given on the command
//! line, then `TRUEMESH__*` environment variables. CLI flags are applied last
//! in `main`.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use truemesh_agents::{AgentThresholds, RegistryConfig};
use truemesh_ledger::LedgerConfig;
use truemesh_workflow::EngineConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Thresholds for the reference agents
    #[serde(default)]
    pub agents: AgentThresholds,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where blocks and workflow snapshots live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Database directory for the sled backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Mine pending transactions on this interval while workflows run
    #[serde(default)]
    pub mining_interval_ms: Option<u64>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            data_dir: default_data_dir(),
            mining_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/truemesh")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl NodeConfig {
    /// Load configuration from files and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        Self::load_from(Path::new("config"), config_path.map(Path::new))
    }

    /// Later sources win: `default`, `local`, the explicit file, then the
    /// environment
    fn load_from(config_dir: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let layer = |name: &str| {
            let path = config_dir.join(name);
            config::File::with_name(&path.to_string_lossy()).required(false)
        };

        let mut builder = config::Config::builder()
            .add_source(layer("default"))
            .add_source(layer("local"));

        if let Some(path) = config_path {
            let explicit = config::File::with_name(&path.to_string_lossy()).required(true);
            builder = builder.add_source(explicit);
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TRUEMESH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Settings for local experiments: no proof-of-work, in-memory storage
    pub fn development() -> Self {
        Self {
            ledger: LedgerConfig::for_testing(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
            ..Self::default()
        }
    }
}
