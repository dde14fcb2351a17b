//! Console configuration

use anyhow::{Context, Result};
use console_lib::backend::KubernetesConfig;
use console_lib::metrics::{SchedulerConfig, DEFAULT_HORIZON_HOURS};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "CONSOLE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "console.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Name of this console instance in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for health, metrics and job endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    #[serde(default = "default_retention_interval")]
    pub retention_interval_secs: u64,

    /// Samples older than this are pruned
    #[serde(default = "default_retention_horizon")]
    pub retention_horizon_hours: i64,

    /// JSON inventory of applications, environments and clusters
    #[serde(default)]
    pub inventory_path: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub kubernetes_connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub kubernetes_request_timeout_secs: u64,

    /// Directory inside replicas exposed for file listing and download
    #[serde(default = "default_inspection_dir")]
    pub inspection_dir: String,

    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: i64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "replica-console".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_collection_interval() -> u64 {
    60
}

fn default_retention_interval() -> u64 {
    3600
}

fn default_retention_horizon() -> i64 {
    DEFAULT_HORIZON_HOURS
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_inspection_dir() -> String {
    KubernetesConfig::default().inspection_dir
}

fn default_log_tail_lines() -> i64 {
    KubernetesConfig::default().log_tail_lines
}

impl ConsoleConfig {
    /// Load from the optional config file, overridden by `CONSOLE_*` variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path), true)
    }

    pub fn load_from(path: &Path, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(path).required(false));
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix("CONSOLE").try_parsing(true));
        }

        let config = builder
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let console: ConsoleConfig = config
            .try_deserialize()
            .context("invalid console configuration")?;
        console.validate()?;
        Ok(console)
    }

    fn validate(&self) -> Result<()> {
        if self.collection_interval_secs == 0 || self.retention_interval_secs == 0 {
            anyhow::bail!("job intervals must be positive");
        }
        if self.retention_horizon_hours <= 0 {
            anyhow::bail!("retention_horizon_hours must be positive");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            collection_interval: Duration::from_secs(self.collection_interval_secs),
            retention_interval: Duration::from_secs(self.retention_interval_secs),
        }
    }

    pub fn kubernetes_config(&self) -> KubernetesConfig {
        KubernetesConfig {
            connect_timeout: Duration::from_secs(self.kubernetes_connect_timeout_secs),
            request_timeout: Duration::from_secs(self.kubernetes_request_timeout_secs),
            inspection_dir: self.inspection_dir.clone(),
            log_tail_lines: self.log_tail_lines,
            ..KubernetesConfig::default()
        }
    }
}
