//! Configuration for the NetPulse node agent
//!
//! Handles:
//! - Node identity (node_id, optional location)
//! - Master endpoint and shared API token
//! - Speedtest execution tuning (command override, timeout, retries)
//! - Reporting interval

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeInfo,
    pub master: MasterLink,
    #[serde(default)]
    pub speedtest: SpeedtestConf,
    #[serde(default)]
    pub report: ReportConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    /// Human-readable location shown in digests (falls back to the
    /// speedtest server description when absent)
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterLink {
    /// Base URL of the master, e.g. "http://master.local:8080"
    pub url: String,
    /// Shared token; NETPULSE_API_TOKEN overrides this value
    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedtestConf {
    /// Full command line override; auto-detection when unset
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConf {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_timeout() -> u64 {
    60
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_interval() -> u64 {
    3600
}

impl Default for SpeedtestConf {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_timeout(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl Default for ReportConf {
    fn default() -> Self {
        Self { interval_secs: default_interval() }
    }
}

impl NodeConfig {
    /// Load config from NETPULSE_NODE_CONFIG or ./node.toml
    pub async fn load() -> Result<Self> {
        let path = Self::config_file_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read node config at {}", path.display()))?;
        let mut config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid node config at {}", path.display()))?;

        if let Ok(token) = std::env::var("NETPULSE_API_TOKEN") {
            if !token.is_empty() {
                config.master.api_token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> PathBuf {
        std::env::var("NETPULSE_NODE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("node.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.node_id.trim().is_empty() {
            bail!("node.node_id must not be empty");
        }
        if self.master.url.trim().is_empty() {
            bail!("master.url must not be empty");
        }
        if self.master.api_token.is_empty() {
            bail!("master.api_token missing (node.toml or NETPULSE_API_TOKEN)");
        }
        if self.speedtest.timeout_secs == 0 {
            bail!("speedtest.timeout_secs must be positive");
        }
        if self.report.interval_secs == 0 {
            bail!("report.interval_secs must be positive");
        }
        Ok(())
    }
}
