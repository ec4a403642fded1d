//! NetPulse Node - Speed measurement agent
//!
//! This agent feeds the NetPulse master:
//! - Runs the external speedtest tool on a configured interval
//! - Attaches host identity (hostname, OS) to every measurement
//! - POSTs the report to the master's ingest endpoint with the shared token
//!
//! Measurement or delivery failures are logged and the agent waits for the
//! next cycle; it never exits on a transient error.

mod config;
mod speedtest;
mod system;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use config::NodeConfig;
use speedtest::{Measurement, SpeedtestRunner};

/// Report payload sent to POST /api/v1/report on the master
#[derive(Debug, Serialize)]
struct ReportPayload {
    node_id: String,
    download_mbps: f64,
    upload_mbps: f64,
    ping_ms: f64,
    isp: Option<String>,
    location: Option<String>,
    os_info: Option<String>,
    captured_at: DateTime<Utc>,
}

/// Main agent state
struct NodeAgent {
    config: NodeConfig,
    runner: SpeedtestRunner,
    http: reqwest::Client,
    os_info: String,
}

impl NodeAgent {
    fn new(config: NodeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let os_info = system::os_info();
        info!(
            "Agent initialized - ID: {}, Host: {}, OS: {}",
            config.node.node_id,
            system::hostname(),
            os_info
        );

        Ok(Self {
            runner: SpeedtestRunner::new(config.speedtest.clone()),
            config,
            http,
            os_info,
        })
    }

    /// Measure-and-report loop; first cycle runs immediately so the master
    /// has data before its first scheduled digest.
    async fn run(&self) -> Result<()> {
        info!(
            "Starting measurement loop (every {}s, master: {})",
            self.config.report.interval_secs, self.config.master.url
        );
        let mut timer = interval(Duration::from_secs(self.config.report.interval_secs));

        loop {
            timer.tick().await;

            let measurement = match self.runner.run().await {
                Ok(m) => m,
                Err(e) => {
                    error!("Speedtest failed, skipping this cycle: {e}");
                    continue;
                }
            };

            if let Err(e) = self.send_report(&measurement).await {
                warn!("Failed to deliver report: {e:#}");
            }
        }
    }

    async fn send_report(&self, measurement: &Measurement) -> Result<()> {
        let payload = ReportPayload {
            node_id: self.config.node.node_id.clone(),
            download_mbps: measurement.download_mbps,
            upload_mbps: measurement.upload_mbps,
            ping_ms: measurement.ping_ms,
            isp: measurement.isp.clone(),
            location: self.config.node.location.clone().or_else(|| measurement.server.clone()),
            os_info: Some(self.os_info.clone()),
            captured_at: Utc::now(),
        };

        let url = format!("{}/api/v1/report", self.config.master.url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.master.api_token)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        if !response.status().is_success() {
            // token is never logged, only the status
            bail!("master returned {}", response.status());
        }
        info!("Report delivered to master");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    info!("NetPulse node agent starting...");

    let config = NodeConfig::load()
        .await
        .context("Failed to load node configuration")?;

    let agent = NodeAgent::new(config).context("Failed to create agent")?;

    agent.run().await.context("Agent execution failed")?;

    Ok(())
}
