//! External speedtest execution
//!
//! Runs the Ookla `speedtest` CLI or the legacy `speedtest-cli` with a
//! timeout and bounded retries, and parses either tool's JSON output.
//! The command line can be overridden in the config; otherwise both known
//! tools are tried in order.

use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::SpeedtestConf;

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub isp: Option<String>,
    pub server: Option<String>,
}

#[derive(Debug, Error)]
pub enum SpeedtestError {
    #[error("invalid speedtest command override: {0}")]
    BadCommand(String),
    #[error("speedtest timed out after {0}s")]
    Timeout(u64),
    #[error("speedtest exited with {0}")]
    Failed(String),
    #[error("unparseable speedtest output")]
    Parse,
    #[error("no speedtest attempt succeeded")]
    Exhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct SpeedtestRunner {
    config: SpeedtestConf,
}

impl SpeedtestRunner {
    pub fn new(config: SpeedtestConf) -> Self {
        Self { config }
    }

    /// Candidate command lines: the configured override alone, or both
    /// known tools in order of preference.
    fn candidates(&self) -> Result<Vec<Vec<String>>, SpeedtestError> {
        if let Some(command) = &self.config.command {
            let words = shell_words::split(command)
                .map_err(|e| SpeedtestError::BadCommand(e.to_string()))?;
            if words.is_empty() {
                return Err(SpeedtestError::BadCommand("empty command".into()));
            }
            return Ok(vec![words]);
        }
        Ok(vec![
            vec![
                "speedtest".into(),
                "--accept-license".into(),
                "--accept-gdpr".into(),
                "--format=json".into(),
            ],
            vec!["speedtest-cli".into(), "--json".into()],
        ])
    }

    /// Execute with retry logic; the last error is returned once every
    /// attempt is exhausted.
    pub async fn run(&self) -> Result<Measurement, SpeedtestError> {
        let candidates = self.candidates()?;
        let retries = self.config.retry_count.max(1);
        let mut last_err = SpeedtestError::Exhausted;

        for attempt in 1..=retries {
            for argv in &candidates {
                info!("Running speedtest (attempt {attempt}/{retries}) with {}", argv[0]);
                match self.run_once(argv).await {
                    Ok(m) => {
                        info!(
                            "Speedtest successful: Download={:.2} Mbps, Upload={:.2} Mbps, Ping={:.2} ms",
                            m.download_mbps, m.upload_mbps, m.ping_ms
                        );
                        return Ok(m);
                    }
                    Err(e) => {
                        warn!("Speedtest attempt failed: {e}");
                        last_err = e;
                    }
                }
            }
            if attempt < retries {
                info!("Waiting {}s before retry...", self.config.retry_delay_secs);
                tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
            }
        }
        Err(last_err)
    }

    async fn run_once(&self, argv: &[String]) -> Result<Measurement, SpeedtestError> {
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            command.output(),
        )
        .await
        .map_err(|_| SpeedtestError::Timeout(self.config.timeout_secs))??;

        if !output.status.success() {
            return Err(SpeedtestError::Failed(output.status.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout).ok_or(SpeedtestError::Parse)
    }
}

/// Accepts both the Ookla JSON (`--format=json`) and the speedtest-cli
/// JSON (`--json`) shapes.
pub fn parse_output(stdout: &str) -> Option<Measurement> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    parse_ookla(&value).or_else(|| parse_cli(&value))
}

// Ookla CLI reports bandwidth in bytes per second
fn parse_ookla(v: &Value) -> Option<Measurement> {
    let download_mbps = v["download"]["bandwidth"].as_f64()? * 8.0 / 1_000_000.0;
    let upload_mbps = v["upload"]["bandwidth"].as_f64()? * 8.0 / 1_000_000.0;
    let ping_ms = v["ping"]["latency"].as_f64()?;

    let isp = v["isp"].as_str().map(str::to_string);
    let server = match (v["server"]["name"].as_str(), v["server"]["location"].as_str()) {
        (Some(name), Some(location)) => Some(format!("{name} ({location})")),
        (Some(name), None) => Some(name.to_string()),
        _ => None,
    };

    Some(Measurement { download_mbps, upload_mbps, ping_ms, isp, server })
}

// speedtest-cli reports plain bits per second
fn parse_cli(v: &Value) -> Option<Measurement> {
    let download_mbps = v["download"].as_f64()? / 1_000_000.0;
    let upload_mbps = v["upload"].as_f64()? / 1_000_000.0;
    let ping_ms = v["ping"].as_f64()?;

    let isp = v["client"]["isp"].as_str().map(str::to_string);
    let server = match (v["server"]["sponsor"].as_str(), v["server"]["name"].as_str()) {
        (Some(sponsor), Some(name)) => Some(format!("{sponsor} ({name})")),
        (Some(sponsor), None) => Some(sponsor.to_string()),
        (None, Some(name)) => Some(name.to_string()),
        _ => None,
    };

    Some(Measurement { download_mbps, upload_mbps, ping_ms, isp, server })
}
