use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MasterConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Secret partagé présenté par les noeuds (surchargé par NETPULSE_API_TOKEN).
    #[serde(default)]
    pub api_token: String,
    /// Fenêtre de staleness : au-delà, un noeud est rendu offline.
    #[serde(default = "default_node_timeout")]
    pub node_timeout_minutes: i64,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Ordre d'affichage explicite ; les noeuds restants suivent, triés.
    #[serde(default)]
    pub nodes_order: Vec<String>,
    #[serde(default)]
    pub nodes_meta: HashMap<String, NodeMeta>,
    pub recipients: Vec<RecipientConf>,
    #[serde(default)]
    pub schedule: ScheduleConf,
    #[serde(default = "default_prefs_path")]
    pub prefs_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeMeta {
    pub flag: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecipientConf {
    pub chat_id: i64,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_view_mode")]
    pub default_view_mode: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleConf {
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub send_immediately: bool,
}

impl Default for ScheduleConf {
    fn default() -> Self {
        Self { interval_minutes: default_interval(), send_immediately: false }
    }
}

/// Bornes inférieures des paliers de débit, en Mbps, strictement croissantes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct Thresholds {
    pub very_low: f64,
    pub low: f64,
    pub medium: f64,
    pub good: f64,
    pub excellent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { very_low: 50.0, low: 200.0, medium: 500.0, good: 1000.0, excellent: 2000.0 }
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".into()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_node_timeout() -> i64 {
    120
}
fn default_interval() -> u64 {
    60
}
fn default_language() -> String {
    "en".into()
}
fn default_view_mode() -> String {
    "compact".into()
}
fn default_prefs_path() -> String {
    "./data/recipient_prefs.json".into()
}

impl MasterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_token.is_empty() {
            bail!("api_token manquant (master.yaml ou NETPULSE_API_TOKEN)");
        }
        if self.recipients.is_empty() {
            bail!("au moins un recipient (chat_id) est requis");
        }
        let t = &self.thresholds;
        let bounds = [t.very_low, t.low, t.medium, t.good, t.excellent];
        if bounds.iter().any(|b| !b.is_finite() || *b < 0.0) {
            bail!("thresholds: bornes négatives ou non finies");
        }
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            bail!("thresholds: les bornes doivent être strictement croissantes");
        }
        if self.schedule.interval_minutes == 0 {
            bail!("schedule.interval_minutes doit être >= 1");
        }
        if self.node_timeout_minutes <= 0 {
            bail!("node_timeout_minutes doit être positif");
        }
        for r in &self.recipients {
            if !matches!(r.default_view_mode.as_str(), "compact" | "detailed") {
                bail!("recipient {}: default_view_mode invalide '{}'", r.chat_id, r.default_view_mode);
            }
        }
        Ok(())
    }
}

/// Charge master.yaml (chemin surchargé par NETPULSE_MASTER_CONFIG), puis
/// applique les surcharges d'environnement. La validation est laissée au main.
pub async fn load_config() -> anyhow::Result<MasterConfig> {
    let path = std::env::var("NETPULSE_MASTER_CONFIG").unwrap_or_else(|_| "master.yaml".into());
    if !Path::new(&path).exists() {
        bail!("fichier de configuration introuvable: {path}");
    }
    let txt = fs::read_to_string(&path).await?;
    let mut cfg: MasterConfig = serde_yaml::from_str(&txt)?;

    if let Ok(token) = std::env::var("NETPULSE_API_TOKEN") {
        if !token.is_empty() {
            cfg.api_token = token;
        }
    }
    Ok(cfg)
}
