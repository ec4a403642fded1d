use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::MasterConfig;
use crate::state::{NodeStateStore, Shared};

/// Réponse de GET /health : mode et vivacité du process, jamais le contenu
/// des rapports.
#[derive(Debug, Serialize, Deserialize)]
pub struct MasterHealth {
    pub status: String,
    pub mode: String,
    pub uptime_seconds: u64,
    pub nodes_tracked: u32,
    pub recipients: u32,
    pub reports_received: u64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    reports_received: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reports_received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_report_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, store: &NodeStateStore, cfg: &Shared<MasterConfig>) -> MasterHealth {
        MasterHealth {
            status: "ok".to_string(),
            mode: "master".to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            nodes_tracked: store.len() as u32,
            recipients: cfg.lock().recipients.len() as u32,
            reports_received: self.reports_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
