use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::SpeedReport;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Store du dernier rapport par noeud.
/// Remplacement atomique de l'enregistrement complet (last-writer-wins par
/// arrivée), lectures par snapshot cohérent : jamais de rapport à moitié écrit.
#[derive(Clone, Default)]
pub struct NodeStateStore {
    reports: Arc<RwLock<HashMap<String, SpeedReport>>>,
}

impl NodeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace l'entrée du noeud par le rapport entier, jamais champ par champ.
    pub fn put(&self, report: SpeedReport) {
        self.reports.write().insert(report.node_id.clone(), report);
    }

    pub fn get(&self, node_id: &str) -> Option<SpeedReport> {
        self.reports.read().get(node_id).cloned()
    }

    /// Vue instantanée de tous les rapports (clone sous read lock).
    pub fn snapshot(&self) -> HashMap<String, SpeedReport> {
        self.reports.read().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.read().len()
    }
}
