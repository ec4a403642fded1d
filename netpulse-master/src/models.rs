use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Dernier rapport de mesure connu pour un noeud. Immuable une fois créé :
/// un nouveau rapport remplace l'ancien en bloc.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeedReport {
    pub node_id: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub isp: Option<String>,
    pub location: Option<String>,
    pub os_info: Option<String>,
    /// Horodatage déclaré par le noeud, affichage uniquement.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub captured_at: Option<OffsetDateTime>,
    /// Horodatage serveur à l'ingestion. C'est lui qui pilote la staleness,
    /// pas l'horloge du noeud.
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

/// Payload reçu sur POST /api/v1/report.
#[derive(Debug, Deserialize)]
pub struct ReportIn {
    pub node_id: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub isp: Option<String>,
    pub location: Option<String>,
    pub os_info: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub captured_at: Option<OffsetDateTime>,
}

impl SpeedReport {
    /// Construit le rapport stocké à partir du payload, estampillé à l'heure
    /// serveur fournie.
    pub fn from_payload(payload: ReportIn, received_at: OffsetDateTime) -> Self {
        Self {
            node_id: payload.node_id,
            download_mbps: payload.download_mbps,
            upload_mbps: payload.upload_mbps,
            ping_ms: payload.ping_ms,
            isp: payload.isp,
            location: payload.location,
            os_info: payload.os_info,
            captured_at: payload.captured_at,
            received_at,
        }
    }
}
