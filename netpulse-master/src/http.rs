/**
 * API REST NETPULSE - Ingestion des rapports et healthcheck
 *
 * RÔLE : Frontière HTTP du master. Reçoit les rapports des noeuds, valide,
 * remplace l'entrée du noeud dans le store et déclenche éventuellement un
 * digest immédiat en tâche de fond.
 *
 * FONCTIONNEMENT :
 * - POST /api/v1/report : ordre de validation strict, token d'abord
 *   (comparaison à temps constant, aucun détail en cas d'échec), puis JSON,
 *   puis champs. Estampillé à l'heure serveur, jamais celle du noeud.
 * - GET /health : vivacité et mode, sans exposer le contenu des rapports.
 *
 * SÉCURITÉ :
 * - Authorization: Bearer <token> obligatoire sur /api/v1/report
 * - le token n'apparaît jamais dans les logs ni les réponses
 */
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::config::MasterConfig;
use crate::health::{HealthTracker, MasterHealth};
use crate::models::{ReportIn, SpeedReport};
use crate::prefs::PrefStore;
use crate::scheduler::dispatch_digest;
use crate::state::{NodeStateStore, Shared};
use crate::telegram::TelegramClient;

#[derive(Clone)]
pub struct AppState {
    pub store: NodeStateStore,
    pub cfg: Shared<MasterConfig>,
    pub health_tracker: HealthTracker,
    pub prefs: Arc<PrefStore>,
    pub telegram: TelegramClient,
    pub warned_unknown: Shared<HashSet<String>>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/v1/report", post(ingest_report))
        .with_state(app_state)
}

async fn get_health(State(app): State<AppState>) -> Json<MasterHealth> {
    Json(app.health_tracker.get_health(&app.store, &app.cfg))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Comparaison à temps constant ; un token configuré vide refuse tout.
fn token_matches(presented: Option<&str>, expected: &str) -> bool {
    let Some(presented) = presented else { return false };
    if expected.is_empty() {
        eprintln!("[http] SECURITY: api_token non configuré, accès refusé");
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn validate_payload(payload: &ReportIn) -> Result<(), String> {
    if payload.node_id.trim().is_empty() {
        return Err("node_id must not be empty".to_string());
    }
    for (name, value) in [
        ("download_mbps", payload.download_mbps),
        ("upload_mbps", payload.upload_mbps),
        ("ping_ms", payload.ping_ms),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be a non-negative finite number"));
        }
    }
    Ok(())
}

// POST /api/v1/report
async fn ingest_report(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    // 1. token avant tout, sans indice sur la suite
    let expected = app.cfg.lock().api_token.clone();
    if !token_matches(bearer_token(&headers), &expected) {
        eprintln!("[http] rapport rejeté: token absent ou invalide");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }

    // 2. payload JSON
    let payload: ReportIn = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[http] rapport rejeté: payload invalide ({e})");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid payload: {e}") })));
        }
    };

    // 3. champs
    if let Err(reason) = validate_payload(&payload) {
        eprintln!("[http] rapport rejeté ({}): {reason}", payload.node_id);
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })));
    }

    // noeud inconnu : accepté, signalé une seule fois avec la config à ajouter
    let known = app.cfg.lock().nodes_meta.contains_key(&payload.node_id);
    if !known && app.warned_unknown.lock().insert(payload.node_id.clone()) {
        println!(
            "[http] noeud inconnu \"{}\", à ajouter dans nodes_meta:\n    {}:\n      flag: \"🏳️\"\n      display_name: \"Node {}\"",
            payload.node_id, payload.node_id, payload.node_id
        );
    }

    let report = SpeedReport::from_payload(payload, OffsetDateTime::now_utc());
    let node_id = report.node_id.clone();
    let download = report.download_mbps;
    app.store.put(report);
    app.health_tracker.mark_report_received();
    println!("[http] rapport reçu du noeud '{node_id}' ({download:.1} Mbps)");

    // digest immédiat en tâche de fond : ne bloque jamais la réponse HTTP,
    // un échec est loggé côté scheduler et jamais renvoyé au noeud
    if app.cfg.lock().schedule.send_immediately {
        let store = app.store.clone();
        let cfg = app.cfg.clone();
        let prefs = app.prefs.clone();
        let client = app.telegram.clone();
        tokio::spawn(async move {
            dispatch_digest(&store, &cfg, &prefs, &client).await;
        });
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_state;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let cfg: MasterConfig = serde_yaml::from_str(
            r#"
api_token: "secret-token"
recipients:
  - chat_id: 1
"#,
        )
        .unwrap();
        AppState {
            store: NodeStateStore::new(),
            cfg: new_state(cfg),
            health_tracker: HealthTracker::new(),
            prefs: Arc::new(PrefStore::new(dir.path().join("prefs.json")).unwrap()),
            telegram: TelegramClient::new("test-token").unwrap(),
            warned_unknown: new_state(HashSet::new()),
        }
    }

    fn auth_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers
    }

    fn payload(node_id: &str, download: f64) -> String {
        json!({
            "node_id": node_id,
            "download_mbps": download,
            "upload_mbps": 45.0,
            "ping_ms": 22.0,
            "isp": "Elisa",
        })
        .to_string()
    }

    #[tokio::test]
    async fn valid_report_is_stored_with_server_timestamp() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);
        let before = OffsetDateTime::now_utc();

        let (code, _) = ingest_report(
            State(app.clone()),
            auth_headers("secret-token"),
            payload("fin", 120.4),
        )
        .await;

        assert_eq!(code, StatusCode::OK);
        let stored = app.store.get("fin").unwrap();
        assert_eq!(stored.download_mbps, 120.4);
        assert!(stored.received_at >= before);
    }

    #[tokio::test]
    async fn bad_token_is_rejected_without_state_change() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);

        let (code, body) = ingest_report(
            State(app.clone()),
            auth_headers("wrong-token"),
            payload("fin", 100.0),
        )
        .await;

        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0["error"], "unauthorized");
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);

        let (code, _) = ingest_report(State(app.clone()), HeaderMap::new(), payload("fin", 100.0)).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);

        let (code, _) = ingest_report(
            State(app.clone()),
            auth_headers("secret-token"),
            "not-json".to_string(),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn empty_node_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);

        let (code, body) = ingest_report(
            State(app.clone()),
            auth_headers("secret-token"),
            payload("  ", 100.0),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["error"], "node_id must not be empty");
    }

    #[tokio::test]
    async fn negative_measurement_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);

        let (code, _) = ingest_report(
            State(app.clone()),
            auth_headers("secret-token"),
            payload("fin", -1.0),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.len(), 0);
    }

    #[tokio::test]
    async fn second_report_replaces_the_first_entirely() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);
        let headers = auth_headers("secret-token");

        let first = json!({
            "node_id": "fin",
            "download_mbps": 100.0,
            "upload_mbps": 99.0,
            "ping_ms": 5.0,
            "isp": "OldNet",
        })
        .to_string();
        let second = json!({
            "node_id": "fin",
            "download_mbps": 200.0,
            "upload_mbps": 10.0,
            "ping_ms": 50.0,
        })
        .to_string();

        ingest_report(State(app.clone()), headers.clone(), first).await;
        ingest_report(State(app.clone()), headers, second).await;

        let stored = app.store.get("fin").unwrap();
        assert_eq!(stored.download_mbps, 200.0);
        assert_eq!(stored.upload_mbps, 10.0);
        assert_eq!(stored.ping_ms, 50.0);
        // le remplacement est total : l'isp du premier rapport ne survit pas
        assert!(stored.isp.is_none());
    }

    #[tokio::test]
    async fn health_endpoint_reports_liveness() {
        let dir = TempDir::new().unwrap();
        let app = test_state(&dir);
        ingest_report(
            State(app.clone()),
            auth_headers("secret-token"),
            payload("fin", 100.0),
        )
        .await;

        let Json(health) = get_health(State(app)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.mode, "master");
        assert_eq!(health.nodes_tracked, 1);
        assert_eq!(health.reports_received, 1);
    }

    #[test]
    fn token_comparison_rules() {
        assert!(token_matches(Some("abc"), "abc"));
        assert!(!token_matches(Some("abd"), "abc"));
        assert!(!token_matches(Some("ab"), "abc"));
        assert!(!token_matches(None, "abc"));
        // token attendu vide : tout est refusé
        assert!(!token_matches(Some(""), ""));
        assert!(!token_matches(Some("x"), ""));
    }
}
