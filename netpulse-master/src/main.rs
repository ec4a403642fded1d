/**
 * NETPULSE MASTER - Point d'entrée du serveur central
 *
 * RÔLE : Orchestration de tous les modules : config, store d'état, préférences,
 * client Telegram, scheduler de digests, API HTTP d'ingestion.
 *
 * ARCHITECTURE : Ingestion HTTP (axum) -> NodeStateStore -> agrégation ->
 * rendu localisé -> envoi Telegram, périodique et/ou immédiat.
 * UTILITÉ : Process unique et autoritaire pour un cluster de noeuds de mesure.
 */

mod aggregator;
mod config;
mod health;
mod http;
mod models;
mod prefs;
mod render;
mod scheduler;
mod state;
mod status;
mod telegram;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::prefs::PrefStore;
use crate::state::{new_state, NodeStateStore};
use crate::telegram::TelegramClient;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg_loaded = match load_config().await {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[master] config invalide: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = cfg_loaded.validate() {
        eprintln!("[master] config invalide: {e}");
        std::process::exit(1);
    }

    let bot_token = match std::env::var("NETPULSE_BOT_TOKEN") {
        Ok(t) if !t.is_empty() => t,
        _ => {
            eprintln!("[master] NETPULSE_BOT_TOKEN manquant (variable d'environnement ou .env)");
            std::process::exit(1);
        }
    };

    // store des préférences par chat, persistant
    let prefs = match PrefStore::new(&cfg_loaded.prefs_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("[master] ouverture du store de préférences échouée: {e}");
            std::process::exit(1);
        }
    };

    let telegram = match TelegramClient::new(&bot_token) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("[master] création du client Telegram échouée: {e}");
            std::process::exit(1);
        }
    };

    let listen_host = cfg_loaded.listen_host.clone();
    let listen_port = cfg_loaded.listen_port;

    let store = NodeStateStore::new();
    let cfg = new_state(cfg_loaded);
    let health_tracker = HealthTracker::new();

    // digests périodiques
    scheduler::spawn_digest_scheduler(store.clone(), cfg.clone(), prefs.clone(), telegram.clone());

    // écoute des commandes /language et /view
    telegram::spawn_update_poller(telegram.clone(), prefs.clone(), cfg.clone());

    let app_state = AppState {
        store,
        cfg,
        health_tracker,
        prefs,
        telegram,
        warned_unknown: new_state(HashSet::new()),
    };

    let app = http::build_router(app_state);

    let addr: SocketAddr = match format!("{listen_host}:{listen_port}").parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("[master] adresse d'écoute invalide {listen_host}:{listen_port}: {e}");
            std::process::exit(1);
        }
    };
    println!("[master] listening on http://{addr}");
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[master] bind {addr} échoué: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("[master] serveur HTTP arrêté: {e}");
        std::process::exit(1);
    }
}
