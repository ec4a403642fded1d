/**
 * PLANIFICATEUR DE DIGESTS - Envoi périodique et envoi immédiat
 *
 * RÔLE : Un seul timer tokio, indépendant du trafic d'ingestion. À chaque
 * tick : snapshot cohérent du store, construction d'une vue agrégée unique,
 * puis rendu + envoi par destinataire avec ses propres préférences.
 *
 * FONCTIONNEMENT :
 * - premier tick après un intervalle complet (pas de digest vide au boot)
 * - MissedTickBehavior::Delay : un tick en retard se met en file derrière le
 *   précédent, deux ticks ne tournent jamais en parallèle
 * - dispatch_digest est partagé entre le chemin planifié et le chemin
 *   "send_immediately" de l'ingestion
 * - le lock d'état n'est jamais tenu pendant un appel réseau
 */
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::aggregator::{build_view, AggregatedView};
use crate::config::MasterConfig;
use crate::prefs::PrefStore;
use crate::render::{render_digest, Lang, ViewMode};
use crate::state::{NodeStateStore, Shared};
use crate::telegram::TelegramClient;

pub fn spawn_digest_scheduler(
    store: NodeStateStore,
    cfg: Shared<MasterConfig>,
    prefs: Arc<PrefStore>,
    client: TelegramClient,
) {
    let minutes = cfg.lock().schedule.interval_minutes.max(1);
    println!("[scheduler] digest périodique toutes les {minutes} min");

    tokio::spawn(async move {
        let period = Duration::from_secs(minutes * 60);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            dispatch_digest(&store, &cfg, &prefs, &client).await;
        }
    });
}

/// Construit la vue depuis un snapshot puis envoie à chaque destinataire,
/// isolément : un échec d'envoi est loggé et ne bloque pas les suivants.
pub async fn dispatch_digest(
    store: &NodeStateStore,
    cfg: &Shared<MasterConfig>,
    prefs: &PrefStore,
    client: &TelegramClient,
) {
    // clone de la config et snapshot sous lock, réseau hors lock
    let cfg_snapshot = cfg.lock().clone();
    let snapshot = store.snapshot();
    let view = build_view(&snapshot, &cfg_snapshot, OffsetDateTime::now_utc());

    let digests = build_digests(&view, &cfg_snapshot, prefs);
    for (chat_id, text) in digests {
        if let Err(e) = client.send_message(chat_id, &text).await {
            eprintln!("[scheduler] digest au chat {chat_id} échoué: {e}");
        }
    }
}

/// Partie pure de l'envoi : (vue, config, préférences) -> un texte par chat,
/// chacun rendu dans la langue et le mode du destinataire.
pub fn build_digests(
    view: &AggregatedView,
    cfg: &MasterConfig,
    prefs: &PrefStore,
) -> Vec<(i64, String)> {
    cfg.recipients
        .iter()
        .map(|r| {
            let pref = prefs.get_or_default(
                r.chat_id,
                Lang::from_code(&r.default_language),
                ViewMode::from_code(&r.default_view_mode),
            );
            (r.chat_id, render_digest(view, pref.language, pref.view_mode))
        })
        .collect()
}
