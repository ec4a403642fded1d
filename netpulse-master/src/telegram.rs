/**
 * CLIENT TELEGRAM - Envoi des digests et écoute des changements de préférences
 *
 * RÔLE : Frontière avec l'API Bot Telegram. Deux responsabilités :
 * - sendMessage (HTML) avec retries bornés et backoff, best-effort : un échec
 *   est loggé et remonté au seul destinataire concerné, jamais plus loin.
 * - long-poll getUpdates pour transformer /language et /view (ou les
 *   callback_query lang:/view:) en mutations du PrefStore, avec confirmation
 *   dans la nouvelle langue du chat.
 */
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MasterConfig;
use crate::prefs::PrefStore;
use crate::render::{confirmation_language, confirmation_view, Lang, ViewMode};
use crate::state::Shared;

/// Limite Telegram par message ; au-delà le texte est découpé.
pub const MAX_MESSAGE_LENGTH: usize = 4096;
const API_TIMEOUT_SECS: u64 = 30;
const RETRY_COUNT: u32 = 3;
const RETRY_DELAY_SECS: u64 = 2;
const POLL_TIMEOUT_SECS: u64 = 25;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram API returned {0}")]
    Api(reqwest::StatusCode),
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, api_base: format!("https://api.telegram.org/bot{bot_token}") })
    }

    /// Envoie un texte au chat, découpé si nécessaire. Retries bornés par
    /// morceau ; la première erreur définitive interrompt l'envoi.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        for chunk in split_message(text) {
            self.send_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_chunk(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        let url = format!("{}/sendMessage", self.api_base);
        let payload = message_payload(chat_id, text);

        let mut attempt = 1;
        loop {
            let err = match self.http.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => DispatchError::Api(resp.status()),
                Err(e) => DispatchError::Http(e),
            };
            if attempt >= RETRY_COUNT {
                return Err(err);
            }
            eprintln!("[telegram] sendMessage chat {chat_id}, tentative {attempt}/{RETRY_COUNT}: {err}");
            attempt += 1;
            tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DispatchError> {
        let url = format!("{}/getUpdates", self.api_base);
        let resp = self
            .http
            .get(&url)
            .query(&[("timeout", POLL_TIMEOUT_SECS as i64), ("offset", offset)])
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(DispatchError::Api(resp.status()));
        }
        let body: UpdatesResponse = resp.json().await?;
        Ok(body.result)
    }
}

fn message_payload(chat_id: i64, text: &str) -> Value {
    json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
    })
}

/// Découpe sur les fins de ligne sous la limite Telegram ; une ligne seule
/// trop longue est coupée en dur.
pub fn split_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if !current.is_empty() && current_len + 1 + line_len > MAX_MESSAGE_LENGTH {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > MAX_MESSAGE_LENGTH {
            let mut buf = String::new();
            let mut n = 0usize;
            for c in line.chars() {
                if n == MAX_MESSAGE_LENGTH {
                    chunks.push(std::mem::take(&mut buf));
                    n = 0;
                }
                buf.push(c);
                n += 1;
            }
            current = buf;
            current_len = n;
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// Structures getUpdates (sous-ensemble utile)
#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[allow(dead_code)]
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub data: Option<String>,
    pub message: Option<Message>,
}

/// Changement de préférence extrait d'un update entrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefChange {
    Language(Lang),
    View(ViewMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefEvent {
    pub chat_id: i64,
    pub change: PrefChange,
}

impl PrefEvent {
    pub fn from_update(update: &Update) -> Option<Self> {
        if let Some(msg) = &update.message {
            let text = msg.text.as_deref()?.trim();
            return Some(Self { chat_id: msg.chat.id, change: parse_command(text)? });
        }
        if let Some(cb) = &update.callback_query {
            let chat_id = cb.message.as_ref()?.chat.id;
            let data = cb.data.as_deref()?;
            return Some(Self { chat_id, change: parse_callback(data)? });
        }
        None
    }
}

fn parse_command(text: &str) -> Option<PrefChange> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    let arg = parts.next()?;

    match command {
        "/language" | "/lang" => parse_lang(arg).map(PrefChange::Language),
        "/view" | "/mode" => parse_view(arg).map(PrefChange::View),
        _ => None,
    }
}

fn parse_callback(data: &str) -> Option<PrefChange> {
    if let Some(code) = data.strip_prefix("lang:") {
        return parse_lang(code).map(PrefChange::Language);
    }
    if let Some(code) = data.strip_prefix("view:") {
        return parse_view(code).map(PrefChange::View);
    }
    None
}

// codes stricts : un code inconnu est ignoré, pas de fallback ici
fn parse_lang(code: &str) -> Option<Lang> {
    match code {
        "en" => Some(Lang::En),
        "ru" => Some(Lang::Ru),
        _ => None,
    }
}

fn parse_view(code: &str) -> Option<ViewMode> {
    match code {
        "compact" => Some(ViewMode::Compact),
        "detailed" => Some(ViewMode::Detailed),
        _ => None,
    }
}

/// Boucle de long-poll getUpdates -> PrefStore. Les échecs réseau attendent
/// quelques secondes puis repartent, la boucle ne meurt jamais.
pub fn spawn_update_poller(client: TelegramClient, prefs: Arc<PrefStore>, cfg: Shared<MasterConfig>) {
    tokio::spawn(async move {
        println!("[telegram] écoute des changements de préférences démarrée");
        let mut offset: i64 = 0;

        loop {
            match client.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let Some(event) = PrefEvent::from_update(&update) else { continue };
                        apply_pref_event(&client, &prefs, &cfg, event).await;
                    }
                }
                Err(e) => {
                    eprintln!("[telegram] getUpdates erreur: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
}

async fn apply_pref_event(
    client: &TelegramClient,
    prefs: &PrefStore,
    cfg: &Shared<MasterConfig>,
    event: PrefEvent,
) {
    let (default_lang, default_mode) = recipient_defaults(cfg, event.chat_id);

    let confirmation = match event.change {
        PrefChange::Language(lang) => match prefs.set_language(event.chat_id, lang) {
            Ok(()) => confirmation_language(lang).to_string(),
            Err(e) => {
                eprintln!("[telegram] set_language chat {} échoué: {e}", event.chat_id);
                return;
            }
        },
        PrefChange::View(mode) => {
            let current = prefs.get_or_default(event.chat_id, default_lang, default_mode);
            match prefs.set_view_mode(event.chat_id, mode) {
                Ok(()) => confirmation_view(current.language, mode),
                Err(e) => {
                    eprintln!("[telegram] set_view_mode chat {} échoué: {e}", event.chat_id);
                    return;
                }
            }
        }
    };

    if let Err(e) = client.send_message(event.chat_id, &confirmation).await {
        eprintln!("[telegram] confirmation au chat {} échouée: {e}", event.chat_id);
    }
}

/// Défauts configurés pour un chat (En/compact si le chat n'est pas listé).
pub fn recipient_defaults(cfg: &Shared<MasterConfig>, chat_id: i64) -> (Lang, ViewMode) {
    let cfg = cfg.lock();
    cfg.recipients
        .iter()
        .find(|r| r.chat_id == chat_id)
        .map(|r| (Lang::from_code(&r.default_language), ViewMode::from_code(&r.default_view_mode)))
        .unwrap_or((Lang::En, ViewMode::Compact))
}
