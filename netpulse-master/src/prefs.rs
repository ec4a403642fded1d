/**
 * PRÉFÉRENCES DESTINATAIRES - Persistance des réglages par chat
 *
 * RÔLE : Stocke {langue, mode d'affichage} pour chaque chat Telegram.
 * Matérialise la valeur par défaut au premier contact, chaque mutation est
 * écrite sur disque immédiatement : un crash entre un changement et le digest
 * suivant ne perd jamais le changement.
 *
 * FONCTIONNEMENT : Cache mémoire sous Mutex + fichier JSON write-through.
 * Le fichier est écrit avant la mise à jour du cache ; en cas d'échec d'écriture
 * le cache garde la dernière valeur réellement persistée.
 */
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use time::OffsetDateTime;

use crate::render::{Lang, ViewMode};

#[derive(Debug, thiserror::Error)]
pub enum PrefError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipientPref {
    pub chat_id: i64,
    pub language: Lang,
    pub view_mode: ViewMode,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub struct PrefStore {
    storage_path: PathBuf,
    cache: Mutex<HashMap<i64, RecipientPref>>,
}

impl PrefStore {
    /// Ouvre (ou crée) le fichier de préférences et charge le cache.
    pub fn new<P: Into<PathBuf>>(storage_path: P) -> Result<Self, PrefError> {
        let path = storage_path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !path.exists() {
            fs::write(&path, "{}")?;
        }

        let content = fs::read_to_string(&path)?;
        let prefs: HashMap<i64, RecipientPref> = serde_json::from_str(&content)?;

        println!("[prefs] {} préférence(s) chargée(s) depuis {:?}", prefs.len(), path);
        Ok(Self { storage_path: path, cache: Mutex::new(prefs) })
    }

    /// Préférences du chat ; matérialise et persiste le défaut configuré au
    /// premier contact. Ne peut pas échouer : un échec de persistance du
    /// défaut est loggé, la valeur par défaut est retournée quand même.
    pub fn get_or_default(&self, chat_id: i64, default_lang: Lang, default_mode: ViewMode) -> RecipientPref {
        let mut cache = self.cache.lock();
        if let Some(pref) = cache.get(&chat_id) {
            return pref.clone();
        }

        let now = OffsetDateTime::now_utc();
        let pref = RecipientPref {
            chat_id,
            language: default_lang,
            view_mode: default_mode,
            created_at: now,
            updated_at: now,
        };

        let mut next = cache.clone();
        next.insert(chat_id, pref.clone());
        match Self::write_file(&self.storage_path, &next) {
            Ok(()) => *cache = next,
            Err(e) => eprintln!("[prefs] persistance du défaut pour {chat_id} échouée: {e}"),
        }
        pref
    }

    pub fn set_language(&self, chat_id: i64, lang: Lang) -> Result<(), PrefError> {
        self.update(chat_id, |p| p.language = lang)
    }

    pub fn set_view_mode(&self, chat_id: i64, mode: ViewMode) -> Result<(), PrefError> {
        self.update(chat_id, |p| p.view_mode = mode)
    }

    /// Mutation sérialisée sous le lock : fichier d'abord, cache ensuite.
    /// Un échec laisse le cache sur la dernière valeur persistée.
    fn update<F: FnOnce(&mut RecipientPref)>(&self, chat_id: i64, apply: F) -> Result<(), PrefError> {
        let mut cache = self.cache.lock();
        let now = OffsetDateTime::now_utc();

        let mut pref = cache.get(&chat_id).cloned().unwrap_or(RecipientPref {
            chat_id,
            language: Lang::En,
            view_mode: ViewMode::Compact,
            created_at: now,
            updated_at: now,
        });
        apply(&mut pref);
        pref.updated_at = now;

        let mut next = cache.clone();
        next.insert(chat_id, pref);
        Self::write_file(&self.storage_path, &next)?;
        *cache = next;
        Ok(())
    }

    fn write_file(path: &PathBuf, prefs: &HashMap<i64, RecipientPref>) -> Result<(), PrefError> {
        let json = serde_json::to_string_pretty(prefs)?;
        fs::write(path, json)?;
        Ok(())
    }

    #[cfg(test)]
    fn known(&self, chat_id: i64) -> Option<RecipientPref> {
        self.cache.lock().get(&chat_id).cloned()
    }
}
