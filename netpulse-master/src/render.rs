/**
 * RENDU DES DIGESTS - Mise en forme Telegram (HTML) des vues agrégées
 *
 * RÔLE : Fonction pure (vue, langue, mode) -> texte. La langue ne change que
 * la table de libellés, jamais les données ni la structure ; des entrées
 * identiques produisent un texte identique à l'octet près.
 *
 * FONCTIONNEMENT :
 * - compact  : une ligne par noeud (drapeau, nom, débits, ping, palier)
 * - detailed : bannière cluster en tête puis un bloc complet par noeud
 *   avec l'âge de la mesure ("last seen N min ago") ou le marqueur stale.
 * Langue inconnue -> anglais, jamais d'échec.
 */
use serde::{Deserialize, Serialize};
use time::macros::format_description;

use crate::aggregator::{AggregatedView, NodeStatus};
use crate::status::{ClusterStatus, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Ru,
}

impl Lang {
    /// Code inconnu -> langue par défaut (en), jamais d'erreur.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ru" => Lang::Ru,
            _ => Lang::En,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ru => "ru",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Compact,
    Detailed,
}

impl ViewMode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "detailed" => ViewMode::Detailed,
            _ => ViewMode::Compact,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            ViewMode::Compact => "compact",
            ViewMode::Detailed => "detailed",
        }
    }
}

struct Labels {
    header: &'static str,
    download: &'static str,
    upload: &'static str,
    ping: &'static str,
    status: &'static str,
    isp: &'static str,
    location: &'static str,
    os: &'static str,
    offline: &'static str,
    stale: &'static str,
    cluster_ok: &'static str,
    cluster_degraded: &'static str,
    tier_very_low: &'static str,
    tier_low: &'static str,
    tier_medium: &'static str,
    tier_good: &'static str,
    tier_excellent: &'static str,
    language_set: &'static str,
    view_set: &'static str,
}

static EN: Labels = Labels {
    header: "📊 Internet Speed Report",
    download: "Download",
    upload: "Upload",
    ping: "Ping",
    status: "Status",
    isp: "ISP",
    location: "Location",
    os: "OS",
    offline: "No data",
    stale: "stale",
    cluster_ok: "Good",
    cluster_degraded: "Degraded",
    tier_very_low: "Very Low",
    tier_low: "Low",
    tier_medium: "Normal",
    tier_good: "Good",
    tier_excellent: "Excellent",
    language_set: "Language updated: English",
    view_set: "View mode updated",
};

static RU: Labels = Labels {
    header: "📊 Отчет о скорости интернета",
    download: "Загрузка",
    upload: "Отдача",
    ping: "Пинг",
    status: "Статус",
    isp: "Провайдер",
    location: "Локация",
    os: "ОС",
    offline: "Нет данных",
    stale: "устарело",
    cluster_ok: "Хорошо",
    cluster_degraded: "Просадка",
    tier_very_low: "Очень низко",
    tier_low: "Низко",
    tier_medium: "Нормально",
    tier_good: "Хорошо",
    tier_excellent: "Отлично",
    language_set: "Язык обновлён: Русский",
    view_set: "Режим отображения обновлён",
};

fn labels(lang: Lang) -> &'static Labels {
    match lang {
        Lang::En => &EN,
        Lang::Ru => &RU,
    }
}

pub fn tier_label(tier: Tier, lang: Lang) -> &'static str {
    let l = labels(lang);
    match tier {
        Tier::VeryLow => l.tier_very_low,
        Tier::Low => l.tier_low,
        Tier::Medium => l.tier_medium,
        Tier::Good => l.tier_good,
        Tier::Excellent => l.tier_excellent,
    }
}

pub fn confirmation_language(lang: Lang) -> &'static str {
    labels(lang).language_set
}

pub fn confirmation_view(lang: Lang, mode: ViewMode) -> String {
    format!("{}: {}", labels(lang).view_set, mode.as_code())
}

pub fn format_speed(speed_mbps: f64) -> String {
    if speed_mbps >= 1000.0 {
        format!("{:.2} Gbps", speed_mbps / 1000.0)
    } else {
        format!("{:.2} Mbps", speed_mbps)
    }
}

pub fn format_ping(ping_ms: f64) -> String {
    format!("{:.2} ms", ping_ms)
}

fn last_seen(lang: Lang, minutes: i64) -> String {
    match lang {
        Lang::En => format!("last seen {minutes} min ago"),
        Lang::Ru => format!("последний раз {minutes} мин назад"),
    }
}

fn header_line(view: &AggregatedView, lang: Lang) -> String {
    let hm = format_description!("[hour]:[minute]");
    let clock = view.generated_at.format(&hm).unwrap_or_default();
    format!("<b>{}</b> ({clock})", labels(lang).header)
}

fn node_name(node: &NodeStatus) -> (&str, &str) {
    let flag = node.flag.as_deref().unwrap_or("🛰️");
    let name = node.display_name.as_deref().unwrap_or(&node.node_id);
    (flag, name)
}

/// Point d'entrée unique du rendu.
pub fn render_digest(view: &AggregatedView, lang: Lang, mode: ViewMode) -> String {
    match mode {
        ViewMode::Compact => render_compact(view, lang),
        ViewMode::Detailed => render_detailed(view, lang),
    }
}

fn render_compact(view: &AggregatedView, lang: Lang) -> String {
    let l = labels(lang);
    let mut lines = vec![header_line(view, lang), String::new()];

    for node in &view.nodes {
        let (flag, name) = node_name(node);
        match &node.report {
            Some(r) => {
                let tier = node.tier.unwrap_or(Tier::VeryLow);
                lines.push(format!(
                    "{flag} {name} — {:.0} / {:.0} Mbps, ping {:.1} ms — {} {}",
                    r.download_mbps,
                    r.upload_mbps,
                    r.ping_ms,
                    tier.emoji(),
                    tier_label(tier, lang),
                ));
            }
            None => lines.push(format!("{flag} {name} — {} 🔴", l.offline)),
        }
    }

    lines.join("\n")
}

fn render_detailed(view: &AggregatedView, lang: Lang) -> String {
    let l = labels(lang);
    let banner = match view.cluster {
        ClusterStatus::Ok => format!("✅ <b>{}:</b> {}", l.status, l.cluster_ok),
        ClusterStatus::Degraded => format!("⚠️ <b>{}:</b> {}", l.status, l.cluster_degraded),
    };
    let counts = format!(
        "✅ {} · ⚠️ {} · 🔴 {}",
        view.summary.ok, view.summary.degraded, view.summary.offline
    );

    let mut lines = vec![header_line(view, lang), banner, counts, String::new()];

    for (i, node) in view.nodes.iter().enumerate() {
        let (flag, name) = node_name(node);
        lines.push(format!("<b>{flag} {name}</b>"));

        match &node.report {
            Some(r) => {
                let tier = node.tier.unwrap_or(Tier::VeryLow);
                lines.push(format!("⬇️ {}: {}", l.download, format_speed(r.download_mbps)));
                lines.push(format!("⬆️ {}: {}", l.upload, format_speed(r.upload_mbps)));
                lines.push(format!("📡 {}: {}", l.ping, format_ping(r.ping_ms)));
                lines.push(format!("📈 {}: {} {}", l.status, tier.emoji(), tier_label(tier, lang)));
                if let Some(isp) = &r.isp {
                    lines.push(format!("🏢 {}: {}", l.isp, isp));
                }
                if let Some(location) = &r.location {
                    lines.push(format!("🌍 {}: {}", l.location, location));
                }
                if let Some(os_info) = &r.os_info {
                    lines.push(format!("💻 {}: {}", l.os, os_info));
                }
                if let Some(age) = node.age_minutes {
                    lines.push(format!("🕐 {}", last_seen(lang, age)));
                }
            }
            None => match node.age_minutes {
                // un rapport existe mais a dépassé la fenêtre de staleness
                Some(_) => lines.push(format!("🔴 {} ({})", l.offline, l.stale)),
                None => lines.push(format!("🔴 {}", l.offline)),
            },
        }

        if i + 1 < view.nodes.len() {
            lines.push(String::new());
            lines.push("———".to_string());
            lines.push(String::new());
        }
    }

    lines.join("\n")
}
