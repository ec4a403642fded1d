/**
 * AGRÉGATEUR - Vue consolidée des derniers rapports par noeud
 *
 * RÔLE : Transformer un snapshot du NodeStateStore en vue ordonnée et datée,
 * prête à être rendue : métadonnées d'affichage, palier par noeud, staleness,
 * compteurs et statut global du cluster.
 *
 * FONCTIONNEMENT : Fonction pure de (snapshot, config, now). L'ordre suit
 * nodes_order, puis les noeuds restants par ordre alphabétique. Un noeud
 * sans rapport, ou dont le dernier rapport dépasse node_timeout_minutes
 * (heure serveur), est rendu offline ; son dernier rapport reste consultable
 * dans le store mais n'est pas présenté comme courant.
 */
use std::collections::{BTreeSet, HashMap};
use time::{Duration, OffsetDateTime};

use crate::config::MasterConfig;
use crate::models::SpeedReport;
use crate::status::{classify, cluster_status, ClusterStatus, Tier};

/// Statut dérivé d'un noeud dans la vue agrégée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHealth {
    Ok,
    Degraded,
    Offline,
}

#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node_id: String,
    pub flag: Option<String>,
    pub display_name: Option<String>,
    pub online: bool,
    pub tier: Option<Tier>,
    pub age_minutes: Option<i64>,
    pub health: NodeHealth,
    pub report: Option<SpeedReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub ok: u32,
    pub degraded: u32,
    pub offline: u32,
}

#[derive(Debug, Clone)]
pub struct AggregatedView {
    pub generated_at: OffsetDateTime,
    pub nodes: Vec<NodeStatus>,
    pub summary: Summary,
    pub cluster: ClusterStatus,
}

/// Construit la vue agrégée depuis un snapshot cohérent du store.
pub fn build_view(
    snapshot: &HashMap<String, SpeedReport>,
    cfg: &MasterConfig,
    now: OffsetDateTime,
) -> AggregatedView {
    // noeuds connus = configurés + déjà vus
    let all_ids: BTreeSet<&str> = cfg
        .nodes_meta
        .keys()
        .map(String::as_str)
        .chain(snapshot.keys().map(String::as_str))
        .collect();

    let mut ordered: Vec<&str> = Vec::with_capacity(all_ids.len());
    for id in &cfg.nodes_order {
        if all_ids.contains(id.as_str()) && !ordered.contains(&id.as_str()) {
            ordered.push(id.as_str());
        }
    }
    // BTreeSet itère trié : le reste suit alphabétiquement
    for id in &all_ids {
        if !ordered.contains(id) {
            ordered.push(*id);
        }
    }

    let timeout = Duration::minutes(cfg.node_timeout_minutes);
    let mut nodes = Vec::with_capacity(ordered.len());
    let mut summary = Summary::default();

    for id in ordered {
        let meta = cfg.nodes_meta.get(id);
        let report = snapshot.get(id);

        let age = report.map(|r| now - r.received_at);
        let online = age.map(|a| a <= timeout).unwrap_or(false);
        let tier = if online {
            report.map(|r| classify(r.download_mbps, &cfg.thresholds))
        } else {
            None
        };

        let health = match tier {
            Some(t) if t >= Tier::Low => NodeHealth::Ok,
            Some(_) => NodeHealth::Degraded,
            None => NodeHealth::Offline,
        };
        match health {
            NodeHealth::Ok => summary.ok += 1,
            NodeHealth::Degraded => summary.degraded += 1,
            NodeHealth::Offline => summary.offline += 1,
        }

        nodes.push(NodeStatus {
            node_id: id.to_string(),
            flag: meta.and_then(|m| m.flag.clone()),
            display_name: meta.and_then(|m| m.display_name.clone()),
            online,
            tier,
            age_minutes: age.map(|a| a.whole_minutes().max(0)),
            health,
            report: if online { report.cloned() } else { None },
        });
    }

    let cluster = cluster_status(nodes.iter().map(|n| if n.online { n.tier } else { None }));

    AggregatedView { generated_at: now, nodes, summary, cluster }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeMeta, RecipientConf};

    fn test_config() -> MasterConfig {
        let yaml = r#"
api_token: "secret"
node_timeout_minutes: 60
nodes_order: ["fin", "lv"]
nodes_meta:
  fin:
    flag: "🇫🇮"
    display_name: "Helsinki"
  lv:
    flag: "🇱🇻"
    display_name: "Riga"
recipients:
  - chat_id: 1
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    fn report_at(node_id: &str, download: f64, received_at: OffsetDateTime) -> SpeedReport {
        SpeedReport {
            node_id: node_id.to_string(),
            download_mbps: download,
            upload_mbps: 40.0,
            ping_ms: 12.0,
            isp: Some("TestNet".into()),
            location: None,
            os_info: None,
            captured_at: None,
            received_at,
        }
    }

    #[test]
    fn config_order_first_then_alphabetical() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("zz".to_string(), report_at("zz", 300.0, now));
        snapshot.insert("aa".to_string(), report_at("aa", 300.0, now));
        snapshot.insert("lv".to_string(), report_at("lv", 300.0, now));
        snapshot.insert("fin".to_string(), report_at("fin", 300.0, now));

        let view = build_view(&snapshot, &cfg, now);
        let ids: Vec<&str> = view.nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["fin", "lv", "aa", "zz"]);
    }

    #[test]
    fn configured_node_without_report_is_offline() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let view = build_view(&HashMap::new(), &cfg, now);

        assert_eq!(view.nodes.len(), 2);
        for n in &view.nodes {
            assert!(!n.online);
            assert_eq!(n.health, NodeHealth::Offline);
            assert!(n.tier.is_none());
            assert!(n.report.is_none());
        }
        assert_eq!(view.summary.offline, 2);
        assert_eq!(view.cluster, ClusterStatus::Degraded);
    }

    #[test]
    fn report_past_timeout_is_offline_but_retained_age() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("fin".to_string(), report_at("fin", 900.0, now - Duration::minutes(61)));

        let view = build_view(&snapshot, &cfg, now);
        let fin = view.nodes.iter().find(|n| n.node_id == "fin").unwrap();
        assert!(!fin.online);
        assert_eq!(fin.health, NodeHealth::Offline);
        assert_eq!(fin.age_minutes, Some(61));
    }

    #[test]
    fn report_within_timeout_is_online_with_tier() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("fin".to_string(), report_at("fin", 600.0, now - Duration::minutes(5)));
        snapshot.insert("lv".to_string(), report_at("lv", 10.0, now));

        let view = build_view(&snapshot, &cfg, now);
        let fin = view.nodes.iter().find(|n| n.node_id == "fin").unwrap();
        let lv = view.nodes.iter().find(|n| n.node_id == "lv").unwrap();

        assert_eq!(fin.tier, Some(Tier::Medium));
        assert_eq!(fin.health, NodeHealth::Ok);
        assert_eq!(fin.age_minutes, Some(5));

        // 10 Mbps : sous toutes les bornes -> VeryLow -> degraded
        assert_eq!(lv.tier, Some(Tier::VeryLow));
        assert_eq!(lv.health, NodeHealth::Degraded);

        assert_eq!(view.summary, Summary { ok: 1, degraded: 1, offline: 0 });
        assert_eq!(view.cluster, ClusterStatus::Degraded);
    }

    #[test]
    fn all_fresh_and_fast_cluster_is_ok() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("fin".to_string(), report_at("fin", 1200.0, now));
        snapshot.insert("lv".to_string(), report_at("lv", 800.0, now));

        let view = build_view(&snapshot, &cfg, now);
        assert_eq!(view.cluster, ClusterStatus::Ok);
        assert_eq!(view.summary, Summary { ok: 2, degraded: 0, offline: 0 });
    }

    #[test]
    fn unknown_node_appears_after_configured_ones() {
        let cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("mystery".to_string(), report_at("mystery", 500.0, now));

        let view = build_view(&snapshot, &cfg, now);
        let ids: Vec<&str> = view.nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["fin", "lv", "mystery"]);

        let mystery = view.nodes.last().unwrap();
        assert!(mystery.flag.is_none());
        assert!(mystery.display_name.is_none());
        assert!(mystery.online);
    }

    #[test]
    fn recipient_conf_is_untouched_by_view_building() {
        // la vue ne dépend pas des recipients : même entrée, même sortie
        let mut cfg = test_config();
        let now = OffsetDateTime::now_utc();
        let mut snapshot = HashMap::new();
        snapshot.insert("fin".to_string(), report_at("fin", 600.0, now));

        let a = build_view(&snapshot, &cfg, now);
        cfg.recipients.push(RecipientConf {
            chat_id: 42,
            default_language: "ru".into(),
            default_view_mode: "detailed".into(),
        });
        cfg.nodes_meta.insert(
            "extra".into(),
            NodeMeta { flag: None, display_name: Some("Extra".into()) },
        );
        let b = build_view(&snapshot, &cfg, now);
        // le noeud ajouté apparaît, mais fin est identique
        assert_eq!(a.nodes[0].tier, b.nodes[0].tier);
        assert_eq!(b.nodes.len(), a.nodes.len() + 1);
    }
}
