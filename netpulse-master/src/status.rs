use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

/// Palier de débit, ordonné du pire au meilleur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    VeryLow,
    Low,
    Medium,
    Good,
    Excellent,
}

impl Tier {
    pub fn emoji(self) -> &'static str {
        match self {
            Tier::VeryLow => "🚨",
            Tier::Low => "🐌",
            Tier::Medium => "🚗",
            Tier::Good => "👍",
            Tier::Excellent => "🚀",
        }
    }
}

/// Statut global du cluster, réduit depuis les statuts par noeud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Ok,
    Degraded,
}

/// Sélectionne le palier dont la borne inférieure la plus haute est couverte
/// par le débit descendant. En dessous de toutes les bornes : VeryLow.
/// Upload et ping sont affichés mais n'entrent pas dans le classement.
pub fn classify(download_mbps: f64, t: &Thresholds) -> Tier {
    let mut tier = Tier::VeryLow;
    for (bound, candidate) in [
        (t.very_low, Tier::VeryLow),
        (t.low, Tier::Low),
        (t.medium, Tier::Medium),
        (t.good, Tier::Good),
        (t.excellent, Tier::Excellent),
    ] {
        if download_mbps >= bound {
            tier = candidate;
        }
    }
    tier
}

/// Réduction binaire : Degraded dès qu'un noeud est stale (None) ou sous le
/// palier Low. Indépendant de l'ordre des entrées.
pub fn cluster_status<I>(tiers: I) -> ClusterStatus
where
    I: IntoIterator<Item = Option<Tier>>,
{
    for tier in tiers {
        match tier {
            None => return ClusterStatus::Degraded,
            Some(t) if t < Tier::Low => return ClusterStatus::Degraded,
            Some(_) => {}
        }
    }
    ClusterStatus::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Thresholds {
        Thresholds { very_low: 50.0, low: 200.0, medium: 500.0, good: 1000.0, excellent: 2000.0 }
    }

    #[test]
    fn picks_greatest_satisfied_lower_bound() {
        let t = table();
        // 120.4 couvre la borne 50 mais pas 200
        assert_eq!(classify(120.4, &t), Tier::VeryLow);
        assert_eq!(classify(250.0, &t), Tier::Low);
        assert_eq!(classify(600.0, &t), Tier::Medium);
        assert_eq!(classify(1500.0, &t), Tier::Good);
        assert_eq!(classify(2500.0, &t), Tier::Excellent);
    }

    #[test]
    fn below_every_bound_is_very_low() {
        assert_eq!(classify(0.0, &table()), Tier::VeryLow);
        assert_eq!(classify(49.9, &table()), Tier::VeryLow);
    }

    #[test]
    fn bound_equality_counts_as_met() {
        let t = table();
        assert_eq!(classify(200.0, &t), Tier::Low);
        assert_eq!(classify(2000.0, &t), Tier::Excellent);
    }

    #[test]
    fn classify_is_monotonic_in_download() {
        let t = table();
        let samples = [0.0, 10.0, 49.9, 50.0, 120.4, 199.9, 200.0, 450.0, 500.0, 999.0, 1000.0, 1999.0, 2000.0, 9000.0];
        let mut last = classify(samples[0], &t);
        for d in samples {
            let tier = classify(d, &t);
            assert!(tier >= last, "tier a régressé à {d} Mbps");
            last = tier;
        }
    }

    #[test]
    fn tier_ordering() {
        assert!(Tier::VeryLow < Tier::Low);
        assert!(Tier::Low < Tier::Medium);
        assert!(Tier::Medium < Tier::Good);
        assert!(Tier::Good < Tier::Excellent);
    }

    #[test]
    fn cluster_ok_when_all_fresh_and_low_or_better() {
        let s = cluster_status([Some(Tier::Low), Some(Tier::Excellent), Some(Tier::Medium)]);
        assert_eq!(s, ClusterStatus::Ok);
    }

    #[test]
    fn cluster_degraded_on_stale_node() {
        let s = cluster_status([Some(Tier::Excellent), None]);
        assert_eq!(s, ClusterStatus::Degraded);
    }

    #[test]
    fn cluster_degraded_below_low() {
        let s = cluster_status([Some(Tier::VeryLow), Some(Tier::Good)]);
        assert_eq!(s, ClusterStatus::Degraded);
    }

    #[test]
    fn cluster_is_order_independent() {
        let a = cluster_status([Some(Tier::Good), None, Some(Tier::Low)]);
        let b = cluster_status([None, Some(Tier::Low), Some(Tier::Good)]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_cluster_is_ok() {
        assert_eq!(cluster_status([]), ClusterStatus::Ok);
    }
}
