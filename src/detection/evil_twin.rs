use crate::config::DetectionConfig;
use crate::models::{AccessPoint, Alert, AlertKind, Severity};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// All access points advertising the same (normalized) network name.
pub struct EssidGroup<'a> {
    pub essid: &'a str,
    pub members: Vec<&'a AccessPoint>,
}

impl<'a> EssidGroup<'a> {
    /// Distinct channels in first-seen order.
    fn channels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for m in &self.members {
            if seen.insert(m.channel.as_str()) {
                out.push(m.channel.clone());
            }
        }
        out
    }

    fn distinct_privacy(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.privacy.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    fn power_range(&self) -> (i32, i32) {
        let min = self.members.iter().map(|m| m.power).min().unwrap_or(0);
        let max = self.members.iter().map(|m| m.power).max().unwrap_or(0);
        (min, max)
    }

    fn members_with_clients(&self) -> usize {
        self.members.iter().filter(|m| m.has_clients()).count()
    }
}

/// One scored indicator: a label for the alert and a check returning the
/// points it contributes, or None when it does not fire.
struct TwinRule {
    label: &'static str,
    eval: fn(&EssidGroup, &DetectionConfig) -> Option<u32>,
}

static RULES: &[TwinRule] = &[
    TwinRule {
        label: "shared channel",
        eval: |g, cfg| {
            // Fewer distinct channels than members means an overlap
            (g.channels().len() < g.members.len()).then_some(cfg.shared_channel_points)
        },
    },
    TwinRule {
        label: "mixed privacy",
        eval: |g, cfg| (g.distinct_privacy() > 1).then_some(cfg.mixed_privacy_points),
    },
    TwinRule {
        label: "power spread",
        eval: |g, cfg| {
            let (min, max) = g.power_range();
            (max - min > cfg.power_spread_dbm).then_some(cfg.power_spread_points)
        },
    },
    TwinRule {
        label: "multiple APs with clients",
        eval: |g, _| {
            let k = g.members_with_clients();
            (k >= 2).then_some(k as u32)
        },
    },
    TwinRule {
        label: "generic name",
        eval: |g, cfg| {
            let name = g.essid.to_lowercase();
            cfg.generic_names
                .iter()
                .any(|generic| name.contains(generic.as_str()))
                .then_some(cfg.generic_name_points)
        },
    },
];

/// Scores duplicate-network groups against the indicator table. Holds no
/// state between cycles.
pub struct EvilTwinDetector {
    config: DetectionConfig,
}

impl EvilTwinDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Score every duplicate-name group in the snapshot and return the alerts
    /// that clear the suspect threshold.
    pub fn detect(&self, aps: &[AccessPoint]) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for group in group_by_essid(aps) {
            if group.members.len() < 2 {
                continue;
            }

            let mut score = 0u32;
            let mut indicators = Vec::new();
            for rule in RULES {
                if let Some(points) = (rule.eval)(&group, &self.config) {
                    score += points;
                    indicators.push(rule.label.to_string());
                }
            }

            if score < self.config.suspect_score {
                // Same name on two radios is normal for dual-band gear
                debug!(
                    essid = group.essid,
                    members = group.members.len(),
                    score,
                    "Duplicate network below alert threshold"
                );
                continue;
            }

            let bssids: Vec<String> = group.members.iter().map(|m| m.bssid.clone()).collect();
            let channels = group.channels();
            let power_range = group.power_range();
            let confirmed = score >= self.config.confirm_score;

            let message = if confirmed {
                format!(
                    "Evil twin confirmed for '{}': {} access points, score {} ({})",
                    group.essid,
                    group.members.len(),
                    score,
                    indicators.join(", ")
                )
            } else {
                format!(
                    "Possible evil twin for '{}': {} access points, score {} ({})",
                    group.essid,
                    group.members.len(),
                    score,
                    indicators.join(", ")
                )
            };

            let essid = group.essid.to_string();
            let (kind, severity) = if confirmed {
                (
                    AlertKind::EvilTwinConfirmed {
                        essid,
                        bssids,
                        channels,
                        power_range,
                        score,
                        indicators,
                    },
                    Severity::Critical,
                )
            } else {
                (
                    AlertKind::EvilTwinSuspicious {
                        essid,
                        bssids,
                        channels,
                        power_range,
                        score,
                        indicators,
                    },
                    Severity::Medium,
                )
            };

            alerts.push(Alert::new(kind, severity, message));
        }

        alerts
    }
}

/// Group the snapshot by normalized essid, preserving first-seen group order.
/// Hidden and empty names never group.
fn group_by_essid(aps: &[AccessPoint]) -> Vec<EssidGroup<'_>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<EssidGroup> = Vec::new();

    for ap in aps {
        let name = ap.essid.trim();
        if name.is_empty() || ap.is_hidden() {
            continue;
        }

        let key = name.to_lowercase();
        match index.get(&key) {
            Some(&i) => groups[i].members.push(ap),
            None => {
                index.insert(key, groups.len());
                groups.push(EssidGroup {
                    essid: name,
                    members: vec![ap],
                });
            }
        }
    }

    groups
}

/// Mark every AP whose name appears on more than one radio. Advisory only,
/// applied regardless of score.
pub fn mark_duplicates(aps: &mut [AccessPoint]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for ap in aps.iter() {
        let name = ap.essid.trim();
        if !name.is_empty() && !ap.is_hidden() {
            *counts.entry(name.to_lowercase()).or_insert(0) += 1;
        }
    }

    for ap in aps.iter_mut() {
        let key = ap.essid.trim().to_lowercase();
        ap.possible_evil_twin = counts.get(&key).copied().unwrap_or(0) > 1 && !ap.is_hidden();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Station;

    fn ap(bssid: &str, essid: &str, channel: &str, privacy: &str, power: i32) -> AccessPoint {
        AccessPoint::new(
            bssid.to_string(),
            essid.to_string(),
            channel.to_string(),
            privacy.to_string(),
            power,
            0,
        )
    }

    fn detector() -> EvilTwinDetector {
        EvilTwinDetector::new(DetectionConfig::default())
    }

    #[test]
    fn test_single_ap_no_alert() {
        let aps = vec![ap("AA:BB:CC:DD:EE:01", "Home", "6", "WPA2", -50)];
        assert!(detector().detect(&aps).is_empty());
    }

    #[test]
    fn test_dual_band_below_threshold() {
        // Same name on two channels, same privacy, similar power: score 0
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "Home", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "Home", "36", "WPA2", -55),
        ];
        assert!(detector().detect(&aps).is_empty());
    }

    #[test]
    fn test_shared_channel_suspicious() {
        // Shared channel alone scores 3: suspicious, not confirmed
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "CoffeeShop", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "WPA2", -55),
        ];
        let alerts = detector().detect(&aps);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Medium);
        match &alerts[0].kind {
            AlertKind::EvilTwinSuspicious {
                score, indicators, ..
            } => {
                assert_eq!(*score, 3);
                assert_eq!(indicators, &["shared channel".to_string()]);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_shared_channel_and_privacy_confirmed() {
        // Shared channel (+3) plus mixed privacy (+2) confirms
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "CoffeeShop", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "OPN", -55),
        ];
        let alerts = detector().detect(&aps);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        match &alerts[0].kind {
            AlertKind::EvilTwinConfirmed {
                score,
                indicators,
                bssids,
                channels,
                power_range,
                ..
            } => {
                assert_eq!(*score, 5);
                assert_eq!(indicators.len(), 2);
                assert_eq!(bssids.len(), 2);
                assert_eq!(channels, &["6".to_string()]);
                assert_eq!(*power_range, (-55, -50));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_client_count_scores_k() {
        let mut a = ap("AA:BB:CC:DD:EE:01", "Net", "1", "WPA2", -50);
        let mut b = ap("AA:BB:CC:DD:EE:02", "Net", "1", "WPA2", -52);
        let mut c = ap("AA:BB:CC:DD:EE:03", "Net", "1", "WPA2", -54);
        for (i, node) in [&mut a, &mut b, &mut c].into_iter().enumerate() {
            node.clients.push(Station {
                mac: format!("11:22:33:44:55:0{}", i),
                power: -60,
            });
        }
        // Shared channel (+3) and three client-bearing members (+3)
        let alerts = detector().detect(&[a, b, c]);
        assert_eq!(alerts.len(), 1);
        match &alerts[0].kind {
            AlertKind::EvilTwinConfirmed { score, .. } => assert_eq!(*score, 6),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_one_client_member_scores_nothing() {
        let mut a = ap("AA:BB:CC:DD:EE:01", "Home", "1", "WPA2", -50);
        a.clients.push(Station {
            mac: "11:22:33:44:55:66".to_string(),
            power: -60,
        });
        let b = ap("AA:BB:CC:DD:EE:02", "Home", "1", "WPA2", -52);
        let alerts = detector().detect(&[a, b]);
        // Only shared channel fires: 3 points
        match &alerts[0].kind {
            AlertKind::EvilTwinSuspicious { score, indicators, .. } => {
                assert_eq!(*score, 3);
                assert!(!indicators.iter().any(|i| i.contains("clients")));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_generic_name_point() {
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "Free WiFi Lounge", "6", "OPN", -50),
            ap("AA:BB:CC:DD:EE:02", "Free WiFi Lounge", "6", "WPA2", -90),
        ];
        // Shared channel 3 + privacy 2 + power spread 2 + generic 1 = 8
        let alerts = detector().detect(&aps);
        match &alerts[0].kind {
            AlertKind::EvilTwinConfirmed { score, indicators, .. } => {
                assert_eq!(*score, 8);
                assert!(indicators.contains(&"generic name".to_string()));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_hidden_never_grouped() {
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "Hidden", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "Hidden", "6", "OPN", -90),
        ];
        assert!(detector().detect(&aps).is_empty());
    }

    #[test]
    fn test_essid_grouping_case_insensitive() {
        let aps = vec![
            ap("AA:BB:CC:DD:EE:01", "coffeeshop", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "OPN", -55),
        ];
        let alerts = detector().detect(&aps);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_mark_duplicates() {
        let mut aps = vec![
            ap("AA:BB:CC:DD:EE:01", "Home", "6", "WPA2", -50),
            ap("AA:BB:CC:DD:EE:02", "home", "36", "WPA2", -55),
            ap("AA:BB:CC:DD:EE:03", "Other", "1", "WPA2", -60),
            ap("AA:BB:CC:DD:EE:04", "Hidden", "1", "WPA2", -60),
            ap("AA:BB:CC:DD:EE:05", "Hidden", "6", "WPA2", -62),
        ];
        mark_duplicates(&mut aps);
        assert!(aps[0].possible_evil_twin);
        assert!(aps[1].possible_evil_twin);
        assert!(!aps[2].possible_evil_twin);
        // Hidden networks are never twins of each other
        assert!(!aps[3].possible_evil_twin);
        assert!(!aps[4].possible_evil_twin);
    }
}
