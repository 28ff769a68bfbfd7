use crate::config::TrafficConfig;
use crate::models::{AccessPoint, Alert, AlertKind, Severity};
use crate::registry::TopologyRegistry;
use std::time::Instant;
use tracing::debug;

/// Severity tiers for one cycle's traffic delta, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Critical,
    Spike,
    High,
    Suspicious,
}

struct TierRule {
    tier: Tier,
    check: fn(i64, Option<f64>, &TrafficConfig) -> bool,
}

/// Evaluated top to bottom; the first match wins. Critical and high fire on
/// the raw delta alone, spike and suspicious only against a valid baseline.
static TIERS: &[TierRule] = &[
    TierRule {
        tier: Tier::Critical,
        check: |delta, _, cfg| delta > cfg.critical_delta,
    },
    TierRule {
        tier: Tier::Spike,
        check: |delta, baseline, cfg| {
            baseline.is_some_and(|avg| {
                avg > cfg.spike_min_avg
                    && (delta as f64) > cfg.spike_ratio * avg
                    && delta > cfg.spike_min_delta
            })
        },
    },
    TierRule {
        tier: Tier::High,
        check: |delta, _, cfg| delta > cfg.high_delta,
    },
    TierRule {
        tier: Tier::Suspicious,
        check: |delta, baseline, cfg| {
            baseline.is_some_and(|avg| {
                avg > cfg.suspicious_min_avg
                    && (delta as f64) > cfg.suspicious_ratio * avg
                    && delta > cfg.suspicious_min_delta
            })
        },
    },
];

/// Classifies per-AP traffic deltas and applies the per-AP alert throttle.
/// The cross-cycle state itself lives in the TopologyRegistry.
pub struct TrafficTracker {
    config: TrafficConfig,
}

impl TrafficTracker {
    pub fn new(config: TrafficConfig) -> Self {
        Self { config }
    }

    /// Fold this cycle's counter into the AP's baseline, annotate the AP and
    /// return an alert when a tier fires and survives the throttle. Must run
    /// exactly once per AP per polling cycle.
    pub fn update(
        &self,
        ap: &mut AccessPoint,
        registry: &mut TopologyRegistry,
        now: Instant,
    ) -> Option<Alert> {
        let obs = registry.observe(&ap.bssid, ap.data, now);
        ap.delta_data = obs.delta;
        ap.baseline = obs.baseline;

        let tier = TIERS
            .iter()
            .find(|rule| (rule.check)(obs.delta, obs.baseline, &self.config))
            .map(|rule| rule.tier)?;

        let alert = self.build_alert(tier, ap, obs.delta, obs.baseline);

        if !alert.is_critical() && registry.throttled(&ap.bssid, now, self.config.throttle_window())
        {
            debug!(bssid = %ap.bssid, "Traffic alert suppressed by throttle");
            return None;
        }

        registry.record_alert(&ap.bssid, now);
        Some(alert)
    }

    fn build_alert(&self, tier: Tier, ap: &AccessPoint, delta: i64, baseline: Option<f64>) -> Alert {
        let (severity, message) = match tier {
            Tier::Critical => (
                Severity::Critical,
                format!(
                    "Critical traffic burst on {} ({}): +{} packets",
                    ap.essid, ap.bssid, delta
                ),
            ),
            Tier::Spike => (
                Severity::High,
                format!(
                    "Traffic spike on {} ({}): +{} packets against baseline {:.1}",
                    ap.essid,
                    ap.bssid,
                    delta,
                    baseline.unwrap_or(0.0)
                ),
            ),
            Tier::High => (
                Severity::High,
                format!(
                    "High traffic on {} ({}): +{} packets",
                    ap.essid, ap.bssid, delta
                ),
            ),
            Tier::Suspicious => (
                Severity::Medium,
                format!(
                    "Unusual traffic on {} ({}): +{} packets against baseline {:.1}",
                    ap.essid,
                    ap.bssid,
                    delta,
                    baseline.unwrap_or(0.0)
                ),
            ),
        };

        let bssid = ap.bssid.clone();
        let essid = ap.essid.clone();
        let kind = match tier {
            Tier::Critical => AlertKind::CriticalTraffic {
                bssid,
                essid,
                delta,
                baseline,
            },
            Tier::Spike => AlertKind::TrafficSpike {
                bssid,
                essid,
                delta,
                baseline,
            },
            Tier::High => AlertKind::HighTraffic {
                bssid,
                essid,
                delta,
                baseline,
            },
            Tier::Suspicious => AlertKind::SuspiciousTraffic {
                bssid,
                essid,
                delta,
                baseline,
            },
        };

        Alert::new(kind, severity, message)
    }
}
