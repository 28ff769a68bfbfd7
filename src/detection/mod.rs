pub mod evil_twin;
pub mod traffic;

pub use evil_twin::{mark_duplicates, EvilTwinDetector};
pub use traffic::TrafficTracker;

use crate::config::TrafficConfig;
use crate::models::{AccessPoint, Alert, DataFlag};

/// Flag APs whose cumulative counter is far above the cycle median. A crude
/// in-snapshot heuristic, independent of the cross-cycle delta tiers.
pub fn apply_data_flags(aps: &mut [AccessPoint], config: &TrafficConfig) {
    let Some(median) = data_median(aps) else {
        return;
    };

    for ap in aps.iter_mut() {
        let data = ap.data as f64;
        ap.data_flag = if data > config.flag_high_ratio * median && ap.data > config.flag_high_min {
            DataFlag::High
        } else if data > config.flag_suspicious_ratio * median
            && ap.data > config.flag_suspicious_min
        {
            DataFlag::Suspicious
        } else {
            DataFlag::Normal
        };
    }
}

fn data_median(aps: &[AccessPoint]) -> Option<f64> {
    if aps.is_empty() {
        return None;
    }

    let mut values: Vec<i64> = aps.iter().map(|ap| ap.data).collect();
    values.sort_unstable();

    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) as f64 / 2.0
    } else {
        values[mid] as f64
    };

    Some(median)
}

/// Merge the two detector outputs into the cycle's alert list. Evil-twin
/// findings lead, traffic findings follow in AP order.
pub fn aggregate(evil_twin: Vec<Alert>, traffic: Vec<Alert>) -> Vec<Alert> {
    let mut alerts = evil_twin;
    alerts.extend(traffic);
    alerts
}

/// Copy each alert onto every AP it names, for per-AP drill-down views.
pub fn attach_alerts(aps: &mut [AccessPoint], alerts: &[Alert]) {
    for ap in aps.iter_mut() {
        ap.alerts = alerts
            .iter()
            .filter(|a| a.mentions(&ap.bssid))
            .cloned()
            .collect();
    }
}
