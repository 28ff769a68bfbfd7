use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rolling traffic state for one access point, keyed by BSSID.
#[derive(Debug, Clone)]
struct BaselineState {
    /// Counter reading from the previous cycle
    previous_data: i64,
    /// Recent positive deltas, oldest first
    history: Vec<i64>,
    /// When this AP last produced a surviving alert
    last_alert_time: Option<Instant>,
    /// Surviving alerts attributed to this AP
    alert_count: u64,
    /// Last cycle in which this AP appeared
    last_seen: Instant,
}

/// What one observation yielded: the per-cycle delta and the baseline that
/// was valid before this sample was folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficObservation {
    pub delta: i64,
    pub baseline: Option<f64>,
}

/// Tracks per-AP traffic baselines across cycles. Single-writer: only the
/// scan loop mutates entries, once per AP per cycle.
pub struct TopologyRegistry {
    entries: HashMap<String, BaselineState>,
    history_depth: usize,
    min_samples: usize,
}

impl TopologyRegistry {
    pub fn new(history_depth: usize, min_samples: usize) -> Self {
        Self {
            entries: HashMap::new(),
            history_depth,
            min_samples,
        }
    }

    /// Fold one cycle's counter reading into the AP's state. The returned
    /// baseline excludes the current delta, so a burst is compared against
    /// what came before it.
    pub fn observe(&mut self, bssid: &str, data: i64, now: Instant) -> TrafficObservation {
        let key = bssid.to_lowercase();

        let state = self.entries.entry(key).or_insert_with(|| BaselineState {
            // First sighting: previous equals current so the delta starts at
            // zero instead of the AP's lifetime counter
            previous_data: data,
            history: Vec::new(),
            last_alert_time: None,
            alert_count: 0,
            last_seen: now,
        });

        state.last_seen = now;

        let delta = (data - state.previous_data).max(0);
        state.previous_data = data;

        let baseline = if state.history.len() >= self.min_samples {
            let sum: i64 = state.history.iter().sum();
            Some(sum as f64 / state.history.len() as f64)
        } else {
            None
        };

        if delta > 0 {
            state.history.push(delta);
            if state.history.len() > self.history_depth {
                state.history.remove(0);
            }
        }

        TrafficObservation { delta, baseline }
    }

    /// Record that an alert for this AP survived throttling.
    pub fn record_alert(&mut self, bssid: &str, now: Instant) {
        if let Some(state) = self.entries.get_mut(&bssid.to_lowercase()) {
            state.last_alert_time = Some(now);
            state.alert_count += 1;
        }
    }

    /// Whether a non-critical alert for this AP should be suppressed.
    pub fn throttled(&self, bssid: &str, now: Instant, window: Duration) -> bool {
        self.entries
            .get(&bssid.to_lowercase())
            .and_then(|s| s.last_alert_time)
            .map(|last| now.saturating_duration_since(last) < window)
            .unwrap_or(false)
    }

    /// Number of surviving alerts attributed to this AP.
    pub fn alert_count(&self, bssid: &str) -> u64 {
        self.entries
            .get(&bssid.to_lowercase())
            .map(|s| s.alert_count)
            .unwrap_or(0)
    }

    /// Drop entries for APs not seen within `max_age`. Safe because a
    /// re-appearing AP starts over with a zero delta.
    pub fn prune(&mut self, now: Instant, max_age: Duration) {
        let before = self.entries.len();
        self.entries
            .retain(|_, s| now.saturating_duration_since(s.last_seen) < max_age);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Pruned stale baseline entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
