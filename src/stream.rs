use crate::models::{AccessPoint, Alert, ScanStatus, SnapshotPayload};
use anyhow::Result;
use serde::Serialize;

/// The slice of a payload that counts as "changed". The per-emission
/// timestamp is excluded, so an unchanged topology compares equal.
#[derive(Serialize)]
struct CanonicalView<'a> {
    aps: &'a [AccessPoint],
    alerts: &'a [Alert],
    status: ScanStatus,
}

/// Decides which cycles get pushed to subscribers: every material change,
/// plus a periodic heartbeat so clients can tell silence from death.
pub struct SnapshotDiffer {
    last_emitted: Option<String>,
    heartbeat_cycles: u64,
    idle_heartbeat_cycles: u64,
}

impl SnapshotDiffer {
    pub fn new(heartbeat_cycles: u64, idle_heartbeat_cycles: u64) -> Self {
        Self {
            last_emitted: None,
            heartbeat_cycles: heartbeat_cycles.max(1),
            idle_heartbeat_cycles: idle_heartbeat_cycles.max(1),
        }
    }

    /// Whether this cycle's payload should be pushed. Updates the stored
    /// encoding on every emission, so equal consecutive payloads are
    /// suppressed until the next heartbeat.
    pub fn should_emit(&mut self, payload: &SnapshotPayload, cycle: u64) -> Result<bool> {
        let canonical = serde_json::to_string(&CanonicalView {
            aps: &payload.access_points,
            alerts: &payload.alerts,
            status: payload.status,
        })?;

        let cadence = match payload.status {
            ScanStatus::NoCsv => self.idle_heartbeat_cycles,
            _ => self.heartbeat_cycles,
        };

        let changed = self.last_emitted.as_deref() != Some(canonical.as_str());
        let heartbeat = cycle % cadence == 0;

        if changed || heartbeat {
            self.last_emitted = Some(canonical);
            return Ok(true);
        }

        Ok(false)
    }
}
