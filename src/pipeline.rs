use crate::capture::CaptureLocator;
use crate::config::Config;
use crate::detection::{self, EvilTwinDetector, TrafficTracker};
use crate::models::{ScanStatus, SnapshotPayload};
use crate::parser::SnapshotParser;
use crate::registry::TopologyRegistry;
use crate::stream::SnapshotDiffer;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, warn};

/// What one cycle produced and whether the differ wants it pushed.
pub struct CycleOutcome {
    pub payload: SnapshotPayload,
    pub emit: bool,
}

/// The full per-cycle path: locate capture, parse, annotate, detect,
/// aggregate, diff. Owns all cross-cycle state; exactly one caller drives it.
pub struct ReconPipeline {
    config: Config,
    parser: SnapshotParser,
    locator: CaptureLocator,
    evil_twin: EvilTwinDetector,
    traffic: TrafficTracker,
    registry: TopologyRegistry,
    differ: SnapshotDiffer,
    cycles: u64,
}

impl ReconPipeline {
    pub fn new(config: Config) -> Self {
        let locator = CaptureLocator::new(
            config.capture.dir.clone(),
            config.capture.prefix.clone(),
            config.capture.extension.clone(),
        );
        let evil_twin = EvilTwinDetector::new(config.detection.clone());
        let traffic = TrafficTracker::new(config.traffic.clone());
        let registry = TopologyRegistry::new(
            config.traffic.history_depth,
            config.traffic.min_baseline_samples,
        );
        let differ = SnapshotDiffer::new(
            config.stream.heartbeat_cycles,
            config.stream.idle_heartbeat_cycles,
        );

        Self {
            config,
            parser: SnapshotParser::new(),
            locator,
            evil_twin,
            traffic,
            registry,
            differ,
            cycles: 0,
        }
    }

    /// Completed cycle count since startup.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle. Mutates baseline state exactly once per AP, so
    /// the caller must not invoke this more often than the polling period.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.cycles += 1;
        let now = Instant::now();

        let payload = match self.locator.locate() {
            None => {
                debug!("No capture source present");
                SnapshotPayload::empty(ScanStatus::NoCsv)
            }
            Some(path) => {
                let raw = match std::fs::read_to_string(&path) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Capture file unreadable");
                        String::new()
                    }
                };
                self.annotate(&raw, now)
            }
        };

        self.registry.prune(now, self.config.traffic.stale_window());

        let emit = self.differ.should_emit(&payload, self.cycles)?;

        debug!(
            cycle = self.cycles,
            networks = payload.total_networks,
            alerts = payload.alerts.len(),
            emit,
            "Cycle complete"
        );

        Ok(CycleOutcome { payload, emit })
    }

    /// Parse and annotate one raw snapshot into a publishable payload.
    fn annotate(&mut self, raw: &str, now: Instant) -> SnapshotPayload {
        let mut aps = self.parser.parse(raw);
        if aps.is_empty() {
            return SnapshotPayload::empty(ScanStatus::NoData);
        }

        detection::mark_duplicates(&mut aps);
        detection::apply_data_flags(&mut aps, &self.config.traffic);

        let twin_alerts = self.evil_twin.detect(&aps);

        let mut traffic_alerts = Vec::new();
        for ap in aps.iter_mut() {
            if let Some(alert) = self.traffic.update(ap, &mut self.registry, now) {
                traffic_alerts.push(alert);
            }
        }

        let alerts = detection::aggregate(twin_alerts, traffic_alerts);
        detection::attach_alerts(&mut aps, &alerts);

        SnapshotPayload::new(aps, ScanStatus::Success, alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertKind;
    use std::path::Path;

    const HEADER: &str = "BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # data, LAN IP, # clients, ESSID, Key";

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::default();
        config.capture.dir = dir.to_string_lossy().to_string();
        config
    }

    fn write_snapshot(dir: &Path, rows: &[String]) {
        let mut content = format!("{}\n", HEADER);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(dir.join("scan-01.csv"), content).unwrap();
    }

    fn ap_row(
        bssid: &str,
        essid: &str,
        channel: &str,
        privacy: &str,
        power: i32,
        data: i64,
    ) -> String {
        format!(
            "{}, x, x, {}, 54, {}, CCMP, PSK, {}, 10, {}, 0.0.0.0, 0, {},",
            bssid, channel, privacy, power, data, essid
        )
    }

    #[test]
    fn test_no_source_yields_no_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = ReconPipeline::new(config_for(dir.path()));

        let outcome = pipeline.run_cycle().unwrap();
        assert_eq!(outcome.payload.status, ScanStatus::NoCsv);
        assert!(outcome.emit);
        assert_eq!(pipeline.cycles(), 1);
    }

    #[test]
    fn test_empty_snapshot_yields_no_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan-01.csv"), "").unwrap();

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        let outcome = pipeline.run_cycle().unwrap();
        assert_eq!(outcome.payload.status, ScanStatus::NoData);
    }

    #[test]
    fn test_success_cycle_with_totals() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[
                ap_row("AA:BB:CC:DD:EE:01", "Alpha", "6", "WPA2", -40, 100),
                ap_row("AA:BB:CC:DD:EE:02", "Beta", "11", "WPA2", -70, 50),
            ],
        );

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        let outcome = pipeline.run_cycle().unwrap();
        let payload = &outcome.payload;

        assert_eq!(payload.status, ScanStatus::Success);
        assert_eq!(payload.total_networks, 2);
        assert_eq!(payload.total_clients, 0);
        assert_eq!(payload.access_points[0].essid, "Alpha");
        assert!(payload.alerts.is_empty());
    }

    #[test]
    fn test_identical_cycles_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[ap_row("AA:BB:CC:DD:EE:01", "Alpha", "6", "WPA2", -40, 100)],
        );

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        assert!(pipeline.run_cycle().unwrap().emit);
        assert!(!pipeline.run_cycle().unwrap().emit);
    }

    #[test]
    fn test_evil_twin_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[
                ap_row("AA:BB:CC:DD:EE:01", "CoffeeShop", "6", "WPA2", -40, 100),
                ap_row("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "OPN", -55, 80),
            ],
        );

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        let outcome = pipeline.run_cycle().unwrap();
        let payload = &outcome.payload;

        assert_eq!(payload.alerts.len(), 1);
        assert!(matches!(
            payload.alerts[0].kind,
            AlertKind::EvilTwinConfirmed { .. }
        ));
        assert!(payload.access_points.iter().all(|ap| ap.possible_evil_twin));
        // Both APs carry the group alert for drill-down
        assert_eq!(payload.access_points[0].alerts.len(), 1);
        assert_eq!(payload.access_points[1].alerts.len(), 1);
    }

    #[test]
    fn test_traffic_burst_across_cycles() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[ap_row("AA:BB:CC:DD:EE:01", "Alpha", "6", "WPA2", -40, 1000)],
        );

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        let first = pipeline.run_cycle().unwrap();
        // First sighting carries no delta
        assert_eq!(first.payload.access_points[0].delta_data, 0);
        assert!(first.payload.alerts.is_empty());

        write_snapshot(
            dir.path(),
            &[ap_row("AA:BB:CC:DD:EE:01", "Alpha", "6", "WPA2", -40, 10_001)],
        );

        let second = pipeline.run_cycle().unwrap();
        let payload = &second.payload;
        assert!(second.emit);
        assert_eq!(payload.access_points[0].delta_data, 9001);
        assert_eq!(payload.alerts.len(), 1);
        assert!(matches!(
            payload.alerts[0].kind,
            AlertKind::CriticalTraffic { .. }
        ));
        assert_eq!(payload.access_points[0].alerts.len(), 1);
    }

    #[test]
    fn test_alert_order_twins_before_traffic() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[
                ap_row("AA:BB:CC:DD:EE:01", "CoffeeShop", "6", "WPA2", -40, 1000),
                ap_row("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "OPN", -55, 80),
            ],
        );

        let mut pipeline = ReconPipeline::new(config_for(dir.path()));
        pipeline.run_cycle().unwrap();

        write_snapshot(
            dir.path(),
            &[
                ap_row("AA:BB:CC:DD:EE:01", "CoffeeShop", "6", "WPA2", -40, 10_001),
                ap_row("AA:BB:CC:DD:EE:02", "CoffeeShop", "6", "OPN", -55, 80),
            ],
        );

        let outcome = pipeline.run_cycle().unwrap();
        let alerts = &outcome.payload.alerts;
        assert_eq!(alerts.len(), 2);
        assert!(matches!(alerts[0].kind, AlertKind::EvilTwinConfirmed { .. }));
        assert!(matches!(alerts[1].kind, AlertKind::CriticalTraffic { .. }));
    }
}
