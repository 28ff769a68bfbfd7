use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name substituted for networks that broadcast an empty ESSID.
/// Detection logic must treat this sentinel as "not a real network name".
pub const HIDDEN_ESSID: &str = "Hidden";

/// A client device observed associated with an access point.
///
/// Stations live only for the duration of one parsed snapshot; they are
/// rebuilt from scratch every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub mac: String,
    /// Signal power in dBm (-100 when the capture did not report one)
    pub power: i32,
}

impl Station {
    pub fn new(mac: impl Into<String>, power: i32) -> Self {
        Self {
            mac: mac.into(),
            power,
        }
    }
}

/// Per-AP traffic flag derived from the cycle-median heuristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFlag {
    #[default]
    Normal,
    Suspicious,
    High,
}

impl std::fmt::Display for DataFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFlag::Normal => write!(f, "normal"),
            DataFlag::Suspicious => write!(f, "suspicious"),
            DataFlag::High => write!(f, "high"),
        }
    }
}

/// Outcome of one scan cycle, carried on every published payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Capture source found and at least one access point parsed
    Success,
    /// Capture source found but it yielded zero access points
    NoData,
    /// No capture source available
    NoCsv,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStatus::Success => write!(f, "success"),
            ScanStatus::NoData => write!(f, "no_data"),
            ScanStatus::NoCsv => write!(f, "no_csv"),
        }
    }
}

/// Alert severity, ordered lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert kind plus the context fields relevant to that kind.
///
/// Serializes with a `type` tag so dashboard consumers can switch on
/// `alert.type` (`evil_twin_confirmed`, `high_traffic`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    EvilTwinConfirmed {
        essid: String,
        bssids: Vec<String>,
        channels: Vec<String>,
        power_range: (i32, i32),
        score: u32,
        indicators: Vec<String>,
    },
    EvilTwinSuspicious {
        essid: String,
        bssids: Vec<String>,
        channels: Vec<String>,
        power_range: (i32, i32),
        score: u32,
        indicators: Vec<String>,
    },
    CriticalTraffic {
        bssid: String,
        essid: String,
        delta: i64,
        baseline: Option<f64>,
    },
    TrafficSpike {
        bssid: String,
        essid: String,
        delta: i64,
        baseline: Option<f64>,
    },
    HighTraffic {
        bssid: String,
        essid: String,
        delta: i64,
        baseline: Option<f64>,
    },
    SuspiciousTraffic {
        bssid: String,
        essid: String,
        delta: i64,
        baseline: Option<f64>,
    },
}

impl AlertKind {
    /// Wire name of this kind, matching the serde tag
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::EvilTwinConfirmed { .. } => "evil_twin_confirmed",
            AlertKind::EvilTwinSuspicious { .. } => "evil_twin_suspicious",
            AlertKind::CriticalTraffic { .. } => "critical_traffic",
            AlertKind::TrafficSpike { .. } => "traffic_spike",
            AlertKind::HighTraffic { .. } => "high_traffic",
            AlertKind::SuspiciousTraffic { .. } => "suspicious_traffic",
        }
    }
}

/// An alert emitted for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(flatten)]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Whether this alert references the given access point
    pub fn mentions(&self, bssid: &str) -> bool {
        match &self.kind {
            AlertKind::EvilTwinConfirmed { bssids, .. }
            | AlertKind::EvilTwinSuspicious { bssids, .. } => {
                bssids.iter().any(|b| b.eq_ignore_ascii_case(bssid))
            }
            AlertKind::CriticalTraffic { bssid: b, .. }
            | AlertKind::TrafficSpike { bssid: b, .. }
            | AlertKind::HighTraffic { bssid: b, .. }
            | AlertKind::SuspiciousTraffic { bssid: b, .. } => b.eq_ignore_ascii_case(bssid),
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.message)
    }
}

/// One observed wireless network, rebuilt every cycle from the parsed
/// snapshot. The cross-cycle fields (`delta_data`, `baseline`) are filled
/// in from the TopologyRegistry before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// MAC as reported by the capture; unique within a snapshot when
    /// compared case-insensitively
    pub bssid: String,
    pub essid: String,
    /// Channel as reported by the capture, kept verbatim
    pub channel: String,
    pub privacy: String,
    /// Signal power in dBm
    pub power: i32,
    /// Cumulative data-packet counter as reported this cycle
    pub data: i64,
    /// Counter increase since the previous cycle, never negative
    #[serde(default)]
    pub delta_data: i64,
    /// Rolling average of recent deltas, absent until enough samples exist
    #[serde(default)]
    pub baseline: Option<f64>,
    #[serde(default)]
    pub clients: Vec<Station>,
    #[serde(default)]
    pub possible_evil_twin: bool,
    #[serde(default)]
    pub data_flag: DataFlag,
    /// Alerts attached this cycle that reference this AP
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl AccessPoint {
    pub fn new(
        bssid: impl Into<String>,
        essid: impl Into<String>,
        channel: impl Into<String>,
        privacy: impl Into<String>,
        power: i32,
        data: i64,
    ) -> Self {
        Self {
            bssid: bssid.into(),
            essid: essid.into(),
            channel: channel.into(),
            privacy: privacy.into(),
            power,
            data,
            delta_data: 0,
            baseline: None,
            clients: Vec::new(),
            possible_evil_twin: false,
            data_flag: DataFlag::Normal,
            alerts: Vec::new(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.essid == HIDDEN_ESSID
    }

    pub fn has_clients(&self) -> bool {
        !self.clients.is_empty()
    }
}

/// Payload pushed to subscribers on every emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    #[serde(rename = "aps")]
    pub access_points: Vec<AccessPoint>,
    pub timestamp: DateTime<Utc>,
    pub total_networks: usize,
    pub total_clients: usize,
    pub status: ScanStatus,
    /// Cycle alerts: evil-twin alerts first, then traffic alerts in AP order
    pub alerts: Vec<Alert>,
}

impl SnapshotPayload {
    pub fn new(access_points: Vec<AccessPoint>, status: ScanStatus, alerts: Vec<Alert>) -> Self {
        let total_networks = access_points.len();
        let total_clients = access_points.iter().map(|ap| ap.clients.len()).sum();

        Self {
            access_points,
            timestamp: Utc::now(),
            total_networks,
            total_clients,
            status,
            alerts,
        }
    }

    pub fn empty(status: ScanStatus) -> Self {
        Self::new(Vec::new(), status, Vec::new())
    }
}
