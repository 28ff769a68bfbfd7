use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub ipc: IpcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            capture: CaptureConfig::default(),
            detection: DetectionConfig::default(),
            traffic: TrafficConfig::default(),
            stream: StreamConfig::default(),
            ipc: IpcConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/airsentry/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("airsentry/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Poll cadence of the scan loop
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.general.poll_interval_secs)
    }

    /// Sleep applied after a failed cycle before retrying
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.general.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seconds between scan cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to back off after a cycle error
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
            log_level: default_log_level(),
        }
    }
}

/// Where the external scanner drops its snapshot files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Directory scanned for capture snapshots
    #[serde(default = "default_capture_dir")]
    pub dir: String,

    /// Filename prefix the scanner writes (e.g. `scan` for scan-01.csv)
    #[serde(default = "default_capture_prefix")]
    pub prefix: String,

    /// Filename extension to match
    #[serde(default = "default_capture_extension")]
    pub extension: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dir: default_capture_dir(),
            prefix: default_capture_prefix(),
            extension: default_capture_extension(),
        }
    }
}

/// Evil-twin scoring thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Score at or above which a duplicate group is confirmed
    #[serde(default = "default_confirm_score")]
    pub confirm_score: u32,

    /// Score at or above which a duplicate group is suspicious
    #[serde(default = "default_suspect_score")]
    pub suspect_score: u32,

    /// Points when at least two group members share a channel
    #[serde(default = "default_shared_channel_points")]
    pub shared_channel_points: u32,

    /// Points when group members advertise different security modes
    #[serde(default = "default_mixed_privacy_points")]
    pub mixed_privacy_points: u32,

    /// Points when the group's power range exceeds `power_spread_dbm`
    #[serde(default = "default_power_spread_points")]
    pub power_spread_points: u32,

    /// Power range (max - min, dBm) treated as implausible for one deployment
    #[serde(default = "default_power_spread_dbm")]
    pub power_spread_dbm: i32,

    /// Points when the essid matches one of `generic_names`
    #[serde(default = "default_generic_name_points")]
    pub generic_name_points: u32,

    /// Generic network names often used as bait (substring match)
    #[serde(default = "default_generic_names")]
    pub generic_names: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confirm_score: default_confirm_score(),
            suspect_score: default_suspect_score(),
            shared_channel_points: default_shared_channel_points(),
            mixed_privacy_points: default_mixed_privacy_points(),
            power_spread_points: default_power_spread_points(),
            power_spread_dbm: default_power_spread_dbm(),
            generic_name_points: default_generic_name_points(),
            generic_names: default_generic_names(),
        }
    }
}

/// Traffic-delta tier thresholds and throttle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Delta above which an alert is critical regardless of baseline
    #[serde(default = "default_critical_delta")]
    pub critical_delta: i64,

    /// Delta above which an alert is high regardless of baseline
    #[serde(default = "default_high_delta")]
    pub high_delta: i64,

    /// Spike tier: delta must exceed ratio x baseline average
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,

    /// Spike tier: minimum absolute delta
    #[serde(default = "default_spike_min_delta")]
    pub spike_min_delta: i64,

    /// Spike tier: minimum baseline average
    #[serde(default = "default_spike_min_avg")]
    pub spike_min_avg: f64,

    /// Suspicious tier: delta must exceed ratio x baseline average
    #[serde(default = "default_suspicious_ratio")]
    pub suspicious_ratio: f64,

    /// Suspicious tier: minimum absolute delta
    #[serde(default = "default_suspicious_min_delta")]
    pub suspicious_min_delta: i64,

    /// Suspicious tier: minimum baseline average
    #[serde(default = "default_suspicious_min_avg")]
    pub suspicious_min_avg: f64,

    /// Delta samples kept per AP for the rolling average
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Samples required before a baseline average is considered valid
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: usize,

    /// Seconds during which repeat non-critical alerts are suppressed
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,

    /// Seconds after which an unseen AP's baseline entry is retired
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Cycle-median flag: high when data > ratio x median
    #[serde(default = "default_flag_high_ratio")]
    pub flag_high_ratio: f64,

    /// Cycle-median flag: high also requires data above this floor
    #[serde(default = "default_flag_high_min")]
    pub flag_high_min: i64,

    /// Cycle-median flag: suspicious when data > ratio x median
    #[serde(default = "default_flag_suspicious_ratio")]
    pub flag_suspicious_ratio: f64,

    /// Cycle-median flag: suspicious also requires data above this floor
    #[serde(default = "default_flag_suspicious_min")]
    pub flag_suspicious_min: i64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            critical_delta: default_critical_delta(),
            high_delta: default_high_delta(),
            spike_ratio: default_spike_ratio(),
            spike_min_delta: default_spike_min_delta(),
            spike_min_avg: default_spike_min_avg(),
            suspicious_ratio: default_suspicious_ratio(),
            suspicious_min_delta: default_suspicious_min_delta(),
            suspicious_min_avg: default_suspicious_min_avg(),
            history_depth: default_history_depth(),
            min_baseline_samples: default_min_baseline_samples(),
            throttle_secs: default_throttle_secs(),
            stale_after_secs: default_stale_after(),
            flag_high_ratio: default_flag_high_ratio(),
            flag_high_min: default_flag_high_min(),
            flag_suspicious_ratio: default_flag_suspicious_ratio(),
            flag_suspicious_min: default_flag_suspicious_min(),
        }
    }
}

impl TrafficConfig {
    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Emission cadence for the snapshot stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Heartbeat every N cycles while a capture source is present
    #[serde(default = "default_heartbeat_cycles")]
    pub heartbeat_cycles: u64,

    /// Heartbeat every N cycles while no capture source exists
    #[serde(default = "default_idle_heartbeat_cycles")]
    pub idle_heartbeat_cycles: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_cycles: default_heartbeat_cycles(),
            idle_heartbeat_cycles: default_idle_heartbeat_cycles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Unix socket the event server listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

// Default value functions

fn default_poll_interval() -> u64 {
    30
}

fn default_error_backoff() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capture_dir() -> String {
    "/var/lib/airsentry/captures".to_string()
}

fn default_capture_prefix() -> String {
    "scan".to_string()
}

fn default_capture_extension() -> String {
    ".csv".to_string()
}

fn default_confirm_score() -> u32 {
    5
}

fn default_suspect_score() -> u32 {
    3
}

fn default_shared_channel_points() -> u32 {
    3
}

fn default_mixed_privacy_points() -> u32 {
    2
}

fn default_power_spread_points() -> u32 {
    2
}

fn default_power_spread_dbm() -> i32 {
    30
}

fn default_generic_name_points() -> u32 {
    1
}

fn default_generic_names() -> Vec<String> {
    ["free wifi", "guest", "hotspot", "staff", "public wifi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_critical_delta() -> i64 {
    8000
}

fn default_high_delta() -> i64 {
    2000
}

fn default_spike_ratio() -> f64 {
    15.0
}

fn default_spike_min_delta() -> i64 {
    500
}

fn default_spike_min_avg() -> f64 {
    20.0
}

fn default_suspicious_ratio() -> f64 {
    5.0
}

fn default_suspicious_min_delta() -> i64 {
    300
}

fn default_suspicious_min_avg() -> f64 {
    50.0
}

fn default_history_depth() -> usize {
    8
}

fn default_min_baseline_samples() -> usize {
    3
}

fn default_throttle_secs() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    3600 // 1 hour
}

fn default_flag_high_ratio() -> f64 {
    10.0
}

fn default_flag_high_min() -> i64 {
    1000
}

fn default_flag_suspicious_ratio() -> f64 {
    2.0
}

fn default_flag_suspicious_min() -> i64 {
    100
}

fn default_heartbeat_cycles() -> u64 {
    6
}

fn default_idle_heartbeat_cycles() -> u64 {
    12
}

fn default_socket_path() -> String {
    crate::ipc::DEFAULT_SOCKET_PATH.to_string()
}
