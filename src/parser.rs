use crate::models::{AccessPoint, Station, HIDDEN_ESSID};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Header names accepted for the data-frame counter column, in priority order.
/// Scanner builds differ in what they call it.
const DATA_HEADERS: &[&str] = &[
    "#data", "# data", "data", "#iv", "# iv", "packets", "# packets", "#beacons", "# beacons",
    "beacons",
];

/// Positional fallbacks for capture builds whose header row is missing or
/// mangled. Matches the common airodump column order.
const AP_FALLBACK_MIN_COLS: usize = 14;
const STATION_MIN_COLS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    AccessPoints,
    Stations,
}

/// Column layout for the access-point section, resolved from the header row
/// when one is present.
#[derive(Debug, Clone)]
struct ApColumns {
    bssid: usize,
    channel: usize,
    privacy: usize,
    power: usize,
    essid: usize,
    data: Vec<usize>,
    min_cols: usize,
}

impl ApColumns {
    fn positional() -> Self {
        Self {
            bssid: 0,
            channel: 3,
            privacy: 5,
            power: 8,
            essid: 13,
            data: vec![10, 9],
            min_cols: AP_FALLBACK_MIN_COLS,
        }
    }

    /// Resolve the layout from an access-point header row. Falls back to the
    /// positional layout for any column the header does not name.
    fn from_header(fields: &[String]) -> Self {
        let mut cols = Self::positional();
        let lowered: Vec<String> = fields.iter().map(|f| f.trim().to_lowercase()).collect();

        let find = |name: &str| lowered.iter().position(|f| f == name);

        if let Some(i) = find("bssid") {
            cols.bssid = i;
        }
        if let Some(i) = find("channel").or_else(|| find("ch")) {
            cols.channel = i;
        }
        if let Some(i) = find("privacy") {
            cols.privacy = i;
        }
        if let Some(i) = find("power").or_else(|| find("pwr")) {
            cols.power = i;
        }
        if let Some(i) = find("essid").or_else(|| find("ssid")) {
            cols.essid = i;
        }

        let mut data = Vec::new();
        for name in DATA_HEADERS {
            if let Some(i) = find(name) {
                data.push(i);
            }
        }
        if !data.is_empty() {
            cols.data = data;
        }

        // A header-resolved layout only needs the columns it actually uses
        cols.min_cols = [cols.bssid, cols.channel, cols.privacy, cols.power, cols.essid]
            .iter()
            .chain(cols.data.iter())
            .max()
            .copied()
            .unwrap_or(0)
            + 1;

        cols
    }
}

/// Parses raw capture snapshots (airodump-style two-section CSV) into
/// access-point topologies.
pub struct SnapshotParser {
    mac_re: Regex,
}

impl Default for SnapshotParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotParser {
    pub fn new() -> Self {
        Self {
            mac_re: Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").unwrap(),
        }
    }

    /// Parse one raw snapshot. Malformed rows are skipped, never fatal; an
    /// unusable snapshot simply yields an empty topology.
    pub fn parse(&self, raw: &str) -> Vec<AccessPoint> {
        let mut aps: Vec<AccessPoint> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut columns = ApColumns::positional();
        let mut section = Section::AccessPoints;
        let mut seen_ap_rows = 0usize;
        let mut dropped_stations = 0usize;

        for line in raw.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                // A blank line after the AP rows separates the two sections
                if section == Section::AccessPoints && seen_ap_rows > 0 {
                    section = Section::Stations;
                }
                continue;
            }

            let fields: Vec<String> = trimmed.split(',').map(|f| f.trim().to_string()).collect();
            let first = fields[0].to_lowercase();

            if first.starts_with("station mac") {
                section = Section::Stations;
                continue;
            }
            if first == "bssid" {
                columns = ApColumns::from_header(&fields);
                section = Section::AccessPoints;
                continue;
            }

            match section {
                Section::AccessPoints => {
                    if self.parse_ap_row(&fields, &columns, &mut aps, &mut index) {
                        seen_ap_rows += 1;
                    }
                }
                Section::Stations => {
                    if !self.parse_station_row(&fields, &mut aps, &index) {
                        dropped_stations += 1;
                    }
                }
            }
        }

        if dropped_stations > 0 {
            debug!(
                dropped = dropped_stations,
                "Skipped stations without a valid association"
            );
        }

        finalize(&mut aps);
        aps
    }

    fn parse_ap_row(
        &self,
        fields: &[String],
        columns: &ApColumns,
        aps: &mut Vec<AccessPoint>,
        index: &mut HashMap<String, usize>,
    ) -> bool {
        if fields.len() < columns.min_cols {
            return false;
        }

        let bssid = fields[columns.bssid].clone();
        if !self.mac_re.is_match(&bssid) {
            return false;
        }

        let key = bssid.to_lowercase();
        if index.contains_key(&key) {
            debug!(bssid = %bssid, "Duplicate access-point row, keeping first");
            return false;
        }

        let channel = fields[columns.channel].clone();
        let privacy = fields[columns.privacy].clone();
        let power = parse_power(&fields[columns.power]);

        let essid_raw = fields[columns.essid].trim();
        let essid = if essid_raw.is_empty() {
            HIDDEN_ESSID.to_string()
        } else {
            essid_raw.to_string()
        };

        let mut data = 0i64;
        for &col in &columns.data {
            if let Some(value) = fields.get(col).and_then(|f| parse_counter(f)) {
                data = value;
                break;
            }
        }

        index.insert(key, aps.len());
        aps.push(AccessPoint::new(bssid, essid, channel, privacy, power, data));
        true
    }

    fn parse_station_row(
        &self,
        fields: &[String],
        aps: &mut [AccessPoint],
        index: &HashMap<String, usize>,
    ) -> bool {
        if fields.len() < STATION_MIN_COLS {
            return false;
        }

        let mac = fields[0].clone();
        let bssid = fields[5].trim();

        // Unassociated stations carry placeholder text instead of a MAC
        if !self.mac_re.is_match(&mac) || !self.mac_re.is_match(bssid) {
            return false;
        }

        let power = parse_power(&fields[3]);

        if let Some(&i) = index.get(&bssid.to_lowercase()) {
            aps[i].clients.push(Station { mac, power });
            return true;
        }

        false
    }
}

/// Parse a signal-power field. Unparseable or absent readings collapse to the
/// weakest-possible sentinel so sorting pushes them to the back.
fn parse_power(field: &str) -> i32 {
    let trimmed = field.trim();
    if let Ok(value) = trimmed.parse::<i32>() {
        return value;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();

    cleaned.parse::<i32>().unwrap_or(-100)
}

/// Parse a frame-counter field. Returns None when the field holds no digits
/// at all, so the caller can try the next candidate column.
fn parse_counter(field: &str) -> Option<i64> {
    let trimmed = field.trim();
    let mut cleaned = String::new();

    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '-' && i == 0) {
            cleaned.push(c);
        }
    }

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    cleaned.parse::<i64>().ok()
}

/// Order the topology for presentation: strongest APs first, each AP's client
/// list strongest first with case-insensitive MAC duplicates removed.
fn finalize(aps: &mut Vec<AccessPoint>) {
    aps.sort_by(|a, b| b.power.cmp(&a.power));

    for ap in aps.iter_mut() {
        ap.clients.sort_by(|a, b| b.power.cmp(&a.power));

        let mut seen: HashSet<String> = HashSet::new();
        ap.clients.retain(|c| seen.insert(c.mac.to_lowercase()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, # clients, ESSID, Key\r
AA:BB:CC:DD:EE:01, 2026-08-01 10:00:00, 2026-08-01 10:05:00,  6, 54, WPA2, CCMP, PSK, -40, 120, 4500, 0.0.0.0, 2, CoffeeShop, \r
AA:BB:CC:DD:EE:02, 2026-08-01 10:00:00, 2026-08-01 10:05:00, 11, 54, OPN, , , -72, 80, 200, 0.0.0.0, 0, , \r
\r
Station MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs\r
11:22:33:44:55:66, 2026-08-01 10:01:00, 2026-08-01 10:04:00, -50, 300, AA:BB:CC:DD:EE:01, CoffeeShop\r
11:22:33:44:55:77, 2026-08-01 10:01:00, 2026-08-01 10:04:00, -45, 120, AA:BB:CC:DD:EE:01, \r
99:88:77:66:55:44, 2026-08-01 10:01:00, 2026-08-01 10:04:00, -60, 10, (not associated), CoffeeShop\r
";

    #[test]
    fn test_parse_two_sections() {
        let parser = SnapshotParser::new();
        let aps = parser.parse(SAMPLE);

        assert_eq!(aps.len(), 2);
        // Sorted strongest first
        assert_eq!(aps[0].bssid, "AA:BB:CC:DD:EE:01");
        assert_eq!(aps[0].power, -40);
        assert_eq!(aps[0].channel, "6");
        assert_eq!(aps[0].privacy, "WPA2");
        assert_eq!(aps[0].clients.len(), 2);
        // Clients strongest first
        assert_eq!(aps[0].clients[0].mac, "11:22:33:44:55:77");
        assert_eq!(aps[0].clients[0].power, -45);
    }

    #[test]
    fn test_counter_column_priority() {
        // Header names both "# IV" and "# beacons"; "#iv" wins per priority
        let parser = SnapshotParser::new();
        let aps = parser.parse(SAMPLE);
        let ap = aps.iter().find(|a| a.bssid == "AA:BB:CC:DD:EE:01").unwrap();
        assert_eq!(ap.data, 4500);
    }

    #[test]
    fn test_blank_essid_becomes_hidden() {
        let parser = SnapshotParser::new();
        let aps = parser.parse(SAMPLE);
        let ap = aps.iter().find(|a| a.bssid == "AA:BB:CC:DD:EE:02").unwrap();
        assert_eq!(ap.essid, HIDDEN_ESSID);
        assert!(ap.is_hidden());
    }

    #[test]
    fn test_unassociated_station_dropped() {
        let parser = SnapshotParser::new();
        let aps = parser.parse(SAMPLE);
        let total: usize = aps.iter().map(|a| a.clients.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_duplicate_bssid_keeps_first() {
        let raw = "\
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # data, LAN IP, # clients, ESSID, Key
AA:BB:CC:DD:EE:01, x, x, 6, 54, WPA2, CCMP, PSK, -40, 10, 100, 0.0.0.0, 0, First,
AA:BB:CC:DD:EE:01, x, x, 9, 54, OPN, , , -30, 10, 999, 0.0.0.0, 0, Second,
";
        let parser = SnapshotParser::new();
        let aps = parser.parse(raw);
        assert_eq!(aps.len(), 1);
        assert_eq!(aps[0].essid, "First");
        assert_eq!(aps[0].data, 100);
    }

    #[test]
    fn test_positional_fallback_without_header() {
        let raw = "\
AA:BB:CC:DD:EE:03, t1, t2, 3, 54, WEP, WEP, , -55, 42, 1234, 0.0.0.0, 1, LegacyNet
";
        let parser = SnapshotParser::new();
        let aps = parser.parse(raw);
        assert_eq!(aps.len(), 1);
        assert_eq!(aps[0].channel, "3");
        assert_eq!(aps[0].privacy, "WEP");
        assert_eq!(aps[0].power, -55);
        // Positional fallback tries column 10 first
        assert_eq!(aps[0].data, 1234);
        assert_eq!(aps[0].essid, "LegacyNet");
    }

    #[test]
    fn test_short_rows_skipped() {
        let raw = "AA:BB:CC:DD:EE:01, only, four, cols\ngarbage line\n";
        let parser = SnapshotParser::new();
        assert!(parser.parse(raw).is_empty());
    }

    #[test]
    fn test_client_dedupe_case_insensitive() {
        let raw = "\
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # data, LAN IP, # clients, ESSID, Key
AA:BB:CC:DD:EE:01, x, x, 6, 54, WPA2, CCMP, PSK, -40, 10, 100, 0.0.0.0, 2, Net,

Station MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs
aa:11:22:33:44:55, x, x, -70, 5, AA:BB:CC:DD:EE:01,
AA:11:22:33:44:55, x, x, -40, 9, AA:BB:CC:DD:EE:01,
";
        let parser = SnapshotParser::new();
        let aps = parser.parse(raw);
        assert_eq!(aps[0].clients.len(), 1);
        // Strongest reading survives the dedupe
        assert_eq!(aps[0].clients[0].power, -40);
    }

    #[test]
    fn test_parse_power_variants() {
        assert_eq!(parse_power("-62"), -62);
        assert_eq!(parse_power(" -62 "), -62);
        assert_eq!(parse_power("-62 dBm"), -62);
        assert_eq!(parse_power(""), -100);
        assert_eq!(parse_power("n/a"), -100);
    }

    #[test]
    fn test_parse_counter_variants() {
        assert_eq!(parse_counter(" 4500 "), Some(4500));
        assert_eq!(parse_counter("4,500"), Some(4500));
        assert_eq!(parse_counter(""), None);
        assert_eq!(parse_counter("-"), None);
        assert_eq!(parse_counter("n/a"), None);
    }

    #[test]
    fn test_empty_input() {
        let parser = SnapshotParser::new();
        assert!(parser.parse("").is_empty());
    }
}
