//! Telemetry categories, their field schemas and per-band extraction rules.

use serde_json::Value;

/// Band assumed when a payload carries no band information.
pub const DEFAULT_BAND: &str = "2.4GHz";

/// Second band assumed for two-element list payloads.
pub const SECOND_BAND: &str = "5GHz";

/// Placeholder cell for missing data.
pub const NA: &str = "N/A";

/// One logical endpoint of the scoring/monitoring API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TelemetryCategory {
    AirMonitoring,
    ApMonitoring,
    LinkMonitoring,
    AirScoring,
    LinkScoring,
}

impl TelemetryCategory {
    /// Every category, in polling order.
    pub const ALL: [TelemetryCategory; 5] = [
        TelemetryCategory::AirMonitoring,
        TelemetryCategory::ApMonitoring,
        TelemetryCategory::LinkMonitoring,
        TelemetryCategory::AirScoring,
        TelemetryCategory::LinkScoring,
    ];

    /// API path, relative to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            TelemetryCategory::AirMonitoring => "/wifi_monitoring/air_data",
            TelemetryCategory::ApMonitoring => "/wifi_monitoring/ap_data",
            TelemetryCategory::LinkMonitoring => "/wifi_monitoring/link_data",
            TelemetryCategory::AirScoring => "/wifi_scoring/air_data",
            TelemetryCategory::LinkScoring => "/wifi_scoring/link_data",
        }
    }

    /// Ordered field schema; this is also the raw capture column order.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            TelemetryCategory::LinkScoring => &[
                "tx_link_quality_score",
                "tx_link_effective_quality_score",
                "link_quality_level",
                "channel_cca_user_impact",
                "tx_phyrate_score",
                "tx_retry_score",
                "tx_failure_score",
                "num_of_samples",
                "hostname",
                "host_type",
                "mac_address",
                "band",
            ],
            TelemetryCategory::AirScoring => &[
                "band",
                "num_of_samples",
                "channel_load",
                "interference",
                "channel_noise",
                "tx_ineff",
                "channel_cca_score",
                "channel",
            ],
            TelemetryCategory::LinkMonitoring => &[
                "mac_address",
                "tx_data_total",
                "rx_data_total",
                "tx_retry_total",
                "tx_bytes_total",
                "rx_bytes_total",
                "tx_in_net_sec",
                "num_of_samples",
                "tx_phyrate_avg",
                "rssi",
                "datarate",
                "rtr",
                "bandwidth",
                "is_ldpc",
                "sgi",
                "tx_nss",
                "throughput_level",
                "band",
                "tx_phyrate_raw",
                "timestamp",
            ],
            TelemetryCategory::AirMonitoring => &[
                "band",
                "status",
                "air_load",
                "interference",
                "channel",
                "txop",
                "noise",
                "glitch",
                "badplcp",
                "timestamp",
            ],
            TelemetryCategory::ApMonitoring => &[
                "band",
                "status",
                "ap_load",
                "channel",
                "bandwidth",
                "radar_status",
                "radar_detected_channel",
                "tx_bytes_total",
                "rx_bytes_total",
                "timestamp",
            ],
        }
    }

    /// Number of fields in the schema.
    pub fn width(self) -> usize {
        self.fields().len()
    }

    /// Position of `field` in the schema.
    pub fn field_index(self, field: &str) -> Option<usize> {
        self.fields().iter().position(|f| *f == field)
    }

    /// Path with the leading `/` removed and `/` replaced by `.`.
    pub fn file_stem(self) -> String {
        self.path().trim_start_matches('/').replace('/', ".")
    }

    /// Capture file name for `band`.
    pub fn file_name(self, band: &str) -> String {
        format!("{}_{}.csv", self.file_stem(), band)
    }

    /// Header line for capture files.
    pub fn header(self) -> String {
        self.fields()
            .iter()
            .map(|f| match unit(f) {
                Some(u) => format!("{f} {u}"),
                None => (*f).to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// All-`N/A` row of schema width.
    pub fn placeholder(self) -> String {
        vec![NA; self.width()].join(",")
    }

    /// Bands present in a bootstrap payload.
    ///
    /// Object payloads are keyed by band. Two-element lists are taken as one
    /// entry per default band. Anything else, including the empty object a
    /// failed fetch produces, falls back to a single default band.
    pub fn discover_bands(payload: &Value) -> Vec<String> {
        match payload {
            Value::Object(map) if !map.is_empty() => map.keys().cloned().collect(),
            Value::Array(items) if items.len() == 2 => {
                vec![DEFAULT_BAND.to_string(), SECOND_BAND.to_string()]
            }
            _ => vec![DEFAULT_BAND.to_string()],
        }
    }

    /// First complete record for `band`, as schema-ordered cells.
    pub fn extract(self, payload: &Value, band: &str) -> Option<Vec<String>> {
        let fields = self.fields();
        match self {
            TelemetryCategory::AirMonitoring | TelemetryCategory::ApMonitoring => payload
                .get(band)?
                .as_array()?
                .iter()
                .find_map(|record| cells(record, fields)),
            TelemetryCategory::LinkMonitoring => payload
                .get(band)?
                .as_array()?
                .iter()
                .filter_map(|entry| entry.as_object()?.values().next())
                .find_map(|station| cells(station, fields)),
            TelemetryCategory::AirScoring => {
                let index = usize::from(band != DEFAULT_BAND);
                cells(payload.as_array()?.get(index)?, fields)
            }
            TelemetryCategory::LinkScoring => {
                let records = payload.as_array()?;
                records
                    .iter()
                    .filter(|r| r.get("band").and_then(Value::as_str) == Some(band))
                    .find_map(|r| cells(r, fields))
                    .or_else(|| cells(records.first()?, fields))
            }
        }
    }
}

impl std::fmt::Display for TelemetryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Unit suffix for a schema field.
pub fn unit(field: &str) -> Option<&'static str> {
    let unit = match field {
        "tx_in_net_sec" => "[sec]",
        "datarate" | "tx_phyrate_raw" | "tx_phyrate_avg" => "[Kbps]",
        "tx_data_total" | "rx_data_total" => "[packets]",
        "tx_bytes_total" | "rx_bytes_total" | "total_rx_bytes" | "total_tx_bytes" => "[B]",
        "bandwidth" => "[GHz]",
        "noise" => "[dB]",
        "rtr" | "air_load" | "interference" | "txop" | "ap_load" | "tx_phyrate_score"
        | "tx_retry_score" | "tx_link_quality_score" | "tx_link_effective_quality_score"
        | "channel_cca_user_impact" | "channel_load" | "channel_noise" | "tx_ineff"
        | "channel_cca_score" => "[%]",
        _ => return None,
    };
    Some(unit)
}

/// Schema-ordered cells of `record`, or `None` if any field is missing.
fn cells(record: &Value, fields: &[&str]) -> Option<Vec<String>> {
    let object = record.as_object()?;
    fields
        .iter()
        .map(|f| object.get(*f).map(cell))
        .collect()
}

/// Render one JSON value as a CSV cell.
fn cell(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace(',', ";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn air_record(band: &str, load: u32) -> Value {
        json!({
            "band": band, "status": "up", "air_load": load, "interference": 3,
            "channel": 6, "txop": 70, "noise": -92, "glitch": 0, "badplcp": 1,
            "timestamp": 1700000000
        })
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            TelemetryCategory::LinkScoring.file_name("2.4GHz"),
            "wifi_scoring.link_data_2.4GHz.csv"
        );
        assert_eq!(
            TelemetryCategory::ApMonitoring.file_stem(),
            "wifi_monitoring.ap_data"
        );
    }

    #[test]
    fn test_header_units() {
        let header = TelemetryCategory::AirScoring.header();
        assert_eq!(
            header,
            "band,num_of_samples,channel_load [%],interference [%],channel_noise [%],tx_ineff [%],channel_cca_score [%],channel"
        );
        assert_eq!(
            TelemetryCategory::LinkMonitoring.placeholder().split(',').count(),
            20
        );
    }

    #[test]
    fn test_band_discovery() {
        let keyed = json!({"2.4GHz": [], "5GHz": []});
        assert_eq!(
            TelemetryCategory::discover_bands(&keyed),
            vec!["2.4GHz", "5GHz"]
        );
        assert_eq!(
            TelemetryCategory::discover_bands(&json!([{}, {}])),
            vec!["2.4GHz", "5GHz"]
        );
        assert_eq!(
            TelemetryCategory::discover_bands(&json!([{}])),
            vec!["2.4GHz"]
        );
        assert_eq!(TelemetryCategory::discover_bands(&json!({})), vec!["2.4GHz"]);
    }

    #[test]
    fn test_air_monitoring_takes_first_complete_record() {
        let payload = json!({
            "2.4GHz": [{"band": "2.4GHz"}, air_record("2.4GHz", 41), air_record("2.4GHz", 99)]
        });
        let row = TelemetryCategory::AirMonitoring
            .extract(&payload, "2.4GHz")
            .unwrap();
        assert_eq!(row.len(), 10);
        assert_eq!(row[2], "41");
        assert_eq!(row[1], "up");
    }

    #[test]
    fn test_link_monitoring_unwraps_mac_key() {
        let mut station = serde_json::Map::new();
        for field in TelemetryCategory::LinkMonitoring.fields() {
            station.insert((*field).to_string(), json!(1));
        }
        station.insert("datarate".to_string(), json!(900));
        let payload = json!({
            "5GHz": [{}, {"aa:bb:cc:dd:ee:ff": Value::Object(station)}]
        });
        let row = TelemetryCategory::LinkMonitoring
            .extract(&payload, "5GHz")
            .unwrap();
        assert_eq!(row[10], "900");
        assert!(
            TelemetryCategory::LinkMonitoring
                .extract(&payload, "2.4GHz")
                .is_none()
        );
    }

    #[test]
    fn test_air_scoring_index_by_band() {
        let record = |ch: u32| {
            json!({
                "band": "x", "num_of_samples": 10, "channel_load": 20.5, "interference": 1,
                "channel_noise": 2, "tx_ineff": 3, "channel_cca_score": 80, "channel": ch
            })
        };
        let payload = json!([record(6), record(36)]);
        let first = TelemetryCategory::AirScoring
            .extract(&payload, "2.4GHz")
            .unwrap();
        let second = TelemetryCategory::AirScoring
            .extract(&payload, "5GHz")
            .unwrap();
        assert_eq!(first[7], "6");
        assert_eq!(first[2], "20.5");
        assert_eq!(second[7], "36");
    }

    #[test]
    fn test_link_scoring_prefers_matching_band() {
        let record = |band: &str, eqs: f64| {
            json!({
                "tx_link_quality_score": 90, "tx_link_effective_quality_score": eqs,
                "link_quality_level": "good", "channel_cca_user_impact": 5,
                "tx_phyrate_score": 70, "tx_retry_score": 60, "tx_failure_score": 1,
                "num_of_samples": 12, "hostname": "sta,1", "host_type": "laptop",
                "mac_address": "aa:bb", "band": band
            })
        };
        let payload = json!([record("2.4GHz", 85.0), record("5GHz", 40.0)]);
        let row = TelemetryCategory::LinkScoring
            .extract(&payload, "5GHz")
            .unwrap();
        assert_eq!(row[1], "40.0");
        // commas inside values must not shift columns
        assert_eq!(row[8], "sta;1");

        let fallback = TelemetryCategory::LinkScoring
            .extract(&payload, "6GHz")
            .unwrap();
        assert_eq!(fallback[1], "85.0");
    }

    #[test]
    fn test_incomplete_payload_yields_nothing() {
        assert!(
            TelemetryCategory::LinkScoring
                .extract(&json!({}), "2.4GHz")
                .is_none()
        );
        assert!(
            TelemetryCategory::AirMonitoring
                .extract(&json!({"2.4GHz": [{"band": "2.4GHz"}]}), "2.4GHz")
                .is_none()
        );
    }
}
