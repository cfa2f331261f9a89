//! Collection against an in-process scoring API.

use axum::{Json, Router, routing::get};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use wifi_qoe_test::{
    CollectArgs, Collector, HttpTelemetryClient, TelemetryCategory, Verdict, write_rollup,
};

fn link_scoring_record(band: &str, effective: u32) -> Value {
    json!({
        "tx_link_quality_score": 90, "tx_link_effective_quality_score": effective,
        "link_quality_level": "good", "channel_cca_user_impact": 5,
        "tx_phyrate_score": 70, "tx_retry_score": 60, "tx_failure_score": 1,
        "num_of_samples": 12, "hostname": "sta-1", "host_type": "laptop",
        "mac_address": "aa:bb:cc:dd:ee:ff", "band": band
    })
}

fn air_scoring_record(band: &str, channel: u32) -> Value {
    json!({
        "band": band, "num_of_samples": 10, "channel_load": 20, "interference": 1,
        "channel_noise": 2, "tx_ineff": 3, "channel_cca_score": 80, "channel": channel
    })
}

fn station(band: &str, datarate: u32) -> Value {
    let mut fields = Map::new();
    for field in TelemetryCategory::LinkMonitoring.fields() {
        fields.insert((*field).to_string(), json!(1));
    }
    fields.insert("band".to_string(), json!(band));
    fields.insert("datarate".to_string(), json!(datarate));
    Value::Object(fields)
}

fn air_monitoring_record(band: &str) -> Value {
    json!({
        "band": band, "status": "up", "air_load": 41, "interference": 3,
        "channel": 6, "txop": 70, "noise": -92, "glitch": 0, "badplcp": 1,
        "timestamp": 1700000000
    })
}

fn ap_monitoring_record(band: &str) -> Value {
    json!({
        "band": band, "status": "up", "ap_load": 30, "channel": 6, "bandwidth": 20,
        "radar_status": "off", "radar_detected_channel": 0, "tx_bytes_total": 10,
        "rx_bytes_total": 20, "timestamp": 1700000000
    })
}

async fn link_scoring() -> Json<Value> {
    Json(json!([
        link_scoring_record("2.4GHz", 12),
        link_scoring_record("5GHz", 20)
    ]))
}

async fn air_scoring() -> Json<Value> {
    Json(json!([
        air_scoring_record("2.4GHz", 6),
        air_scoring_record("5GHz", 36)
    ]))
}

async fn link_monitoring() -> Json<Value> {
    Json(json!({
        "2.4GHz": [{"aa:bb:cc:dd:ee:ff": station("2.4GHz", 900)}],
        "5GHz": [{"aa:bb:cc:dd:ee:00": station("5GHz", 500)}]
    }))
}

async fn air_monitoring() -> Json<Value> {
    Json(json!({
        "2.4GHz": [air_monitoring_record("2.4GHz")],
        "5GHz": [air_monitoring_record("5GHz")]
    }))
}

async fn ap_monitoring() -> Json<Value> {
    Json(json!({
        "2.4GHz": [ap_monitoring_record("2.4GHz")],
        "5GHz": [ap_monitoring_record("5GHz")]
    }))
}

async fn framework_version() -> Json<Value> {
    Json(json!({"framework_version": {"release": "3.2.1"}}))
}

struct ScoringApi {
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScoringApi {
    async fn start() -> Self {
        let app = Router::new()
            .route("/wifi_scoring/link_data", get(link_scoring))
            .route("/wifi_scoring/air_data", get(air_scoring))
            .route("/wifi_monitoring/link_data", get(link_monitoring))
            .route("/wifi_monitoring/air_data", get(air_monitoring))
            .route("/wifi_monitoring/ap_data", get(ap_monitoring))
            .route("/management/framework_version", get(framework_version));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for ScoringApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_collect_two_bands_end_to_end() {
    let api = ScoringApi::start().await;
    let tmp = TempDir::new().unwrap();
    let args = CollectArgs {
        dut_bitrate: 1000,
        external_ap_load: 500,
        external_ap_channel: 6,
        duration_secs: 4,
        period_secs: 1,
        tolerance: 10.0,
        url: api.base_url.clone(),
        output: tmp.path().join("TP1_dut_ch6_1000_int_ch6_500.csv"),
    };

    let client = HttpTelemetryClient::new(&api.base_url).unwrap();
    assert_eq!(client.framework_release().await, "3.2.1");

    let report = Collector::new(client, args.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.iterations, 4);
    assert!(!report.interrupted);
    assert_eq!(report.errors(), 0);
    let bands: Vec<_> = report.bands.iter().map(|b| b.band.as_str()).collect();
    assert_eq!(bands, vec!["2.4GHz", "5GHz"]);

    // bootstrap plus four polling ticks in every raw series
    for category in TelemetryCategory::ALL {
        for band in ["2.4GHz", "5GHz"] {
            let raw = args.raw_dir().join(category.file_name(band));
            assert_eq!(lines(&raw).len(), 6, "{}", raw.display());
        }
    }

    let low = &report.bands[0];
    assert_eq!(low.tally.rows, 3);
    assert_eq!(low.tally.accumulated, 1);
    assert_eq!(low.tally.verdict, Some(Verdict::Pass));
    let detail = lines(&args.detail_path("2.4GHz"));
    assert_eq!(detail.len(), 5);
    assert!(detail[1].starts_with("0,1000,500,6,10.0,2.0,,"));
    assert!(detail[4].starts_with(",,,,10.0,2.0,Passed!,12.0,"));

    let high = &report.bands[1];
    assert_eq!(high.tally.verdict, Some(Verdict::Fail));
    let detail = lines(&args.detail_path("5GHz"));
    assert!(detail[3].starts_with("2,1000,500,6,50.0,-30.0,Failed!,20,"));
    assert!(detail[4].starts_with(",,,,50.0,30.0,Failed!,"));

    let summary = tmp.path().join("summary.csv");
    let rollup = write_rollup(tmp.path(), &summary).unwrap();
    assert_eq!(rollup.rows, 2);
    let table = lines(&summary);
    assert_eq!(table.len(), 3);
    assert!(table[1].starts_with("TP1_dut_ch6_1000_int_ch6_500_2.4GHz,10.0,2.0,Passed!,"));
    assert!(table[2].starts_with("TP1_dut_ch6_1000_int_ch6_500_5GHz,50.0,30.0,Failed!,"));
}

#[tokio::test]
async fn test_unreachable_api_still_writes_na_summary() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let tmp = TempDir::new().unwrap();
    let args = CollectArgs {
        dut_bitrate: 1000,
        external_ap_load: 0,
        external_ap_channel: 1,
        duration_secs: 1,
        period_secs: 1,
        tolerance: 10.0,
        url: url.clone(),
        output: tmp.path().join("TP9"),
    };

    let client = HttpTelemetryClient::new(&url).unwrap();
    let report = Collector::new(client, args.clone(), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(report.bands.len(), 1);
    assert_eq!(report.bands[0].band, "2.4GHz");
    assert_eq!(report.bands[0].tally.verdict, None);
    let detail = lines(&args.detail_path("2.4GHz"));
    assert_eq!(detail.len(), 2);
    assert_eq!(detail[1], vec!["N/A"; 27].join(","));
}
