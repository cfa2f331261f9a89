//! HTTP access to the scoring/monitoring and management APIs.

use super::category::{NA, TelemetryCategory};
use crate::error::{QoeError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of telemetry payloads.
///
/// Implementations never fail: a fetch or decode error is reported as an
/// empty JSON object so the polling loop can write a placeholder row.
#[async_trait]
pub trait TelemetryFetcher: Send + Sync {
    async fn poll(&self, category: TelemetryCategory) -> Value;
}

/// `reqwest`-backed client for the router's HTTPS API.
///
/// The routers serve self-signed certificates, so certificate validation is
/// disabled.
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpTelemetryClient {
    /// Client rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| QoeError::Config(format!("invalid API URL {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| QoeError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    /// GET `path` relative to the base URL and decode it as JSON.
    pub async fn get_json(&self, path: &str) -> Value {
        let url = match self.base.join(path) {
            Ok(url) => url,
            Err(e) => {
                warn!("cannot build URL for {}: {}", path, e);
                return empty();
            }
        };

        let response = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("An error occurred retrieving data from {}: {}", url, e);
                return empty();
            }
        };
        if !response.status().is_success() {
            warn!("{} returned status {}", url, response.status());
            return empty();
        }

        match response.json::<Value>().await {
            Ok(value) => {
                debug!("fetched {}", url);
                value
            }
            Err(e) => {
                warn!("invalid JSON from {}: {}", url, e);
                empty()
            }
        }
    }

    /// Firmware release reported by the management API, or `N/A`.
    pub async fn framework_release(&self) -> String {
        let value = self.get_json("/management/framework_version").await;
        value
            .pointer("/framework_version/release")
            .map(|release| match release {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| NA.to_string())
    }
}

#[async_trait]
impl TelemetryFetcher for HttpTelemetryClient {
    async fn poll(&self, category: TelemetryCategory) -> Value {
        self.get_json(category.path()).await
    }
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Batch work directory name: `MMDDYYYY_{release}`.
///
/// Path separators are dropped from the release so `N/A` stays one component.
pub fn work_dir_name(date: NaiveDate, release: &str) -> String {
    format!("{}_{}", date.format("%m%d%Y"), release.replace('/', ""))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_dir_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(work_dir_name(date, "4.2.1"), "03072024_4.2.1");
        assert_eq!(work_dir_name(date, NA), "03072024_NA");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpTelemetryClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_api_degrades_to_empty() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let client = HttpTelemetryClient::new(&format!("http://{addr}")).unwrap();
        let value = client.poll(TelemetryCategory::LinkScoring).await;
        assert_eq!(value, empty());
        assert_eq!(client.framework_release().await, NA);
    }
}
