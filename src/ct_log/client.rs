// src/ct_log/client.rs
use anyhow::{Context, Result};
use base64::Engine;
use std::time::Duration;
use tracing::debug;

use super::types::{GetEntriesResponse, LogEntry, SignedTreeHead};
use crate::types::Fingerprint;

/// HTTP client for Certificate Transparency log RFC 6962 API
pub struct CtLogClient {
    base_url: String,
    log_id: String,
    http_client: reqwest::Client,
}

impl CtLogClient {
    /// Create a new CT log client.
    ///
    /// `log_key` is the log's base64 DER public key. The log ID (SHA-256 of
    /// the key) is derived from it; a key that doesn't decode is rejected.
    pub fn new(base_url: &str, log_key: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .with_context(|| format!("Invalid CT log URL: {}", base_url))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported CT log URL scheme: {}", parsed.scheme());
        }

        let key_der = base64::engine::general_purpose::STANDARD
            .decode(log_key.trim())
            .context("Failed to decode base64 CT log key")?;

        if key_der.is_empty() {
            anyhow::bail!("CT log key is empty");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            log_id: Fingerprint::of(&key_der).to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Hex log ID (SHA-256 of the log's public key)
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Get Signed Tree Head (current log size and timestamp)
    /// Endpoint: GET {base_url}/ct/v1/get-sth
    pub async fn get_sth(&self) -> Result<SignedTreeHead> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        debug!("Fetching STH from {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch STH")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            anyhow::bail!("STH request failed with status {}: {}", status, body);
        }

        let sth: SignedTreeHead = response
            .json()
            .await
            .context("Failed to parse STH JSON")?;

        debug!(
            "STH received: tree_size={}, timestamp={}",
            sth.tree_size, sth.timestamp
        );

        Ok(sth)
    }

    /// Get entries from CT log, `start` and `end` inclusive.
    /// Logs may return fewer entries than requested.
    /// Endpoint: GET {base_url}/ct/v1/get-entries?start={start}&end={end}
    pub async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<LogEntry>> {
        let url = format!(
            "{}/ct/v1/get-entries?start={}&end={}",
            self.base_url, start, end
        );

        debug!("Fetching entries {}-{} from {}", start, end, self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch entries")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            anyhow::bail!(
                "Get entries request failed with status {}: {}",
                status,
                body
            );
        }

        let entries_response: GetEntriesResponse = response
            .json()
            .await
            .context("Failed to parse entries JSON")?;

        debug!(
            "Received {} entries from {}",
            entries_response.entries.len(),
            self.base_url
        );

        Ok(entries_response.entries)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const TEST_LOG_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE4xKvYsLg0o+1zngLR0ZNR4gdIVka0PUSIiX/Asm8c/RNolGd7thXFgt5NtYR6UWbwV2YCoUfDtanRk8NHdxPUw==";

    #[test]
    fn test_log_id_from_key() {
        let client = CtLogClient::new("https://log.example.com/", TEST_LOG_KEY).unwrap();
        assert_eq!(
            client.log_id(),
            "aeb3286eb85a290ccbba32fce6333966496158ae7c291d75fde3f281a06d645d"
        );
        assert_eq!(client.base_url(), "https://log.example.com");
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(CtLogClient::new("https://log.example.com", "not base64!").is_err());
        assert!(CtLogClient::new("https://log.example.com", "").is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(CtLogClient::new("not a url", TEST_LOG_KEY).is_err());
        assert!(CtLogClient::new("ftp://log.example.com", TEST_LOG_KEY).is_err());
    }

    #[tokio::test]
    async fn test_get_sth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree_size": 42,
                "timestamp": 1447082395000u64,
                "sha256_root_hash": "root=",
                "tree_head_signature": "sig="
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();
        let sth = client.get_sth().await.unwrap();
        assert_eq!(sth.tree_size, 42);
    }

    #[tokio::test]
    async fn test_get_sth_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(1) // no retry
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();
        let err = client.get_sth().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_get_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", "10"))
            .and(query_param("end", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [
                    {"leaf_input": "AA==", "extra_data": ""},
                    {"leaf_input": "AQ==", "extra_data": ""}
                ]
            })))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();
        let entries = client.get_entries(10, 11).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].leaf_input, "AQ==");
    }

    #[tokio::test]
    async fn test_get_entries_bad_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();
        assert!(client.get_entries(0, 0).await.is_err());
    }
}
