// src/config.rs

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Public key of the default log (Certly), base64 DER
pub const DEFAULT_LOG_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAECyPLhWKYYUgEc+tUXfPQB4wtGS2MNvXrjwFCCnyYJifBtd2Sk7Cu+Js9DNhMTh35FftHaHu6ZrclnNBKwmbbSA==";

#[derive(Debug, Deserialize, Clone)]
pub struct CtLogConfig {
    #[serde(default = "default_log_url")]
    pub url: String,
    #[serde(default = "default_log_key")]
    pub key: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_update_cache")]
    pub update_cache: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

fn default_log_url() -> String { "https://log.certly.io".to_string() }
fn default_log_key() -> String { DEFAULT_LOG_KEY.to_string() }
fn default_cache_file() -> String { "certly.log".to_string() }
fn default_update_cache() -> bool { true }
fn default_batch_size() -> u64 { 1000 }

impl Default for CtLogConfig {
    fn default() -> Self {
        Self {
            url: default_log_url(),
            key: default_log_key(),
            cache_file: default_cache_file(),
            update_cache: default_update_cache(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_issuer_filter")]
    pub issuer_filter: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_issuer_filter() -> String { "Let's Encrypt Authority X1".to_string() }
fn default_workers() -> usize { 50 }
fn default_dial_timeout() -> u64 { 5 }
fn default_progress_interval() -> u64 { 5 }
fn default_show_progress() -> bool { true }

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            issuer_filter: default_issuer_filter(),
            workers: default_workers(),
            dial_timeout_secs: default_dial_timeout(),
            progress_interval_secs: default_progress_interval(),
            show_progress: default_show_progress(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricsConfig {
    /// Prometheus text file written after the scan
    #[serde(default)]
    pub export_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ct_log: CtLogConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&contents)?;
        Ok(cfg)
    }

    /// Reject settings the scanner can't run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scanner.workers == 0 {
            anyhow::bail!("scanner.workers must be at least 1");
        }
        if self.scanner.dial_timeout_secs == 0 {
            anyhow::bail!("scanner.dial_timeout_secs must be greater than 0");
        }
        if self.scanner.progress_interval_secs == 0 {
            anyhow::bail!("scanner.progress_interval_secs must be greater than 0");
        }
        if self.ct_log.batch_size == 0 {
            anyhow::bail!("ct_log.batch_size must be greater than 0");
        }
        Ok(())
    }
}
