// src/cli.rs
use clap::Parser;

use crate::config::Config;

/// ct-adoption: measure how many logged certificates are actually served
///
/// Loads certificates from a Certificate Transparency log, keeps those from
/// one issuer that haven't expired, and connects to every name each one
/// covers to see whether the host presents it.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-adoption")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Input & Configuration =====
    /// Path to an optional TOML config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// CT log base URL [default: https://log.certly.io]
    #[arg(long = "log-url")]
    pub log_url: Option<String>,

    /// Base64 DER public key of the CT log [default: Certly's key]
    #[arg(long = "log-key")]
    pub log_key: Option<String>,

    /// Local append-only cache of log entries [default: certly.log]
    #[arg(long = "cache-file")]
    pub cache_file: Option<String>,

    /// Don't download new entries into the local cache
    #[arg(long = "no-update-cache")]
    pub no_update_cache: bool,

    // ===== Scanning =====
    /// Issuer common name to scan [default: Let's Encrypt Authority X1]
    #[arg(long = "issuer-filter")]
    pub issuer_filter: Option<String>,

    /// Number of scanner workers [default: 50]
    #[arg(short = 'n', long = "scanners")]
    pub scanners: Option<usize>,

    /// Dial timeout for each connection, in seconds [default: 5]
    #[arg(short = 't', long = "scanner-timeout")]
    pub scanner_timeout: Option<u64>,

    // ===== Display =====
    /// Progress refresh interval in seconds [default: 5]
    #[arg(long = "progress-interval")]
    pub progress_interval: Option<u64>,

    /// Disable the progress line
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Print the final report as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Write final counters in Prometheus text format to this file
    #[arg(long = "metrics-file")]
    pub metrics_file: Option<String>,

    // ===== Logging =====
    /// Debug logging, including every failed connection (disables progress)
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Validate flag values and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scanners == Some(0) {
            anyhow::bail!("--scanners must be at least 1");
        }

        if self.scanner_timeout == Some(0) {
            anyhow::bail!("--scanner-timeout must be greater than 0");
        }

        if self.progress_interval == Some(0) {
            anyhow::bail!("--progress-interval must be greater than 0");
        }

        Ok(())
    }

    /// Overlay flags that were given on top of the loaded config
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref url) = self.log_url {
            config.ct_log.url = url.clone();
        }
        if let Some(ref key) = self.log_key {
            config.ct_log.key = key.clone();
        }
        if let Some(ref path) = self.cache_file {
            config.ct_log.cache_file = path.clone();
        }
        if self.no_update_cache {
            config.ct_log.update_cache = false;
        }
        if let Some(ref issuer) = self.issuer_filter {
            config.scanner.issuer_filter = issuer.clone();
        }
        if let Some(workers) = self.scanners {
            config.scanner.workers = workers;
        }
        if let Some(timeout) = self.scanner_timeout {
            config.scanner.dial_timeout_secs = timeout;
        }
        if let Some(interval) = self.progress_interval {
            config.scanner.progress_interval_secs = interval;
        }
        if self.no_progress {
            config.scanner.show_progress = false;
        }
        if let Some(ref path) = self.metrics_file {
            config.metrics.export_path = Some(path.clone());
        }
    }

    /// Check if the progress line should be drawn
    pub fn should_show_progress(&self, config: &Config) -> bool {
        !self.debug && !self.no_progress && config.scanner.show_progress
    }

    /// Determine log level from the debug flag, falling back to the config
    pub fn log_level<'a>(&self, config: &'a Config) -> &'a str {
        if self.debug {
            "debug"
        } else {
            &config.logging.level
        }
    }
}
