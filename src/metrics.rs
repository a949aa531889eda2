//! Prometheus metrics for ct-adoption
//!
//! The final statistics snapshot is mirrored into gauges and can be written
//! out in the Prometheus text format once the scan is over.

use lazy_static::lazy_static;
use prometheus::{IntGauge, IntGaugeVec, Opts, Registry};
use std::path::Path;
use tracing::{info, warn};

use crate::stats::StatsSnapshot;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Probed names per outcome
    /// Labels: outcome="skipped|unavailable|...|valid"
    pub static ref NAMES_BY_OUTCOME: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ctadoption_names", "Probed names by outcome"),
        &["outcome"]
    ).expect("metric cannot be created");

    /// Processed certificates per usage bucket
    /// Labels: usage="unused|partially_used|fully_used"
    pub static ref CERTIFICATES_BY_USAGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ctadoption_certificates", "Processed certificates by usage"),
        &["usage"]
    ).expect("metric cannot be created");

    pub static ref NAMES_PROCESSED: IntGauge = IntGauge::new(
        "ctadoption_names_processed",
        "Total number of names probed"
    ).expect("metric cannot be created");

    pub static ref CERTIFICATES_PROCESSED: IntGauge = IntGauge::new(
        "ctadoption_certificates_processed",
        "Total number of certificates processed"
    ).expect("metric cannot be created");

    pub static ref NAMES_OCSP_STAPLED: IntGauge = IntGauge::new(
        "ctadoption_names_ocsp_stapled",
        "Names serving their certificate with a stapled OCSP response"
    ).expect("metric cannot be created");

    pub static ref NAMES_SCT_PRESENT: IntGauge = IntGauge::new(
        "ctadoption_names_sct_present",
        "Names serving their certificate with embedded SCTs"
    ).expect("metric cannot be created");
}

/// Initialize metrics registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(NAMES_BY_OUTCOME.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATES_BY_USAGE.clone()))?;
    REGISTRY.register(Box::new(NAMES_PROCESSED.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATES_PROCESSED.clone()))?;
    REGISTRY.register(Box::new(NAMES_OCSP_STAPLED.clone()))?;
    REGISTRY.register(Box::new(NAMES_SCT_PRESENT.clone()))?;

    Ok(())
}

/// Set every gauge from a snapshot; safe to call repeatedly
pub fn record_snapshot(snapshot: &StatsSnapshot) {
    for (outcome, count) in &snapshot.names {
        NAMES_BY_OUTCOME
            .with_label_values(&[*outcome])
            .set(*count as i64);
    }
    for (usage, count) in &snapshot.certificates {
        CERTIFICATES_BY_USAGE
            .with_label_values(&[*usage])
            .set(*count as i64);
    }

    NAMES_PROCESSED.set(snapshot.processed_names as i64);
    CERTIFICATES_PROCESSED.set(snapshot.processed_certificates as i64);
    NAMES_OCSP_STAPLED.set(snapshot.ocsp_stapled as i64);
    NAMES_SCT_PRESENT.set(snapshot.sct_present as i64);
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Record the snapshot and write all metrics to `path`
pub fn write_metrics(path: &Path, snapshot: &StatsSnapshot) -> anyhow::Result<()> {
    use anyhow::Context;

    record_snapshot(snapshot);
    std::fs::write(path, export_metrics())
        .with_context(|| format!("Failed to write metrics to {:?}", path))?;

    info!("Wrote metrics to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunStatistics;
    use crate::types::ProbeOutcome;

    fn snapshot() -> StatsSnapshot {
        let stats = RunStatistics::new();
        let outcomes = [
            ProbeOutcome::Valid {
                ocsp_stapled: true,
                sct_present: true,
            },
            ProbeOutcome::TlsError,
        ];
        for _ in &outcomes {
            stats.name_probed();
        }
        stats.record(&outcomes);
        stats.snapshot()
    }

    #[test]
    fn test_metrics_initialization() {
        let result = init_metrics();
        // Another test may have registered them first
        assert!(result.is_ok() || matches!(result, Err(prometheus::Error::AlreadyReg)));
    }

    #[test]
    fn test_record_snapshot_sets_gauges() {
        record_snapshot(&snapshot());

        assert_eq!(NAMES_BY_OUTCOME.with_label_values(&["valid"]).get(), 1);
        assert_eq!(NAMES_BY_OUTCOME.with_label_values(&["tls_error"]).get(), 1);
        assert_eq!(
            CERTIFICATES_BY_USAGE.with_label_values(&["partially_used"]).get(),
            1
        );
        assert_eq!(NAMES_PROCESSED.get(), 2);
        assert_eq!(CERTIFICATES_PROCESSED.get(), 1);

        // Setting again is idempotent
        record_snapshot(&snapshot());
        assert_eq!(NAMES_PROCESSED.get(), 2);
    }

    #[test]
    fn test_write_metrics_file() {
        let _ = init_metrics();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adoption.prom");

        write_metrics(&path, &snapshot()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ctadoption_names_processed 2"));
        assert!(text.contains("ctadoption_names{outcome=\"valid\"} 1"));
        assert!(text.contains("ctadoption_certificates{usage=\"partially_used\"} 1"));
    }
}
