// src/stats.rs
//! Run statistics for an adoption scan

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{CertificateSummary, OutcomeKind, ProbeOutcome};

#[derive(Default)]
struct Counters {
    outcomes: [AtomicU64; OutcomeKind::ALL.len()],
    summaries: [AtomicU64; CertificateSummary::ALL.len()],
    processed_certificates: AtomicU64,
    processed_names: AtomicU64,
    ocsp_stapled: AtomicU64,
    sct_present: AtomicU64,
}

/// Thread-safe scan counters.
///
/// Every counter is updated independently; readers may observe a
/// certificate's outcomes before its summary.
#[derive(Clone, Default)]
pub struct RunStatistics {
    inner: Arc<Counters>,
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed_certificates: u64,
    pub processed_names: u64,
    pub names: BTreeMap<&'static str, u64>,
    pub certificates: BTreeMap<&'static str, u64>,
    pub ocsp_stapled: u64,
    pub sct_present: u64,
}

impl StatsSnapshot {
    pub fn outcome(&self, kind: OutcomeKind) -> u64 {
        self.names.get(kind.as_str()).copied().unwrap_or(0)
    }

    pub fn summary(&self, summary: CertificateSummary) -> u64 {
        self.certificates.get(summary.as_str()).copied().unwrap_or(0)
    }
}

fn outcome_index(kind: OutcomeKind) -> usize {
    OutcomeKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()
}

fn summary_index(summary: CertificateSummary) -> usize {
    CertificateSummary::ALL
        .iter()
        .position(|s| *s == summary)
        .unwrap_or_default()
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one probed name, for live progress
    pub fn name_probed(&self) {
        self.inner.processed_names.fetch_add(1, Ordering::Relaxed);
    }

    /// Record every outcome of one certificate and return its summary
    pub fn record(&self, outcomes: &[ProbeOutcome]) -> CertificateSummary {
        let counters = &self.inner;

        for outcome in outcomes {
            counters.outcomes[outcome_index(outcome.kind())].fetch_add(1, Ordering::Relaxed);

            if let ProbeOutcome::Valid {
                ocsp_stapled,
                sct_present,
            } = outcome
            {
                if *ocsp_stapled {
                    counters.ocsp_stapled.fetch_add(1, Ordering::Relaxed);
                }
                if *sct_present {
                    counters.sct_present.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let summary = CertificateSummary::from_outcomes(outcomes);
        counters.summaries[summary_index(summary)].fetch_add(1, Ordering::Relaxed);
        counters.processed_certificates.fetch_add(1, Ordering::Relaxed);

        summary
    }

    pub fn processed_certificates(&self) -> u64 {
        self.inner.processed_certificates.load(Ordering::Relaxed)
    }

    pub fn processed_names(&self) -> u64 {
        self.inner.processed_names.load(Ordering::Relaxed)
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = &self.inner;

        let names = OutcomeKind::ALL
            .iter()
            .zip(counters.outcomes.iter())
            .map(|(kind, count)| (kind.as_str(), count.load(Ordering::Relaxed)))
            .collect();

        let certificates = CertificateSummary::ALL
            .iter()
            .zip(counters.summaries.iter())
            .map(|(summary, count)| (summary.as_str(), count.load(Ordering::Relaxed)))
            .collect();

        StatsSnapshot {
            processed_certificates: counters.processed_certificates.load(Ordering::Relaxed),
            processed_names: counters.processed_names.load(Ordering::Relaxed),
            names,
            certificates,
            ocsp_stapled: counters.ocsp_stapled.load(Ordering::Relaxed),
            sct_present: counters.sct_present.load(Ordering::Relaxed),
        }
    }
}

/// Format a duration in seconds, e.g. `1h 1m 1s`
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
