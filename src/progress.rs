// src/progress.rs
//! Live scan progress using indicatif

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::stats::{format_duration, RunStatistics};

/// ETAs outside this window are shown as `???`
const MAX_ETA_SECS: u64 = 24 * 60 * 60;

/// Progress indicator wrapper
pub struct ProgressIndicator {
    spinner: Option<ProgressBar>,
    enabled: bool,
}

impl ProgressIndicator {
    /// Create a new progress indicator drawing to stdout
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                spinner: None,
                enabled: false,
            };
        }

        let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        Self {
            spinner: Some(spinner),
            enabled: true,
        }
    }

    /// Set the status message
    pub fn set_message(&self, msg: impl Into<String>) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(msg.into());
        }
    }

    /// Temporarily suspend the spinner to print other output
    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if let Some(ref spinner) = self.spinner {
            spinner.suspend(f)
        } else {
            f()
        }
    }

    /// Finish and clear the progress indicator
    pub fn finish(&self) {
        if let Some(ref spinner) = self.spinner {
            spinner.finish_and_clear();
        }
    }

    /// Check if progress indicator is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Counters behind one progress line
#[derive(Debug, Clone, Copy)]
pub struct ProgressSample {
    pub certificates: u64,
    pub total_certificates: u64,
    pub names: u64,
    pub total_names: u64,
    pub elapsed: Duration,
}

/// Time left at the current name rate, if it is worth showing
pub fn estimate_eta(remaining_names: u64, names_per_sec: f64) -> Option<Duration> {
    if names_per_sec <= 0.0 || !names_per_sec.is_finite() {
        return None;
    }

    // Whole seconds, so anything under two seconds is hidden
    let secs = (remaining_names as f64 / names_per_sec) as u64;
    if secs > 1 && secs < MAX_ETA_SECS {
        Some(Duration::from_secs(secs))
    } else {
        None
    }
}

pub fn render_progress_line(sample: &ProgressSample) -> String {
    let secs = sample.elapsed.as_secs_f64();
    let (cps, nps) = if secs > 0.0 {
        (
            sample.certificates as f64 / secs,
            sample.names as f64 / secs,
        )
    } else {
        (0.0, 0.0)
    };

    let eta = estimate_eta(sample.total_names.saturating_sub(sample.names), nps)
        .map(|d| format_duration(d.as_secs()))
        .unwrap_or_else(|| "???".to_string());

    format!(
        "{}/{} certificates checked, {}/{} names [{:.2} cps, {:.2} nps, eta: {}]",
        sample.certificates,
        sample.total_certificates,
        sample.names,
        sample.total_names,
        cps,
        nps,
        eta
    )
}

/// Refreshes the progress line on a fixed interval until halted
pub struct ProgressReporter {
    indicator: ProgressIndicator,
    stats: RunStatistics,
    total_certificates: u64,
    total_names: u64,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(
        indicator: ProgressIndicator,
        stats: RunStatistics,
        total_certificates: u64,
        total_names: u64,
        interval: Duration,
    ) -> Self {
        Self {
            indicator,
            stats,
            total_certificates,
            total_names,
            interval,
        }
    }

    fn sample(&self, started: Instant) -> ProgressSample {
        ProgressSample {
            certificates: self.stats.processed_certificates(),
            total_certificates: self.total_certificates,
            names: self.stats.processed_names(),
            total_names: self.total_names,
            elapsed: started.elapsed(),
        }
    }

    /// Loop until `halt_rx` turns `true` or its sender is dropped
    pub async fn run(self, mut halt_rx: watch::Receiver<bool>) {
        let started = Instant::now();

        loop {
            if *halt_rx.borrow() {
                break;
            }

            self.indicator
                .set_message(render_progress_line(&self.sample(started)));

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                changed = halt_rx.changed() => {
                    if changed.is_err() || *halt_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.indicator.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_indicator_disabled() {
        let progress = ProgressIndicator::new(false);
        assert!(!progress.is_enabled());

        // Should not panic
        progress.set_message("test");
        progress.suspend(|| {});
        progress.finish();
    }

    #[test]
    fn test_progress_indicator_enabled() {
        let progress = ProgressIndicator::new(true);
        assert!(progress.is_enabled());

        progress.set_message("Testing");
        progress.suspend(|| {
            println!("Suspended output");
        });
    }

    #[test]
    fn test_eta_window() {
        assert_eq!(estimate_eta(100, 10.0), Some(Duration::from_secs(10)));
        // One second or less is not shown
        assert_eq!(estimate_eta(10, 10.0), None);
        assert_eq!(estimate_eta(15, 10.0), None);
        assert_eq!(estimate_eta(20, 10.0), Some(Duration::from_secs(2)));
        // A day or more is not shown
        assert_eq!(estimate_eta(86_400, 1.0), None);
        assert_eq!(estimate_eta(86_399, 1.0), Some(Duration::from_secs(86_399)));
    }

    #[test]
    fn test_eta_without_rate() {
        assert_eq!(estimate_eta(100, 0.0), None);
        assert_eq!(estimate_eta(100, f64::NAN), None);
        assert_eq!(estimate_eta(100, f64::INFINITY), None);
    }

    #[test]
    fn test_render_progress_line() {
        let sample = ProgressSample {
            certificates: 10,
            total_certificates: 100,
            names: 50,
            total_names: 500,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(
            render_progress_line(&sample),
            "10/100 certificates checked, 50/500 names [1.00 cps, 5.00 nps, eta: 1m 30s]"
        );
    }

    #[test]
    fn test_render_at_start() {
        let sample = ProgressSample {
            certificates: 0,
            total_certificates: 3,
            names: 0,
            total_names: 6,
            elapsed: Duration::ZERO,
        };
        assert_eq!(
            render_progress_line(&sample),
            "0/3 certificates checked, 0/6 names [0.00 cps, 0.00 nps, eta: ???]"
        );
    }

    #[tokio::test]
    async fn test_reporter_stops_when_halted() {
        let (halt_tx, halt_rx) = watch::channel(false);
        let reporter = ProgressReporter::new(
            ProgressIndicator::new(false),
            RunStatistics::new(),
            1,
            1,
            Duration::from_secs(3600),
        );

        let handle = tokio::spawn(reporter.run(halt_rx));
        halt_tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reporter_stops_when_sender_dropped() {
        let (halt_tx, halt_rx) = watch::channel(false);
        let reporter = ProgressReporter::new(
            ProgressIndicator::new(false),
            RunStatistics::new(),
            1,
            1,
            Duration::from_secs(3600),
        );

        let handle = tokio::spawn(reporter.run(halt_rx));
        drop(halt_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
