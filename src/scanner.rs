// src/scanner.rs
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::probe::Prober;
use crate::shutdown::ScanState;
use crate::source::CertificateQueue;
use crate::stats::RunStatistics;
use crate::types::{Certificate, ProbeOutcome};

/// How a scan ended
#[derive(Debug, Clone, Copy)]
pub struct ScanRun {
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Fixed pool of workers draining a [`CertificateQueue`]
pub struct Dispatcher {
    prober: Arc<dyn Prober>,
    workers: usize,
    dial_timeout: Duration,
}

impl Dispatcher {
    pub fn new(prober: Arc<dyn Prober>, workers: usize, dial_timeout: Duration) -> Self {
        Self {
            prober,
            workers: workers.max(1),
            dial_timeout,
        }
    }

    /// Run every worker to completion.
    ///
    /// Returns once the queue is drained, or once every worker has noticed
    /// the stop flag and finished its current certificate.
    pub async fn run(
        &self,
        queue: Arc<CertificateQueue>,
        stats: RunStatistics,
        stop_rx: watch::Receiver<ScanState>,
    ) -> ScanRun {
        let started = Instant::now();
        info!("Starting {} scanner workers", self.workers);

        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    prober: Arc::clone(&self.prober),
                    queue: Arc::clone(&queue),
                    stats: stats.clone(),
                    stop_rx: stop_rx.clone(),
                    dial_timeout: self.dial_timeout,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("Scanner task failed: {}", e);
            }
        }

        let cancelled = *stop_rx.borrow() == ScanState::Stopping;
        info!(
            "All scanner workers stopped ({} certificates processed)",
            stats.processed_certificates()
        );

        ScanRun {
            cancelled,
            elapsed: started.elapsed(),
        }
    }
}

struct Worker {
    id: usize,
    prober: Arc<dyn Prober>,
    queue: Arc<CertificateQueue>,
    stats: RunStatistics,
    stop_rx: watch::Receiver<ScanState>,
    dial_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            // Checked before taking work so nothing is pulled and dropped
            if *self.stop_rx.borrow() == ScanState::Stopping {
                debug!("Worker {} stopping", self.id);
                break;
            }

            let Some(cert) = self.queue.next().await else {
                break;
            };

            let outcomes = self.check_certificate(&cert).await;
            let summary = self.stats.record(&outcomes);
            debug!(
                "Certificate {} ({} names): {}",
                cert.fingerprint,
                cert.dns_names.len(),
                summary
            );
        }
    }

    /// Probe every name of one certificate, in order
    async fn check_certificate(&self, cert: &Certificate) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::with_capacity(cert.dns_names.len());

        for name in &cert.dns_names {
            let outcome = self
                .prober
                .probe(name, &cert.fingerprint, self.dial_timeout)
                .await;
            self.stats.name_probed();
            outcomes.push(outcome);
        }

        outcomes
    }
}
