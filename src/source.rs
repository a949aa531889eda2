//! Loading scan candidates from the local CT cache
//!
//! Builds the fixed work list for a scan: sync the cache with the log, keep
//! certificates that pass the [`IssuerFilter`], and hand them to the workers
//! through a pre-filled, closed queue.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::cert_parser::CertificateParser;
use crate::config::Config;
use crate::ct_log::{CtLogClient, EntriesCache};
use crate::filter::IssuerFilter;
use crate::types::Certificate;

/// Closed queue of certificates shared by all workers.
///
/// The channel is filled up front and its sender dropped, so `next` returns
/// `None` once every certificate has been handed out.
#[derive(Debug)]
pub struct CertificateQueue {
    receiver: Mutex<mpsc::Receiver<Certificate>>,
    total_certificates: u64,
    total_names: u64,
}

impl CertificateQueue {
    pub fn new(certificates: Vec<Certificate>) -> Result<Self> {
        let total_certificates = certificates.len() as u64;
        let total_names = certificates.iter().map(|c| c.dns_names.len() as u64).sum();

        // tokio rejects a zero-capacity channel
        let (sender, receiver) = mpsc::channel(certificates.len().max(1));
        for cert in certificates {
            sender
                .try_send(cert)
                .map_err(|_| anyhow::anyhow!("Certificate queue overflow"))?;
        }
        drop(sender);

        Ok(Self {
            receiver: Mutex::new(receiver),
            total_certificates,
            total_names,
        })
    }

    /// Take the next certificate, or `None` when the queue is drained
    pub async fn next(&self) -> Option<Certificate> {
        self.receiver.lock().await.recv().await
    }

    pub fn total_certificates(&self) -> u64 {
        self.total_certificates
    }

    pub fn total_names(&self) -> u64 {
        self.total_names
    }
}

/// Walk the cache and keep every certificate the filter accepts.
///
/// Entries that fail to decode or parse are skipped. Certificates without
/// DNS names are dropped since there is nothing to probe.
pub fn load_certificates(cache: &EntriesCache, filter: &IssuerFilter) -> Result<Vec<Certificate>> {
    let mut certificates = Vec::new();
    let mut unreadable = 0u64;
    let mut total = 0u64;

    for (position, entry) in cache.entries()? {
        total += 1;

        let cert = match entry.and_then(|e| CertificateParser::parse_log_entry(&e.leaf_input)) {
            Ok(cert) => cert,
            Err(e) => {
                debug!("Skipping entry {}: {:#}", position, e);
                unreadable += 1;
                continue;
            }
        };

        if cert.dns_names.is_empty() || !filter.matches(&cert) {
            continue;
        }

        certificates.push(cert);
    }

    info!(
        "Filtered {} of {} cached entries for issuer {:?} ({} unreadable)",
        certificates.len(),
        total,
        filter.issuer(),
        unreadable
    );

    if certificates.is_empty() {
        anyhow::bail!("filtered list contains no certificates");
    }

    Ok(certificates)
}

/// Sync the local cache with the log and build the scan queue
pub async fn prepare_queue(config: &Config) -> Result<CertificateQueue> {
    let client = CtLogClient::new(&config.ct_log.url, &config.ct_log.key)
        .context("Failed to initialise CT log client")?;
    info!("Using CT log {} (log id {})", client.base_url(), client.log_id());

    let cache = EntriesCache::open(&config.ct_log.cache_file)?;

    let sth = client.get_sth().await?;
    let local = cache.count()?;
    info!(
        "local entries: {}, remote entries: {} at {}",
        local,
        sth.tree_size,
        sth.time()
            .map(|t| t.to_rfc2822())
            .unwrap_or_else(|| "unknown time".to_string())
    );

    if config.ct_log.update_cache && local < sth.tree_size {
        info!("updating local cache...");
        cache
            .update(&client, sth.tree_size, config.ct_log.batch_size)
            .await?;
    }

    info!("filtering local cache");
    let filter = IssuerFilter::new(config.scanner.issuer_filter.clone());
    let certificates = tokio::task::spawn_blocking(move || load_certificates(&cache, &filter))
        .await
        .context("Certificate loading task failed")??;

    CertificateQueue::new(certificates)
}
