//! Cooperative cancellation of a running scan
//!
//! An interrupt never aborts in-flight work: it stops the progress line,
//! flips the shared stop flag that workers check between certificates, and
//! lets the scan drain.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Lifecycle of a scan as seen by the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Stopping,
}

pub struct CancellationController {
    state_tx: watch::Sender<ScanState>,
    progress_tx: watch::Sender<bool>,
}

impl CancellationController {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ScanState::Running);
        let (progress_tx, _) = watch::channel(false);

        Self {
            state_tx,
            progress_tx,
        }
    }

    /// Stop flag for a worker
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state_tx.subscribe()
    }

    /// Becomes `true` once the progress display should stop
    pub fn progress_signal(&self) -> watch::Receiver<bool> {
        self.progress_tx.subscribe()
    }

    pub fn state(&self) -> ScanState {
        *self.state_tx.borrow()
    }

    pub fn halt_progress(&self) {
        self.progress_tx.send_replace(true);
    }

    /// Move to `Stopping`. Returns `false` if a stop was already requested.
    pub fn request_stop(&self) -> bool {
        self.halt_progress();

        let previous = self.state_tx.send_replace(ScanState::Stopping);
        if previous == ScanState::Stopping {
            return false;
        }

        println!("\n\ninterrupted, cleaning up");
        warn!("Interrupt received, waiting for in-flight certificates");
        true
    }

    /// Spawn a task turning every Ctrl-C into [`request_stop`](Self::request_stop).
    ///
    /// The caller aborts the returned handle once the scan is over.
    pub fn listen_for_interrupt(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for interrupt: {}", e);
                    break;
                }
                controller.request_stop();
            }
        })
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}
