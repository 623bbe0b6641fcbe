//! Graceful shutdown handling.

use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Broadcasts a one-shot stop notification to the health listener and
/// anything else serving requests.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Notify every subscriber. Returns how many were reached.
    pub fn shutdown(&self) -> usize {
        match self.sender.send(()) {
            Ok(reached) => {
                debug!(subscribers = reached, "shutdown signalled");
                reached
            }
            Err(_) => {
                debug!("shutdown signalled with no subscribers");
                0
            }
        }
    }

    /// Wait for Ctrl+C, then notify every subscriber.
    ///
    /// If the signal handler cannot be installed the process would never
    /// stop cleanly, so subscribers are notified right away instead.
    pub async fn on_ctrl_c(&self) -> usize {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received shutdown signal"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
        self.shutdown()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
