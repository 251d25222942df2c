//! Spool worker
//!
//! Drives the queue pump: wakes on submissions and finished jobs, and on a
//! timer so retry backoffs are re-admitted even when nothing else happens.

use crate::queue::PrintQueueManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct SpoolWorker {
    manager: Arc<PrintQueueManager>,
    poll_interval: Duration,
}

impl SpoolWorker {
    pub fn new(manager: Arc<PrintQueueManager>, poll_interval: Duration) -> Self {
        Self {
            manager,
            poll_interval,
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("spool worker started");
        let notify = self.manager.notified();

        loop {
            self.manager.process_queue();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("spool worker received shutdown signal");
                    break;
                }
                _ = notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
