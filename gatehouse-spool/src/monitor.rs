//! Printer status monitor
//!
//! Polls printer health on its own schedule, independent of job
//! processing. The monitor never contends for a printer that is mid
//! transmission: it takes the same per-profile lock the dispatcher uses,
//! but with `try_lock`, skipping the cycle instead of waiting. The queue
//! manager consults the resulting cache before dispatching so jobs are not
//! sent to a printer already known to be offline or out of paper.

use crate::dispatch::TransportFactory;
use crate::events::{EventHub, QueueEvent};
use crate::profiles::ProfileRegistry;
use crate::queue::ProfileLocks;
use dashmap::DashMap;
use gatehouse_printer::PrinterHealth;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Latest known health per printer profile
#[derive(Debug, Default)]
pub struct StatusCache {
    latest: DashMap<String, PrinterHealth>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, printer_id: &str) -> Option<PrinterHealth> {
        self.latest.get(printer_id).map(|h| h.clone())
    }

    /// Store a fresh reading; returns the previous online flag for edge
    /// detection.
    pub fn update(&self, printer_id: &str, health: PrinterHealth) -> Option<bool> {
        self.latest
            .insert(printer_id.to_string(), health)
            .map(|prev| prev.online)
    }

    pub fn forget(&self, printer_id: &str) {
        self.latest.remove(printer_id);
    }
}

/// Periodic health poller for every registered printer
pub struct StatusMonitor {
    registry: Arc<ProfileRegistry>,
    locks: Arc<ProfileLocks>,
    cache: Arc<StatusCache>,
    events: EventHub,
    factory: Arc<dyn TransportFactory>,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(
        registry: Arc<ProfileRegistry>,
        locks: Arc<ProfileLocks>,
        cache: Arc<StatusCache>,
        events: EventHub,
        factory: Arc<dyn TransportFactory>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            locks,
            cache,
            events,
            factory,
            interval,
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "status monitor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("status monitor received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.poll_all().await;
                }
            }
        }
    }

    /// One polling pass across the registry
    pub async fn poll_all(&self) {
        for profile in self.registry.list() {
            let lock = self.locks.lock_for(&profile.id);
            let Ok(_guard) = lock.try_lock() else {
                // Transmission in progress; skip this cycle rather than
                // contend for the printer.
                debug!(printer_id = %profile.id, "printer busy, skipping status check");
                continue;
            };

            let mut transport = self.factory.open(&profile);
            let health = match transport.connect().await {
                Ok(()) => {
                    let health = transport
                        .check_status()
                        .await
                        .unwrap_or_else(|e| PrinterHealth::offline(e.to_string()));
                    let _ = transport.disconnect().await;
                    health
                }
                Err(e) => {
                    warn!(printer_id = %profile.id, error = %e, "status probe failed");
                    PrinterHealth::offline(e.to_string())
                }
            };

            let was_online = self.cache.update(&profile.id, health.clone());

            self.events.emit(QueueEvent::PrinterStatus {
                printer_id: profile.id.clone(),
                health: health.clone(),
            });

            // Connected/disconnected only on edges, not every poll
            match (was_online, health.online) {
                (Some(false) | None, true) => {
                    self.events.emit(QueueEvent::PrinterConnected {
                        printer_id: profile.id.clone(),
                    });
                }
                (Some(true), false) => {
                    self.events.emit(QueueEvent::PrinterDisconnected {
                        printer_id: profile.id.clone(),
                    });
                }
                _ => {}
            }
        }
    }
}
