//! Print service facade
//!
//! The one object the hosting application constructs at startup and tears
//! down on shutdown. Wires the queue manager, spool worker and status
//! monitor together; exposes job submission, queue operations, printer
//! management and the event stream. Explicitly constructed and injectable;
//! there is no global instance.

use crate::config::SpoolConfig;
use crate::dispatch::{HardwareTransportFactory, TransportFactory};
use crate::error::{SpoolError, SpoolResult};
use crate::events::{EventHub, QueueEvent};
use crate::monitor::{StatusCache, StatusMonitor};
use crate::profiles::ProfileRegistry;
use crate::queue::{PrintQueueManager, ProfileLocks};
use crate::tasks::{BackgroundTasks, TaskKind};
use crate::types::{JobRequest, PrintJob, PrinterProfile, QueueStats};
use crate::worker::SpoolWorker;
use gatehouse_printer::transport::{bluetooth, usb};
use gatehouse_printer::{DiscoveredBlePrinter, DiscoveredUsbPrinter, PrinterHealth};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

pub struct PrintService {
    config: SpoolConfig,
    registry: Arc<ProfileRegistry>,
    locks: Arc<ProfileLocks>,
    cache: Arc<StatusCache>,
    events: EventHub,
    factory: Arc<dyn TransportFactory>,
    manager: Arc<PrintQueueManager>,
    tasks: Option<BackgroundTasks>,
}

impl PrintService {
    /// Build a service against real hardware transports
    pub fn new(config: SpoolConfig) -> Self {
        let factory = Arc::new(HardwareTransportFactory::new(config.tuning.clone()));
        Self::with_factory(config, Arc::new(ProfileRegistry::new()), factory)
    }

    /// Build a service with a custom transport factory (tests, simulators)
    pub fn with_factory(
        config: SpoolConfig,
        registry: Arc<ProfileRegistry>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let locks = Arc::new(ProfileLocks::new());
        let cache = Arc::new(StatusCache::new());
        let events = EventHub::new();

        let manager = PrintQueueManager::new(
            config.clone(),
            Arc::clone(&registry),
            Arc::clone(&locks),
            Arc::clone(&cache),
            events.clone(),
            Arc::clone(&factory),
        );

        Self {
            config,
            registry,
            locks,
            cache,
            events,
            factory,
            manager,
            tasks: None,
        }
    }

    /// Spawn the spool worker and status monitor. Must run inside a tokio
    /// runtime; calling twice is a no-op.
    pub fn start(&mut self) {
        if self.tasks.is_some() {
            return;
        }

        let mut tasks = BackgroundTasks::new();

        let worker = SpoolWorker::new(Arc::clone(&self.manager), self.config.queue_poll_interval);
        let shutdown = tasks.shutdown_token();
        tasks.spawn("spool_worker", TaskKind::Worker, async move {
            worker.run(shutdown).await;
        });

        let monitor = StatusMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.locks),
            Arc::clone(&self.cache),
            self.events.clone(),
            Arc::clone(&self.factory),
            self.config.status_check_interval,
        );
        let shutdown = tasks.shutdown_token();
        tasks.spawn("status_monitor", TaskKind::Periodic, async move {
            monitor.run(shutdown).await;
        });

        info!(tasks = tasks.len(), "print service started");
        self.tasks = Some(tasks);
    }

    /// Stop background tasks and wait for in-flight work to wind down
    pub async fn shutdown(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await;
        }
        info!("print service stopped");
    }

    // ========== Job operations ==========

    pub fn submit(&self, req: JobRequest) -> SpoolResult<String> {
        self.manager.submit(req)
    }

    pub fn cancel(&self, job_id: &str) -> SpoolResult<()> {
        self.manager.cancel(job_id)
    }

    pub fn retry_failed(&self, job_id: &str) -> SpoolResult<()> {
        self.manager.retry_failed(job_id)
    }

    pub fn reprint(&self, job_id: &str) -> SpoolResult<String> {
        self.manager.reprint(job_id)
    }

    pub fn clear_completed(&self) -> usize {
        self.manager.clear_completed()
    }

    pub fn get_job(&self, job_id: &str) -> Option<PrintJob> {
        self.manager.get_job(job_id)
    }

    pub fn queue_status(&self) -> QueueStats {
        self.manager.queue_status()
    }

    /// Event stream for UI and history collaborators
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    // ========== Printer management ==========

    pub fn profiles(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    pub fn upsert_profile(&self, profile: PrinterProfile) {
        self.registry.upsert(profile);
    }

    pub fn remove_profile(&self, printer_id: &str) -> SpoolResult<()> {
        self.registry
            .remove(printer_id)
            .map(|_| self.cache.forget(printer_id))
            .ok_or_else(|| SpoolError::ProfileNotFound(printer_id.to_string()))
    }

    /// Connect, probe, disconnect - nothing is printed. Updates the status
    /// cache so the result immediately influences scheduling.
    #[instrument(skip(self))]
    pub async fn test_printer(&self, printer_id: &str) -> SpoolResult<PrinterHealth> {
        let profile = self
            .registry
            .get(printer_id)
            .ok_or_else(|| SpoolError::ProfileNotFound(printer_id.to_string()))?;

        let lock = self.locks.lock_for(printer_id);
        let _guard = lock.lock().await;

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
            Err(e) => PrinterHealth::offline(e.to_string()),
        };

        self.cache.update(printer_id, health.clone());
        self.events.emit(QueueEvent::PrinterStatus {
            printer_id: printer_id.to_string(),
            health: health.clone(),
        });
        Ok(health)
    }

    // ========== Discovery ==========

    /// BLE scan for printers, bounded by the configured scan duration
    pub async fn scan_bluetooth(&self) -> SpoolResult<Vec<DiscoveredBlePrinter>> {
        Ok(bluetooth::scan_for_printers(None, self.config.tuning.scan_duration).await?)
    }

    /// Enumerate USB devices with known thermal printer vendor ids
    pub fn discover_usb(&self) -> SpoolResult<Vec<DiscoveredUsbPrinter>> {
        Ok(usb::discover_printers()?)
    }
}

impl std::fmt::Debug for PrintService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintService")
            .field("profiles", &self.registry.len())
            .field("running", &self.tasks.is_some())
            .finish()
    }
}
