//! Queue event stream
//!
//! Every job transition emits exactly one event; listeners (the hosting UI,
//! the history store) subscribe through a broadcast channel. Emission is
//! best-effort: a lagging or absent listener never blocks printing.

use crate::types::{PrintJob, QueueStats};
use gatehouse_printer::PrinterHealth;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast capacity; sized for bursts of job transitions plus periodic
/// status updates without lagging slow UI listeners.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One notification to external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    JobCreated { job: PrintJob },
    JobUpdated { job: PrintJob },
    JobCompleted { job: PrintJob },
    JobFailed { job: PrintJob },
    JobCancelled { job: PrintJob },
    QueueStatus { stats: QueueStats },
    PrinterStatus { printer_id: String, health: PrinterHealth },
    PrinterConnected { printer_id: String },
    PrinterDisconnected { printer_id: String },
}

impl QueueEvent {
    /// Short name for logs and routing
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::JobCreated { .. } => "job:created",
            QueueEvent::JobUpdated { .. } => "job:updated",
            QueueEvent::JobCompleted { .. } => "job:completed",
            QueueEvent::JobFailed { .. } => "job:failed",
            QueueEvent::JobCancelled { .. } => "job:cancelled",
            QueueEvent::QueueStatus { .. } => "queue:status",
            QueueEvent::PrinterStatus { .. } => "printer:status",
            QueueEvent::PrinterConnected { .. } => "printer:connected",
            QueueEvent::PrinterDisconnected { .. } => "printer:disconnected",
        }
    }
}

/// Shared event sender handed to the queue manager and status monitor
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Emit one event; silently dropped when nobody listens
    pub fn emit(&self, event: QueueEvent) {
        tracing::trace!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}
