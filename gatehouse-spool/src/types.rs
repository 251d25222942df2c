//! Print job and printer profile types

use chrono::{DateTime, Utc};
use gatehouse_printer::escpos::Capabilities;
use gatehouse_printer::transport::LinkConfig;
use gatehouse_printer::{ErrorKind, PrintError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which ticket template a job renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    /// Issued at the barrier on vehicle entry
    Entry,
    /// Issued at the barrier on vehicle exit
    Exit,
    /// Payment receipt with fee breakdown
    Receipt,
    /// Free-form thermal slip (header/footer lines only)
    Thermal,
}

/// Dispatch priority. Ordering matters: later variants dequeue first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

/// Job lifecycle states
///
/// Transitions only move along:
/// `queued -> printing -> {completed | failed | retrying}`,
/// `retrying -> queued` once the backoff delay elapses, and any
/// pre-printing state `-> cancelled` on explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Printing,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are purged by `clear_completed` (completed,
    /// cancelled) or kept for inspection (failed).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the job still occupies a slot in the active queue
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Printing => "printing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One fee/amount row on a receipt; amounts arrive preformatted because
/// fee calculation belongs to the business collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeLine {
    pub label: String,
    pub amount: String,
}

/// Structured ticket payload, immutable once enqueued
///
/// Mirrors the parking entry record: plate, vehicle, driver, entry/exit
/// times and the fee rows decided upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketData {
    pub site_name: String,
    #[serde(default)]
    pub header_lines: Vec<String>,
    #[serde(default)]
    pub vehicle_number: String,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fee_lines: Vec<FeeLine>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub serial: Option<u64>,
    /// Barcode/QR payload, typically the ticket id
    #[serde(default)]
    pub reference: Option<String>,
    /// Base64-encoded PNG/JPEG logo, rasterized at render time
    #[serde(default)]
    pub logo_base64: Option<String>,
    #[serde(default)]
    pub footer_lines: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Error snapshot attached to a failed attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
}

impl From<&PrintError> for JobError {
    fn from(err: &PrintError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

/// Job submission contract for business/UI collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub ticket_id: String,
    pub ticket_kind: TicketKind,
    pub ticket: TicketData,
    /// Defaults to the registry's default printer when absent
    #[serde(default)]
    pub printer_id: Option<String>,
    #[serde(default)]
    pub priority: Option<JobPriority>,
    #[serde(default)]
    pub copies: Option<u8>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// A print job, owned exclusively by the queue manager for its lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    pub ticket_id: String,
    pub ticket_kind: TicketKind,
    pub ticket: TicketData,
    pub printer_id: String,
    pub priority: JobPriority,
    pub copies: u8,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub printed_at: Option<DateTime<Utc>>,
    /// When a retrying job becomes eligible for re-admission
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<JobError>,
    /// Capability downgrades recorded at build time (e.g. cut omitted)
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Compiled ESC/POS bytes, built once and reused across retries
    #[serde(skip)]
    pub rendered: Option<Arc<Vec<u8>>>,
}

/// Default print settings applied by the renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintSettings {
    /// Darkness 1-15 where supported
    #[serde(default = "default_density")]
    pub density: u8,
    /// Lines fed before the cut
    #[serde(default = "default_feed_margin")]
    pub feed_margin: u8,
    #[serde(default = "default_true")]
    pub auto_cut: bool,
}

fn default_density() -> u8 {
    8
}

fn default_feed_margin() -> u8 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            density: default_density(),
            feed_margin: default_feed_margin(),
            auto_cut: default_true(),
        }
    }
}

/// Stored configuration describing how to reach one physical printer and
/// what it supports. Read-mostly during printing; mutated only by the
/// configuration collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterProfile {
    pub id: String,
    pub name: String,
    /// Free-form type tag from the configuration UI (thermal, receipt, ...)
    #[serde(default)]
    pub printer_type: Option<String>,
    pub link: LinkConfig,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub defaults: PrintSettings,
    #[serde(default)]
    pub is_default: bool,
}

/// Aggregate queue counters for listeners
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub printing: usize,
    pub completed: usize,
    pub failed: usize,
    pub retrying: usize,
    pub cancelled: usize,
    pub is_processing: bool,
    /// Moving average duration of one completed job
    pub avg_job_ms: u64,
    /// `avg_job_ms x jobs queued ahead`
    pub estimated_wait_ms: u64,
}
