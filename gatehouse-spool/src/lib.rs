//! # gatehouse-spool
//!
//! Print job queue and orchestration for parking-gate thermal printing.
//!
//! The spool sits between business collaborators (entry/exit flows, the
//! configuration UI, the history store) and the hardware layer in
//! `gatehouse-printer`. It owns job lifecycle, priority scheduling,
//! retry/backoff, per-printer serialization and printer health monitoring,
//! and reports every transition on an event stream.
//!
//! ## Example
//!
//! ```ignore
//! use gatehouse_spool::{JobRequest, PrintService, SpoolConfig, TicketData, TicketKind};
//!
//! let mut service = PrintService::new(SpoolConfig::from_env());
//! service.upsert_profile(profile_from_settings_store());
//! service.start();
//!
//! let job_id = service.submit(JobRequest {
//!     ticket_id: "TCK-1042".into(),
//!     ticket_kind: TicketKind::Entry,
//!     ticket: TicketData {
//!         site_name: "Central Lot".into(),
//!         vehicle_number: "AB-123-CD".into(),
//!         ..Default::default()
//!     },
//!     printer_id: None,
//!     priority: None,
//!     copies: None,
//!     max_attempts: None,
//! })?;
//!
//! // ... listen on service.subscribe() for job:completed / job:failed
//! service.shutdown().await;
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod monitor;
pub mod profiles;
pub mod queue;
pub mod renderer;
pub mod retry;
pub mod service;
pub mod tasks;
pub mod types;
pub mod worker;

// Re-exports
pub use config::SpoolConfig;
pub use dispatch::{HardwareTransportFactory, TransportFactory};
pub use error::{SpoolError, SpoolResult};
pub use events::{EventHub, QueueEvent};
pub use monitor::{StatusCache, StatusMonitor};
pub use profiles::ProfileRegistry;
pub use queue::{PrintQueueManager, ProfileLocks};
pub use renderer::TicketRenderer;
pub use retry::{RetryDecision, RetryPolicy};
pub use service::PrintService;
pub use types::{
    FeeLine, JobError, JobPriority, JobRequest, JobStatus, PrintJob, PrintSettings,
    PrinterProfile, QueueStats, TicketData, TicketKind,
};
pub use worker::SpoolWorker;
