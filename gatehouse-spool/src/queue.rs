//! Print queue manager
//!
//! Owns every [`PrintJob`] for its lifetime and is the only place job state
//! changes. Scheduling rules:
//!
//! - dequeue order is priority first (urgent > high > normal), then
//!   creation order within a tier (stable FIFO)
//! - at most `max_concurrent_jobs` transmissions in flight globally
//! - jobs for one printer profile are serialized through a per-profile
//!   mutex; two jobs are never mid-transmission to the same printer
//! - an in-flight job is never interrupted; cancellation is only honored
//!   before transmission starts
//!
//! # Job flow
//!
//! ```text
//! submit(req)
//!     ├─ 1. Validate fields and queue capacity
//!     ├─ 2. Insert job as queued, emit job:created
//!     └─ 3. Wake the pump
//! process_queue()
//!     ├─ 1. Re-admit retrying jobs whose backoff elapsed
//!     ├─ 2. Sort eligible jobs, acquire permit + profile lock
//!     ├─ 3. Mark printing, emit job:updated, spawn transmission
//!     └─ 4. Emit queue:status
//! transmission task
//!     ├─ 1. Short-circuit on cached offline/out-of-paper status
//!     ├─ 2. Render + compile once, cache bytes on the job
//!     ├─ 3. connect -> send x copies -> disconnect
//!     └─ 4. complete_job / fail_attempt (retry controller decides)
//! ```

use crate::config::SpoolConfig;
use crate::dispatch::{self, TransportFactory};
use crate::error::{SpoolError, SpoolResult};
use crate::events::{EventHub, QueueEvent};
use crate::monitor::StatusCache;
use crate::profiles::ProfileRegistry;
use crate::renderer::TicketRenderer;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{JobError, JobRequest, JobStatus, PrintJob, QueueStats};
use chrono::Utc;
use dashmap::DashMap;
use gatehouse_printer::PrintError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, info, instrument, warn};

/// Per-profile mutual exclusion tokens, shared with the status monitor
#[derive(Debug, Default)]
pub struct ProfileLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, printer_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(printer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct PrintQueueManager {
    config: SpoolConfig,
    jobs: DashMap<String, PrintJob>,
    profiles: Arc<ProfileRegistry>,
    locks: Arc<ProfileLocks>,
    status_cache: Arc<StatusCache>,
    events: EventHub,
    factory: Arc<dyn TransportFactory>,
    renderer: TicketRenderer,
    retry: RetryPolicy,
    /// Global in-flight bound; one permit per transmission
    inflight: Arc<Semaphore>,
    /// Wakes the spool worker on submissions and finished jobs
    notify: Arc<Notify>,
    /// Serializes capacity check + insert in `submit`
    submit_guard: std::sync::Mutex<()>,
    is_processing: AtomicBool,
    /// Monotonic submission counter for stable FIFO within a priority tier
    next_seq: AtomicU64,
    /// Moving average duration of one job in milliseconds
    avg_job_ms: AtomicU64,
}

impl PrintQueueManager {
    pub fn new(
        config: SpoolConfig,
        profiles: Arc<ProfileRegistry>,
        locks: Arc<ProfileLocks>,
        status_cache: Arc<StatusCache>,
        events: EventHub,
        factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let retry = RetryPolicy::new(config.retry_base_delay, config.retry_max_delay);
        let renderer = TicketRenderer::new(config.timezone);
        let inflight = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Arc::new(Self {
            config,
            jobs: DashMap::new(),
            profiles,
            locks,
            status_cache,
            events,
            factory,
            renderer,
            retry,
            inflight,
            notify: Arc::new(Notify::new()),
            submit_guard: std::sync::Mutex::new(()),
            is_processing: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            avg_job_ms: AtomicU64::new(0),
        })
    }

    /// Handle the spool worker waits on
    pub fn notified(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Snapshot of one job
    pub fn get_job(&self, job_id: &str) -> Option<PrintJob> {
        self.jobs.get(job_id).map(|j| j.clone())
    }

    /// Jobs still occupying queue slots
    fn active_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.status.is_active()).count()
    }

    /// Accept a job into the queue.
    ///
    /// Validates required fields, rejects when the active set is at
    /// `max_queue_size`, and returns the generated job id.
    #[instrument(skip(self, req), fields(ticket_id = %req.ticket_id))]
    pub fn submit(&self, req: JobRequest) -> SpoolResult<String> {
        if req.ticket_id.trim().is_empty() {
            return Err(SpoolError::Validation("ticket_id must not be empty".into()));
        }
        if let Some(0) = req.copies {
            return Err(SpoolError::Validation("copies must be at least 1".into()));
        }

        let profile = self.profiles.resolve(req.printer_id.as_deref())?;

        let _guard = self.submit_guard.lock().expect("submit guard poisoned");
        if self.active_count() >= self.config.max_queue_size {
            return Err(SpoolError::Validation(format!(
                "print queue full ({} jobs)",
                self.config.max_queue_size
            )));
        }

        let now = Utc::now();
        let job = PrintJob {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: req.ticket_id,
            ticket_kind: req.ticket_kind,
            ticket: req.ticket,
            printer_id: profile.id,
            priority: req.priority.unwrap_or_default(),
            copies: req.copies.unwrap_or(1),
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: req.max_attempts.unwrap_or(self.config.default_max_attempts).max(1),
            created_at: now,
            updated_at: now,
            printed_at: None,
            retry_at: None,
            last_error: None,
            warnings: Vec::new(),
            rendered: None,
        };

        let id = job.id.clone();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        info!(job_id = %id, printer_id = %job.printer_id, priority = ?job.priority, seq, "job queued");

        self.jobs.insert(id.clone(), job.clone());
        self.events.emit(QueueEvent::JobCreated { job });
        drop(_guard);

        self.notify.notify_one();
        Ok(id)
    }

    /// One scheduling pass. Idempotent; safe to call from a timer, from
    /// submission wakeups, and after each finished job.
    ///
    /// Must run inside a tokio runtime: dispatched jobs are spawned tasks.
    pub fn process_queue(self: &Arc<Self>) {
        self.is_processing.store(true, Ordering::SeqCst);

        self.readmit_due_retries();

        // Eligible jobs in dispatch order: priority desc, then FIFO
        let mut eligible: Vec<(String, crate::types::JobPriority, chrono::DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .map(|j| (j.id.clone(), j.priority, j.created_at))
            .collect();
        eligible.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        for (job_id, _, _) in eligible {
            let Ok(permit) = Arc::clone(&self.inflight).try_acquire_owned() else {
                // Worker pool exhausted; later jobs must wait for a slot.
                break;
            };

            let Some(printer_id) = self.jobs.get(&job_id).map(|j| j.printer_id.clone()) else {
                continue;
            };

            let lock = self.locks.lock_for(&printer_id);
            let Ok(profile_guard) = Arc::clone(&lock).try_lock_owned() else {
                // Printer busy with another job; permit goes back to the
                // pool and the next profile gets a chance.
                drop(permit);
                continue;
            };

            // Re-check under the entry lock: the job may have been
            // cancelled since the scan.
            let dispatched = {
                let Some(mut job) = self.jobs.get_mut(&job_id) else {
                    continue;
                };
                if job.status != JobStatus::Queued {
                    false
                } else {
                    job.status = JobStatus::Printing;
                    job.updated_at = Utc::now();
                    self.events.emit(QueueEvent::JobUpdated { job: job.clone() });
                    true
                }
            };

            if dispatched {
                debug!(job_id = %job_id, printer_id = %printer_id, "dispatching");
                let manager = Arc::clone(self);
                let id = job_id.clone();
                tokio::spawn(async move {
                    manager.run_job(&id).await;
                    drop(profile_guard);
                    drop(permit);
                    manager.notify.notify_one();
                    manager.process_queue();
                });
            }
        }

        self.is_processing.store(false, Ordering::SeqCst);
        self.events.emit(QueueEvent::QueueStatus {
            stats: self.queue_status(),
        });
    }

    /// Move retrying jobs whose backoff elapsed back to queued
    fn readmit_due_retries(&self) {
        let now = Utc::now();
        let due: Vec<String> = self
            .jobs
            .iter()
            .filter(|j| {
                j.status == JobStatus::Retrying && j.retry_at.map(|at| at <= now).unwrap_or(true)
            })
            .map(|j| j.id.clone())
            .collect();

        for job_id in due {
            if let Some(mut job) = self.jobs.get_mut(&job_id) {
                if job.status != JobStatus::Retrying {
                    continue;
                }
                job.status = JobStatus::Queued;
                job.retry_at = None;
                job.updated_at = Utc::now();
                debug!(job_id = %job_id, attempts = job.attempts, "retry re-admitted");
                self.events.emit(QueueEvent::JobUpdated { job: job.clone() });
            }
        }
    }

    /// Execute one dispatched job. Caller holds the in-flight permit and
    /// the profile lock for the whole call.
    async fn run_job(self: &Arc<Self>, job_id: &str) {
        let started = Instant::now();

        let Some(job) = self.get_job(job_id) else {
            return;
        };

        let Some(profile) = self.profiles.get(&job.printer_id) else {
            self.fail_attempt(
                job_id,
                &PrintError::Validation(format!("printer profile {} removed", job.printer_id)),
            );
            return;
        };

        // Known-bad printer: fail the attempt without touching the link
        if let Some(health) = self.status_cache.latest(&profile.id) {
            if !health.is_printable() {
                let reason = if health.online {
                    format!("printer {} out of paper", profile.id)
                } else {
                    format!("printer {} offline", profile.id)
                };
                warn!(job_id = %job_id, "{}, skipping transmission", reason);
                self.fail_attempt(job_id, &PrintError::Connection(reason));
                return;
            }
        }

        // Render once; retries reuse the cached buffer
        let bytes = match job.rendered {
            Some(ref bytes) => Arc::clone(bytes),
            None => {
                let stream = self.renderer.render(job.ticket_kind, &job.ticket, &profile);
                match stream.compile(&profile.capabilities) {
                    Ok(compiled) => {
                        let warnings = compiled.warnings().to_vec();
                        for w in &warnings {
                            warn!(job_id = %job_id, warning = %w, "build downgrade");
                        }
                        let bytes = Arc::new(compiled.into_bytes());
                        if let Some(mut entry) = self.jobs.get_mut(job_id) {
                            entry.rendered = Some(Arc::clone(&bytes));
                            entry.warnings.extend(warnings);
                        }
                        bytes
                    }
                    Err(e) => {
                        // Capability/validation failures are caught here,
                        // before any bytes are sent.
                        self.fail_attempt(job_id, &e);
                        return;
                    }
                }
            }
        };

        let mut transport = self.factory.open(&profile);
        match dispatch::transmit(&mut transport, &bytes, job.copies).await {
            Ok(report) => {
                info!(
                    job_id = %job_id,
                    bytes = report.bytes_sent,
                    chunks = report.chunks_sent,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job printed"
                );
                self.complete_job(job_id, started);
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "transmission failed");
                self.fail_attempt(job_id, &e);
            }
        }
    }

    fn complete_job(&self, job_id: &str, started: Instant) {
        let Some(mut job) = self.jobs.get_mut(job_id) else {
            return;
        };
        if job.status != JobStatus::Printing {
            return;
        }

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.printed_at = Some(now);
        job.updated_at = now;
        self.events.emit(QueueEvent::JobCompleted { job: job.clone() });
        drop(job);

        // Exponential moving average feeding the wait estimate
        let sample = started.elapsed().as_millis() as u64;
        let old = self.avg_job_ms.load(Ordering::Relaxed);
        let next = if old == 0 { sample } else { (old * 7 + sample) / 8 };
        self.avg_job_ms.store(next, Ordering::Relaxed);
    }

    /// Record a failed attempt and let the retry controller decide what
    /// happens next.
    fn fail_attempt(&self, job_id: &str, error: &PrintError) {
        let Some(mut job) = self.jobs.get_mut(job_id) else {
            return;
        };
        if job.status != JobStatus::Printing {
            return;
        }

        // Attempts never exceed max_attempts, manual retries included
        job.attempts = (job.attempts + 1).min(job.max_attempts);
        let job_error = JobError::from(error);
        job.last_error = Some(job_error.clone());
        job.updated_at = Utc::now();

        match self
            .retry
            .decide(&job_error, job.attempts, job.max_attempts)
        {
            RetryDecision::GiveUp => {
                job.status = JobStatus::Failed;
                job.retry_at = None;
                warn!(
                    job_id = %job_id,
                    attempts = job.attempts,
                    kind = %job_error.kind,
                    "job failed permanently"
                );
                self.events.emit(QueueEvent::JobFailed { job: job.clone() });
            }
            RetryDecision::RetryAfter(delay) => {
                job.status = JobStatus::Retrying;
                job.retry_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                info!(
                    job_id = %job_id,
                    attempts = job.attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "job scheduled for retry"
                );
                self.events.emit(QueueEvent::JobUpdated { job: job.clone() });
            }
        }
    }

    /// Manually force a failed job back into the queue, attempt count
    /// preserved.
    pub fn retry_failed(&self, job_id: &str) -> SpoolResult<()> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SpoolError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Failed {
            return Err(SpoolError::Conflict(format!(
                "job is {}, only failed jobs can be retried",
                job.status
            )));
        }

        job.status = JobStatus::Queued;
        job.retry_at = None;
        job.updated_at = Utc::now();
        info!(job_id = %job_id, attempts = job.attempts, "manual retry");
        self.events.emit(QueueEvent::JobUpdated { job: job.clone() });
        drop(job);

        self.notify.notify_one();
        Ok(())
    }

    /// Cancel a job that has not started transmitting. Once bytes are in
    /// flight the request is rejected until the job reaches a terminal or
    /// retrying state.
    pub fn cancel(&self, job_id: &str) -> SpoolResult<()> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SpoolError::JobNotFound(job_id.to_string()))?;

        match job.status {
            JobStatus::Queued | JobStatus::Retrying => {
                job.status = JobStatus::Cancelled;
                job.retry_at = None;
                job.updated_at = Utc::now();
                info!(job_id = %job_id, "job cancelled");
                self.events.emit(QueueEvent::JobCancelled { job: job.clone() });
                Ok(())
            }
            JobStatus::Printing => Err(SpoolError::Conflict(
                "job is printing and cannot be cancelled".into(),
            )),
            status => Err(SpoolError::Conflict(format!("job already {}", status))),
        }
    }

    /// Purge completed and cancelled jobs from the active set. Failed jobs
    /// stay visible until retried or cleared by their owner; history
    /// retention is the external store's concern.
    pub fn clear_completed(&self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !matches!(job.status, JobStatus::Completed | JobStatus::Cancelled)
        });
        let removed = before - self.jobs.len();
        if removed > 0 {
            debug!(removed, "terminal jobs cleared");
            self.events.emit(QueueEvent::QueueStatus {
                stats: self.queue_status(),
            });
        }
        removed
    }

    /// Clone a terminal job into a fresh queued job, reusing the compiled
    /// buffer.
    pub fn reprint(&self, job_id: &str) -> SpoolResult<String> {
        let source = self
            .get_job(job_id)
            .ok_or_else(|| SpoolError::JobNotFound(job_id.to_string()))?;

        if !source.status.is_terminal() {
            return Err(SpoolError::Conflict(format!(
                "job is {}, only finished jobs can be reprinted",
                source.status
            )));
        }

        self.submit_reprint(source)
    }

    fn submit_reprint(&self, source: PrintJob) -> SpoolResult<String> {
        let _guard = self.submit_guard.lock().expect("submit guard poisoned");
        if self.active_count() >= self.config.max_queue_size {
            return Err(SpoolError::Validation(format!(
                "print queue full ({} jobs)",
                self.config.max_queue_size
            )));
        }

        let now = Utc::now();
        let job = PrintJob {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            updated_at: now,
            printed_at: None,
            retry_at: None,
            last_error: None,
            ..source
        };
        let id = job.id.clone();
        self.next_seq.fetch_add(1, Ordering::SeqCst);
        info!(job_id = %id, "reprint queued");
        self.jobs.insert(id.clone(), job.clone());
        self.events.emit(QueueEvent::JobCreated { job });
        drop(_guard);

        self.notify.notify_one();
        Ok(id)
    }

    /// Aggregate counts plus the wait estimate
    pub fn queue_status(&self) -> QueueStats {
        let mut stats = QueueStats {
            is_processing: self.is_processing.load(Ordering::SeqCst),
            avg_job_ms: self.avg_job_ms.load(Ordering::Relaxed),
            ..QueueStats::default()
        };

        for job in self.jobs.iter() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Printing => stats.printing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }

        stats.estimated_wait_ms = stats.avg_job_ms * stats.queued as u64;
        stats
    }
}

impl std::fmt::Debug for PrintQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintQueueManager")
            .field("jobs", &self.jobs.len())
            .field("max_concurrent", &self.config.max_concurrent_jobs)
            .finish()
    }
}

#[cfg(test)]
mod tests;
