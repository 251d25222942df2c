//! Spool configuration
//!
//! # Environment variables
//!
//! All settings can be overridden through environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | MAX_CONCURRENT_JOBS | 2 | In-flight job limit across all printers |
//! | MAX_QUEUE_SIZE | 100 | Active job cap; submissions beyond it are rejected |
//! | DEFAULT_MAX_ATTEMPTS | 3 | Attempts per job unless the request overrides |
//! | RETRY_BASE_DELAY_MS | 2000 | First retry backoff |
//! | RETRY_MAX_DELAY_MS | 60000 | Backoff ceiling |
//! | QUEUE_POLL_INTERVAL_MS | 1000 | Pump period of the spool worker |
//! | STATUS_CHECK_INTERVAL_MS | 30000 | Printer health poll period |
//! | TICKET_TIMEZONE | Europe/Madrid | Timezone for timestamps printed on tickets |
//! | CONNECT_TIMEOUT_MS | 5000 | Per connection attempt |
//! | WRITE_TIMEOUT_MS | 10000 | Per write operation |
//! | STATUS_TIMEOUT_MS | 800 | Per status probe |
//! | BLE_CHUNK_SIZE | 20 | Bytes per BLE write |
//! | BLE_CHUNK_DELAY_MS | 20 | Pause between BLE chunks |
//! | BLE_CHUNK_RETRIES | 3 | Extra attempts per dropped chunk |
//! | BLE_KEEP_ALIVE_MS | 15000 | Idle heartbeat period |
//! | BLE_AUTO_RECONNECT | true | Resume a job after a mid-job link drop |
//! | BLE_SCAN_DURATION_MS | 10000 | Discovery/pairing scan window |

use chrono_tz::Tz;
use gatehouse_printer::transport::TransportTuning;
use gatehouse_printer::ChunkTuning;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Worker pool size; also the in-flight job bound
    pub max_concurrent_jobs: usize,
    /// Cap on the active (non-terminal) job set
    pub max_queue_size: usize,
    /// Attempts per job unless the submission overrides
    pub default_max_attempts: u32,
    /// First retry delay; doubles per attempt up to the ceiling
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Pump period when no submissions arrive
    pub queue_poll_interval: Duration,
    /// Printer health poll period
    pub status_check_interval: Duration,
    /// Timezone for timestamps printed on tickets
    pub timezone: Tz,
    /// Timeouts and link tuning handed to the transports
    pub tuning: TransportTuning,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(name: &str, default: u64) -> Duration {
    Duration::from_millis(env_u64(name, default))
}

impl SpoolConfig {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults.
    pub fn from_env() -> Self {
        let timezone = std::env::var("TICKET_TIMEZONE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(chrono_tz::Europe::Madrid);

        let tuning = TransportTuning {
            connect_timeout: env_ms("CONNECT_TIMEOUT_MS", 5000),
            write_timeout: env_ms("WRITE_TIMEOUT_MS", 10000),
            status_timeout: env_ms("STATUS_TIMEOUT_MS", 800),
            chunk: ChunkTuning {
                chunk_size: env_u64("BLE_CHUNK_SIZE", 20).max(1) as usize,
                chunk_delay: env_ms("BLE_CHUNK_DELAY_MS", 20),
                max_chunk_retries: env_u64("BLE_CHUNK_RETRIES", 3) as u32,
            },
            keep_alive_interval: env_ms("BLE_KEEP_ALIVE_MS", 15000),
            auto_reconnect: std::env::var("BLE_AUTO_RECONNECT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            scan_duration: env_ms("BLE_SCAN_DURATION_MS", 10000),
        };

        Self {
            max_concurrent_jobs: env_u64("MAX_CONCURRENT_JOBS", 2).max(1) as usize,
            max_queue_size: env_u64("MAX_QUEUE_SIZE", 100) as usize,
            default_max_attempts: env_u64("DEFAULT_MAX_ATTEMPTS", 3).max(1) as u32,
            retry_base_delay: env_ms("RETRY_BASE_DELAY_MS", 2000),
            retry_max_delay: env_ms("RETRY_MAX_DELAY_MS", 60000),
            queue_poll_interval: env_ms("QUEUE_POLL_INTERVAL_MS", 1000),
            status_check_interval: env_ms("STATUS_CHECK_INTERVAL_MS", 30000),
            timezone,
            tuning,
        }
    }

    /// Fast-cadence configuration for tests
    pub fn with_overrides(max_concurrent_jobs: usize, max_queue_size: usize) -> Self {
        let mut config = Self::from_env();
        config.max_concurrent_jobs = max_concurrent_jobs;
        config.max_queue_size = max_queue_size;
        config.retry_base_delay = Duration::from_millis(20);
        config.retry_max_delay = Duration::from_millis(200);
        config.queue_poll_interval = Duration::from_millis(20);
        config.status_check_interval = Duration::from_millis(50);
        config
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpoolConfig::from_env();
        assert!(config.max_concurrent_jobs >= 1);
        assert!(config.default_max_attempts >= 1);
        assert!(config.tuning.chunk.chunk_size >= 1);
    }

    #[test]
    fn test_overrides() {
        let config = SpoolConfig::with_overrides(4, 10);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.max_queue_size, 10);
        assert!(config.queue_poll_interval < Duration::from_millis(100));
    }
}
