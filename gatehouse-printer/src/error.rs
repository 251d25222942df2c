//! Error types for the printer library

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Printer error types
///
/// Every transport translates platform errors into one of these variants at
/// the adapter boundary; callers above the transport layer never see raw
/// `rusb`/`btleplug`/socket errors.
#[derive(Debug, Error)]
pub enum PrintError {
    /// Cannot establish or maintain a link to the printer
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Bluetooth pairing/bonding failure
    #[error("Pairing failed: {0}")]
    Pairing(String),

    /// Write failed mid-stream
    #[error("Transmission failed: {0}")]
    Transmission(String),

    /// No response within the configured bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// OS or hardware denied access to the device
    #[error("Permission denied: {0}")]
    Permissions(String),

    /// Bad input (address, config, job fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested feature unsupported by the printer profile
    #[error("Capability not supported: {0}")]
    Capability(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrintError {
    /// Classification kind, stable across error messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrintError::Connection(_) => ErrorKind::Connection,
            PrintError::Pairing(_) => ErrorKind::Pairing,
            PrintError::Transmission(_) => ErrorKind::Transmission,
            PrintError::Timeout(_) => ErrorKind::Timeout,
            PrintError::Permissions(_) => ErrorKind::Permissions,
            PrintError::Validation(_) => ErrorKind::Validation,
            PrintError::Capability(_) => ErrorKind::Capability,
            PrintError::Io(_) => ErrorKind::Transmission,
        }
    }

    /// Whether the retry controller may reschedule a job that failed with
    /// this error. Permission, validation and capability failures are
    /// terminal immediately.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

/// Error classification attached to failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Pairing,
    Transmission,
    Timeout,
    Permissions,
    Validation,
    Capability,
}

impl ErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::Connection | ErrorKind::Transmission | ErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Pairing => "pairing",
            ErrorKind::Transmission => "transmission",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permissions => "permissions",
            ErrorKind::Validation => "validation",
            ErrorKind::Capability => "capability",
        };
        f.write_str(s)
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(PrintError::Connection("gone".into()).is_recoverable());
        assert!(PrintError::Transmission("mid-stream".into()).is_recoverable());
        assert!(PrintError::Timeout("no answer".into()).is_recoverable());

        assert!(!PrintError::Permissions("denied".into()).is_recoverable());
        assert!(!PrintError::Validation("bad copies".into()).is_recoverable());
        assert!(!PrintError::Capability("no qr".into()).is_recoverable());
        assert!(!PrintError::Pairing("bond rejected".into()).is_recoverable());
    }

    #[test]
    fn test_io_maps_to_transmission() {
        let err: PrintError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(err.kind(), ErrorKind::Transmission);
        assert!(err.is_recoverable());
    }
}
