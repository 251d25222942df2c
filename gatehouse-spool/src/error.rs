use gatehouse_printer::PrintError;
use thiserror::Error;

/// Errors surfaced by queue and service operations
#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("printer profile not found: {0}")]
    ProfileNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Printer(#[from] PrintError),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for spool operations
pub type SpoolResult<T> = std::result::Result<T, SpoolError>;
