//! Chunking engine for constrained links
//!
//! BLE writes carry at most an MTU-sized payload, so a compiled ticket is
//! split into bounded chunks written sequentially with a delay between
//! writes, giving the printer's receive buffer time to drain. A dropped
//! chunk is retried on its own before the whole transmission is failed, so
//! one bad write does not force re-sending an entire ticket.

use crate::error::PrintError;
use std::future::Future;
use std::time::Duration;

/// Chunking parameters
///
/// `chunk_size` is hardware-dependent; the default stays within the 23-byte
/// minimum BLE MTU minus the 3-byte ATT header.
#[derive(Debug, Clone)]
pub struct ChunkTuning {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub max_chunk_retries: u32,
}

impl Default for ChunkTuning {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            chunk_delay: Duration::from_millis(20),
            max_chunk_retries: 3,
        }
    }
}

/// Split a buffer into `ceil(len / chunk_size)` pieces of at most
/// `chunk_size` bytes that concatenate back to the original.
pub fn split(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    data.chunks(chunk_size).collect()
}

/// A transmission that failed on a specific chunk after bounded retries
#[derive(Debug)]
pub struct ChunkFailure {
    /// Zero-based index of the first chunk that was not acknowledged
    pub index: usize,
    pub total: usize,
    pub error: PrintError,
}

/// Drives one chunked transmission over a caller-supplied write function
pub struct ChunkEngine {
    tuning: ChunkTuning,
}

impl ChunkEngine {
    pub fn new(tuning: ChunkTuning) -> Self {
        Self { tuning }
    }

    pub fn chunk_size(&self) -> usize {
        self.tuning.chunk_size
    }

    /// Total chunks a buffer of `len` bytes will produce
    pub fn total_chunks(&self, len: usize) -> usize {
        len.div_ceil(self.tuning.chunk_size)
    }

    /// Write `data` chunk by chunk, starting at `start_index` (for resume
    /// after reconnect). Each chunk gets up to `max_chunk_retries` extra
    /// attempts before the transmission fails with the offending index.
    ///
    /// Returns the number of chunks written by this call.
    pub async fn transmit<F, Fut>(
        &self,
        data: &[u8],
        start_index: usize,
        mut write_chunk: F,
    ) -> Result<usize, ChunkFailure>
    where
        F: FnMut(usize, Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), PrintError>>,
    {
        let chunks = split(data, self.tuning.chunk_size);
        let total = chunks.len();
        let mut written = 0usize;

        for (index, chunk) in chunks.into_iter().enumerate().skip(start_index) {
            let mut attempt = 0u32;
            loop {
                match write_chunk(index, chunk.to_vec()).await {
                    Ok(()) => break,
                    Err(error) if attempt < self.tuning.max_chunk_retries => {
                        attempt += 1;
                        tracing::warn!(
                            chunk = index + 1,
                            total,
                            attempt,
                            error = %error,
                            "chunk write failed, retrying"
                        );
                        tokio::time::sleep(self.tuning.chunk_delay).await;
                    }
                    Err(error) => {
                        return Err(ChunkFailure {
                            index,
                            total,
                            error,
                        });
                    }
                }
            }

            written += 1;
            if index + 1 < total && !self.tuning.chunk_delay.is_zero() {
                tokio::time::sleep(self.tuning.chunk_delay).await;
            }
        }

        Ok(written)
    }
}
