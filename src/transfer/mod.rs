//! Transfer engine
//!
//! Chunked file streaming in both directions with progress sampling.

pub mod descriptor;
pub mod file_ops;
pub mod progress;

use std::time::Duration;

use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL_MS};

pub use descriptor::{Direction, TransferDescriptor};
pub use file_ops::{
    ProgressSink, discard_payload, receive_file, send_file, upload_file, validate_filename,
};
pub use progress::{
    ProgressEvent, ProgressTracker, TransferSummary, format_rate, format_size, log_progress,
};

/// Tuning shared by every transfer on a connection.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub progress_interval: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
        }
    }
}
