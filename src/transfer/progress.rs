//! Progress instrumentation
//!
//! Samples a [`TransferDescriptor`] at most once per interval and turns the
//! delta since the previous sample into an instantaneous rate and ETA.

use log::debug;
use std::time::{Duration, Instant};

use crate::transfer::{Direction, TransferDescriptor};

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Observable progress sample; not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub filename: String,
    pub direction: Direction,
    pub transferred: u64,
    pub total: u64,
    /// Bytes per second over the last sample window
    pub throughput: f64,
    pub eta: Duration,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.transferred as f64 / self.total as f64
        }
    }
}

/// Totals reported when a transfer completes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub filename: String,
    pub direction: Direction,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferSummary {
    pub fn average_throughput(&self) -> f64 {
        throughput(self.bytes, self.elapsed)
    }
}

pub struct ProgressTracker {
    descriptor: TransferDescriptor,
    interval: Duration,
    last_sample_at: Instant,
    last_sample_bytes: u64,
}

impl ProgressTracker {
    pub fn new(descriptor: TransferDescriptor, interval: Duration) -> Self {
        let last_sample_at = descriptor.started_at();
        Self {
            descriptor,
            interval,
            last_sample_at,
            last_sample_bytes: 0,
        }
    }

    pub fn descriptor(&self) -> &TransferDescriptor {
        &self.descriptor
    }

    /// Records `n` bytes, returning a sample if the interval has elapsed.
    pub fn record(&mut self, n: usize) -> Option<ProgressEvent> {
        self.record_at(n, Instant::now())
    }

    fn record_at(&mut self, n: usize, now: Instant) -> Option<ProgressEvent> {
        self.descriptor.advance(n as u64);

        let window = now.saturating_duration_since(self.last_sample_at);
        if window < self.interval {
            return None;
        }

        let moved = self.descriptor.transferred_size() - self.last_sample_bytes;
        let rate = throughput(moved, window);
        self.last_sample_at = now;
        self.last_sample_bytes = self.descriptor.transferred_size();

        Some(ProgressEvent {
            filename: self.descriptor.filename().to_string(),
            direction: self.descriptor.direction(),
            transferred: self.descriptor.transferred_size(),
            total: self.descriptor.total_size(),
            throughput: rate,
            eta: estimate_remaining(self.descriptor.remaining(), rate),
        })
    }

    pub fn finish(self) -> TransferSummary {
        TransferSummary {
            filename: self.descriptor.filename().to_string(),
            direction: self.descriptor.direction(),
            bytes: self.descriptor.transferred_size(),
            elapsed: self.descriptor.elapsed(),
        }
    }
}

/// Bytes per second; zero for an empty window.
pub fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}

/// Time left at `rate` bytes per second; zero when nothing is moving.
pub fn estimate_remaining(remaining: u64, rate: f64) -> Duration {
    if rate > 0.0 {
        // Absurd declared sizes overflow Duration.
        Duration::try_from_secs_f64(remaining as f64 / rate).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Human-readable size in 1024-based units with one decimal.
pub fn format_size(bytes: f64) -> String {
    if bytes <= 0.0 {
        return "0 B".to_string();
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec))
}

/// Progress sink used by the server.
pub fn log_progress(event: &ProgressEvent) {
    debug!(
        "{} {}: {}/{} at {} (ETA {:.1}s)",
        event.direction,
        event.filename,
        format_size(event.transferred as f64),
        format_size(event.total as f64),
        format_rate(event.throughput),
        event.eta.as_secs_f64()
    );
}
