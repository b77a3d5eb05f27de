//! Transfer descriptor
//!
//! Ephemeral state of one streaming operation. Never shared across
//! connections and never persisted.

use std::fmt;
use std::time::{Duration, Instant};

/// Direction relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server
    Upload,
    /// Server to client
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    filename: String,
    total_size: u64,
    direction: Direction,
    transferred_size: u64,
    started_at: Instant,
}

impl TransferDescriptor {
    pub fn new(filename: impl Into<String>, total_size: u64, direction: Direction) -> Self {
        Self {
            filename: filename.into(),
            total_size,
            direction,
            transferred_size: 0,
            started_at: Instant::now(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn transferred_size(&self) -> u64 {
        self.transferred_size
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.transferred_size)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Records `n` more bytes moved.
    pub fn advance(&mut self, n: u64) {
        self.transferred_size += n;
    }
}
