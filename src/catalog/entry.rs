use std::time::{SystemTime, UNIX_EPOCH};

/// One file in a catalog snapshot. Immutable; a refresh builds new entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    size: u64,
    modified: SystemTime,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Modification time as fractional seconds since the Unix epoch.
    pub fn modified_secs(&self) -> f64 {
        system_time_secs(self.modified)
    }
}

/// Seconds since the Unix epoch; times before the epoch clamp to 0.
pub fn system_time_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
