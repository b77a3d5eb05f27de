//! Server responses
//!
//! Structured notifications pushed as minified JSON objects, and the plain
//! text replies that share the same stream.

use serde::{Deserialize, Serialize};
use std::io;

use crate::catalog::{CatalogSnapshot, FileEntry};

/// Readiness acknowledgment a receiver sends before file bytes flow.
pub const READY_TOKEN: &str = "READY";
/// Sent instead of [`READY_TOKEN`] when a client refuses a transfer.
pub const CANCEL_TOKEN: &str = "CANCEL";
pub const ERROR_PREFIX: &str = "ERROR: ";
pub const ECHO_PREFIX: &str = "Server received: ";

/// One file in a `file_list` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub modified: f64,
}

impl From<&FileEntry> for FileSummary {
    fn from(entry: &FileEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            size: entry.size(),
            modified: entry.modified_secs(),
        }
    }
}

/// Payload of a `file_info` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetails {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub modified: f64,
    pub readable: bool,
}

/// Structured notifications, discriminated by their `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    FileList { files: Vec<FileSummary> },
    FileInfo(FileDetails),
    FileTransfer { name: String, size: u64 },
}

impl Notification {
    pub fn file_list(snapshot: &CatalogSnapshot) -> Self {
        Notification::FileList {
            files: snapshot.entries().iter().map(FileSummary::from).collect(),
        }
    }

    /// Minified JSON followed by a newline.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// A text unit received by a client, classified by prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum TextReply {
    Error(String),
    Echo(String),
    Other(String),
}

impl TextReply {
    pub fn parse(line: &str) -> Self {
        if let Some(reason) = line.strip_prefix(ERROR_PREFIX) {
            TextReply::Error(reason.to_string())
        } else if let Some(text) = line.strip_prefix(ECHO_PREFIX) {
            TextReply::Echo(text.to_string())
        } else {
            TextReply::Other(line.to_string())
        }
    }
}

/// `ERROR: <reason>` line.
pub fn error_line(reason: &str) -> String {
    format!("{ERROR_PREFIX}{reason}\n")
}

/// Acknowledgment for unrecognised input.
pub fn echo_line(text: &str) -> String {
    format!("{ECHO_PREFIX}{text}\n")
}
