//! Client events
//!
//! Everything the server pushes, after classification, plus the local
//! transfer lifecycle.

use crate::protocol::{FileDetails, FileSummary};
use crate::transfer::{Direction, ProgressEvent, TransferSummary};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    FileList(Vec<FileSummary>),
    FileInfo(FileDetails),
    TransferStarted {
        name: String,
        size: u64,
        direction: Direction,
    },
    Progress(ProgressEvent),
    TransferFinished(TransferSummary),
    TransferFailed {
        name: String,
        direction: Direction,
        reason: String,
    },
    /// `ERROR:` line, prefix stripped
    ServerError(String),
    /// Echo of text this client sent
    ServerEcho(String),
    ServerText(String),
    Disconnected,
}
