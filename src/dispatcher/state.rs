//! Dispatcher state
//!
//! `Idle` loops through `AwaitingUploadPayload` for uploads and through
//! `SendingFile` for downloads; `Closed` is terminal.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    AwaitingUploadPayload,
    SendingFile,
    Closed,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatcherState::Idle => "idle",
            DispatcherState::AwaitingUploadPayload => "awaiting-upload-payload",
            DispatcherState::SendingFile => "sending-file",
            DispatcherState::Closed => "closed",
        };
        f.write_str(name)
    }
}
