//! Error handlers
//!
//! Maps errors onto the wire and decides which ones end a connection.

use crate::error::types::{CatalogError, FrameError, ShareError, TransferError};
use crate::protocol::responses::error_line;

/// Whether an error must tear down the connection it occurred on.
pub fn is_fatal(err: &ShareError) -> bool {
    match err {
        ShareError::Frame(_) | ShareError::Io(_) => true,
        ShareError::Transfer(TransferError::ConnectionFailure(_)) => true,
        _ => false,
    }
}

/// Convert an error to the text reason sent after `ERROR: `.
pub fn error_reason(err: &ShareError) -> String {
    match err {
        ShareError::Catalog(CatalogError::IndexOutOfRange { .. }) => "Invalid file index".into(),
        ShareError::Catalog(CatalogError::NotFound(_)) => "File not found on disk".into(),
        ShareError::Catalog(CatalogError::Unavailable(..)) => "Shared directory unavailable".into(),
        ShareError::Transfer(TransferError::ProtocolViolation { expected, .. }) => {
            format!("Transfer aborted: expected {}", expected)
        }
        ShareError::Transfer(TransferError::InvalidName(_)) => "Invalid filename".into(),
        ShareError::Transfer(TransferError::Incomplete { received, expected }) => {
            format!("Upload incomplete: {}/{} bytes", received, expected)
        }
        ShareError::Frame(FrameError::UnitTooLarge(_)) => "Message too long".into(),
        other => other.to_string(),
    }
}

/// Full `ERROR: <reason>` response line for an error.
pub fn error_response(err: &ShareError) -> String {
    error_line(&error_reason(err))
}
