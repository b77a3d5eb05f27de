//! Error types
//!
//! Defines domain-specific error types for each module of lanshare.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Message framer errors
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    UnitTooLarge(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "I/O error while framing: {}", e),
            FrameError::UnitTooLarge(limit) => {
                write!(f, "Unit exceeds the {} byte limit", limit)
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(error: io::Error) -> Self {
        FrameError::Io(error)
    }
}

/// File catalog errors
#[derive(Debug)]
pub enum CatalogError {
    Unavailable(PathBuf, io::Error),
    IndexOutOfRange { index: i64, len: usize },
    NotFound(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Unavailable(dir, e) => {
                write!(f, "Catalog unavailable for {}: {}", dir.display(), e)
            }
            CatalogError::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for {} files", index, len)
            }
            CatalogError::NotFound(name) => write!(f, "File not found on disk: {}", name),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Transfer engine errors
#[derive(Debug)]
pub enum TransferError {
    ConnectionFailure(io::Error),
    ProtocolViolation { expected: String, received: String },
    Incomplete { received: u64, expected: u64 },
    FileSystem(io::Error),
    InvalidName(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::ConnectionFailure(e) => write!(f, "Connection failure: {}", e),
            TransferError::ProtocolViolation { expected, received } => {
                write!(f, "Protocol violation: expected {}, got {}", expected, received)
            }
            TransferError::Incomplete { received, expected } => {
                write!(f, "Transfer incomplete: {}/{} bytes", received, expected)
            }
            TransferError::FileSystem(e) => write!(f, "File system error: {}", e),
            TransferError::InvalidName(name) => write!(f, "Invalid filename: {}", name),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<FrameError> for TransferError {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Io(e) => TransferError::ConnectionFailure(e),
            FrameError::UnitTooLarge(limit) => TransferError::ConnectionFailure(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unit exceeds the {limit} byte limit"),
            )),
        }
    }
}

/// General error that encompasses all error types
#[derive(Debug)]
pub enum ShareError {
    Frame(FrameError),
    Catalog(CatalogError),
    Transfer(TransferError),
    Io(io::Error),
    Config(String),
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::Frame(e) => write!(f, "Framing error: {}", e),
            ShareError::Catalog(e) => write!(f, "Catalog error: {}", e),
            ShareError::Transfer(e) => write!(f, "Transfer error: {}", e),
            ShareError::Io(e) => write!(f, "I/O error: {}", e),
            ShareError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for ShareError {}

impl From<FrameError> for ShareError {
    fn from(error: FrameError) -> Self {
        ShareError::Frame(error)
    }
}

impl From<CatalogError> for ShareError {
    fn from(error: CatalogError) -> Self {
        ShareError::Catalog(error)
    }
}

impl From<TransferError> for ShareError {
    fn from(error: TransferError) -> Self {
        ShareError::Transfer(error)
    }
}

impl From<io::Error> for ShareError {
    fn from(error: io::Error) -> Self {
        ShareError::Io(error)
    }
}

impl From<config::ConfigError> for ShareError {
    fn from(error: config::ConfigError) -> Self {
        ShareError::Config(error.to_string())
    }
}
