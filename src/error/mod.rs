//! Error handling
//!
//! Defines error types and handling for lanshare.

pub mod handlers;
pub mod types;

pub use types::*;
