//! Connection manager
//!
//! Owns the listening socket, runs one session per connection and keeps
//! the registry of live connections.

pub mod core;
pub mod registry;

pub use core::{Server, ServerHandle, ServerStatus};
pub use registry::ConnectionRegistry;
