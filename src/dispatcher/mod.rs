//! Command dispatcher
//!
//! Interprets framed units from one connection, consults the catalog and
//! drives the transfer engine.

pub mod handlers;
pub mod session;
pub mod state;

pub use handlers::Dispatcher;
pub use session::Session;
pub use state::DispatcherState;
