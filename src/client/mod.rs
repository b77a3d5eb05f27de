//! Client side of the protocol
//!
//! A [`Client`] sends commands and uploads; pushed units arrive as
//! [`ClientEvent`]s.

pub mod events;
pub mod session;

pub use events::ClientEvent;
pub use session::Client;
