//! lanshare: share the files of one directory with peers on the local
//! network over a single TCP connection per peer.

pub mod catalog;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transfer;

pub use client::{Client, ClientEvent};
pub use config::{ClientConfig, ServerConfig, Settings};
pub use error::ShareError;
pub use server::{Server, ServerHandle, ServerStatus};
