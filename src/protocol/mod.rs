//! Wire protocol
//!
//! Text commands, structured notifications and the framer that separates
//! them on one TCP stream.

pub mod commands;
pub mod framer;
pub mod responses;

pub use commands::{Command, parse_command, upload_header};
pub use framer::{Framer, Unit};
pub use responses::{
    FileDetails, FileSummary, Notification, READY_TOKEN, TextReply, echo_line, error_line,
};
