//! Per-connection session loop.
//!
//! Reads framed units strictly in arrival order and dispatches each one
//! before reading the next, so payload regions are consumed by the transfer
//! engine before the framer can misread them as commands.

use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::catalog::FileCatalog;
use crate::dispatcher::handlers::send_line;
use crate::dispatcher::{Dispatcher, DispatcherState};
use crate::error::ShareError;
use crate::error::handlers::{error_response, is_fatal};
use crate::protocol::{Command, Framer, Unit, parse_command};
use crate::transfer::TransferOptions;

pub struct Session<R, W> {
    framer: Framer<R>,
    writer: W,
    dispatcher: Dispatcher,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        peer: SocketAddr,
        reader: R,
        writer: W,
        catalog: Arc<FileCatalog>,
        options: TransferOptions,
        max_unit_bytes: usize,
    ) -> Self {
        Self {
            framer: Framer::new(reader, max_unit_bytes),
            writer,
            dispatcher: Dispatcher::new(peer, catalog, options),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    /// Serves commands until the peer closes or a fatal error occurs.
    pub async fn run(&mut self) -> Result<(), ShareError> {
        let result = self.serve().await;
        self.dispatcher.transition(DispatcherState::Closed);
        result
    }

    async fn serve(&mut self) -> Result<(), ShareError> {
        let peer = self.dispatcher.peer();

        loop {
            let unit = match self.framer.next_unit().await? {
                Some(unit) => unit,
                None => {
                    info!("Connection closed by client {}", peer);
                    return Ok(());
                }
            };

            let text = match unit {
                Unit::Text(text) => text,
                Unit::Structured(_) => self.framer.object_source().to_string(),
            };

            let command = parse_command(&text);
            if command != Command::Empty {
                info!("Received from {}: {:?}", peer, command);
            }

            if let Err(e) = self
                .dispatcher
                .handle_command(command, &mut self.framer, &mut self.writer)
                .await
            {
                if is_fatal(&e) {
                    error!("Connection {} failed: {}", peer, e);
                    return Err(e);
                }
                warn!("Command from {} failed: {}", peer, e);
                send_line(&mut self.writer, &error_response(&e)).await?;
            }
        }
    }
}
