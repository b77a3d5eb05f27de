//! Command handlers
//!
//! One handler per command. Handlers write their own successful responses;
//! errors bubble up to the session, which decides between an `ERROR:` line
//! and closing the connection.

use log::{debug, info, warn};
use std::fs::Metadata;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::catalog::entry::system_time_secs;
use crate::catalog::{CatalogSnapshot, FileCatalog, FileEntry};
use crate::dispatcher::DispatcherState;
use crate::error::{CatalogError, ShareError, TransferError};
use crate::protocol::{Command, FileDetails, Framer, Notification, echo_line, error_line};
use crate::transfer::{self, Direction, TransferOptions, log_progress};

/// Per-connection command interpreter.
pub struct Dispatcher {
    peer: SocketAddr,
    catalog: Arc<FileCatalog>,
    options: TransferOptions,
    state: DispatcherState,
    /// Snapshot this peer last received; its indices refer to this listing.
    last_seen: Option<Arc<CatalogSnapshot>>,
}

impl Dispatcher {
    pub fn new(peer: SocketAddr, catalog: Arc<FileCatalog>, options: TransferOptions) -> Self {
        Self {
            peer,
            catalog,
            options,
            state: DispatcherState::Idle,
            last_seen: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn transition(&mut self, next: DispatcherState) {
        if self.state != next {
            debug!("Connection {}: {} -> {}", self.peer, self.state, next);
            self.state = next;
        }
    }

    /// Dispatches one parsed command to its handler.
    pub async fn handle_command<R, W>(
        &mut self,
        command: Command,
        framer: &mut Framer<R>,
        writer: &mut W,
    ) -> Result<(), ShareError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match command {
            Command::ListFiles => self.handle_list_files(writer).await,
            Command::FileInfo(index) => self.handle_file_info(index, writer).await,
            Command::GetFile(index) => self.handle_get_file(index, framer, writer).await,
            Command::Upload { name, size } => self.handle_upload(name, size, framer).await,
            Command::InvalidIndex(raw) => {
                debug!("Rejecting {:?} from {}", raw, self.peer);
                send(writer, error_line("Invalid file index").as_bytes()).await
            }
            Command::MalformedUpload(header) => {
                warn!("Ignoring malformed upload header from {}: {}", self.peer, header);
                Ok(())
            }
            Command::Text(text) => send(writer, echo_line(&text).as_bytes()).await,
            Command::Empty => Ok(()),
        }
    }

    /// LIST_FILES: refresh, remember the snapshot for this peer, push it.
    async fn handle_list_files<W>(&mut self, writer: &mut W) -> Result<(), ShareError>
    where
        W: AsyncWrite + Unpin,
    {
        let snapshot = self.catalog.refresh().await;
        let payload = Notification::file_list(&snapshot).encode()?;
        self.last_seen = Some(snapshot);
        send(writer, &payload).await
    }

    /// FILE_INFO: fresh metadata plus a readability probe.
    async fn handle_file_info<W>(&mut self, index: i64, writer: &mut W) -> Result<(), ShareError>
    where
        W: AsyncWrite + Unpin,
    {
        let (entry, path, meta) = self.resolve(index).await?;
        let readable = tokio::fs::File::open(&path).await.is_ok();

        let details = FileDetails {
            index: usize::try_from(index).unwrap_or_default(),
            name: entry.name().to_string(),
            size: meta.len(),
            modified: meta.modified().map(system_time_secs).unwrap_or(0.0),
            readable,
        };
        let payload = Notification::FileInfo(details).encode()?;
        send(writer, &payload).await
    }

    /// GET_FILE: hand the connection to the send path until it finishes.
    async fn handle_get_file<R, W>(
        &mut self,
        index: i64,
        framer: &mut Framer<R>,
        writer: &mut W,
    ) -> Result<(), ShareError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (entry, path, _) = self.resolve(index).await?;

        self.transition(DispatcherState::SendingFile);
        let result = transfer::send_file(
            framer,
            writer,
            &path,
            entry.name(),
            &self.options,
            &mut log_progress,
        )
        .await;
        self.transition(DispatcherState::Idle);

        let summary = result?;
        info!(
            "Sent {} to {}: {} bytes in {:.1}s ({}/s avg)",
            summary.filename,
            self.peer,
            summary.bytes,
            summary.elapsed.as_secs_f64(),
            transfer::format_size(summary.average_throughput())
        );
        Ok(())
    }

    /// UPLOAD: the payload follows the header directly, so it is consumed
    /// here before the framer looks at the stream again.
    async fn handle_upload<R>(
        &mut self,
        name: String,
        size: u64,
        framer: &mut Framer<R>,
    ) -> Result<(), ShareError>
    where
        R: AsyncRead + Unpin,
    {
        self.transition(DispatcherState::AwaitingUploadPayload);

        if let Err(e) = transfer::validate_filename(&name) {
            warn!("Rejecting upload from {}: {}", self.peer, e);
            let drained = transfer::discard_payload(framer, size, self.options.chunk_size).await;
            self.transition(DispatcherState::Idle);
            drained?;
            return Err(e.into());
        }

        let result = transfer::receive_file(
            framer,
            self.catalog.root(),
            &name,
            size,
            Direction::Upload,
            &self.options,
            &mut log_progress,
        )
        .await;
        self.transition(DispatcherState::Idle);

        let summary = result?;
        info!(
            "File uploaded successfully by {}: {} ({} bytes in {:.1}s)",
            self.peer,
            summary.filename,
            summary.bytes,
            summary.elapsed.as_secs_f64()
        );
        self.catalog.refresh().await;
        Ok(())
    }

    /// Resolves an index against the listing this peer last saw, then
    /// re-checks the file on disk.
    async fn resolve(
        &self,
        index: i64,
    ) -> Result<(FileEntry, PathBuf, Metadata), CatalogError> {
        let view = match &self.last_seen {
            Some(snapshot) => Arc::clone(snapshot),
            None => self.catalog.snapshot().await,
        };
        let entry = view.get(index)?.clone();
        let (path, meta) = self.catalog.verify(&entry).await?;
        Ok((entry, path, meta))
    }
}

async fn send<W>(writer: &mut W, bytes: &[u8]) -> Result<(), ShareError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(bytes)
        .await
        .map_err(TransferError::ConnectionFailure)?;
    writer
        .flush()
        .await
        .map_err(TransferError::ConnectionFailure)?;
    Ok(())
}

/// Writes a plain text line, treating failure as fatal.
pub async fn send_line<W>(writer: &mut W, line: &str) -> Result<(), ShareError>
where
    W: AsyncWrite + Unpin,
{
    send(writer, line.as_bytes()).await
}
