//! Module `file_ops`
//!
//! Streams file bytes over an established connection in either direction.
//! The byte count agreed before streaming is the only completion signal, so
//! every path here reads or writes exactly that many bytes or fails.

use log::{error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::catalog::PARTIAL_PREFIX;
use crate::error::TransferError;
use crate::protocol::commands::upload_header;
use crate::protocol::{Framer, Notification, READY_TOKEN, Unit};
use crate::transfer::progress::{ProgressEvent, ProgressTracker, TransferSummary};
use crate::transfer::{Direction, TransferDescriptor, TransferOptions};

/// Callback receiving progress samples.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(&ProgressEvent) + Send);

/// Rejects names that would escape the flat shared directory.
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(PARTIAL_PREFIX);

    if invalid {
        Err(TransferError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Destination file that removes itself unless persisted.
///
/// Dropping it (error return, cancelled task) deletes the partial data.
struct PartialFile {
    path: PathBuf,
    file: Option<File>,
}

impl PartialFile {
    async fn create(path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(data).await,
            None => Err(io::Error::other("partial file already closed")),
        }
    }

    async fn persist(mut self, dest: &Path) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        fs::rename(&self.path, dest).await?;
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Sends a file to the peer: announce, wait for `READY`, stream.
pub async fn send_file<R, W>(
    framer: &mut Framer<R>,
    writer: &mut W,
    path: &Path,
    name: &str,
    options: &TransferOptions,
    on_progress: ProgressSink<'_>,
) -> Result<TransferSummary, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await.map_err(TransferError::FileSystem)?;
    let size = file
        .metadata()
        .await
        .map_err(TransferError::FileSystem)?
        .len();

    let announce = Notification::FileTransfer {
        name: name.to_string(),
        size,
    }
    .encode()
    .map_err(TransferError::ConnectionFailure)?;
    writer
        .write_all(&announce)
        .await
        .map_err(TransferError::ConnectionFailure)?;
    writer
        .flush()
        .await
        .map_err(TransferError::ConnectionFailure)?;

    await_ready(framer).await?;

    info!("Sending file: {} ({} bytes)", name, size);
    let descriptor = TransferDescriptor::new(name, size, Direction::Download);
    let summary = stream_to_peer(&mut file, writer, descriptor, options, on_progress).await?;
    info!("File sent successfully: {}", name);
    Ok(summary)
}

/// Sends a local file with an `UPLOAD:` header followed by its bytes.
pub async fn upload_file<W>(
    writer: &mut W,
    path: &Path,
    options: &TransferOptions,
    on_progress: ProgressSink<'_>,
) -> Result<TransferSummary, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;
    validate_filename(name)?;

    let mut file = File::open(path).await.map_err(TransferError::FileSystem)?;
    let size = file
        .metadata()
        .await
        .map_err(TransferError::FileSystem)?
        .len();

    writer
        .write_all(upload_header(name, size).as_bytes())
        .await
        .map_err(TransferError::ConnectionFailure)?;

    info!("Uploading: {} ({} bytes)", name, size);
    let descriptor = TransferDescriptor::new(name, size, Direction::Upload);
    stream_to_peer(&mut file, writer, descriptor, options, on_progress).await
}

async fn await_ready<R: AsyncRead + Unpin>(framer: &mut Framer<R>) -> Result<(), TransferError> {
    match framer.next_unit().await? {
        Some(Unit::Text(token)) if token == READY_TOKEN => Ok(()),
        Some(Unit::Text(token)) => Err(TransferError::ProtocolViolation {
            expected: READY_TOKEN.to_string(),
            received: token,
        }),
        Some(Unit::Structured(value)) => Err(TransferError::ProtocolViolation {
            expected: READY_TOKEN.to_string(),
            received: value.to_string(),
        }),
        None => Err(TransferError::ConnectionFailure(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed before acknowledging the transfer",
        ))),
    }
}

/// Streams exactly `descriptor.total_size()` bytes from `source` to `writer`.
///
/// A source that fails or runs dry early leaves the peer waiting for bytes
/// that will never come, so both are reported as connection failures.
pub async fn stream_to_peer<S, W>(
    source: &mut S,
    writer: &mut W,
    descriptor: TransferDescriptor,
    options: &TransferOptions,
    on_progress: ProgressSink<'_>,
) -> Result<TransferSummary, TransferError>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tracker = ProgressTracker::new(descriptor, options.progress_interval);
    let mut buffer = vec![0u8; options.chunk_size];

    while tracker.descriptor().remaining() > 0 {
        let want = tracker.descriptor().remaining().min(buffer.len() as u64) as usize;
        let n = source.read(&mut buffer[..want]).await.map_err(|e| {
            error!("Reading {} failed: {}", tracker.descriptor().filename(), e);
            TransferError::ConnectionFailure(e)
        })?;

        if n == 0 {
            let sent = tracker.descriptor().transferred_size();
            let total = tracker.descriptor().total_size();
            error!(
                "Source for {} ended after {}/{} bytes",
                tracker.descriptor().filename(),
                sent,
                total
            );
            return Err(TransferError::ConnectionFailure(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {sent} of {total} bytes"),
            )));
        }

        writer
            .write_all(&buffer[..n])
            .await
            .map_err(TransferError::ConnectionFailure)?;

        if let Some(event) = tracker.record(n) {
            on_progress(&event);
        }
    }

    writer
        .flush()
        .await
        .map_err(TransferError::ConnectionFailure)?;
    Ok(tracker.finish())
}

/// Receives exactly `size` raw bytes from the framer into `dir/name`.
///
/// Data lands in a hidden partial file that is renamed into place only once
/// every byte has arrived. If the destination cannot be written the payload
/// is still consumed so the stream stays aligned.
pub async fn receive_file<R>(
    framer: &mut Framer<R>,
    dir: &Path,
    name: &str,
    size: u64,
    direction: Direction,
    options: &TransferOptions,
    on_progress: ProgressSink<'_>,
) -> Result<TransferSummary, TransferError>
where
    R: AsyncRead + Unpin,
{
    validate_filename(name)?;

    let final_path = dir.join(name);
    let partial_path = dir.join(format!("{PARTIAL_PREFIX}{name}"));
    let mut sink_error = None;
    let mut partial = match PartialFile::create(partial_path).await {
        Ok(partial) => Some(partial),
        Err(e) => {
            error!("Failed to create partial file for {}: {}", name, e);
            sink_error = Some(e);
            None
        }
    };

    info!("Receiving file: {} ({} bytes)", name, size);
    let descriptor = TransferDescriptor::new(name, size, direction);
    let mut tracker = ProgressTracker::new(descriptor, options.progress_interval);
    let mut buffer = vec![0u8; options.chunk_size];

    while tracker.descriptor().remaining() > 0 {
        let want = tracker.descriptor().remaining().min(buffer.len() as u64) as usize;
        let n = framer
            .read_raw(&mut buffer[..want])
            .await
            .map_err(TransferError::ConnectionFailure)?;

        if n == 0 {
            let received = tracker.descriptor().transferred_size();
            warn!("File transfer incomplete: {}/{} bytes for {}", received, size, name);
            return Err(TransferError::Incomplete {
                received,
                expected: size,
            });
        }

        let write_error = match partial.as_mut() {
            Some(file) => file.write_all(&buffer[..n]).await.err(),
            None => None,
        };
        if let Some(e) = write_error {
            error!("Failed to write {}: {}", name, e);
            sink_error = Some(e);
            partial = None;
        }

        if let Some(event) = tracker.record(n) {
            on_progress(&event);
        }
    }

    if let Some(e) = sink_error {
        return Err(TransferError::FileSystem(e));
    }

    if let Some(partial) = partial {
        partial
            .persist(&final_path)
            .await
            .map_err(TransferError::FileSystem)?;
    }

    info!("File received successfully: {} ({} bytes)", name, size);
    Ok(tracker.finish())
}

/// Reads and throws away `size` raw bytes.
pub async fn discard_payload<R>(
    framer: &mut Framer<R>,
    size: u64,
    chunk_size: usize,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = size;
    let mut buffer = vec![0u8; chunk_size];

    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let n = framer
            .read_raw(&mut buffer[..want])
            .await
            .map_err(TransferError::ConnectionFailure)?;
        if n == 0 {
            return Err(TransferError::Incomplete {
                received: size - remaining,
                expected: size,
            });
        }
        remaining -= n as u64;
    }
    Ok(())
}
