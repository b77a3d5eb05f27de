//! Remote session
//!
//! A background task owns the read half and turns every unit the server
//! pushes into a [`ClientEvent`]. Downloads are answered from that task,
//! since the payload follows the `file_transfer` notification directly.
//!
//! The protocol has no request ids, so an upload must not overlap a
//! download that has been requested but not yet announced.

use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::client::ClientEvent;
use crate::config::ClientConfig;
use crate::error::{ShareError, TransferError};
use crate::protocol::commands::{FILE_INFO, GET_FILE, LIST_FILES};
use crate::protocol::responses::CANCEL_TOKEN;
use crate::protocol::{FileSummary, Framer, Notification, READY_TOKEN, TextReply, Unit};
use crate::transfer::{
    self, Direction, ProgressEvent, TransferOptions, TransferSummary, validate_filename,
};

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;
type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Connection to a lanshare server.
pub struct Client {
    peer: SocketAddr,
    writer: SharedWriter,
    files: Arc<Mutex<Vec<FileSummary>>>,
    options: TransferOptions,
    events: EventSender,
    receiver: Option<JoinHandle<()>>,
}

impl Client {
    /// Connects and starts the receive task. Events arrive on the returned
    /// channel until [`ClientEvent::Disconnected`].
    pub async fn connect(
        addr: &str,
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ShareError> {
        let download_dir = config.download_dir_path();
        tokio::fs::create_dir_all(&download_dir).await?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransferError::ConnectionFailure)?;
        let peer = stream.peer_addr()?;
        info!("Connected to {}", peer);

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));
        let files = Arc::new(Mutex::new(Vec::new()));
        let options = config.transfer_options();
        let (events, rx) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(receive_loop(
            Framer::new(read_half, config.max_unit_bytes),
            ReceiveContext {
                writer: Arc::clone(&writer),
                files: Arc::clone(&files),
                download_dir,
                options: options.clone(),
                events: events.clone(),
            },
        ));

        Ok((
            Self {
                peer,
                writer,
                files,
                options,
                events,
                receiver: Some(receiver),
            },
            rx,
        ))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one line of free text; the server echoes it back.
    pub async fn send_text(&self, text: &str) -> Result<(), ShareError> {
        if text.contains(['\n', '\r']) {
            return Err(ShareError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "text must fit on one line",
            )));
        }
        self.send_line(text).await
    }

    pub async fn list_files(&self) -> Result<(), ShareError> {
        self.send_line(LIST_FILES).await
    }

    pub async fn file_info(&self, index: i64) -> Result<(), ShareError> {
        self.send_line(&format!("{FILE_INFO} {index}")).await
    }

    /// Requests a download; the file lands in the download directory.
    pub async fn download(&self, index: i64) -> Result<(), ShareError> {
        self.send_line(&format!("{GET_FILE} {index}")).await
    }

    /// Streams a local file to the server's shared directory.
    pub async fn upload(&self, path: &Path) -> Result<TransferSummary, ShareError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let size = tokio::fs::metadata(path)
            .await
            .map_err(TransferError::FileSystem)?
            .len();

        self.emit(ClientEvent::TransferStarted {
            name: name.clone(),
            size,
            direction: Direction::Upload,
        });

        let events = self.events.clone();
        let mut on_progress = |event: &ProgressEvent| {
            let _ = events.send(ClientEvent::Progress(event.clone()));
        };

        let result = {
            let mut writer = self.writer.lock().await;
            transfer::upload_file(&mut *writer, path, &self.options, &mut on_progress).await
        };

        match result {
            Ok(summary) => {
                info!("Uploaded {} ({} bytes)", summary.filename, summary.bytes);
                self.emit(ClientEvent::TransferFinished(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", name, e);
                self.emit(ClientEvent::TransferFailed {
                    name,
                    direction: Direction::Upload,
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Listing from the most recent `file_list` notification.
    pub async fn cached_files(&self) -> Vec<FileSummary> {
        self.files.lock().await.clone()
    }

    /// Closes the sending side and waits for the server to hang up.
    pub async fn disconnect(mut self) -> Result<(), ShareError> {
        self.writer.lock().await.shutdown().await?;
        if let Some(receiver) = self.receiver.take() {
            if let Err(e) = receiver.await {
                warn!("Receive task ended abnormally: {}", e);
            }
        }
        info!("Disconnected from {}", self.peer);
        Ok(())
    }

    async fn send_line(&self, line: &str) -> Result<(), ShareError> {
        let mut writer = self.writer.lock().await;
        write_line(&mut writer, line).await?;
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

/// State owned by the receive task.
struct ReceiveContext {
    writer: SharedWriter,
    files: Arc<Mutex<Vec<FileSummary>>>,
    download_dir: PathBuf,
    options: TransferOptions,
    events: EventSender,
}

impl ReceiveContext {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

async fn receive_loop(mut framer: Framer<OwnedReadHalf>, receiver: ReceiveContext) {
    loop {
        let unit = match framer.next_unit().await {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Lost connection to server: {}", e);
                break;
            }
        };

        match unit {
            Unit::Structured(value) => match serde_json::from_value::<Notification>(value) {
                Ok(Notification::FileList { files }) => {
                    *receiver.files.lock().await = files.clone();
                    receiver.emit(ClientEvent::FileList(files));
                }
                Ok(Notification::FileInfo(details)) => {
                    receiver.emit(ClientEvent::FileInfo(details));
                }
                Ok(Notification::FileTransfer { name, size }) => {
                    if let Err(e) = accept_download(&mut framer, &receiver, &name, size).await {
                        warn!("Download of {} lost the connection: {}", name, e);
                        break;
                    }
                }
                Err(e) => debug!("Ignoring unrecognised notification: {}", e),
            },
            Unit::Text(line) => receiver.emit(match TextReply::parse(&line) {
                TextReply::Error(reason) => ClientEvent::ServerError(reason),
                TextReply::Echo(text) => ClientEvent::ServerEcho(text),
                TextReply::Other(text) => ClientEvent::ServerText(text),
            }),
        }
    }

    receiver.emit(ClientEvent::Disconnected);
}

/// Answers a `file_transfer` announcement and receives the payload.
///
/// Only errors that leave the stream unusable are returned.
async fn accept_download(
    framer: &mut Framer<OwnedReadHalf>,
    receiver: &ReceiveContext,
    name: &str,
    size: u64,
) -> Result<(), TransferError> {
    if let Err(e) = validate_filename(name) {
        warn!("Refusing download: {}", e);
        write_line(&mut *receiver.writer.lock().await, CANCEL_TOKEN).await?;
        receiver.emit(ClientEvent::TransferFailed {
            name: name.to_string(),
            direction: Direction::Download,
            reason: e.to_string(),
        });
        return Ok(());
    }

    receiver.emit(ClientEvent::TransferStarted {
        name: name.to_string(),
        size,
        direction: Direction::Download,
    });
    write_line(&mut *receiver.writer.lock().await, READY_TOKEN).await?;

    let events = receiver.events.clone();
    let mut on_progress = |event: &ProgressEvent| {
        let _ = events.send(ClientEvent::Progress(event.clone()));
    };

    let result = transfer::receive_file(
        framer,
        &receiver.download_dir,
        name,
        size,
        Direction::Download,
        &receiver.options,
        &mut on_progress,
    )
    .await;

    match result {
        Ok(summary) => {
            info!(
                "Downloaded {} ({} bytes in {:.1}s)",
                summary.filename,
                summary.bytes,
                summary.elapsed.as_secs_f64()
            );
            receiver.emit(ClientEvent::TransferFinished(summary));
            Ok(())
        }
        Err(e) => {
            receiver.emit(ClientEvent::TransferFailed {
                name: name.to_string(),
                direction: Direction::Download,
                reason: e.to_string(),
            });
            match e {
                TransferError::Incomplete { .. } | TransferError::ConnectionFailure(_) => Err(e),
                _ => Ok(()),
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), TransferError> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    writer
        .write_all(&bytes)
        .await
        .map_err(TransferError::ConnectionFailure)?;
    writer
        .flush()
        .await
        .map_err(TransferError::ConnectionFailure)
}
