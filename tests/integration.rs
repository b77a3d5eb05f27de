use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use lanshare::protocol::{Framer, Unit};
use lanshare::transfer::Direction;
use lanshare::{Client, ClientConfig, ClientEvent, Server, ServerConfig, ServerHandle};

const WAIT: Duration = Duration::from_secs(5);

// Helper to start a server on an ephemeral port
async fn start_server(
    shared: &Path,
    max_connections: usize,
) -> (SocketAddr, ServerHandle, JoinHandle<()>) {
    let config = ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        shared_dir: shared.to_string_lossy().into_owned(),
        chunk_size: 4096,
        progress_interval_ms: 10,
        max_connections,
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let task = tokio::spawn(server.run());
    (addr, handle, task)
}

/// Speaks the wire protocol directly.
struct RawPeer {
    framer: Framer<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawPeer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            framer: Framer::new(read_half, 1024 * 1024),
            writer,
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn next(&mut self) -> Option<Unit> {
        timeout(WAIT, self.framer.next_unit())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
    }

    async fn next_text(&mut self) -> String {
        match self.next().await {
            Some(Unit::Text(text)) => text,
            other => panic!("expected a text line, got {:?}", other),
        }
    }

    async fn next_object(&mut self) -> Value {
        match self.next().await {
            Some(Unit::Structured(value)) => value,
            other => panic!("expected a structured unit, got {:?}", other),
        }
    }

    async fn read_payload(&mut self, size: usize) -> Vec<u8> {
        let mut payload = Vec::with_capacity(size);
        let mut buf = [0u8; 1024];
        while payload.len() < size {
            let want = (size - payload.len()).min(buf.len());
            let n = timeout(WAIT, self.framer.read_raw(&mut buf[..want]))
                .await
                .expect("timed out waiting for payload")
                .unwrap();
            assert!(n > 0, "stream ended mid-payload");
            payload.extend_from_slice(&buf[..n]);
        }
        payload
    }
}

async fn next_event(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skips progress and start events until something else arrives.
async fn next_outcome(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    loop {
        match next_event(events).await {
            ClientEvent::Progress(_) | ClientEvent::TransferStarted { .. } => continue,
            event => return event,
        }
    }
}

fn file_names(listing: &Value) -> Vec<String> {
    listing["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_list_and_download() {
    let shared = tempfile::tempdir().unwrap();
    std::fs::write(shared.path().join("a.txt"), b"hello world").unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"LIST_FILES\n").await;
    let listing = peer.next_object().await;
    assert_eq!(listing["type"], "file_list");
    assert_eq!(file_names(&listing), vec!["a.txt"]);
    assert_eq!(listing["files"][0]["size"], 11);

    peer.send(b"GET_FILE 0\n").await;
    let announce = peer.next_object().await;
    assert_eq!(announce["type"], "file_transfer");
    assert_eq!(announce["name"], "a.txt");
    assert_eq!(announce["size"], 11);

    peer.send(b"READY\n").await;
    assert_eq!(peer.read_payload(11).await, b"hello world");

    peer.send(b"ping\n").await;
    assert_eq!(peer.next_text().await, "Server received: ping");
    handle.stop();
}

#[tokio::test]
async fn test_upload_becomes_visible() {
    let shared = tempfile::tempdir().unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"UPLOAD:up.txt:5\nhello").await;
    peer.send(b"UPLOAD:empty.txt:0\nLIST_FILES\n").await;

    let listing = peer.next_object().await;
    assert_eq!(file_names(&listing), vec!["empty.txt", "up.txt"]);
    assert_eq!(listing["files"][0]["size"], 0);
    assert_eq!(std::fs::read(shared.path().join("up.txt")).unwrap(), b"hello");
    handle.stop();
}

#[tokio::test]
async fn test_truncated_upload_is_discarded() {
    let shared = tempfile::tempdir().unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"UPLOAD:big.bin:100\n0123456789").await;
    peer.writer.shutdown().await.unwrap();

    assert_eq!(
        peer.next_text().await,
        "ERROR: Upload incomplete: 10/100 bytes"
    );
    assert!(peer.next().await.is_none());

    assert_eq!(std::fs::read_dir(shared.path()).unwrap().count(), 0);
    let mut other = RawPeer::connect(addr).await;
    other.send(b"LIST_FILES\n").await;
    assert!(file_names(&other.next_object().await).is_empty());
    handle.stop();
}

#[tokio::test]
async fn test_invalid_indices_keep_connection_open() {
    let shared = tempfile::tempdir().unwrap();
    std::fs::write(shared.path().join("a.txt"), b"x").unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"LIST_FILES\n").await;
    peer.next_object().await;

    peer.send(b"FILE_INFO -1\nFILE_INFO 1\nGET_FILE abc\n").await;
    for _ in 0..3 {
        assert_eq!(peer.next_text().await, "ERROR: Invalid file index");
    }

    peer.send(b"FILE_INFO 0\n").await;
    let info = peer.next_object().await;
    assert_eq!(info["type"], "file_info");
    assert_eq!(info["name"], "a.txt");
    assert_eq!(info["readable"], true);
    handle.stop();
}

#[tokio::test]
async fn test_wrong_acknowledgment_aborts_download() {
    let shared = tempfile::tempdir().unwrap();
    std::fs::write(shared.path().join("a.txt"), b"payload").unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"GET_FILE 0\n").await;
    peer.next_object().await;
    peer.send(b"OK\n").await;
    assert_eq!(
        peer.next_text().await,
        "ERROR: Transfer aborted: expected READY"
    );

    peer.send(b"still there?\n").await;
    assert_eq!(peer.next_text().await, "Server received: still there?");
    handle.stop();
}

#[tokio::test]
async fn test_client_round_trip() {
    let shared = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 8).await;

    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let source = local.path().join("data.bin");
    std::fs::write(&source, &content).unwrap();

    let config = ClientConfig {
        download_dir: downloads.path().to_string_lossy().into_owned(),
        chunk_size: 1024,
        progress_interval_ms: 1,
        ..ClientConfig::default()
    };
    let (client, mut events) = Client::connect(&addr.to_string(), &config).await.unwrap();

    let summary = client.upload(&source).await.unwrap();
    assert_eq!(summary.bytes, content.len() as u64);
    assert_eq!(summary.direction, Direction::Upload);
    assert!(matches!(
        next_outcome(&mut events).await,
        ClientEvent::TransferFinished(_)
    ));

    client.list_files().await.unwrap();
    let ClientEvent::FileList(files) = next_outcome(&mut events).await else {
        panic!("expected a file list");
    };
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "data.bin");
    assert_eq!(client.cached_files().await, files);

    client.download(0).await.unwrap();
    let ClientEvent::TransferFinished(summary) = next_outcome(&mut events).await else {
        panic!("expected the download to finish");
    };
    assert_eq!(summary.direction, Direction::Download);
    assert_eq!(
        std::fs::read(downloads.path().join("data.bin")).unwrap(),
        content
    );

    client.send_text("hello server").await.unwrap();
    assert_eq!(
        next_outcome(&mut events).await,
        ClientEvent::ServerEcho("hello server".to_string())
    );
    assert!(client.send_text("two\nlines").await.is_err());

    client.file_info(7).await.unwrap();
    assert_eq!(
        next_outcome(&mut events).await,
        ClientEvent::ServerError("Invalid file index".to_string())
    );

    client.disconnect().await.unwrap();
    handle.stop();
}

#[tokio::test]
async fn test_stop_closes_connections() {
    let shared = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let (addr, handle, task) = start_server(shared.path(), 8).await;

    let config = ClientConfig {
        download_dir: downloads.path().to_string_lossy().into_owned(),
        ..ClientConfig::default()
    };
    let (_client, mut events) = Client::connect(&addr.to_string(), &config).await.unwrap();

    handle.stop();
    assert!(handle.is_stopped());
    assert_eq!(next_outcome(&mut events).await, ClientEvent::Disconnected);

    timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(handle.status().await.connections, 0);
    assert!(TcpStream::connect(addr).await.is_err());
}

/// Polls until `done` holds or the wait runs out.
async fn eventually<F>(mut done: F)
where
    F: FnMut() -> bool,
{
    timeout(WAIT, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn dir_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_stop_during_upload_discards_partial() {
    let shared = tempfile::tempdir().unwrap();
    let (addr, handle, task) = start_server(shared.path(), 8).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"UPLOAD:c.txt:100\n0123456789").await;

    let partial = shared.path().join(".lanshare-partial-c.txt");
    eventually(|| std::fs::metadata(&partial).map(|m| m.len() == 10).unwrap_or(false)).await;

    handle.stop();

    // End of stream, or a reset if the socket went away with data queued.
    let ended = timeout(WAIT, peer.framer.next_unit())
        .await
        .expect("connection stayed open after stop");
    assert!(!matches!(ended, Ok(Some(_))), "unexpected unit {:?}", ended);

    timeout(WAIT, task).await.unwrap().unwrap();
    eventually(|| dir_entries(shared.path()).is_empty()).await;
}

#[tokio::test]
async fn test_huge_declared_upload_frees_its_slot() {
    let shared = tempfile::tempdir().unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 1).await;

    let mut peer = RawPeer::connect(addr).await;
    peer.send(format!("UPLOAD:x:{}\nA", u64::MAX).as_bytes()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.send(b"B").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.writer.shutdown().await.unwrap();

    assert_eq!(
        peer.next_text().await,
        format!("ERROR: Upload incomplete: 2/{} bytes", u64::MAX)
    );
    assert!(peer.next().await.is_none());
    drop(peer);

    timeout(WAIT, async {
        while handle.status().await.connections > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection slot was never released");

    let mut next = RawPeer::connect(addr).await;
    next.send(b"hello\n").await;
    assert_eq!(next.next_text().await, "Server received: hello");
    assert!(dir_entries(shared.path()).is_empty());
    handle.stop();
}

#[tokio::test]
async fn test_connection_limit() {
    let shared = tempfile::tempdir().unwrap();
    let (addr, handle, _task) = start_server(shared.path(), 1).await;

    let mut first = RawPeer::connect(addr).await;
    first.send(b"hi\n").await;
    assert_eq!(first.next_text().await, "Server received: hi");

    let status = handle.status().await;
    assert_eq!(status.connections, 1);
    assert_eq!(status.files, 0);

    let mut second = RawPeer::connect(addr).await;
    assert_eq!(second.next_text().await, "ERROR: Too many connections");
    assert!(second.next().await.is_none());

    first.send(b"still served\n").await;
    assert_eq!(first.next_text().await, "Server received: still served");
    handle.stop();
}

#[tokio::test]
async fn test_missing_shared_dir() {
    let root = tempfile::tempdir().unwrap();
    let shared = root.path().join("nested").join("share");
    let (addr, handle, _task) = start_server(&shared, 8).await;
    assert!(shared.is_dir());

    std::fs::write(shared.join("late.txt"), b"late").unwrap();
    assert_eq!(handle.refresh().await.len(), 1);

    std::fs::remove_dir_all(&shared).unwrap();
    let mut peer = RawPeer::connect(addr).await;
    peer.send(b"LIST_FILES\n").await;
    assert!(file_names(&peer.next_object().await).is_empty());
    handle.stop();
}
