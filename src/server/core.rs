use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};

use crate::catalog::{CatalogSnapshot, FileCatalog};
use crate::config::ServerConfig;
use crate::dispatcher::Session;
use crate::error::ShareError;
use crate::protocol::error_line;
use crate::server::registry::{Admission, ConnectionRegistry};

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    catalog: Arc<FileCatalog>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Point-in-time view of a running server.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub connections: usize,
    pub peers: Vec<SocketAddr>,
    pub files: usize,
    pub shared_dir: PathBuf,
}

/// Cloneable control surface for a server that is running elsewhere.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    catalog: Arc<FileCatalog>,
    registry: Arc<ConnectionRegistry>,
}

impl Server {
    /// Prepares the shared directory, binds the listener and takes the
    /// first catalog snapshot.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let shared_dir = config.shared_dir_path();
        if let Err(e) = tokio::fs::create_dir_all(&shared_dir).await {
            warn!("Failed to create shared directory {}: {}", shared_dir.display(), e);
        } else {
            info!("Shared directory: {}", shared_dir.display());
        }

        let addr = config.listen_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", addr, e);
                return Err(e);
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        let catalog = Arc::new(FileCatalog::new(shared_dir));
        let snapshot = catalog.refresh().await;
        info!("Sharing {} files", snapshot.len());

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            config: Arc::new(config),
            catalog,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            catalog: Arc::clone(&self.catalog),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Accepts connections until [`ServerHandle::stop`] is called, then
    /// closes the listener and every live connection.
    pub async fn run(self) {
        let mut stop = self.shutdown.subscribe();
        info!(
            "Starting lanshare server on {} (max {} connections)",
            self.config.listen_addr(),
            self.config.max_connections
        );

        loop {
            tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        }

        let Server {
            listener, registry, ..
        } = self;
        drop(listener);
        let closed = registry.close_all().await;
        info!("Server stopped ({} connections closed)", closed);
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = Arc::clone(&self.registry);
        let catalog = Arc::clone(&self.catalog);
        let config = Arc::clone(&self.config);

        // One task per connection so the accept loop never blocks
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, registry, catalog, config).await {
                warn!("Failed to handle connection {}: {}", addr, e);
            }
        });
    }
}

/// Admits a connection and runs its session until the peer leaves or the
/// server closes it.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    catalog: Arc<FileCatalog>,
    config: Arc<ServerConfig>,
) -> io::Result<()> {
    let close = match registry.register(addr, config.max_connections).await {
        Admission::Admitted(close) => close,
        Admission::Full => {
            warn!(
                "Refusing {}: connection limit ({}) reached",
                addr, config.max_connections
            );
            stream
                .write_all(error_line("Too many connections").as_bytes())
                .await?;
            stream.shutdown().await?;
            return Ok(());
        }
        Admission::ShuttingDown => return Ok(()),
    };

    info!(
        "Accepted connection from {} ({}/{} connections)",
        addr,
        registry.len().await,
        config.max_connections
    );

    let (read_half, write_half) = stream.into_split();
    let mut session = Session::new(
        addr,
        read_half,
        write_half,
        catalog,
        config.transfer_options(),
        config.max_unit_bytes,
    );

    supervise(addr, &registry, close, async move { session.run().await }).await;
    Ok(())
}

/// Runs a connection's work in its own task and deregisters the connection
/// however that task ends, including by panic or server stop.
async fn supervise<F>(
    addr: SocketAddr,
    registry: &ConnectionRegistry,
    mut close: oneshot::Receiver<()>,
    work: F,
) where
    F: Future<Output = Result<(), ShareError>> + Send + 'static,
{
    let mut worker = tokio::spawn(work);

    tokio::select! {
        joined = &mut worker => match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Session with {} ended with error: {}", addr, e),
            Err(e) => error!("Worker for {} failed: {}", addr, e),
        },
        _ = &mut close => {
            info!("Closing connection {} on server stop", addr);
            // Aborting drops the session, which releases the socket.
            worker.abort();
            let _ = worker.await;
        }
    }

    registry.remove(&addr).await;
    info!("Connection {} released", addr);
}

impl ServerHandle {
    /// Stops accepting and closes all live connections. In-flight
    /// transfers are not waited for.
    pub fn stop(&self) {
        info!("Stopping server");
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn status(&self) -> ServerStatus {
        ServerStatus {
            connections: self.registry.len().await,
            peers: self.registry.peers().await,
            files: self.catalog.snapshot().await.len(),
            shared_dir: self.catalog.root().to_path_buf(),
        }
    }

    /// Rescans the shared directory outside of any client request.
    pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
        self.catalog.refresh().await
    }
}
