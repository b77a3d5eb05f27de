//! Connection registry
//!
//! Tracks live connections by peer address. Each entry holds the sender
//! half of a close signal; firing it makes the worker drop its socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::{Mutex, oneshot};

struct ConnectionEntry {
    connected_at: Instant,
    close: oneshot::Sender<()>,
}

/// Outcome of asking the registry to admit a new connection.
#[derive(Debug)]
pub enum Admission {
    /// Admitted; resolves when the connection must be closed.
    Admitted(oneshot::Receiver<()>),
    Full,
    ShuttingDown,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<SocketAddr, ConnectionEntry>,
    closed: bool,
}

/// Registry for tracking active connections
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, addr: SocketAddr, limit: usize) -> Admission {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Admission::ShuttingDown;
        }
        if inner.connections.len() >= limit {
            return Admission::Full;
        }

        let (close, closed) = oneshot::channel();
        inner.connections.insert(
            addr,
            ConnectionEntry {
                connected_at: Instant::now(),
                close,
            },
        );
        Admission::Admitted(closed)
    }

    pub async fn remove(&self, addr: &SocketAddr) -> bool {
        self.inner.lock().await.connections.remove(addr).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Peers ordered by connection time, oldest first.
    pub async fn peers(&self) -> Vec<SocketAddr> {
        let inner = self.inner.lock().await;
        let mut peers: Vec<_> = inner
            .connections
            .iter()
            .map(|(addr, entry)| (entry.connected_at, *addr))
            .collect();
        peers.sort();
        peers.into_iter().map(|(_, addr)| addr).collect()
    }

    /// Signals every connection to close and refuses new ones.
    ///
    /// Returns how many connections were signalled.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let entries: Vec<_> = inner.connections.drain().collect();
        let count = entries.len();
        for (_, entry) in entries {
            // The worker may already be on its way out.
            let _ = entry.close.send(());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_respects_limit() {
        let registry = ConnectionRegistry::new();

        assert!(matches!(
            registry.register(addr(1), 2).await,
            Admission::Admitted(_)
        ));
        assert!(matches!(
            registry.register(addr(2), 2).await,
            Admission::Admitted(_)
        ));
        assert!(matches!(registry.register(addr(3), 2).await, Admission::Full));
        assert_eq!(registry.len().await, 2);

        assert!(registry.remove(&addr(1)).await);
        assert!(!registry.remove(&addr(1)).await);
        assert!(matches!(
            registry.register(addr(3), 2).await,
            Admission::Admitted(_)
        ));
        assert_eq!(registry.peers().await, vec![addr(2), addr(3)]);
    }

    #[tokio::test]
    async fn test_close_all_signals_and_refuses() {
        let registry = ConnectionRegistry::new();
        let Admission::Admitted(closed) = registry.register(addr(1), 4).await else {
            panic!("expected admission");
        };

        assert_eq!(registry.close_all().await, 1);
        assert!(closed.await.is_ok());
        assert!(registry.is_empty().await);
        assert!(matches!(
            registry.register(addr(2), 4).await,
            Admission::ShuttingDown
        ));
    }
}
