//! TCP listener with a connection ceiling.
//!
//! # Responsibilities
//! - Bind the listen address
//! - Accept incoming TCP connections
//! - Refuse connections beyond `max_connections`
//! - Survive transient accept errors

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ServeError;
use crate::observability::metrics;

/// A TCP listener that caps concurrently open connections.
///
/// Connections accepted while every slot is taken are closed immediately
/// rather than queued, so an overloaded server sheds load instead of
/// letting the kernel backlog grow.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: &str, max_connections: usize) -> Result<Self, ServeError> {
        if addr.trim().is_empty() {
            return Err(ServeError::InvalidAddress(addr.to_string()));
        }
        let inner = TcpListener::bind(addr).await.map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = inner.local_addr().map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "listener bound"
        );

        Ok(Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections.max(1))),
            max_connections,
            local_addr,
        })
    }

    /// Accept the next connection that fits under the limit.
    pub async fn accept(&self) -> (TcpStream, SocketAddr, ConnectionPermit) {
        loop {
            let (stream, addr) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // EMFILE and friends clear up once connections close.
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            match Arc::clone(&self.connection_limit).try_acquire_owned() {
                Ok(permit) => {
                    tracing::debug!(
                        peer_addr = %addr,
                        available_permits = self.connection_limit.available_permits(),
                        "connection accepted"
                    );
                    return (stream, addr, ConnectionPermit { _permit: permit });
                }
                Err(_) => {
                    metrics::record_rejected_connection("max_connections");
                    tracing::warn!(
                        peer_addr = %addr,
                        max_connections = self.max_connections,
                        "connection limit reached, closing connection"
                    );
                    drop(stream);
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot; released when dropped, even if the connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1:0", 4).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.available_permits(), 4);
    }

    #[tokio::test]
    async fn rejects_empty_address() {
        assert!(matches!(
            Listener::bind("", 4).await,
            Err(ServeError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn sheds_connections_over_limit() {
        use tokio::io::AsyncReadExt;

        let listener = Listener::bind("127.0.0.1:0", 1).await.unwrap();
        let addr = listener.local_addr();

        let _first = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, _permit) = listener.accept().await;
        assert_eq!(listener.available_permits(), 0);

        let mut second = TcpStream::connect(addr).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(pending.is_err(), "no connection may be handed out over the limit");

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(1), second.read(&mut buf))
            .await
            .expect("shed connection should be closed");
        assert_eq!(read.unwrap_or(0), 0);
    }
}
