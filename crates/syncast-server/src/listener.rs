//! TCP listener that feeds accepted clients into the registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::registry::{ClientConnection, ConnectionRegistry};
use crate::transport;

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener-level errors. Any of these stops the server from serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Accepts client connections. No handshake: every accepted stream is
/// registered straight away.
pub struct BroadcastListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BroadcastListener {
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(addr = %local_addr, "Server started");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever.
    pub async fn serve(self, registry: ConnectionRegistry) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    accept_stream(stream, peer, &registry);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Register an accepted stream and spawn its transport task.
pub fn accept_stream(
    stream: TcpStream,
    peer: SocketAddr,
    registry: &ConnectionRegistry,
) -> Arc<ClientConnection> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }
    let (conn, io) = ClientConnection::new(Some(peer));
    registry.add(Arc::clone(&conn));
    tokio::spawn(transport::drive(stream, Arc::clone(&conn), io));
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = BroadcastListener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().to_string();

        let err = BroadcastListener::bind(&addr).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&addr));
    }

    #[tokio::test]
    async fn accepted_clients_are_registered() {
        let listener = BroadcastListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let registry = ConnectionRegistry::new();
        tokio::spawn(listener.serve(registry.clone()));

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();

        for _ in 0..100 {
            if registry.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.len(), 2);
    }
}
