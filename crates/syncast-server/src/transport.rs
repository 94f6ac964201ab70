//! Per-connection transport task.
//!
//! Owns the socket for one client: writes queued sends in order, watches the
//! read side for the peer going away, and honours operator cancellation. Every
//! way out of the loop ends in a terminal state transition, which is what
//! prunes the connection from the registry.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::registry::{ClientConnection, ConnectionIo, ConnectionState, DeliveryError};

/// Drive `stream` on behalf of `connection` until it reaches a terminal state.
pub async fn drive<S>(stream: S, connection: Arc<ClientConnection>, io: ConnectionIo)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let ConnectionIo {
        mut outbound,
        cancel,
    } = io;
    let (mut reader, mut writer) = tokio::io::split(stream);
    connection.transition(ConnectionState::Ready);

    // Clients never send anything meaningful; inbound bytes are discarded.
    let mut discard = [0u8; 512];

    let end_state = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = writer.shutdown().await {
                    debug!(connection_id = %connection.id(), error = %e, "Shutdown after cancel failed");
                }
                break ConnectionState::Cancelled;
            }
            Some(send) = outbound.recv() => {
                let result = tokio::select! {
                    written = write_frame(&mut writer, &send.bytes) => {
                        written.map_err(|e| DeliveryError::Io(e.to_string()))
                    }
                    () = cancel.cancelled() => Err(DeliveryError::Closed),
                };
                match result {
                    Ok(()) => send.complete(Ok(())),
                    Err(DeliveryError::Io(reason)) => {
                        warn!(
                            connection_id = %connection.id(),
                            peer = %connection.peer_label(),
                            error = %reason,
                            "Error sending data"
                        );
                        send.complete(Err(DeliveryError::Io(reason.clone())));
                        break ConnectionState::Failed(reason);
                    }
                    // Cancelled mid-write; the cancel branch ends the loop next.
                    Err(other) => send.complete(Err(other)),
                }
            }
            read = reader.read(&mut discard) => match read {
                // Clients never write, so EOF is treated as the peer leaving.
                // A client that only half-closes its write side is dropped too.
                Ok(0) => break ConnectionState::Cancelled,
                Ok(n) => debug!(connection_id = %connection.id(), bytes = n, "Ignoring inbound bytes"),
                Err(e) => break ConnectionState::Failed(e.to_string()),
            },
        }
    };

    connection.transition(end_state);

    outbound.close();
    while let Ok(send) = outbound.try_recv() {
        send.complete(Err(DeliveryError::Closed));
    }
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}
