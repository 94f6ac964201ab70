//! Operator control path: turns commands into broadcasts.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::broadcast::{BroadcastCoordinator, BroadcastError, PendingBroadcast};
use crate::commands::Command;
use crate::media::{MediaError, MediaLibrary};

/// Usage text shown when the console starts.
pub const USAGE: &str = "To play a file, enter its name without the extension. \
Enter 'stop' to stop playback, 'disconnect' to drop every client.";

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

/// Result of a successfully executed command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Sends are queued; delivery finishes in the background.
    Broadcast(PendingBroadcast),
    Disconnected(usize),
}

/// Executes operator commands against an explicit coordinator and library.
#[derive(Clone)]
pub struct Operator {
    coordinator: BroadcastCoordinator,
    media: MediaLibrary,
}

impl Operator {
    pub const fn new(coordinator: BroadcastCoordinator, media: MediaLibrary) -> Self {
        Self { coordinator, media }
    }

    /// Run one command. Returns once every send is queued, without waiting
    /// for delivery.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, OperatorError> {
        match command {
            Command::Play(name) => {
                let payload = self.media.load(&name).await?;
                let bytes = payload.len();
                let pending = self.coordinator.schedule_play(payload)?;
                info!(
                    name = %name,
                    bytes,
                    clients = pending.attempted(),
                    kind = %pending.kind(),
                    "Sending file to clients"
                );
                Ok(CommandOutcome::Broadcast(pending))
            }
            Command::Stop => {
                info!("Sending stop command to all clients");
                Ok(CommandOutcome::Broadcast(self.coordinator.broadcast_stop()))
            }
            Command::Disconnect => Ok(CommandOutcome::Disconnected(
                self.coordinator.disconnect_all(),
            )),
        }
    }
}

/// Read commands line by line until EOF, executing each.
///
/// Delivery results are logged by the coordinator as they complete, so a slow
/// client never holds up the next command.
pub async fn run_console<R>(operator: &Operator, reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    info!("{USAGE}");
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match operator.execute(command).await {
            Ok(CommandOutcome::Broadcast(pending)) if pending.is_noop() => {
                info!(kind = %pending.kind(), "No clients connected");
            }
            Ok(CommandOutcome::Broadcast(pending)) => {
                info!(
                    kind = %pending.kind(),
                    clients = pending.attempted(),
                    "Broadcast queued"
                );
            }
            Ok(CommandOutcome::Disconnected(count)) => {
                info!(count, "Disconnect requested");
            }
            Err(e) => warn!(error = %e, "Command failed"),
        }
    }
    info!("Console input closed");
    Ok(())
}
