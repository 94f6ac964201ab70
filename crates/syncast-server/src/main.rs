//! Syncast Server
//!
//! Accepts TCP clients and, on operator command, broadcasts a media file to
//! all of them tagged with a shared start time.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use syncast_core::Config;
use syncast_core::config::load_config;
use syncast_server::broadcast::BroadcastCoordinator;
use syncast_server::listener::BroadcastListener;
use syncast_server::media::MediaLibrary;
use syncast_server::operator::{Operator, run_console};
use syncast_server::registry::ConnectionRegistry;

/// How long shutdown waits for cancelled clients to close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "syncast-server")]
#[command(
    version,
    about = "Syncast server - synchronized media broadcast to TCP clients"
)]
struct Args {
    /// Path to a JSON config file. Defaults to the global settings file.
    #[arg(long, env = "SYNCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the listener on.
    #[arg(long)]
    bind_address: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between a play command and the scheduled start.
    #[arg(long)]
    play_delay: Option<u64>,

    /// Seconds to wait for one client's send before reporting it failed.
    #[arg(long)]
    send_timeout: Option<u64>,

    /// Directory holding media files.
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Extension appended to media names.
    #[arg(long)]
    media_extension: Option<String>,

    /// Log level filter (e.g. "info", "debug").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SYNCAST_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.bind_address {
            config.server.bind_address.clone_from(addr);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level.clone_from(level);
        }
        if let Some(secs) = self.play_delay {
            config.playback.delay_secs = secs;
        }
        if let Some(secs) = self.send_timeout {
            config.playback.send_timeout_secs = secs;
        }
        if let Some(dir) = &self.media_dir {
            config.media.directory = Some(dir.clone());
        }
        if let Some(ext) = &self.media_extension {
            config.media.extension.clone_from(ext);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    let log_filter = format!("syncast_server={}", config.server.log_level);
    syncast_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr(),
        play_delay_secs = config.playback.delay_secs,
        "Starting syncast-server"
    );

    let listener = BroadcastListener::bind(&config.server.listen_addr()).await?;

    let registry = ConnectionRegistry::new();
    let coordinator = BroadcastCoordinator::new(
        registry.clone(),
        config.playback.send_timeout(),
        config.playback.delay(),
    );
    let media = MediaLibrary::new(
        config.media.resolved_directory(),
        config.media.extension.clone(),
    );
    info!(directory = %media.directory().display(), "Serving media");
    let operator = Operator::new(coordinator.clone(), media);

    // Keep serving after stdin closes (e.g. when run detached).
    let console = async {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = run_console(&operator, stdin).await {
            warn!(error = %e, "Console read failed");
        }
        std::future::pending::<()>().await;
    };

    tokio::select! {
        () = listener.serve(registry.clone()) => {}
        () = console => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        }
    }

    let remaining = registry.snapshot();
    coordinator.disconnect_all();
    for conn in &remaining {
        if tokio::time::timeout(SHUTDOWN_GRACE, conn.terminated())
            .await
            .is_err()
        {
            warn!(connection_id = %conn.id(), "Client did not close in time");
        }
    }

    info!("Server stopped");
    Ok(())
}
