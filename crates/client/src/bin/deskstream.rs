//! Headless viewer runner
//!
//! Connects the streaming core to a server without any UI shell: useful
//! for soak-testing a deployment and for watching the control traffic
//! with `RUST_LOG=debug`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deskstream_client::platform::{NullClipboard, NullSurface};
use deskstream_client::{ClientConfig, DashboardUpdate, Session, SessionOptions};
use deskstream_core::settings::PreferenceStore;

#[derive(Parser, Debug)]
#[command(name = "deskstream", about = "Headless deskstream viewer core")]
struct Args {
    /// Page URL of the deskstream server, e.g. https://host:8081/webrtc
    #[arg(env = "DESKSTREAM_URL")]
    url: url::Url,

    /// Preference store file; in-memory when omitted
    #[arg(long, env = "DESKSTREAM_PREFS")]
    prefs: Option<PathBuf>,

    /// Force relayed ICE candidates (TURN only)
    #[arg(long)]
    relay: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::new(args.url);
    config.ice.force_relay = args.relay;

    let store = match &args.prefs {
        Some(path) => PreferenceStore::open(path, config.storage_prefix())
            .with_context(|| format!("opening preference store {}", path.display()))?,
        None => PreferenceStore::in_memory(config.storage_prefix()),
    };

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let (_command_tx, command_rx) = mpsc::unbounded_channel();

    let session = Session::new(SessionOptions {
        config,
        store,
        clipboard: Arc::new(NullClipboard),
        surface: Arc::new(NullSurface::default()),
        update_tx,
    });
    session.initialize(command_rx).await?;
    info!("session up, ctrl-c to exit");

    loop {
        tokio::select! {
            update = update_rx.recv() => match update {
                Some(DashboardUpdate::Status { message }) => info!("{message}"),
                Some(DashboardUpdate::Stats(stats)) => info!(
                    "video {:.2} Mbps, audio {:.1} kbps, latency {:.0} ms",
                    stats.video_bitrate_mbps,
                    stats.audio_bitrate_kbps,
                    stats.connection_latency_ms,
                ),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.cleanup().await;
    info!("bye");
    Ok(())
}
