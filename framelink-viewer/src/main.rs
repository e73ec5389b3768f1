//! framelink viewer: entry point.
//!
//! ```text
//! framelink-viewer                    Listen with defaults
//! framelink-viewer --config <path>    Use custom config TOML
//! framelink-viewer --gen-config       Dump default config and exit
//! framelink-viewer --no-input         Do not forward stdin events
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framelink_core::{ConnectionSupervisor, EventChannel, EventForwarder, FrameConsumer};
use framelink_viewer::config::{FrameMode, ViewerConfig};
use framelink_viewer::input::LineInput;
use framelink_viewer::sink::DigestSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framelink-viewer", about = "Receive frames from a framelink sender")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framelink-viewer.toml")]
    config: PathBuf,

    /// Address to receive frames on (overrides config).
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Sender's control-event address (overrides config).
    #[arg(short, long)]
    sender: Option<SocketAddr>,

    /// Reassemble chunk datagrams instead of accepting TCP.
    #[arg(long)]
    chunked: bool,

    /// Do not read control events from stdin.
    #[arg(long)]
    no_input: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_addr = addr;
    }
    if let Some(addr) = cli.sender {
        config.network.sender_event_addr = addr;
    }
    if cli.chunked {
        config.network.mode = FrameMode::Chunked;
    }
    if cli.no_input {
        config.input.enabled = false;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framelink-viewer v{}", env!("CARGO_PKG_VERSION"));

    let transport = config.to_transport_config();
    transport.validate()?;
    info!(
        "expecting {}x{} frames ({} bytes, {} chunks)",
        transport.frame_width,
        transport.frame_height,
        transport.frame_size(),
        transport.chunk_count()
    );

    // ── 1. Frame consumer ───────────────────────────────────────

    let sink = DigestSink::new(config.display.digest_every);
    let listen = config.network.listen_addr;
    let mut consumer = match config.network.mode {
        FrameMode::Reliable => FrameConsumer::reliable(sink, transport.clone(), listen).await?,
        FrameMode::Chunked => FrameConsumer::chunked(sink, transport.clone(), listen).await?,
    };
    let consumer_stop = consumer.stop_handle();
    let mut stats_rx = consumer.stats_receiver();

    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            error!("frame consumer failed: {e}");
        }
    });

    // ── 2. Input forwarding ─────────────────────────────────────

    let forwarder_stop = if config.input.enabled {
        let mut supervisor = ConnectionSupervisor::new(transport.retry_policy());
        let channel = EventChannel::bind(
            config.network.event_bind_addr,
            config.network.sender_event_addr,
            &mut supervisor,
        )
        .await?;
        let mut forwarder = EventForwarder::new(LineInput::stdin(), channel);
        let stop = forwarder.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = forwarder.run().await {
                error!("event forwarder failed: {e}");
            }
        });
        Some(stop)
    } else {
        None
    };

    // ── 3. Stats until Ctrl-C ───────────────────────────────────

    let stats_every = Duration::from_millis(config.display.stats_interval_ms);
    let mut ticker = tokio::time::interval(stats_every.max(Duration::from_millis(100)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick(), if !stats_every.is_zero() => {
                let stats = stats_rx.borrow_and_update().clone();
                info!(
                    "{:.1} fps, {} frames, {} bytes, {} dropped, {} connection(s)",
                    stats.fps,
                    stats.total_frames,
                    stats.total_bytes,
                    stats.dropped_frames,
                    stats.connections
                );
            }
        }
    }

    consumer_stop.store(false, Ordering::SeqCst);
    if let Some(stop) = forwarder_stop {
        stop.store(false, Ordering::SeqCst);
    }
    let _ = tokio::time::timeout(Duration::from_secs(2), consumer_task).await;

    Ok(())
}
