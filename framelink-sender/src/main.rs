//! framelink sender: entry point.
//!
//! ```text
//! framelink-sender                  Run with ./framelink-sender.toml
//! framelink-sender --config <path>  Load a custom config TOML
//! framelink-sender --gen-config     Write default config to stdout
//! framelink-sender --chunked        Override the mode to chunked UDP
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framelink_core::{ConnectionSupervisor, EventReceiver, FrameProducer};
use framelink_sender::config::{FrameMode, SenderConfig};
use framelink_sender::events::EventLogger;
use framelink_sender::pattern::{TestPatternSource, format_name};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framelink-sender", about = "Stream frames to a framelink viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framelink-sender.toml")]
    config: PathBuf,

    /// Viewer address (overrides the config file).
    #[arg(long)]
    viewer: Option<SocketAddr>,

    /// Send chunk datagrams instead of a TCP stream.
    #[arg(long)]
    chunked: bool,

    /// Write the default configuration to this path and exit.
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if let Some(path) = &cli.write_config {
        SenderConfig::write_default(path)?;
        println!("Default config written to {}", path.display());
        return Ok(());
    }

    // Load config.
    let mut config = SenderConfig::load(&cli.config);
    if let Some(viewer) = cli.viewer {
        config.network.viewer_addr = viewer;
    }
    if cli.chunked {
        config.network.mode = FrameMode::Chunked;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport = config.to_transport_config();
    transport.validate()?;

    info!("framelink-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("mode: {:?}", config.network.mode);
    info!("viewer: {}", config.network.viewer_addr);
    info!(
        "frame: {}x{} {} ({} bytes), sending 1 of every {}",
        transport.frame_width,
        transport.frame_height,
        format_name(transport.pixel_format),
        transport.frame_size(),
        config.frame.send_every.max(1)
    );

    // Control events from the viewer.
    let mut supervisor = ConnectionSupervisor::new(transport.retry_policy());
    let receiver = EventReceiver::bind(config.network.event_listen_addr, &mut supervisor).await?;
    info!("listening for control events on {}", receiver.local_addr()?);
    let mut event_log = EventLogger::new(receiver);
    let event_stop = event_log.stop_handle();
    let event_task = tokio::spawn(async move { event_log.run().await });

    // Frames to the viewer.
    let source = TestPatternSource::new(&transport, config.frame.fps);
    let mut producer = match config.network.mode {
        FrameMode::Reliable => {
            FrameProducer::reliable(source, transport, config.network.viewer_addr)
        }
        FrameMode::Chunked => FrameProducer::chunked(
            source,
            transport,
            config.network.chunk_bind_addr,
            config.network.viewer_addr,
        ),
    }
    .with_send_every(config.frame.send_every);
    let producer_stop = producer.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        producer_stop.store(false, Ordering::SeqCst);
        event_stop.store(false, Ordering::SeqCst);
    });

    let result = producer.run().await;
    event_task.abort();
    if let Err(e) = &result {
        error!("frame producer failed: {e}");
    }
    info!(
        "sent {} of {} frames over {} connection(s)",
        producer.frames_sent(),
        producer.frames_acquired(),
        producer.connections()
    );
    result?;
    Ok(())
}
