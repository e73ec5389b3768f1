//! Configuration for the frame sender.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framelink_core::{PixelFormat, TransportConfig, WireEndian};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Frame geometry and pacing.
    pub frame: FrameConfig,
    /// Transport tuning.
    pub transport: TransportSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// How frames travel to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Length-prefixed frames over one TCP connection.
    #[default]
    Reliable,
    /// Chunk datagrams over UDP.
    Chunked,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Frame transport mode.
    pub mode: FrameMode,
    /// Viewer address frames are sent to.
    pub viewer_addr: SocketAddr,
    /// Local address the chunk socket binds to (chunked mode).
    pub chunk_bind_addr: SocketAddr,
    /// Local address control events are received on.
    pub event_listen_addr: SocketAddr,
}

/// Frame configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    /// "rgb8", "bgr8", "rgba8", "bgra8" or "gray8".
    pub pixel_format: String,
    /// Frames generated per second by the test pattern.
    pub fps: u32,
    /// Send one of every N generated frames.
    pub send_every: u32,
}

/// Transport tuning shared with the viewer. Both ends must agree on
/// geometry, chunk size and byte order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Payload bytes per chunk datagram.
    pub chunk_size: usize,
    /// Delay between setup attempts and before reconnecting.
    pub retry_interval_ms: u64,
    /// Give up after this many attempts (0 = never).
    pub max_retry_attempts: u32,
    /// How long to wait for the frame source.
    pub io_timeout_ms: u64,
    /// Largest single read or write on the reliable channel.
    pub io_chunk_size: usize,
    /// "big" or "little".
    pub endian: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: FrameMode::Reliable,
            viewer_addr: SocketAddr::from(([127, 0, 0, 1], 12347)),
            chunk_bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            event_listen_addr: SocketAddr::from(([0, 0, 0, 0], 12346)),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pixel_format: "rgb8".into(),
            fps: 30,
            send_every: 4,
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        let core = TransportConfig::default();
        Self {
            chunk_size: core.chunk_size,
            retry_interval_ms: core.retry_interval.as_millis() as u64,
            max_retry_attempts: 0,
            io_timeout_ms: core.io_timeout.as_millis() as u64,
            io_chunk_size: core.io_chunk_size,
            endian: "big".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Build the core transport settings. Unknown names fall back to
    /// the defaults.
    pub fn to_transport_config(&self) -> TransportConfig {
        let pixel_format = PixelFormat::from_name(&self.frame.pixel_format).unwrap_or_else(|| {
            tracing::warn!("unknown pixel format {:?}; using rgb8", self.frame.pixel_format);
            PixelFormat::default()
        });
        let endian = WireEndian::from_name(&self.transport.endian).unwrap_or_else(|| {
            tracing::warn!("unknown byte order {:?}; using big", self.transport.endian);
            WireEndian::default()
        });

        TransportConfig {
            frame_width: self.frame.width,
            frame_height: self.frame.height,
            pixel_format,
            chunk_size: self.transport.chunk_size,
            retry_interval: Duration::from_millis(self.transport.retry_interval_ms),
            max_retry_attempts: (self.transport.max_retry_attempts > 0)
                .then_some(self.transport.max_retry_attempts),
            io_timeout: Duration::from_millis(self.transport.io_timeout_ms.max(1)),
            io_chunk_size: self.transport.io_chunk_size,
            reassembly_deadline: None,
            endian,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
