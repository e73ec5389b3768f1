//! Viewer configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framelink_core::{PixelFormat, TransportConfig, WireEndian};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Expected frame geometry.
    pub frame: FrameConfig,
    /// Transport tuning.
    pub transport: TransportSection,
    /// Frame display settings.
    pub display: DisplayConfig,
    /// Input forwarding settings.
    pub input: InputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// How frames arrive from the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Accept one TCP connection at a time.
    #[default]
    Reliable,
    /// Reassemble chunk datagrams.
    Chunked,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: FrameMode,
    /// Address frames are received on (TCP listener or UDP socket).
    pub listen_addr: SocketAddr,
    /// Sender's control-event address.
    pub sender_event_addr: SocketAddr,
    /// Local address the event socket binds to.
    pub event_bind_addr: SocketAddr,
}

/// Frame geometry. Must match the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    /// "rgb8", "bgr8", "rgba8", "bgra8" or "gray8".
    pub pixel_format: String,
}

/// Transport tuning. Must match the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Payload bytes per chunk datagram.
    pub chunk_size: usize,
    /// Delay between setup attempts and before accepting again.
    pub retry_interval_ms: u64,
    /// Give up after this many attempts (0 = never).
    pub max_retry_attempts: u32,
    /// Largest single read on the reliable channel.
    pub io_chunk_size: usize,
    /// Abandon a partially received chunked frame after this long
    /// (0 = wait indefinitely).
    pub reassembly_deadline_ms: u64,
    /// "big" or "little".
    pub endian: String,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Log a digest of every Nth frame (0 = never).
    pub digest_every: u64,
    /// Log frame statistics this often, in milliseconds (0 = never).
    pub stats_interval_ms: u64,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Read control events from stdin and forward them to the sender.
    pub enabled: bool,
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
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 12347)),
            sender_event_addr: SocketAddr::from(([127, 0, 0, 1], 12346)),
            event_bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pixel_format: "rgb8".into(),
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
            io_chunk_size: core.io_chunk_size,
            reassembly_deadline_ms: 1000,
            endian: "big".into(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            digest_every: 30,
            stats_interval_ms: 5000,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { enabled: true }
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

impl ViewerConfig {
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

    pub fn to_transport_config(&self) -> TransportConfig {
        let pixel_format = PixelFormat::from_name(&self.frame.pixel_format).unwrap_or_else(|| {
            tracing::warn!("unknown pixel format {:?}; using rgb8", self.frame.pixel_format);
            PixelFormat::default()
        });
        let endian = WireEndian::from_name(&self.transport.endian).unwrap_or_else(|| {
            tracing::warn!("unknown byte order {:?}; using big", self.transport.endian);
            WireEndian::default()
        });
        let defaults = TransportConfig::default();

        TransportConfig {
            frame_width: self.frame.width,
            frame_height: self.frame.height,
            pixel_format,
            chunk_size: self.transport.chunk_size,
            retry_interval: Duration::from_millis(self.transport.retry_interval_ms),
            max_retry_attempts: (self.transport.max_retry_attempts > 0)
                .then_some(self.transport.max_retry_attempts),
            io_timeout: defaults.io_timeout,
            io_chunk_size: self.transport.io_chunk_size,
            reassembly_deadline: (self.transport.reassembly_deadline_ms > 0)
                .then(|| Duration::from_millis(self.transport.reassembly_deadline_ms)),
            endian,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.listen_addr.port(), 12347);
        assert_eq!(parsed.network.mode, FrameMode::Reliable);
        assert!(parsed.input.enabled);
    }

    #[test]
    fn deadline_zero_waits_forever() {
        let mut cfg = ViewerConfig::default();
        assert_eq!(
            cfg.to_transport_config().reassembly_deadline,
            Some(Duration::from_secs(1))
        );
        cfg.transport.reassembly_deadline_ms = 0;
        assert_eq!(cfg.to_transport_config().reassembly_deadline, None);
    }

    #[test]
    fn geometry_matches_sender_defaults() {
        let core = ViewerConfig::default().to_transport_config();
        assert_eq!(core.frame_size(), 921_600);
        assert_eq!(core.chunk_count(), 16);
        assert!(core.validate().is_ok());
    }
}
