//! Transport configuration shared by every component.
//!
//! Built once at startup (usually from a binary's TOML config) and
//! cloned into each channel and service. Nothing mutates it afterwards.

use std::time::Duration;

use crate::error::TransportError;
use crate::frame::PixelFormat;
use crate::header::WireEndian;
use crate::supervisor::RetryPolicy;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

// ── TransportConfig ──────────────────────────────────────────────

/// Parameters both peers must agree on, plus local tuning.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels.
    pub frame_height: u32,
    /// Pixel layout; only its size matters to the transport.
    pub pixel_format: PixelFormat,
    /// Payload bytes per chunk datagram.
    pub chunk_size: usize,
    /// Delay between setup retries and reconnects.
    pub retry_interval: Duration,
    /// Give up on a setup step after this many attempts (`None` = never).
    pub max_retry_attempts: Option<u32>,
    /// Upper bound on waiting for the frame source.
    pub io_timeout: Duration,
    /// Largest single read or write on the reliable stream.
    pub io_chunk_size: usize,
    /// Abandon an incomplete chunked frame after this long (`None` = wait forever).
    pub reassembly_deadline: Option<Duration>,
    /// Byte order of header integers.
    pub endian: WireEndian,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            pixel_format: PixelFormat::Rgb8,
            chunk_size: 60_000,
            retry_interval: Duration::from_secs(5),
            max_retry_attempts: None,
            io_timeout: Duration::from_secs(30),
            io_chunk_size: 4096,
            reassembly_deadline: None,
            endian: WireEndian::Big,
        }
    }
}

impl TransportConfig {
    /// Agreed frame size `F` in bytes, or `None` if the geometry overflows.
    pub fn checked_frame_size(&self) -> Option<usize> {
        (self.frame_width as usize)
            .checked_mul(self.frame_height as usize)?
            .checked_mul(self.pixel_format.bytes_per_pixel())
    }

    /// Agreed frame size `F` in bytes. Saturates on overflow; [`validate`]
    /// rejects such geometry.
    ///
    /// [`validate`]: TransportConfig::validate
    pub fn frame_size(&self) -> usize {
        self.checked_frame_size().unwrap_or(usize::MAX)
    }

    /// Number of chunks `N = ceil(F / C)` per frame.
    pub fn chunk_count(&self) -> usize {
        self.frame_size().div_ceil(self.chunk_size)
    }

    /// Retry policy for the connection supervisor.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: self.retry_interval,
            max_attempts: self.max_retry_attempts,
        }
    }

    /// Reject configurations no channel can operate with.
    pub fn validate(&self) -> Result<(), TransportError> {
        let Some(frame_size) = self.checked_frame_size() else {
            return Err(TransportError::InvalidConfig("frame size overflows"));
        };
        if frame_size == 0 {
            return Err(TransportError::InvalidConfig("frame size must be non-zero"));
        }
        if frame_size > i32::MAX as usize {
            return Err(TransportError::InvalidConfig(
                "frame size must fit the i32 length prefix",
            ));
        }
        let max_chunk = MAX_DATAGRAM_PAYLOAD - crate::header::PREFIX_SIZE;
        if self.chunk_size == 0 || self.chunk_size > max_chunk {
            return Err(TransportError::InvalidConfig(
                "chunk size must fit in one datagram with its header",
            ));
        }
        if self.io_chunk_size == 0 {
            return Err(TransportError::InvalidConfig("io chunk size must be non-zero"));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.frame_size(), 921_600);
        assert_eq!(cfg.chunk_count(), 16);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn chunk_count_rounds_up() {
        let cfg = TransportConfig {
            frame_width: 320,
            frame_height: 480,
            ..Default::default()
        };
        assert_eq!(cfg.frame_size(), 460_800);
        assert_eq!(cfg.chunk_count(), 8);
    }

    #[test]
    fn rejects_oversized_chunks() {
        let cfg = TransportConfig {
            chunk_size: MAX_DATAGRAM_PAYLOAD,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(TransportError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_empty_frames() {
        let cfg = TransportConfig {
            frame_width: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_overflowing_geometry() {
        let cfg = TransportConfig {
            frame_width: u32::MAX,
            frame_height: u32::MAX,
            pixel_format: PixelFormat::Rgba8,
            ..Default::default()
        };
        assert_eq!(cfg.checked_frame_size(), None);
        assert!(matches!(
            cfg.validate(),
            Err(TransportError::InvalidConfig("frame size overflows"))
        ));
    }

    #[test]
    fn retry_policy_mirrors_config() {
        let cfg = TransportConfig {
            retry_interval: Duration::from_millis(250),
            max_retry_attempts: Some(4),
            ..Default::default()
        };
        let policy = cfg.retry_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(4));
    }
}
