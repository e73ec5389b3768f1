//! Frame buffers and pixel layouts.
//!
//! A [`Frame`] is the indivisible unit the transport delivers: an opaque
//! byte buffer whose length both peers agree on out of band. The
//! transport never looks inside it.

use std::fmt;

use crate::error::{ProtocolViolation, TransportError};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of the frames being carried.
///
/// Only used to derive the agreed frame size; the transport does not
/// convert between formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    #[default]
    Rgb8,
    /// 3 bytes per pixel: Blue, Green, Red.
    Bgr8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Parse a lowercase format name as used in config files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rgb8" => Some(Self::Rgb8),
            "bgr8" => Some(Self::Bgr8),
            "rgba8" => Some(Self::Rgba8),
            "bgra8" => Some(Self::Bgra8),
            "gray8" => Some(Self::Gray8),
            _ => None,
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One complete frame of exactly the agreed size.
///
/// Construction validates the length, so a `Frame` in hand is always
/// whole.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    /// Wrap `data`, rejecting any length other than `expected`.
    pub fn new(data: Vec<u8>, expected: usize) -> Result<Self, TransportError> {
        if data.len() != expected {
            return Err(ProtocolViolation::LengthMismatch {
                expected,
                actual: data.len() as i64,
            }
            .into());
        }
        Ok(Self { data })
    }

    /// An all-zero frame of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Frame size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for producers filling a frame in place. The length
    /// cannot change through a slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}
