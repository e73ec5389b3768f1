//! Synthetic frame source.
//!
//! Stands in for a camera: produces a diagonal gradient that scrolls by
//! one pixel per frame, paced at a fixed rate.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use framelink_core::{Frame, FrameSource, PixelFormat, TransportConfig, TransportError};

pub struct TestPatternSource {
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    frame_size: usize,
    period: Duration,
    next_due: Instant,
    frame_number: u64,
}

impl TestPatternSource {
    /// A source matching `config`'s geometry, producing `fps` frames per
    /// second (at least one).
    pub fn new(config: &TransportConfig, fps: u32) -> Self {
        Self {
            width: config.frame_width as usize,
            height: config.frame_height as usize,
            bytes_per_pixel: config.pixel_format.bytes_per_pixel(),
            frame_size: config.frame_size(),
            period: Duration::from_secs(1) / fps.max(1),
            next_due: Instant::now(),
            frame_number: 0,
        }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn render(&self) -> Result<Frame, TransportError> {
        let shift = self.frame_number as usize;
        let size = self.frame_size;
        let mut data = Vec::with_capacity(size);
        for y in 0..self.height {
            for x in 0..self.width {
                let level = ((x + y + shift) % 256) as u8;
                for channel in 0..self.bytes_per_pixel {
                    data.push(level.wrapping_add((channel * 85) as u8));
                }
            }
        }
        Frame::new(data, size)
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn acquire(&mut self, timeout: Duration) -> Result<Frame, TransportError> {
        let now = Instant::now();
        if self.next_due > now + timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }
        tokio::time::sleep_until(self.next_due).await;

        // Fall behind rather than burst when the consumer is slow.
        self.next_due = Instant::now().max(self.next_due) + self.period;
        let frame = self.render()?;
        self.frame_number += 1;
        Ok(frame)
    }
}

/// Pixel format name, for logging.
pub fn format_name(format: PixelFormat) -> &'static str {
    match format {
        PixelFormat::Rgb8 => "rgb8",
        PixelFormat::Bgr8 => "bgr8",
        PixelFormat::Rgba8 => "rgba8",
        PixelFormat::Bgra8 => "bgra8",
        PixelFormat::Gray8 => "gray8",
    }
}

// ── Tests ────────────────────────────────────────────────────────
