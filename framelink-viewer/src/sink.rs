//! Frame sink for a headless viewer.
//!
//! There is no window: each frame is hashed with BLAKE3 so a sender and
//! a viewer can be compared by their logs, and the latest digest is
//! kept for inspection.

use tracing::info;

use framelink_core::{Frame, FrameSink, TransportError};

#[derive(Debug, Default)]
pub struct DigestSink {
    log_every: u64,
    frames: u64,
    last_digest: Option<blake3::Hash>,
}

impl DigestSink {
    /// Log every `log_every`-th digest; `0` never logs.
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every,
            ..Default::default()
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_digest(&self) -> Option<&blake3::Hash> {
        self.last_digest.as_ref()
    }
}

impl FrameSink for DigestSink {
    fn render(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let digest = blake3::hash(frame.as_bytes());
        self.frames += 1;
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            info!("frame #{} ({} bytes) blake3 {}", self.frames, frame.len(), digest.to_hex());
        }
        self.last_digest = Some(digest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_latest_digest() {
        let mut sink = DigestSink::new(0);
        assert!(sink.last_digest().is_none());

        let a = Frame::new(vec![1; 16], 16).unwrap();
        let b = Frame::new(vec![2; 16], 16).unwrap();
        sink.render(&a).unwrap();
        sink.render(&b).unwrap();

        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.last_digest(), Some(&blake3::hash(&[2; 16])));
    }
}
