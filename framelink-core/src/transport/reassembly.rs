//! Per-frame reassembly of chunk datagrams.
//!
//! A [`ReassemblyState`] lives for exactly one frame attempt. It holds a
//! presence bitmap of `N` entries and a zeroed buffer of `F` bytes.
//! Chunks may arrive in any order and any number of times; the frame is
//! complete once every bitmap entry is set. Nothing is reused between
//! frames: a new attempt always starts from a fresh state.

use std::time::{Duration, Instant};

use crate::config::TransportConfig;
use crate::error::{ProtocolViolation, TransportError};
use crate::frame::Frame;
use crate::header::{ChunkHeader, WireEndian};

// ── ChunkOutcome ─────────────────────────────────────────────────

/// What accepting a chunk did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// New chunk recorded; more are outstanding.
    Stored,
    /// The index was already recorded; nothing changed.
    Duplicate,
    /// New chunk recorded and every index is now present.
    Complete,
}

// ── ReassemblyState ──────────────────────────────────────────────

#[derive(Debug)]
pub struct ReassemblyState {
    frame_size: usize,
    chunk_size: usize,
    present: Vec<bool>,
    buffer: Vec<u8>,
    received_chunks: usize,
    received_bytes: usize,
    started: Instant,
}

impl ReassemblyState {
    /// Fresh state for a frame of `frame_size` bytes cut into
    /// `chunk_size`-byte chunks.
    pub fn new(frame_size: usize, chunk_size: usize) -> Self {
        let chunk_count = frame_size.div_ceil(chunk_size);
        Self {
            frame_size,
            chunk_size,
            present: vec![false; chunk_count],
            buffer: vec![0u8; frame_size],
            received_chunks: 0,
            received_bytes: 0,
            started: Instant::now(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.frame_size(), config.chunk_size)
    }

    /// Decode a raw datagram and accept its chunk.
    pub fn accept_datagram(
        &mut self,
        datagram: &[u8],
        endian: WireEndian,
    ) -> Result<ChunkOutcome, ProtocolViolation> {
        let (header, payload) = ChunkHeader::decode_datagram(datagram, endian)?;
        self.accept(header.chunk_index, payload)
    }

    /// Record `payload` as chunk `index`.
    ///
    /// Out-of-range chunks are rejected before anything is written, so a
    /// rejection never alters the buffer.
    pub fn accept(
        &mut self,
        index: i32,
        payload: &[u8],
    ) -> Result<ChunkOutcome, ProtocolViolation> {
        let out_of_range = ProtocolViolation::ChunkOutOfRange {
            index: index as i64,
            payload_len: payload.len(),
            chunk_count: self.chunk_count(),
        };
        let Ok(slot) = usize::try_from(index) else {
            return Err(out_of_range);
        };
        if slot >= self.chunk_count() || payload.len() > self.chunk_size {
            return Err(out_of_range);
        }
        let offset = slot * self.chunk_size;
        if offset + payload.len() > self.frame_size {
            return Err(out_of_range);
        }

        if self.present[slot] {
            return Ok(ChunkOutcome::Duplicate);
        }

        self.buffer[offset..offset + payload.len()].copy_from_slice(payload);
        self.present[slot] = true;
        self.received_chunks += 1;
        self.received_bytes += payload.len();

        if self.is_complete() {
            Ok(ChunkOutcome::Complete)
        } else {
            Ok(ChunkOutcome::Stored)
        }
    }

    /// `N`, the number of chunks in a frame.
    pub fn chunk_count(&self) -> usize {
        self.present.len()
    }

    pub fn received_chunks(&self) -> usize {
        self.received_chunks
    }

    pub fn received_bytes(&self) -> usize {
        self.received_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks == self.chunk_count()
    }

    /// Indices not yet seen, in ascending order.
    pub fn missing_chunks(&self) -> Vec<usize> {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(i, _)| i)
            .collect()
    }

    /// Time since this attempt began.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Hand over the finished frame.
    ///
    /// Fails if chunks are missing or if short chunks left the byte
    /// total below `F`.
    pub fn into_frame(self) -> Result<Frame, TransportError> {
        if !self.is_complete() || self.received_bytes != self.frame_size {
            return Err(ProtocolViolation::IncompleteFrame {
                received: self.received_bytes,
                expected: self.frame_size,
            }
            .into());
        }
        Frame::new(self.buffer, self.frame_size)
    }
}

// ── Tests ────────────────────────────────────────────────────────
