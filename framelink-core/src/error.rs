//! Domain-specific error types for the frame transport.
//!
//! All fallible operations return `Result<T, TransportError>`.
//! Errors are handled at the channel boundary; collaborators only ever
//! observe "no frame this cycle".

use std::time::Duration;
use thiserror::Error;

use crate::supervisor::SetupStep;

/// The canonical error type for the frame transport.
#[derive(Debug, Error)]
pub enum TransportError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// A socket setup step failed. The supervisor retries these.
    #[error("{step} failed: {source}")]
    Setup {
        step: SetupStep,
        #[source]
        source: std::io::Error,
    },

    /// A bounded retry policy ran out of attempts.
    #[error("{step} failed after {attempts} attempts")]
    SetupExhausted { step: SetupStep, attempts: u32 },

    // ── Connection Errors ────────────────────────────────────────
    /// The peer closed the connection, or the channel is already closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A short write or truncated read. Fatal to the current connection.
    #[error("partial {op}: expected {expected} bytes, got {actual}")]
    PartialIo {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The underlying I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// Received data violated the wire protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A chunked frame did not complete before its deadline.
    #[error("reassembly abandoned after {after:?}: {received} of {expected} chunks")]
    ReassemblyTimeout {
        received: usize,
        expected: usize,
        after: Duration,
    },

    /// An outbound payload does not fit the transport.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Application Errors ───────────────────────────────────────
    /// The transport configuration is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// A state machine transition was not valid from the current state.
    #[error("invalid state transition: {0}")]
    InvalidState(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ProtocolViolation ────────────────────────────────────────────

/// Ways a peer can break the framing rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A reliable-stream length prefix differs from the agreed frame size.
    #[error("frame length {actual} does not match agreed size {expected}")]
    LengthMismatch { expected: usize, actual: i64 },

    /// A chunk index or payload falls outside the frame.
    #[error("chunk {index} with {payload_len} bytes is out of range ({chunk_count} chunks)")]
    ChunkOutOfRange {
        index: i64,
        payload_len: usize,
        chunk_count: usize,
    },

    /// A datagram too short to carry a chunk header.
    #[error("datagram of {0} bytes is shorter than a chunk header")]
    DatagramTooShort(usize),

    /// Every chunk arrived but the bytes do not add up to a frame.
    #[error("reassembled {received} bytes, expected {expected}")]
    IncompleteFrame { received: usize, expected: usize },
}

impl TransportError {
    /// Returns `true` when the error leaves the current connection unusable
    /// and the owner must tear it down and reconnect.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::PartialIo { .. } | Self::Io(_) | Self::Protocol(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for TransportError {
    fn from(s: String) -> Self {
        TransportError::Other(s)
    }
}

impl From<&str> for TransportError {
    fn from(s: &str) -> Self {
        TransportError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = TransportError::Protocol(ProtocolViolation::LengthMismatch {
            expected: 100,
            actual: 99,
        });
        assert!(e.to_string().contains("99"));
        assert!(e.to_string().contains("100"));

        let e = TransportError::SetupExhausted {
            step: SetupStep::Connect,
            attempts: 3,
        };
        assert_eq!(e.to_string(), "connect failed after 3 attempts");
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: TransportError = io_err.into();
        assert!(matches!(e, TransportError::Io(_)));
        assert!(e.is_connection_fatal());
    }

    #[test]
    fn timeouts_are_not_connection_fatal() {
        assert!(!TransportError::Timeout(Duration::from_millis(5)).is_connection_fatal());
        assert!(TransportError::ConnectionClosed.is_connection_fatal());
    }
}
