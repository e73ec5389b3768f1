//! Connection lifecycle of a reliable frame channel.
//!
//! Provides a `ConnectionPhase` enum covering both the connecting and
//! the accepting side, with validated transitions that return `Result`
//! instead of panicking.

use std::time::Instant;

use crate::error::TransportError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a reliable channel's data-plane connection.
///
/// ```text
///  connecting side:  Disconnected ──► Connecting ──► Connected
///  accepting side:   Disconnected ──► Listening  ──► Accepted
///                         ▲                               │
///                         └──── any error / peer close ───┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No active connection. Initial state and the state after any failure.
    #[default]
    Disconnected,

    /// Socket created, connect in progress.
    Connecting,

    /// Outbound connection established; frames may flow.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// Listener bound, waiting for a peer.
    Listening,

    /// Inbound connection accepted; frames may flow.
    Accepted {
        /// When the peer was accepted.
        since: Instant,
    },
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Listening => write!(f, "Listening"),
            Self::Accepted { .. } => write!(f, "Accepted"),
        }
    }
}

impl ConnectionPhase {
    /// Returns `true` when frames may be exchanged.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Accepted { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the current data-plane connection has been up.
    ///
    /// Returns `None` unless established.
    pub fn established_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } | Self::Accepted { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Listening`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_listen(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Disconnected => {
                *self = Self::Listening;
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "cannot listen: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Accepted`.
    ///
    /// Valid from: `Listening`.
    pub fn complete_accept(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Listening => {
                *self = Self::Accepted {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "cannot accept: not in Listening state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Every transport error ends up here; the owner reconnects from scratch.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
