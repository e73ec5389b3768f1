//! # framelink-core
//!
//! Frame transport between a sender (camera/capture side) and a viewer.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `PixelFormat`, fixed-size raw pixel buffers
//! - **Wire format**: `LengthPrefix`, `ChunkHeader`, `WireEndian`
//! - **Transport**: `ReliableFrameChannel` (length-prefixed over TCP),
//!   `ChunkedFrameSender`/`ChunkedFrameReceiver` (chunk datagrams over UDP)
//!   and the per-frame `ReassemblyState`
//! - **Events**: `ControlEvent`, `EventChannel`, `EventReceiver`,
//!   `EventCodec` for best-effort input datagrams
//! - **Supervisor**: `ConnectionSupervisor` with a fixed-delay `RetryPolicy`
//! - **Services**: `FrameProducer`, `FrameConsumer`, `EventForwarder`
//! - **Error**: `TransportError`, a typed `thiserror`-based error hierarchy

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod header;
pub mod service;
pub mod source;
pub mod state;
pub mod supervisor;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::EventCodec;
pub use config::{MAX_DATAGRAM_PAYLOAD, TransportConfig};
pub use error::{ProtocolViolation, TransportError};
pub use event::{ControlEvent, EventChannel, EventReceiver};
pub use frame::{Frame, PixelFormat};
pub use header::{ChunkHeader, LengthPrefix, PREFIX_SIZE, WireEndian};
pub use service::{EventForwarder, FrameConsumer, FrameProducer, FrameStats};
pub use source::{FrameSink, FrameSource, InputSource};
pub use state::ConnectionPhase;
pub use supervisor::{ConnectionSupervisor, RetryPolicy, SetupStep, SupervisorPhase};
pub use transport::{
    ChunkOutcome, ChunkedFrameReceiver, ChunkedFrameSender, ReassemblyState,
    ReliableFrameChannel,
};
