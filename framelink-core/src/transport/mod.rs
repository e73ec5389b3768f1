//! # Frame transport
//!
//! Two independent ways to move fixed-size frames between peers.
//!
//! ```text
//! PRODUCER                                     CONSUMER
//! ┌──────────────────────┐   TCP [len][F]    ┌──────────────────────────┐
//! │ ReliableFrameChannel │ ────────────────► │ ReliableFrameChannel     │
//! │   ::send             │                   │   ::receive              │
//! └──────────────────────┘                   └──────────────────────────┘
//! ┌──────────────────────┐   UDP [idx][≤C]   ┌──────────────────────────┐
//! │ ChunkedFrameSender   │ ────────────────► │ ChunkedFrameReceiver     │
//! │   ::send_frame       │   × N datagrams   │   ::receive_frame        │
//! └──────────────────────┘                   │   (ReassemblyState)      │
//!                                            └──────────────────────────┘
//! ```
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `reliable`   | Length-prefixed frames over a stream, poison on error |
//! | `chunked`    | Index-tagged chunk datagrams, completeness-only       |
//! | `reassembly` | Bitmap + buffer for one in-flight chunked frame       |

pub mod chunked;
pub mod reassembly;
pub mod reliable;

pub use chunked::{ChunkedFrameReceiver, ChunkedFrameSender};
pub use reassembly::{ChunkOutcome, ReassemblyState};
pub use reliable::ReliableFrameChannel;
