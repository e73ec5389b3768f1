//! # framelink-sender
//!
//! Producer side of a frame link. Streams frames from a synthetic
//! test-pattern source to a viewer, either over one TCP connection or
//! as chunk datagrams, and logs the control events the viewer sends
//! back.
//!
//! The connection to the viewer is supervised: refused connects are
//! retried at a fixed interval and a broken connection is re-established
//! without restarting the process.

pub mod config;
pub mod events;
pub mod pattern;
