//! # framelink-viewer
//!
//! Consumer side of a frame link. Receives frames from
//! `framelink-sender` over TCP or as chunk datagrams, hands them to a
//! digest sink, and forwards control events typed on stdin back to the
//! sender as best-effort datagrams.

pub mod config;
pub mod input;
pub mod sink;
