//! Long-running loops built on the transport channels.
//!
//! | Service            | Side     | Loop                                      |
//! |--------------------|----------|-------------------------------------------|
//! | [`FrameProducer`]  | sender   | acquire → send, reconnect on failure      |
//! | [`FrameConsumer`]  | viewer   | accept/receive → render, publish stats    |
//! | [`EventForwarder`] | viewer   | poll input → send one datagram per event  |
//!
//! Each service is meant to be spawned as its own Tokio task and owns
//! its sockets. All of them expose a `stop_handle()`; storing `false`
//! into it ends the loop at the next await point.

pub mod consumer;
pub mod forwarder;
pub mod producer;

pub use consumer::{FrameConsumer, FrameStats};
pub use forwarder::EventForwarder;
pub use producer::FrameProducer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves once `running` becomes false.
pub(crate) async fn wait_for_stop(running: &Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
}

/// Sleep for `delay` unless stopped first. Returns `false` if stopped.
pub(crate) async fn pause(delay: Duration, running: &Arc<AtomicBool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => running.load(Ordering::SeqCst),
        _ = wait_for_stop(running) => false,
    }
}
