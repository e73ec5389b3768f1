//! Control-event intake on the sender.
//!
//! Events arrive as best-effort datagrams from the viewer. The sender
//! has no actuators of its own, so each event is logged and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use framelink_core::{ControlEvent, EventReceiver};

pub struct EventLogger {
    receiver: EventReceiver,
    running: Arc<AtomicBool>,
    axis_events: u64,
    button_events: u64,
    other_events: u64,
}

impl EventLogger {
    pub fn new(receiver: EventReceiver) -> Self {
        Self {
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            axis_events: 0,
            button_events: 0,
            other_events: 0,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn total(&self) -> u64 {
        self.axis_events + self.button_events + self.other_events
    }

    pub fn axis_events(&self) -> u64 {
        self.axis_events
    }

    pub fn button_events(&self) -> u64 {
        self.button_events
    }

    pub fn other_events(&self) -> u64 {
        self.other_events
    }

    /// Log events until stopped or the socket fails for good.
    pub async fn run(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        while running.load(Ordering::SeqCst) {
            let next = tokio::select! {
                next = self.receiver.next_event() => next,
                _ = wait_for_stop(&running) => break,
            };
            match next {
                Some(Ok((event, from))) => self.record(&event, from),
                Some(Err(e)) => warn!("event receive failed: {e}"),
                None => {
                    warn!("event socket closed");
                    break;
                }
            }
        }

        info!("event log stopped after {} events", self.total());
    }

    fn record(&mut self, event: &ControlEvent, from: std::net::SocketAddr) {
        match event {
            ControlEvent::Axis { .. } => {
                self.axis_events += 1;
                debug!("{from}: {event}");
            }
            ControlEvent::ButtonPressed(_) | ControlEvent::ButtonReleased(_) => {
                self.button_events += 1;
                info!("{from}: {event}");
            }
            ControlEvent::Other(_) => {
                self.other_events += 1;
                info!("{from}: unrecognised event {event:?}");
            }
        }
    }
}

async fn wait_for_stop(running: &Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
