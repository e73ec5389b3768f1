//! Input forwarding loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::event::EventChannel;
use crate::service::wait_for_stop;
use crate::source::InputSource;

/// Polls an [`InputSource`] and sends each event as one datagram.
///
/// Send failures are logged and counted; the loop keeps going. It ends
/// when stopped or when the source reports that it is gone.
pub struct EventForwarder<I> {
    input: I,
    channel: EventChannel,
    running: Arc<AtomicBool>,
    forwarded: u64,
    failed: u64,
}

impl<I: InputSource> EventForwarder<I> {
    pub fn new(input: I, channel: EventChannel) -> Self {
        Self {
            input,
            channel,
            running: Arc::new(AtomicBool::new(false)),
            forwarded: 0,
            failed: 0,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub async fn run(&mut self) -> Result<(), TransportError> {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        info!("forwarding input events to {}", self.channel.remote_addr());

        while running.load(Ordering::SeqCst) {
            let polled = tokio::select! {
                polled = self.input.poll() => polled,
                _ = wait_for_stop(&running) => break,
            };
            let Some(events) = polled else {
                info!("input source closed");
                break;
            };

            for event in &events {
                match self.channel.send_event(event).await {
                    Ok(()) => {
                        self.forwarded += 1;
                        debug!("forwarded {event}");
                    }
                    Err(e) => {
                        self.failed += 1;
                        warn!("failed to forward {event}: {e}");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::UdpSocket;

    use crate::event::{ControlEvent, EventReceiver};

    struct ScriptedInput(VecDeque<Vec<ControlEvent>>);

    #[async_trait]
    impl InputSource for ScriptedInput {
        async fn poll(&mut self) -> Option<Vec<ControlEvent>> {
            self.0.pop_front()
        }
    }

    #[tokio::test]
    async fn forwards_until_source_closes() {
        let rx_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rx_addr = rx_sock.local_addr().unwrap();
        let mut receiver = EventReceiver::new(rx_sock);

        let tx_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let script = VecDeque::from(vec![
            vec![ControlEvent::ButtonPressed(0), ControlEvent::Axis { axis: 1, value: 300 }],
            vec![],
            vec![ControlEvent::ButtonReleased(0)],
        ]);
        let channel = EventChannel::new(tx_sock, rx_addr);
        let mut forwarder = EventForwarder::new(ScriptedInput(script), channel);

        forwarder.run().await.unwrap();
        assert_eq!(forwarder.forwarded(), 3);
        assert_eq!(forwarder.failed(), 0);
        assert!(!forwarder.is_running());

        let mut got = Vec::new();
        for _ in 0..3 {
            let (event, _) = tokio::time::timeout(Duration::from_secs(5), receiver.next_event())
                .await
                .expect("timeout")
                .expect("stream ended")
                .unwrap();
            got.push(event);
        }
        assert_eq!(
            got,
            vec![
                ControlEvent::ButtonPressed(0),
                ControlEvent::Axis { axis: 1, value: 300 },
                ControlEvent::ButtonReleased(0),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_events_are_counted_not_fatal() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let huge = ControlEvent::Other("x".repeat(70_000));
        let script = VecDeque::from(vec![vec![huge, ControlEvent::ButtonPressed(2)]]);
        let channel = EventChannel::new(sock, addr);
        let mut forwarder = EventForwarder::new(ScriptedInput(script), channel);

        forwarder.run().await.unwrap();
        assert_eq!(forwarder.failed(), 1);
        assert_eq!(forwarder.forwarded(), 1);
    }
}
