//! Fire-and-forget control events.
//!
//! Input events (controller axes, buttons) travel as one UDP datagram
//! each, in plain text, with no sequence numbers and no
//! acknowledgment. Loss is tolerated: every sample is superseded by the
//! next one.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use futures::StreamExt;
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;
use tokio_util::udp::UdpFramed;

use crate::codec::EventCodec;
use crate::config::MAX_DATAGRAM_PAYLOAD;
use crate::error::TransportError;
use crate::supervisor::{ConnectionSupervisor, SetupStep};

// ── ControlEvent ─────────────────────────────────────────────────

/// A single input sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// `"Axis <n> value: <v>"`
    Axis { axis: u8, value: i16 },
    /// `"Button <n> pressed"`
    ButtonPressed(u8),
    /// `"Button <n> released"`
    ButtonReleased(u8),
    /// Any other text.
    Other(String),
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axis { axis, value } => write!(f, "Axis {axis} value: {value}"),
            Self::ButtonPressed(n) => write!(f, "Button {n} pressed"),
            Self::ButtonReleased(n) => write!(f, "Button {n} released"),
            Self::Other(text) => f.write_str(text),
        }
    }
}

impl ControlEvent {
    /// Parse the text form. Unrecognised text becomes [`ControlEvent::Other`].
    pub fn parse(text: &str) -> Self {
        Self::parse_known(text).unwrap_or_else(|| Self::Other(text.to_string()))
    }

    fn parse_known(text: &str) -> Option<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        match words.as_slice() {
            ["Axis", axis, "value:", value] => Some(Self::Axis {
                axis: axis.parse().ok()?,
                value: value.parse().ok()?,
            }),
            ["Button", n, "pressed"] => Some(Self::ButtonPressed(n.parse().ok()?)),
            ["Button", n, "released"] => Some(Self::ButtonReleased(n.parse().ok()?)),
            _ => None,
        }
    }
}

impl FromStr for ControlEvent {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

// ── EventChannel ─────────────────────────────────────────────────

/// Sending side: one best-effort datagram per event.
pub struct EventChannel {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    events_sent: AtomicU64,
}

impl EventChannel {
    /// Wrap an already-bound socket targeting `remote_addr`.
    pub fn new(socket: UdpSocket, remote_addr: SocketAddr) -> Self {
        Self {
            socket,
            remote_addr,
            events_sent: AtomicU64::new(0),
        }
    }

    /// Bind `local` (retrying through `supervisor`) and target `remote_addr`.
    pub async fn bind(
        local: SocketAddr,
        remote_addr: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<Self, TransportError> {
        let socket = supervisor
            .establish(SetupStep::Bind, move || async move {
                UdpSocket::bind(local)
                    .await
                    .map_err(|e| SetupStep::Bind.fail(e))
            })
            .await?;
        supervisor.mark_active();
        Ok(Self::new(socket, remote_addr))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// Send raw event bytes as one datagram. Nothing is retried.
    pub async fn send(&self, event: &[u8]) -> Result<(), TransportError> {
        if event.len() > MAX_DATAGRAM_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                size: event.len(),
                max: MAX_DATAGRAM_PAYLOAD,
            });
        }
        let n = self.socket.send_to(event, self.remote_addr).await?;
        if n != event.len() {
            return Err(TransportError::PartialIo {
                op: "event send",
                expected: event.len(),
                actual: n,
            });
        }
        self.events_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send a typed event in its text form.
    pub async fn send_event(&self, event: &ControlEvent) -> Result<(), TransportError> {
        let mut buf = BytesMut::new();
        EventCodec.encode(event.clone(), &mut buf)?;
        self.send(&buf).await
    }
}

// ── EventReceiver ────────────────────────────────────────────────

/// Receiving side for the process that consumes control events.
pub struct EventReceiver {
    framed: UdpFramed<EventCodec>,
}

impl EventReceiver {
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            framed: UdpFramed::new(socket, EventCodec),
        }
    }

    /// Bind `addr`, retrying through `supervisor`.
    pub async fn bind(
        addr: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<Self, TransportError> {
        let socket = supervisor
            .establish(SetupStep::Bind, move || async move {
                UdpSocket::bind(addr)
                    .await
                    .map_err(|e| SetupStep::Bind.fail(e))
            })
            .await?;
        supervisor.mark_active();
        Ok(Self::new(socket))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.framed.get_ref().local_addr()?)
    }

    /// Wait for the next event and its sender.
    pub async fn next_event(
        &mut self,
    ) -> Option<Result<(ControlEvent, SocketAddr), TransportError>> {
        self.framed.next().await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn text_forms() {
        let cases = [
            (ControlEvent::Axis { axis: 0, value: 1234 }, "Axis 0 value: 1234"),
            (ControlEvent::ButtonPressed(5), "Button 5 pressed"),
            (ControlEvent::ButtonReleased(5), "Button 5 released"),
        ];
        for (event, text) in cases {
            assert_eq!(event.to_string(), text);
            assert_eq!(ControlEvent::parse(text), event);
            assert_eq!(text.parse::<ControlEvent>(), Ok(event));
        }
    }

    #[test]
    fn unknown_text_is_opaque() {
        assert_eq!(
            ControlEvent::parse("Hat 1 up"),
            ControlEvent::Other("Hat 1 up".into())
        );
        // Out-of-range numbers do not parse as a known shape.
        assert!(matches!(
            ControlEvent::parse("Axis 0 value: 99999"),
            ControlEvent::Other(_)
        ));
    }

    #[tokio::test]
    async fn events_cross_loopback() {
        let receiver_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver_sock.local_addr().unwrap();
        let mut receiver = EventReceiver::new(receiver_sock);

        let sender_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = EventChannel::new(sender_sock, receiver_addr);

        channel
            .send_event(&ControlEvent::Axis { axis: 2, value: -5 })
            .await
            .unwrap();
        channel.send(b"Button 1 released").await.unwrap();
        assert_eq!(channel.events_sent(), 2);

        let (first, _) = tokio::time::timeout(Duration::from_secs(5), receiver.next_event())
            .await
            .expect("timeout")
            .expect("stream ended")
            .unwrap();
        assert_eq!(first, ControlEvent::Axis { axis: 2, value: -5 });

        let (second, _) = tokio::time::timeout(Duration::from_secs(5), receiver.next_event())
            .await
            .expect("timeout")
            .expect("stream ended")
            .unwrap();
        assert_eq!(second, ControlEvent::ButtonReleased(1));
    }

    #[tokio::test]
    async fn oversized_events_are_rejected() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let channel = EventChannel::new(sock, addr);

        let err = channel.send(&vec![b'x'; MAX_DATAGRAM_PAYLOAD + 1]).await.unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
        assert_eq!(channel.events_sent(), 0);
    }
}
