//! Reliable, ordered frame delivery over a byte stream.
//!
//! Each frame travels as `[length:i32][payload]`. The length is always
//! the agreed frame size; anything else ends the connection. There is
//! no resynchronization: one bad prefix, short write or truncated
//! payload poisons the channel, and the owner reconnects.
//!
//! The channel is generic over the stream so tests can drive it with
//! in-memory I/O. Production code uses [`ReliableFrameChannel::connect`]
//! and [`ReliableFrameChannel::accept`] over TCP.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{ProtocolViolation, TransportError};
use crate::frame::Frame;
use crate::header::{LengthPrefix, PREFIX_SIZE, WireEndian};
use crate::state::ConnectionPhase;
use crate::supervisor::ConnectionSupervisor;

// ── ReliableFrameChannel ─────────────────────────────────────────

/// One data-plane connection carrying fixed-size frames.
pub struct ReliableFrameChannel<S> {
    stream: S,
    frame_size: usize,
    io_chunk_size: usize,
    endian: WireEndian,
    phase: ConnectionPhase,
    frames_sent: u64,
    frames_received: u64,
}

impl<S> ReliableFrameChannel<S> {
    /// Wrap an already-established stream.
    pub fn from_stream(stream: S, config: &TransportConfig) -> Self {
        Self::with_phase(
            stream,
            config,
            ConnectionPhase::Connected {
                since: std::time::Instant::now(),
            },
        )
    }

    fn with_phase(stream: S, config: &TransportConfig, phase: ConnectionPhase) -> Self {
        Self {
            stream,
            frame_size: config.frame_size(),
            io_chunk_size: config.io_chunk_size,
            endian: config.endian,
            phase,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    /// Agreed frame size `F`.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.phase.is_established() {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }

    /// Poison the channel and hand the error back.
    fn fail(&mut self, err: TransportError) -> TransportError {
        debug!("closing {} channel: {err}", self.phase);
        self.phase.force_disconnect();
        err
    }
}

impl<S: AsyncWrite + Unpin> ReliableFrameChannel<S> {
    /// Write one frame: the length prefix, then the payload in bounded
    /// writes. Any failure closes the channel.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.ensure_open()?;
        if frame.len() != self.frame_size {
            return Err(ProtocolViolation::LengthMismatch {
                expected: self.frame_size,
                actual: frame.len() as i64,
            }
            .into());
        }

        match self.write_frame(frame).await {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let prefix = LengthPrefix::for_len(frame.len())?.encode(self.endian);

        // The prefix goes out in a single write; splitting it is fatal.
        let n = self.stream.write(&prefix).await?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        if n != PREFIX_SIZE {
            return Err(TransportError::PartialIo {
                op: "length prefix write",
                expected: PREFIX_SIZE,
                actual: n,
            });
        }

        let payload = frame.as_bytes();
        let mut written = 0;
        while written < payload.len() {
            let end = (written + self.io_chunk_size).min(payload.len());
            let n = self.stream.write(&payload[written..end]).await?;
            if n == 0 {
                return Err(TransportError::PartialIo {
                    op: "payload write",
                    expected: payload.len(),
                    actual: written,
                });
            }
            written += n;
        }

        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half and mark the channel closed.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.phase.force_disconnect();
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> ReliableFrameChannel<S> {
    /// Read one frame. Returns only whole frames of the agreed size.
    ///
    /// A length prefix other than `F` closes the channel without
    /// reading any payload byte.
    pub async fn receive(&mut self) -> Result<Frame, TransportError> {
        self.ensure_open()?;
        match self.read_frame().await {
            Ok(frame) => {
                self.frames_received += 1;
                Ok(frame)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let mut prefix = [0u8; PREFIX_SIZE];
        match self.stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransportError::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        }

        let len = LengthPrefix::decode(prefix, self.endian).validate(self.frame_size)?;

        let mut data = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let end = (filled + self.io_chunk_size).min(len);
            let n = self.stream.read(&mut data[filled..end]).await?;
            if n == 0 {
                return Err(TransportError::PartialIo {
                    op: "payload read",
                    expected: len,
                    actual: filled,
                });
            }
            filled += n;
        }

        Frame::new(data, len)
    }
}

// ── TCP constructors ─────────────────────────────────────────────

/// A socket that refuses `TCP_NODELAY` still carries frames, only slower.
fn nodelay_applied(result: std::io::Result<()>, peer: SocketAddr) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("could not set TCP_NODELAY for {peer}: {e}");
            false
        }
    }
}

impl ReliableFrameChannel<TcpStream> {
    /// Connect to `addr`, retrying through `supervisor` until it succeeds
    /// or the policy gives up.
    pub async fn connect(
        config: &TransportConfig,
        addr: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<Self, TransportError> {
        let mut phase = ConnectionPhase::default();
        phase.begin_connect()?;

        let stream = supervisor.connect(addr).await?;
        nodelay_applied(stream.set_nodelay(true), addr);
        phase.complete_connect()?;

        info!("connected to {addr}");
        Ok(Self::with_phase(stream, config, phase))
    }

    /// Accept one peer on `listener`, retrying through `supervisor`.
    pub async fn accept(
        config: &TransportConfig,
        listener: &TcpListener,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<(Self, SocketAddr), TransportError> {
        let mut phase = ConnectionPhase::default();
        phase.begin_listen()?;

        let (stream, peer) = supervisor.accept(listener).await?;
        nodelay_applied(stream.set_nodelay(true), peer);
        phase.complete_accept()?;

        info!("accepted frame connection from {peer}");
        Ok((Self::with_phase(stream, config, phase), peer))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.stream.peer_addr()?)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use crate::frame::PixelFormat;

    fn config(frame_size: u32) -> TransportConfig {
        TransportConfig {
            frame_width: frame_size,
            frame_height: 1,
            pixel_format: PixelFormat::Gray8,
            ..Default::default()
        }
    }

    fn patterned(size: usize, seed: u8) -> Frame {
        let data = (0..size).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect();
        Frame::new(data, size).unwrap()
    }

    fn wire(prefix: i32, payload: &[u8]) -> Vec<u8> {
        let mut out = prefix.to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    /// Writer that accepts at most `max_per_write` bytes per call and
    /// records the size of every request.
    struct RecordingWriter {
        max_per_write: usize,
        requests: Vec<usize>,
        data: Vec<u8>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.requests.push(buf.len());
            let n = buf.len().min(this.max_per_write);
            this.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_frames() {
        let cfg = TransportConfig {
            io_chunk_size: 64,
            ..config(1000)
        };
        let (a, b) = tokio::io::duplex(8192);
        let mut tx = ReliableFrameChannel::from_stream(a, &cfg);
        let mut rx = ReliableFrameChannel::from_stream(b, &cfg);

        let frames: Vec<Frame> = (0..3).map(|seed| patterned(1000, seed)).collect();
        let outbound = frames.clone();
        let sender = tokio::spawn(async move {
            for frame in &outbound {
                tx.send(frame).await.unwrap();
            }
            tx.frames_sent()
        });

        for expected in &frames {
            let got = rx.receive().await.unwrap();
            assert_eq!(&got, expected);
        }
        assert_eq!(sender.await.unwrap(), 3);
        assert_eq!(rx.frames_received(), 3);
    }

    #[tokio::test]
    async fn receives_exact_frame_and_stops_at_next_prefix() {
        let cfg = config(100);
        let payload: Vec<u8> = (0..100u8).collect();
        let mut bytes = wire(100, &payload);
        bytes.extend_from_slice(&100i32.to_be_bytes());

        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(bytes), &cfg);
        let frame = rx.receive().await.unwrap();

        assert_eq!(frame.len(), 100);
        assert_eq!(frame.as_bytes(), &payload[..]);
        assert_eq!(rx.get_ref().position(), 104);
        assert!(rx.phase().is_established());
    }

    #[tokio::test]
    async fn length_mismatch_closes_without_reading_payload() {
        let cfg = config(100);
        let bytes = wire(99, &[0xEE; 99]);

        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(bytes), &cfg);
        let err = rx.receive().await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolViolation::LengthMismatch {
                expected: 100,
                actual: 99
            })
        ));
        assert!(rx.phase().is_disconnected());
        assert_eq!(rx.get_ref().position(), 4);

        // Poisoned: nothing more is read.
        assert!(matches!(
            rx.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert_eq!(rx.get_ref().position(), 4);
    }

    #[tokio::test]
    async fn eof_before_prefix_is_connection_closed() {
        let cfg = config(100);
        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(Vec::new()), &cfg);
        assert!(matches!(
            rx.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn partial_prefix_is_connection_closed() {
        let cfg = config(100);
        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(vec![0u8, 0]), &cfg);
        assert!(matches!(
            rx.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn truncated_payload_is_partial_io() {
        let cfg = config(100);
        let bytes = wire(100, &[1u8; 60]);
        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(bytes), &cfg);

        let err = rx.receive().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::PartialIo {
                expected: 100,
                actual: 60,
                ..
            }
        ));
        assert!(err.is_connection_fatal());
    }

    #[tokio::test]
    async fn little_endian_peers_interoperate() {
        let cfg = TransportConfig {
            endian: WireEndian::Little,
            ..config(8)
        };
        let mut bytes = 8i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abcdefgh");

        let mut rx = ReliableFrameChannel::from_stream(Cursor::new(bytes), &cfg);
        assert_eq!(rx.receive().await.unwrap().as_bytes(), b"abcdefgh");
    }

    #[tokio::test]
    async fn payload_writes_are_bounded_and_retried() {
        let cfg = config(10_000);
        let frame = patterned(10_000, 9);
        let writer = RecordingWriter {
            max_per_write: 1000,
            requests: Vec::new(),
            data: Vec::new(),
        };

        let mut tx = ReliableFrameChannel::from_stream(writer, &cfg);
        tx.send(&frame).await.unwrap();

        let writer = tx.into_inner();
        assert_eq!(writer.requests[0], 4);
        assert!(writer.requests[1..].iter().all(|&n| n <= 4096));
        assert_eq!(writer.data, wire(10_000, frame.as_bytes()));
    }

    #[tokio::test]
    async fn short_prefix_write_is_fatal() {
        let cfg = config(16);
        let prefix = 16i32.to_be_bytes();
        let mock = tokio_test::io::Builder::new().write(&prefix[..2]).build();

        let mut tx = ReliableFrameChannel::from_stream(mock, &cfg);
        let err = tx.send(&patterned(16, 0)).await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::PartialIo {
                op: "length prefix write",
                expected: 4,
                actual: 2
            }
        ));
        assert!(tx.phase().is_disconnected());
    }

    #[tokio::test]
    async fn write_error_closes_channel() {
        let cfg = config(16);
        let mock = tokio_test::io::Builder::new()
            .write(&16i32.to_be_bytes())
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();

        let mut tx = ReliableFrameChannel::from_stream(mock, &cfg);
        let err = tx.send(&patterned(16, 0)).await.unwrap_err();

        assert!(matches!(err, TransportError::Io(_)));
        assert!(matches!(
            tx.send(&patterned(16, 0)).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn rejects_frames_of_the_wrong_size_locally() {
        let cfg = config(16);
        let mock = tokio_test::io::Builder::new().build();
        let mut tx = ReliableFrameChannel::from_stream(mock, &cfg);

        let err = tx.send(&patterned(8, 0)).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        assert!(tx.phase().is_established());
    }

    #[test]
    fn nodelay_failure_is_logged_not_fatal() {
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(nodelay_applied(Ok(()), peer));
        assert!(!nodelay_applied(Err(io::Error::other("unsupported")), peer));
    }
}
