//! Viewer-side frame loop.
//!
//! Receives frames from a producer and hands them to a [`FrameSink`].
//! Frame statistics are published through a `tokio::sync::watch`
//! channel so a UI can read them without touching the receive loop.
//!
//! In reliable mode the listener is kept for the lifetime of the
//! consumer and one producer is served at a time; when its connection
//! fails the consumer waits one retry interval and accepts again. In
//! chunked mode a bad datagram or a missed deadline only costs the
//! current frame.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::service::{pause, wait_for_stop};
use crate::source::FrameSink;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::{ChunkedFrameReceiver, ReliableFrameChannel};

const FPS_WINDOW: usize = 60;

// ── FrameStats ───────────────────────────────────────────────────

/// Receive-side statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Smoothed frames per second over the last 60 frames.
    pub fps: f64,
    /// Frames handed to the sink.
    pub total_frames: u64,
    /// Payload bytes of those frames.
    pub total_bytes: u64,
    /// Frames lost to protocol violations, deadlines or broken
    /// connections.
    pub dropped_frames: u64,
    /// Producer connections accepted (reliable mode).
    pub connections: u64,
}

struct StatsTracker {
    stats: FrameStats,
    intervals: VecDeque<Duration>,
    last_frame: Option<Instant>,
    tx: watch::Sender<FrameStats>,
}

impl StatsTracker {
    fn new(tx: watch::Sender<FrameStats>) -> Self {
        Self {
            stats: FrameStats::default(),
            intervals: VecDeque::with_capacity(FPS_WINDOW + 1),
            last_frame: None,
            tx,
        }
    }

    fn frame(&mut self, len: usize) {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            self.intervals.push_back(now.duration_since(last));
            if self.intervals.len() > FPS_WINDOW {
                self.intervals.pop_front();
            }
        }
        let total: f64 = self.intervals.iter().map(Duration::as_secs_f64).sum();
        self.stats.fps = if total > 0.0 {
            self.intervals.len() as f64 / total
        } else {
            0.0
        };
        self.stats.total_frames += 1;
        self.stats.total_bytes += len as u64;
        self.publish();
    }

    fn dropped(&mut self) {
        self.stats.dropped_frames += 1;
        self.publish();
    }

    fn connection(&mut self) {
        self.stats.connections += 1;
        self.publish();
    }

    fn publish(&self) {
        let _ = self.tx.send(self.stats.clone());
    }
}

// ── FrameConsumer ────────────────────────────────────────────────

enum Endpoint {
    Reliable(TcpListener),
    Chunked(ChunkedFrameReceiver),
}

/// Viewer-side service. Spawn [`run`](Self::run) on the runtime.
pub struct FrameConsumer<K> {
    sink: K,
    config: TransportConfig,
    endpoint: Endpoint,
    supervisor: ConnectionSupervisor,
    running: Arc<AtomicBool>,
    tracker: StatsTracker,
    stats_rx: watch::Receiver<FrameStats>,
}

impl<K: FrameSink> FrameConsumer<K> {
    /// Listen for a producer's TCP connection on `addr`.
    ///
    /// The listener is set up here, with retries, so the bound address
    /// is known before [`run`](Self::run).
    pub async fn reliable(
        sink: K,
        config: TransportConfig,
        addr: SocketAddr,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let mut supervisor = ConnectionSupervisor::new(config.retry_policy());
        let listener = supervisor.bind_listener(addr).await?;
        info!("waiting for frame producer on {}", listener.local_addr()?);
        Ok(Self::with_endpoint(sink, config, Endpoint::Reliable(listener), supervisor))
    }

    /// Receive chunk datagrams on `addr`.
    pub async fn chunked(
        sink: K,
        config: TransportConfig,
        addr: SocketAddr,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let mut supervisor = ConnectionSupervisor::new(config.retry_policy());
        let receiver = ChunkedFrameReceiver::bind(&config, addr, &mut supervisor).await?;
        info!("receiving chunked frames on {}", receiver.local_addr()?);
        Ok(Self::with_endpoint(sink, config, Endpoint::Chunked(receiver), supervisor))
    }

    fn with_endpoint(
        sink: K,
        config: TransportConfig,
        endpoint: Endpoint,
        supervisor: ConnectionSupervisor,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
        Self {
            sink,
            config,
            endpoint,
            supervisor,
            running: Arc::new(AtomicBool::new(false)),
            tracker: StatsTracker::new(stats_tx),
            stats_rx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        match &self.endpoint {
            Endpoint::Reliable(listener) => Ok(listener.local_addr()?),
            Endpoint::Chunked(receiver) => receiver.local_addr(),
        }
    }

    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_rx.clone()
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

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run until stopped or until accept retries are exhausted.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        self.running.store(true, Ordering::SeqCst);
        let result = match self.endpoint {
            Endpoint::Reliable(_) => self.run_reliable().await,
            Endpoint::Chunked(_) => self.run_chunked().await,
        };
        self.running.store(false, Ordering::SeqCst);
        info!(
            "frame consumer stopped: {} frames, {} dropped",
            self.tracker.stats.total_frames, self.tracker.stats.dropped_frames
        );
        result
    }

    async fn run_reliable(&mut self) -> Result<(), TransportError> {
        let running = Arc::clone(&self.running);
        let Endpoint::Reliable(listener) = &self.endpoint else {
            return Err(TransportError::InvalidState("consumer is not in reliable mode"));
        };

        while running.load(Ordering::SeqCst) {
            let accepted = tokio::select! {
                result = ReliableFrameChannel::accept(
                    &self.config,
                    listener,
                    &mut self.supervisor,
                ) => result,
                _ = wait_for_stop(&running) => break,
            };
            let (mut channel, peer) = accepted?;
            self.tracker.connection();

            loop {
                let received = tokio::select! {
                    result = channel.receive() => result,
                    _ = wait_for_stop(&running) => return Ok(()),
                };
                match received {
                    Ok(frame) => deliver(&mut self.sink, &mut self.tracker, &frame),
                    Err(e) => {
                        warn!("frame connection from {peer} closed: {e}");
                        if !matches!(e, TransportError::ConnectionClosed) {
                            self.tracker.dropped();
                        }
                        break;
                    }
                }
            }

            self.supervisor.mark_lost();
            drop(channel);
            if !pause(self.config.retry_interval, &running).await {
                break;
            }
        }
        Ok(())
    }

    async fn run_chunked(&mut self) -> Result<(), TransportError> {
        let running = Arc::clone(&self.running);
        let Endpoint::Chunked(receiver) = &mut self.endpoint else {
            return Err(TransportError::InvalidState("consumer is not in chunked mode"));
        };

        while running.load(Ordering::SeqCst) {
            let received = tokio::select! {
                result = receiver.receive_frame() => result,
                _ = wait_for_stop(&running) => break,
            };
            match received {
                Ok(frame) => deliver(&mut self.sink, &mut self.tracker, &frame),
                // Already logged by the receiver.
                Err(TransportError::Protocol(_) | TransportError::ReassemblyTimeout { .. }) => {
                    self.tracker.dropped();
                }
                Err(e) => {
                    warn!("chunked receive failed: {e}");
                    if !pause(self.config.retry_interval, &running).await {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn deliver<K: FrameSink>(sink: &mut K, tracker: &mut StatsTracker, frame: &Frame) {
    tracker.frame(frame.len());
    debug!("frame #{} received", tracker.stats.total_frames);
    if let Err(e) = sink.render(frame) {
        warn!("frame sink failed: {e}");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    use crate::frame::PixelFormat;
    use crate::header::ChunkHeader;
    use crate::transport::ChunkedFrameSender;

    struct ChannelSink(mpsc::UnboundedSender<Frame>);

    impl FrameSink for ChannelSink {
        fn render(&mut self, frame: &Frame) -> Result<(), TransportError> {
            self.0
                .send(frame.clone())
                .map_err(|_| TransportError::Other("sink closed".into()))
        }
    }

    fn config(size: u32, chunk_size: usize) -> TransportConfig {
        TransportConfig {
            frame_width: size,
            frame_height: 1,
            pixel_format: PixelFormat::Gray8,
            chunk_size,
            retry_interval: Duration::from_millis(50),
            reassembly_deadline: Some(Duration::from_millis(200)),
            ..Default::default()
        }
    }

    fn frame(size: usize, fill: u8) -> Frame {
        Frame::new(vec![fill; size], size).unwrap()
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no frame rendered")
            .expect("sink dropped")
    }

    #[test]
    fn fps_follows_frame_spacing() {
        let (tx, rx) = watch::channel(FrameStats::default());
        let mut tracker = StatsTracker::new(tx);
        tracker.frame(10);
        assert_eq!(rx.borrow().fps, 0.0);
        assert_eq!(rx.borrow().total_frames, 1);

        std::thread::sleep(Duration::from_millis(20));
        tracker.frame(10);
        let stats = rx.borrow().clone();
        assert_eq!(stats.total_bytes, 20);
        assert!(stats.fps > 0.0 && stats.fps <= 50.0);
    }

    #[tokio::test]
    async fn reliable_consumer_renders_and_reaccepts() {
        let cfg = config(64, 16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut consumer = FrameConsumer::reliable(ChannelSink(tx), cfg.clone(), addr)
            .await
            .unwrap();
        let addr = consumer.local_addr().unwrap();
        let mut stats = consumer.stats_receiver();
        let stop = consumer.stop_handle();
        let task = tokio::spawn(async move { consumer.run().await });

        let mut supervisor = ConnectionSupervisor::new(cfg.retry_policy());
        let mut first = ReliableFrameChannel::connect(&cfg, addr, &mut supervisor)
            .await
            .unwrap();
        first.send(&frame(64, 1)).await.unwrap();
        assert_eq!(recv(&mut rx).await, frame(64, 1));
        first.close().await.unwrap();
        drop(first);

        let mut second = ReliableFrameChannel::connect(&cfg, addr, &mut supervisor)
            .await
            .unwrap();
        second.send(&frame(64, 2)).await.unwrap();
        assert_eq!(recv(&mut rx).await, frame(64, 2));

        stats
            .wait_for(|s| s.total_frames == 2 && s.connections == 2)
            .await
            .unwrap();

        stop.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("consumer did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn chunked_consumer_survives_bad_datagrams() {
        let cfg = config(48, 16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut consumer = FrameConsumer::chunked(ChannelSink(tx), cfg.clone(), addr)
            .await
            .unwrap();
        let addr = consumer.local_addr().unwrap();
        let mut stats = consumer.stats_receiver();
        let stop = consumer.stop_handle();
        let task = tokio::spawn(async move { consumer.run().await });

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bad = ChunkHeader { chunk_index: 3 }.encode_datagram(&[0; 16], cfg.endian);
        raw.send_to(&bad, addr).await.unwrap();
        stats.wait_for(|s| s.dropped_frames == 1).await.unwrap();

        let sender = ChunkedFrameSender::new(raw, addr, &cfg);
        sender.send_frame(&frame(48, 9)).await.unwrap();
        assert_eq!(recv(&mut rx).await, frame(48, 9));

        stop.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("consumer did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn idle_chunked_consumer_drops_nothing() {
        let cfg = TransportConfig {
            reassembly_deadline: Some(Duration::from_millis(100)),
            ..config(48, 16)
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut consumer = FrameConsumer::chunked(ChannelSink(tx), cfg.clone(), addr)
            .await
            .unwrap();
        let addr = consumer.local_addr().unwrap();
        let stats = consumer.stats_receiver();
        let stop = consumer.stop_handle();
        let task = tokio::spawn(async move { consumer.run().await });

        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(stats.borrow().dropped_frames, 0);

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = ChunkedFrameSender::new(raw, addr, &cfg);
        sender.send_frame(&frame(48, 4)).await.unwrap();
        assert_eq!(recv(&mut rx).await, frame(48, 4));
        assert_eq!(stats.borrow().dropped_frames, 0);

        stop.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("consumer did not stop")
            .unwrap()
            .unwrap();
    }
}
