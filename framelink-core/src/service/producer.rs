//! Sender-side frame loop.
//!
//! Pulls frames from a [`FrameSource`] and pushes every `send_every`-th
//! one to the viewer, either over a [`ReliableFrameChannel`] or as
//! chunk datagrams through a [`ChunkedFrameSender`].
//!
//! In reliable mode a broken connection is dropped, the loop waits one
//! retry interval and connects again; the source keeps its state across
//! reconnects. Chunked mode has no connection to lose.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::service::{pause, wait_for_stop};
use crate::source::FrameSource;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::{ChunkedFrameSender, ReliableFrameChannel};

#[derive(Debug, Clone, Copy)]
enum Target {
    Reliable { remote: SocketAddr },
    Chunked { local: SocketAddr, remote: SocketAddr },
}

/// Sender-side service. Spawn [`run`](Self::run) on the runtime.
pub struct FrameProducer<S> {
    source: S,
    config: TransportConfig,
    target: Target,
    send_every: u64,
    running: Arc<AtomicBool>,
    frames_acquired: u64,
    frames_sent: u64,
    connections: u64,
}

impl<S: FrameSource> FrameProducer<S> {
    /// Stream frames to a viewer listening on `remote`.
    pub fn reliable(source: S, config: TransportConfig, remote: SocketAddr) -> Self {
        Self::with_target(source, config, Target::Reliable { remote })
    }

    /// Send chunk datagrams from `local` to `remote`.
    pub fn chunked(
        source: S,
        config: TransportConfig,
        local: SocketAddr,
        remote: SocketAddr,
    ) -> Self {
        Self::with_target(source, config, Target::Chunked { local, remote })
    }

    fn with_target(source: S, config: TransportConfig, target: Target) -> Self {
        Self {
            source,
            config,
            target,
            send_every: 1,
            running: Arc::new(AtomicBool::new(false)),
            frames_acquired: 0,
            frames_sent: 0,
            connections: 0,
        }
    }

    /// Send only one of every `n` acquired frames. `0` is treated as `1`.
    pub fn with_send_every(mut self, n: u32) -> Self {
        self.send_every = u64::from(n.max(1));
        self
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

    pub fn frames_acquired(&self) -> u64 {
        self.frames_acquired
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Connections established so far (reliable mode).
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Run until stopped or until connection setup is exhausted.
    ///
    /// Only [`TransportError::SetupExhausted`] and configuration errors
    /// escape; everything else is logged and retried.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        self.config.validate()?;
        self.running.store(true, Ordering::SeqCst);
        let mut supervisor = ConnectionSupervisor::new(self.config.retry_policy());

        let result = match self.target {
            Target::Reliable { remote } => self.run_reliable(remote, &mut supervisor).await,
            Target::Chunked { local, remote } => {
                self.run_chunked(local, remote, &mut supervisor).await
            }
        };

        self.running.store(false, Ordering::SeqCst);
        info!(
            "frame producer stopped: {} acquired, {} sent",
            self.frames_acquired, self.frames_sent
        );
        result
    }

    async fn run_reliable(
        &mut self,
        remote: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<(), TransportError> {
        let running = Arc::clone(&self.running);

        while running.load(Ordering::SeqCst) {
            let connected = tokio::select! {
                result = ReliableFrameChannel::connect(&self.config, remote, supervisor) => result,
                _ = wait_for_stop(&running) => break,
            };
            let mut channel = connected?;
            self.connections += 1;

            let lost = loop {
                let next = tokio::select! {
                    next = self.next_frame() => next,
                    _ = wait_for_stop(&running) => break None,
                };
                let Some(frame) = next else { continue };
                match channel.send(&frame).await {
                    Ok(()) => {
                        self.frames_sent += 1;
                        debug!("sent frame #{}", self.frames_sent);
                    }
                    Err(e) => break Some(e),
                }
            };

            match lost {
                Some(e) => {
                    warn!("frame connection to {remote} lost: {e}");
                    supervisor.mark_lost();
                    drop(channel);
                    if !pause(self.config.retry_interval, &running).await {
                        break;
                    }
                }
                None => {
                    let _ = channel.close().await;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn run_chunked(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<(), TransportError> {
        let running = Arc::clone(&self.running);
        let sender = tokio::select! {
            result = ChunkedFrameSender::bind(&self.config, local, remote, supervisor) => result?,
            _ = wait_for_stop(&running) => return Ok(()),
        };
        info!("sending chunked frames to {remote}");

        while running.load(Ordering::SeqCst) {
            let next = tokio::select! {
                next = self.next_frame() => next,
                _ = wait_for_stop(&running) => break,
            };
            let Some(frame) = next else { continue };
            match sender.send_frame(&frame).await {
                Ok(()) => self.frames_sent += 1,
                Err(e) => warn!("chunked send to {remote} failed: {e}"),
            }
        }
        Ok(())
    }

    /// Acquire one frame and apply decimation. `None` means nothing to
    /// send this round.
    async fn next_frame(&mut self) -> Option<Frame> {
        let timeout = self.config.io_timeout;
        let acquired = match tokio::time::timeout(timeout, self.source.acquire(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        let frame = match acquired {
            Ok(frame) => frame,
            Err(TransportError::Timeout(after)) => {
                debug!("no frame within {after:?}");
                return None;
            }
            Err(e) => {
                warn!("frame source failed: {e}");
                tokio::time::sleep(self.config.retry_interval).await;
                return None;
            }
        };

        if frame.len() != self.config.frame_size() {
            warn!(
                "frame source produced {} bytes, expected {}; skipping",
                frame.len(),
                self.config.frame_size()
            );
            return None;
        }

        self.frames_acquired += 1;
        if self.frames_acquired % self.send_every != 0 {
            return None;
        }
        Some(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────
