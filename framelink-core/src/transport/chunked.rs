//! Best-effort frame delivery over datagrams.
//!
//! The sender cuts each frame into `N = ceil(F / C)` chunks and sends
//! one datagram per chunk, tagged with its index. There is no frame
//! header and no end marker: the receiver infers frame boundaries from
//! bitmap completeness alone.
//!
//! Lost chunks are never re-requested. Without a reassembly deadline a
//! single lost chunk stalls the frame until the chunk shows up again
//! (e.g. as part of the next frame); with one, the incomplete frame is
//! discarded and the next call starts fresh.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::error::{ProtocolViolation, TransportError};
use crate::frame::Frame;
use crate::header::{ChunkHeader, WireEndian};
use crate::supervisor::{ConnectionSupervisor, SetupStep};
use crate::transport::reassembly::{ChunkOutcome, ReassemblyState};

/// Bind a UDP socket, retrying through `supervisor`.
async fn bind_udp(
    addr: SocketAddr,
    supervisor: &mut ConnectionSupervisor,
) -> Result<UdpSocket, TransportError> {
    let socket = supervisor
        .establish(SetupStep::Bind, move || async move {
            UdpSocket::bind(addr)
                .await
                .map_err(|e| SetupStep::Bind.fail(e))
        })
        .await?;
    supervisor.mark_active();
    Ok(socket)
}

// ── ChunkedFrameReceiver ─────────────────────────────────────────

/// Receive side: reassembles chunk datagrams into whole frames.
pub struct ChunkedFrameReceiver {
    socket: UdpSocket,
    frame_size: usize,
    chunk_size: usize,
    endian: WireEndian,
    deadline: Option<Duration>,
    frames_completed: u64,
    frames_abandoned: u64,
}

impl ChunkedFrameReceiver {
    /// Wrap an already-bound socket.
    pub fn new(socket: UdpSocket, config: &TransportConfig) -> Self {
        Self {
            socket,
            frame_size: config.frame_size(),
            chunk_size: config.chunk_size,
            endian: config.endian,
            deadline: config.reassembly_deadline,
            frames_completed: 0,
            frames_abandoned: 0,
        }
    }

    /// Bind to `addr`, retrying through `supervisor`.
    pub async fn bind(
        config: &TransportConfig,
        addr: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<Self, TransportError> {
        let socket = bind_udp(addr, supervisor).await?;
        Ok(Self::new(socket, config))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Frames dropped for a protocol violation or a missed deadline.
    pub fn frames_abandoned(&self) -> u64 {
        self.frames_abandoned
    }

    /// Collect chunks until one whole frame is present.
    ///
    /// Each call starts from a fresh [`ReassemblyState`]. A malformed
    /// datagram aborts the current frame and is returned as an error;
    /// the caller simply calls again for the next frame.
    ///
    /// The reassembly deadline runs from the first accepted chunk, so an
    /// idle link waits indefinitely without abandoning anything.
    pub async fn receive_frame(&mut self) -> Result<Frame, TransportError> {
        let mut state = ReassemblyState::new(self.frame_size, self.chunk_size);
        // One spare byte reveals payloads longer than a chunk.
        let mut buf = vec![0u8; ChunkHeader::SIZE + self.chunk_size + 1];

        let collected = match self.next_chunk(&mut state, &mut buf).await {
            Ok(ChunkOutcome::Complete) => Ok(()),
            Ok(_) => match self.deadline {
                Some(deadline) => {
                    let outcome =
                        tokio::time::timeout(deadline, self.collect(&mut state, &mut buf)).await;
                    match outcome {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::ReassemblyTimeout {
                            received: state.received_chunks(),
                            expected: state.chunk_count(),
                            after: deadline,
                        }),
                    }
                }
                None => self.collect(&mut state, &mut buf).await,
            },
            Err(e) => Err(e),
        };

        if let Err(e) = collected {
            if matches!(
                e,
                TransportError::Protocol(_) | TransportError::ReassemblyTimeout { .. }
            ) {
                self.frames_abandoned += 1;
                warn!(
                    "abandoning frame with {} of {} chunks: {e}",
                    state.received_chunks(),
                    state.chunk_count()
                );
            }
            return Err(e);
        }

        match state.into_frame() {
            Ok(frame) => {
                self.frames_completed += 1;
                debug!("reassembled frame #{}", self.frames_completed);
                Ok(frame)
            }
            Err(e) => {
                self.frames_abandoned += 1;
                warn!("abandoning frame: {e}");
                Err(e)
            }
        }
    }

    async fn collect(
        &self,
        state: &mut ReassemblyState,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        while self.next_chunk(state, buf).await? != ChunkOutcome::Complete {}
        Ok(())
    }

    async fn next_chunk(
        &self,
        state: &mut ReassemblyState,
        buf: &mut [u8],
    ) -> Result<ChunkOutcome, TransportError> {
        let (len, from) = self.socket.recv_from(buf).await?;
        let outcome = state.accept_datagram(&buf[..len], self.endian)?;
        match outcome {
            ChunkOutcome::Complete => {}
            ChunkOutcome::Stored => trace!(
                "chunk from {from}: {} of {}",
                state.received_chunks(),
                state.chunk_count()
            ),
            ChunkOutcome::Duplicate => trace!("duplicate chunk from {from}"),
        }
        Ok(outcome)
    }
}

// ── ChunkedFrameSender ───────────────────────────────────────────

/// Send side: one datagram per chunk, in index order.
pub struct ChunkedFrameSender {
    socket: UdpSocket,
    remote_addr: SocketAddr,
    frame_size: usize,
    chunk_size: usize,
    endian: WireEndian,
    /// Total datagram bytes sent since construction.
    bytes_sent: AtomicU64,
}

impl ChunkedFrameSender {
    /// Wrap an already-bound socket targeting `remote_addr`.
    pub fn new(socket: UdpSocket, remote_addr: SocketAddr, config: &TransportConfig) -> Self {
        Self {
            socket,
            remote_addr,
            frame_size: config.frame_size(),
            chunk_size: config.chunk_size,
            endian: config.endian,
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Bind `local` (retrying through `supervisor`) and target `remote_addr`.
    pub async fn bind(
        config: &TransportConfig,
        local: SocketAddr,
        remote_addr: SocketAddr,
        supervisor: &mut ConnectionSupervisor,
    ) -> Result<Self, TransportError> {
        let socket = bind_udp(local, supervisor).await?;
        Ok(Self::new(socket, remote_addr, config))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Send every chunk of `frame`.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        if frame.len() != self.frame_size {
            return Err(ProtocolViolation::LengthMismatch {
                expected: self.frame_size,
                actual: frame.len() as i64,
            }
            .into());
        }

        let mut sent_total = 0u64;
        for (idx, piece) in frame.as_bytes().chunks(self.chunk_size).enumerate() {
            let dgram = ChunkHeader {
                chunk_index: idx as i32,
            }
            .encode_datagram(piece, self.endian);

            let n = self.socket.send_to(&dgram, self.remote_addr).await?;
            if n != dgram.len() {
                return Err(TransportError::PartialIo {
                    op: "chunk send",
                    expected: dgram.len(),
                    actual: n,
                });
            }
            sent_total += n as u64;
        }

        self.bytes_sent.fetch_add(sent_total, Ordering::Relaxed);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
