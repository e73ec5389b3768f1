//! Retry supervision for socket setup.
//!
//! Every fallible setup step (socket creation, bind, listen, accept,
//! connect) goes through [`ConnectionSupervisor::establish`], which
//! applies one fixed-interval [`RetryPolicy`]:
//!
//! 1. Run the step.
//! 2. On failure, log the cause and drop whatever the attempt created.
//! 3. Sleep `interval` and run the same step again.
//!
//! Retries are unbounded unless the policy caps them. Sleeping goes
//! through `tokio::time`, so tests drive it with a paused clock.
//!
//! ```text
//!   Idle ──► Attempting{1} ──► Attempting{2} ──► … ──► Active
//!                 │                                      │
//!                 └──► Failed (max_attempts reached)     └──► Idle (mark_lost)
//! ```

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{info, warn};

use crate::error::TransportError;

/// Backlog for frame listeners; only one peer is served at a time.
const LISTEN_BACKLOG: u32 = 1;

// ── SetupStep ────────────────────────────────────────────────────

/// The setup operation a retry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    Socket,
    Bind,
    Listen,
    Accept,
    Connect,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Socket => "socket",
            Self::Bind => "bind",
            Self::Listen => "listen",
            Self::Accept => "accept",
            Self::Connect => "connect",
        };
        f.write_str(name)
    }
}

impl SetupStep {
    /// Wrap an I/O error as a setup failure of this step.
    pub fn fail(self, source: std::io::Error) -> TransportError {
        TransportError::Setup { step: self, source }
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────

/// Fixed-delay retry policy. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between a failed attempt and the next one.
    pub interval: Duration,
    /// Stop after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Unbounded retries every `interval`.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

// ── SupervisorPhase ──────────────────────────────────────────────

/// Where the supervisor is in its setup cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SupervisorPhase {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Running attempt number `attempt` of `step`.
    Attempting { step: SetupStep, attempt: u32 },
    /// Setup finished; the connection is in use.
    Active { since: Instant },
    /// The policy's attempt cap was reached.
    Failed { step: SetupStep, attempts: u32 },
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Attempting { step, attempt } => write!(f, "Attempting {step} (#{attempt})"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Failed { step, attempts } => write!(f, "Failed {step} after {attempts}"),
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────

/// Applies a [`RetryPolicy`] to socket setup and tracks the outcome.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    policy: RetryPolicy,
    phase: SupervisorPhase,
    /// Failed attempts across the supervisor's lifetime.
    failures: u64,
    /// Attempts made by the most recent `establish` call.
    attempts: u32,
}

impl ConnectionSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: SupervisorPhase::Idle,
            failures: 0,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn phase(&self) -> &SupervisorPhase {
        &self.phase
    }

    /// Total failed attempts so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Attempts used by the latest setup step, including the successful one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `attempt_fn` until it succeeds or the policy gives up.
    ///
    /// Whatever a failed attempt created is dropped before the sleep.
    pub async fn establish<T, F, Fut>(
        &mut self,
        step: SetupStep,
        mut attempt_fn: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.attempts = attempt;
            self.phase = SupervisorPhase::Attempting { step, attempt };

            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{step} succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.failures += 1;
                    if !self.policy.allows_retry_after(attempt) {
                        warn!("{step} failed on final attempt {attempt}: {e}");
                        self.phase = SupervisorPhase::Failed {
                            step,
                            attempts: attempt,
                        };
                        return Err(TransportError::SetupExhausted {
                            step,
                            attempts: attempt,
                        });
                    }
                    warn!(
                        "{step} failed (attempt {attempt}): {e}; retrying in {:?}",
                        self.policy.interval
                    );
                }
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }

    /// Connect to `addr`, retrying per policy.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<TcpStream, TransportError> {
        let stream = self
            .establish(SetupStep::Connect, move || async move {
                TcpStream::connect(addr)
                    .await
                    .map_err(|e| SetupStep::Connect.fail(e))
            })
            .await?;
        self.mark_active();
        Ok(stream)
    }

    /// Create, bind and listen on `addr`, retrying the whole sequence
    /// per policy. A half-built socket is dropped before each retry.
    pub async fn bind_listener(&mut self, addr: SocketAddr) -> Result<TcpListener, TransportError> {
        self.establish(SetupStep::Listen, move || async move {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }
            .map_err(|e| SetupStep::Socket.fail(e))?;
            socket
                .set_reuseaddr(true)
                .map_err(|e| SetupStep::Socket.fail(e))?;
            socket.bind(addr).map_err(|e| SetupStep::Bind.fail(e))?;
            socket
                .listen(LISTEN_BACKLOG)
                .map_err(|e| SetupStep::Listen.fail(e))
        })
        .await
    }

    /// Accept one peer on `listener`, retrying per policy.
    pub async fn accept(
        &mut self,
        listener: &TcpListener,
    ) -> Result<(TcpStream, SocketAddr), TransportError> {
        let accepted = self
            .establish(SetupStep::Accept, move || async move {
                listener
                    .accept()
                    .await
                    .map_err(|e| SetupStep::Accept.fail(e))
            })
            .await?;
        self.mark_active();
        Ok(accepted)
    }

    /// Record that setup completed and the connection is in use.
    pub fn mark_active(&mut self) {
        self.phase = SupervisorPhase::Active {
            since: Instant::now(),
        };
    }

    /// Record that the active connection was lost.
    pub fn mark_lost(&mut self) {
        self.phase = SupervisorPhase::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
