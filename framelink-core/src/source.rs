//! Seams between the transport and the outside world.
//!
//! Frame capture, rendering and input polling belong to the host
//! application. The services only see these traits.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::event::ControlEvent;
use crate::frame::Frame;

/// Produces frames to be sent, e.g. a camera or a screen grabber.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrived in time.
    /// The frame must be exactly the configured frame size.
    async fn acquire(&mut self, timeout: Duration) -> Result<Frame, TransportError>;
}

/// Consumes received frames, e.g. a display window.
pub trait FrameSink: Send {
    fn render(&mut self, frame: &Frame) -> Result<(), TransportError>;
}

/// Produces control events, e.g. a game controller.
#[async_trait]
pub trait InputSource: Send {
    /// Events gathered since the last poll. `None` means the source is
    /// gone and forwarding should end.
    async fn poll(&mut self) -> Option<Vec<ControlEvent>>;
}
