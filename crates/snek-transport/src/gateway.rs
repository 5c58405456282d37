//! Gateway socket seam.

use async_trait::async_trait;

use snek_protocol::GatewayFrame;

use crate::error::TransportError;

/// What a socket read produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A decoded frame.
    Frame(GatewayFrame),
    /// The remote closed the socket with this close code.
    Closed(u16),
}

/// Opens gateway sockets. One call per connection attempt.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameSocket>, TransportError>;
}

/// An open gateway socket.
///
/// `recv` must be cancel-safe: the session selects over it together with
/// the heartbeat timer and outbound commands.
#[async_trait]
pub trait FrameSocket: Send {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError>;

    async fn recv(&mut self) -> Result<SocketEvent, TransportError>;

    /// Closes the socket deliberately with `code`.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}
