//! Gateway session lifecycle.
//!
//! - [`session`] runs one connection: handshake, heartbeat and frame handling.
//! - [`classify`] maps how a connection ended to a reconnect plan.
//! - [`runner`] is the outer loop that keeps reconnecting until stopped.

use thiserror::Error;

use snek_protocol::ProtocolError;
use snek_transport::TransportError;

mod classify;
mod runner;
mod session;

pub use classify::{classify, NextStep, ReconnectMode, ReconnectPlan};
pub use runner::{ReconnectLoop, RunnerState};
pub use session::{GatewaySession, ResumeState, SessionHandle, SessionInfo, SessionParams};

/// Why a gateway connection ended.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The session asked for a new connection (RECONNECT, INVALID_SESSION
    /// or a missed heartbeat ack).
    #[error("gateway restart requested (resume: {resume})")]
    Restart { resume: bool },

    /// The remote closed the socket.
    #[error("gateway closed with code {code}")]
    Closed { code: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("unexpected gateway failure: {0}")]
    Unexpected(String),
}
