//! Dispatcher actor commands and errors.
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::event::Event;

use super::listener::{Listener, ListenerOrigin};

/// Predicate a pending wait matches events against.
pub type WaitPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

// ============================================================================
// Dispatcher Commands
// ============================================================================

/// Commands sent to the dispatcher actor.
///
/// Fire-and-forget commands are sent synchronously over an unbounded
/// queue, so a wait registered before a dispatch call is always
/// evaluated by that dispatch.
pub enum DispatchCommand {
    /// Fan an event out to its listeners, then resolve matching waits.
    Dispatch { event: Event },

    /// Add a listener to the table.
    AddListener { listener: Listener },

    /// Remove every listener with the given origin.
    RemoveListeners {
        origin: ListenerOrigin,
        respond_to: oneshot::Sender<usize>,
    },

    /// Register a one-shot wait.
    RegisterWait {
        id: u64,
        event: String,
        predicate: WaitPredicate,
        respond_to: oneshot::Sender<Event>,
    },

    /// Drop a pending wait (timeout or caller gave up).
    CancelWait { event: String, id: u64 },

    /// Number of pending waits across all events.
    WaitCount { respond_to: oneshot::Sender<usize> },

    /// Number of listeners registered for an event.
    ListenerCount {
        event: String,
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Dispatcher Errors
// ============================================================================

/// Errors that can occur during dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No matching event arrived in time.
    #[error("timed out waiting for `{event}`")]
    Timeout { event: String },

    /// The arguments cannot describe a wait.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The dispatcher actor has shut down.
    #[error("dispatcher channel closed")]
    ChannelClosed,
}
