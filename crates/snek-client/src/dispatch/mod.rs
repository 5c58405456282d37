//! Event dispatcher and wait registry using the actor pattern.
//!
//! The dispatcher is the single logical sequence that owns the listener
//! table and the wait table. Everything that mutates either goes through
//! its command queue, so no locks guard them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Gateway session │────▶│ DispatcherActor  │────▶│ listener tasks   │
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │  DispatchCommand      │  wait table            │  errors
//!         │  (mpsc channel)       │  (oneshot per wait)    │  (Hooks::on_error)
//!         ▼                       ▼                        ▼
//!    dispatch / add /        HashMap<name,           one task per
//!    wait / cancel           Vec<PendingWait>>       listener call
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Listener and predicate panics are caught and reported
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::hooks::Hooks;

mod actor;
mod commands;
mod handle;
mod listener;

pub use actor::DispatcherActor;
pub use commands::{DispatchCommand, DispatchError, WaitPredicate};
pub use handle::{Dispatcher, WaitFuture};
pub use listener::{Listener, ListenerOrigin};

/// Spawn the dispatcher actor and return a handle for interaction.
///
/// Listener invocations receive children of `cancel`. The actor stops
/// once every [`Dispatcher`] handle is dropped.
pub fn spawn_dispatcher(hooks: Arc<dyn Hooks>, cancel: CancellationToken) -> Dispatcher {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let actor = DispatcherActor::new(cmd_rx, hooks, cancel);
    tokio::spawn(actor.run());

    Dispatcher::new(cmd_tx)
}
