//! Client interface for interacting with the DispatcherActor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `DispatchError::ChannelClosed`

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use snek_core::Snowflake;

use crate::event::{names, Event};

use super::commands::{DispatchCommand, DispatchError};
use super::listener::{Listener, ListenerOrigin};

/// Resolves with the matching event, or fails with a timeout.
pub type WaitFuture = BoxFuture<'static, Result<Event, DispatchError>>;

// ============================================================================
// Dispatcher Handle
// ============================================================================

/// Handle for interacting with the dispatcher actor.
///
/// Cheap to clone. `dispatch` and wait registration are synchronous sends
/// on an unbounded queue, so their relative order is the order of the
/// calls that made them.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<DispatchCommand>,
    next_wait: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(sender: mpsc::UnboundedSender<DispatchCommand>) -> Self {
        Self {
            sender,
            next_wait: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queues an event for fan-out. Never blocks and never fails the caller.
    pub fn dispatch(&self, event: Event) {
        let name = event.resolved_name().to_string();
        if self.sender.send(DispatchCommand::Dispatch { event }).is_err() {
            warn!(event = %name, "Dispatcher closed, dropping event");
        }
    }

    /// Adds a listener.
    ///
    /// # Errors
    ///
    /// - `DispatchError::ChannelClosed` if the actor has shut down
    pub fn add_listener(&self, listener: Listener) -> Result<(), DispatchError> {
        self.sender
            .send(DispatchCommand::AddListener { listener })
            .map_err(|_| DispatchError::ChannelClosed)
    }

    /// Removes every listener registered with `origin`, returning how many.
    pub async fn remove_listeners(&self, origin: ListenerOrigin) -> Result<usize, DispatchError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DispatchCommand::RemoveListeners {
                origin,
                respond_to: tx,
            })
            .map_err(|_| DispatchError::ChannelClosed)?;

        rx.await.map_err(|_| DispatchError::ChannelClosed)
    }

    /// Registers a one-shot wait for `event`.
    ///
    /// The wait is registered before this returns, so an event dispatched
    /// after the call is evaluated against it even if the returned future
    /// has not been polled yet. On timeout the wait is removed from the
    /// table and the future fails with [`DispatchError::Timeout`]. Dropping
    /// the future before it resolves removes the wait as well.
    pub fn wait_for<F>(
        &self,
        event: impl Into<String>,
        predicate: F,
        timeout: Option<Duration>,
    ) -> WaitFuture
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let event = event.into();
        let id = self.next_wait.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let registered = self
            .sender
            .send(DispatchCommand::RegisterWait {
                id,
                event: event.clone(),
                predicate: Arc::new(predicate),
                respond_to: tx,
            })
            .is_ok();
        let mut guard = CancelOnDrop {
            sender: self.sender.clone(),
            event: event.clone(),
            id,
            armed: registered,
        };

        async move {
            if !registered {
                return Err(DispatchError::ChannelClosed);
            }

            let Some(limit) = timeout else {
                let result = rx.await;
                guard.armed = false;
                return result.map_err(|_| DispatchError::ChannelClosed);
            };

            match tokio::time::timeout(limit, rx).await {
                Ok(result) => {
                    guard.armed = false;
                    result.map_err(|_| DispatchError::ChannelClosed)
                }
                Err(_) => {
                    debug!(event = %event, wait = id, "Wait timed out");
                    drop(guard);
                    Err(DispatchError::Timeout { event })
                }
            }
        }
        .boxed()
    }

    /// Waits for a component interaction on any of `messages` or with any
    /// of `components` as its custom id.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidArgument` if both filters are empty; this is
    ///   reported here, before anything is registered
    pub fn wait_for_component(
        &self,
        messages: &[Snowflake],
        components: &[String],
        timeout: Option<Duration>,
    ) -> Result<WaitFuture, DispatchError> {
        if messages.is_empty() && components.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "You must specify messages or components (or both)".to_string(),
            ));
        }

        let messages: HashSet<Snowflake> = messages.iter().copied().collect();
        let components: HashSet<String> = components.iter().cloned().collect();

        Ok(self.wait_for(
            names::COMPONENT,
            move |event| {
                let Some(ctx) = event.as_component() else {
                    return false;
                };
                let message_ok = messages.is_empty()
                    || ctx.message_id.is_some_and(|id| messages.contains(&id));
                let component_ok = components.is_empty() || components.contains(&ctx.custom_id);
                message_ok && component_ok
            },
            timeout,
        ))
    }

    /// Number of pending waits across all events.
    pub async fn wait_count(&self) -> Result<usize, DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatchCommand::WaitCount { respond_to: tx })
            .map_err(|_| DispatchError::ChannelClosed)?;
        rx.await.map_err(|_| DispatchError::ChannelClosed)
    }

    /// Number of listeners registered for `event`.
    pub async fn listener_count(&self, event: impl Into<String>) -> Result<usize, DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatchCommand::ListenerCount {
                event: event.into(),
                respond_to: tx,
            })
            .map_err(|_| DispatchError::ChannelClosed)?;
        rx.await.map_err(|_| DispatchError::ChannelClosed)
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Removes a pending wait from the table unless it resolved.
struct CancelOnDrop {
    sender: mpsc::UnboundedSender<DispatchCommand>,
    event: String,
    id: u64,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.sender.send(DispatchCommand::CancelWait {
                event: std::mem::take(&mut self.event),
                id: self.id,
            });
        }
    }
}
