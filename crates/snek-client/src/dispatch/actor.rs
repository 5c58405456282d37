//! Dispatcher actor - owns the listener and wait tables.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Listener panics are caught inside their task
//! - Predicate panics are caught and count as "no match"

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::guard::run_guarded;
use crate::hooks::Hooks;

use super::commands::{DispatchCommand, WaitPredicate};
use super::listener::{Listener, ListenerOrigin};

/// A registered one-shot wait.
struct PendingWait {
    id: u64,
    predicate: WaitPredicate,
    respond_to: oneshot::Sender<Event>,
}

// ============================================================================
// Dispatcher Actor
// ============================================================================

/// The dispatcher actor.
///
/// Processes commands sequentially; this ordering is what makes waits
/// registered before a dispatch observable by that dispatch.
pub struct DispatcherActor {
    receiver: mpsc::UnboundedReceiver<DispatchCommand>,
    listeners: HashMap<String, Vec<Listener>>,
    waits: HashMap<String, Vec<PendingWait>>,
    hooks: Arc<dyn Hooks>,
    cancel: CancellationToken,
}

impl DispatcherActor {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<DispatchCommand>,
        hooks: Arc<dyn Hooks>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            listeners: HashMap::new(),
            waits: HashMap::new(),
            hooks,
            cancel,
        }
    }

    /// Runs until every handle is dropped.
    pub async fn run(mut self) {
        debug!("Dispatcher actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            listeners = self.listeners.values().map(Vec::len).sum::<usize>(),
            waits = self.wait_count(),
            "Dispatcher actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: DispatchCommand) {
        match cmd {
            DispatchCommand::Dispatch { event } => self.handle_dispatch(event),
            DispatchCommand::AddListener { listener } => {
                debug!(event = listener.event(), name = listener.name(), "Adding listener");
                self.listeners
                    .entry(listener.event().to_string())
                    .or_default()
                    .push(listener);
            }
            DispatchCommand::RemoveListeners { origin, respond_to } => {
                let removed = self.handle_remove_listeners(origin);
                let _ = respond_to.send(removed);
            }
            DispatchCommand::RegisterWait {
                id,
                event,
                predicate,
                respond_to,
            } => {
                self.waits.entry(event).or_default().push(PendingWait {
                    id,
                    predicate,
                    respond_to,
                });
            }
            DispatchCommand::CancelWait { event, id } => self.handle_cancel_wait(&event, id),
            DispatchCommand::WaitCount { respond_to } => {
                let _ = respond_to.send(self.wait_count());
            }
            DispatchCommand::ListenerCount { event, respond_to } => {
                let count = self.listeners.get(&event).map_or(0, Vec::len);
                let _ = respond_to.send(count);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Fans the event out, one task per listener, then resolves waits.
    fn handle_dispatch(&mut self, event: Event) {
        let name = event.resolved_name().to_string();
        debug!(event = %name, "Dispatching event");

        if let Some(listeners) = self.listeners.get(&name) {
            for listener in listeners {
                self.spawn_listener(listener, event.clone());
            }
        }

        self.resolve_waits(&name, &event);
    }

    fn spawn_listener(&self, listener: &Listener, event: Event) {
        let source = format!("{} ({})", event.resolved_name(), listener.name());
        let future = listener.invoke(event, self.cancel.child_token());
        let hooks = Arc::clone(&self.hooks);

        tokio::spawn(async move {
            if let Err(err) = run_guarded(future).await {
                crate::guard::run_hook(hooks.on_error(&source, &err)).await;
            }
        });
    }

    /// Resolves matching waits in registration order.
    ///
    /// The pending list is rebuilt in a single pass: satisfied and
    /// abandoned waits are dropped, the rest keep their relative order.
    fn resolve_waits(&mut self, name: &str, event: &Event) {
        let Some(pending) = self.waits.remove(name) else {
            return;
        };

        let mut remaining = Vec::with_capacity(pending.len());
        for wait in pending {
            if wait.respond_to.is_closed() {
                continue;
            }
            let predicate = Arc::clone(&wait.predicate);
            let matched = catch_unwind(AssertUnwindSafe(|| predicate(event))).unwrap_or_else(|_| {
                warn!(event = %name, wait = wait.id, "Wait predicate panicked, treating as no match");
                false
            });
            if matched {
                let _ = wait.respond_to.send(event.clone());
            } else {
                remaining.push(wait);
            }
        }

        if !remaining.is_empty() {
            self.waits.insert(name.to_string(), remaining);
        }
    }

    fn handle_cancel_wait(&mut self, event: &str, id: u64) {
        if let Some(pending) = self.waits.get_mut(event) {
            pending.retain(|w| w.id != id);
            if pending.is_empty() {
                self.waits.remove(event);
            }
        }
    }

    fn handle_remove_listeners(&mut self, origin: ListenerOrigin) -> usize {
        let mut removed = 0;
        for listeners in self.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|l| l.origin() != origin);
            removed += before - listeners.len();
        }
        self.listeners.retain(|_, l| !l.is_empty());
        removed
    }

    fn wait_count(&self) -> usize {
        self.waits.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DefaultHooks;

    fn actor() -> DispatcherActor {
        let (_tx, rx) = mpsc::unbounded_channel();
        DispatcherActor::new(rx, Arc::new(DefaultHooks), CancellationToken::new())
    }

    fn register(actor: &mut DispatcherActor, id: u64, event: &str, matches: bool) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        actor.handle_command(DispatchCommand::RegisterWait {
            id,
            event: event.to_string(),
            predicate: Arc::new(move |_| matches),
            respond_to: tx,
        });
        rx
    }

    #[tokio::test]
    async fn test_multiple_matching_waits_resolve_without_skipping() {
        let mut actor = actor();
        let mut first = register(&mut actor, 1, "x", true);
        let mut second = register(&mut actor, 2, "x", true);
        let mut third = register(&mut actor, 3, "x", false);
        let mut fourth = register(&mut actor, 4, "x", true);

        actor.handle_dispatch(Event::empty("x"));

        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_ok());
        assert!(third.try_recv().is_err());
        assert!(fourth.try_recv().is_ok());
        assert_eq!(actor.wait_count(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_waits_are_pruned() {
        let mut actor = actor();
        let dropped = register(&mut actor, 1, "x", false);
        drop(dropped);
        let _kept = register(&mut actor, 2, "x", false);

        actor.handle_dispatch(Event::empty("x"));
        assert_eq!(actor.wait_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_predicate_is_no_match() {
        let mut actor = actor();
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(DispatchCommand::RegisterWait {
            id: 1,
            event: "x".to_string(),
            predicate: Arc::new(|_| panic!("bad predicate")),
            respond_to: tx,
        });
        actor.handle_dispatch(Event::empty("x"));
        assert!(rx.try_recv().is_err());
        assert_eq!(actor.wait_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_wait() {
        let mut actor = actor();
        let _a = register(&mut actor, 1, "x", false);
        let _b = register(&mut actor, 2, "y", false);
        actor.handle_cancel_wait("x", 1);
        assert_eq!(actor.wait_count(), 1);
        assert!(!actor.waits.contains_key("x"));
    }

    #[tokio::test]
    async fn test_remove_listeners_by_origin() {
        let mut actor = actor();
        actor.handle_command(DispatchCommand::AddListener {
            listener: Listener::new("x", "user", |_, _| async { Ok(()) }),
        });
        actor.handle_command(DispatchCommand::AddListener {
            listener: Listener::built_in("x", "builtin", |_, _| async { Ok(()) }),
        });
        assert_eq!(actor.handle_remove_listeners(ListenerOrigin::User), 1);
        assert_eq!(actor.listeners.get("x").map(Vec::len), Some(1));
    }
}
