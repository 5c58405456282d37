//! Event listeners.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::event::Event;
use crate::guard::{HandlerFuture, HandlerResult};

type ListenerFn = Arc<dyn Fn(Event, CancellationToken) -> HandlerFuture + Send + Sync>;

/// Who registered a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerOrigin {
    /// Registered by the client at construction.
    BuiltIn,
    /// Registered through the public API.
    User,
}

/// A handler bound to an event name.
#[derive(Clone)]
pub struct Listener {
    event: String,
    name: String,
    origin: ListenerOrigin,
    handler: ListenerFn,
}

impl Listener {
    /// Creates a user listener.
    ///
    /// The handler receives the event and a cancellation token that fires
    /// when the client stops.
    pub fn new<F, Fut>(event: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Event, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            event: event.into(),
            name: name.into(),
            origin: ListenerOrigin::User,
            handler: Arc::new(move |event, token| handler(event, token).boxed()),
        }
    }

    pub(crate) fn built_in<F, Fut>(event: &str, name: &str, handler: F) -> Self
    where
        F: Fn(Event, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut listener = Self::new(event, name, handler);
        listener.origin = ListenerOrigin::BuiltIn;
        listener
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> ListenerOrigin {
        self.origin
    }

    pub(crate) fn invoke(&self, event: Event, token: CancellationToken) -> HandlerFuture {
        (self.handler)(event, token)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
