//! Events flowing through the dispatcher.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use snek_protocol::{GuildPayload, MessagePayload};

use crate::command::ComponentContext;

/// Names of the events the client itself dispatches.
pub mod names {
    pub const LOGIN: &str = "login";
    pub const DISCONNECT: &str = "disconnect";
    pub const READY: &str = "ready";
    pub const RESUME: &str = "resume";
    pub const WEBSOCKET_READY: &str = "websocket_ready";
    pub const RAW_INTERACTION_CREATE: &str = "raw_interaction_create";
    pub const RAW_MESSAGE_CREATE: &str = "raw_message_create";
    pub const RAW_GUILD_CREATE: &str = "raw_guild_create";
    pub const MESSAGE_CREATE: &str = "message_create";
    pub const GUILD_JOIN: &str = "guild_join";
    pub const COMPONENT: &str = "component";
    pub const BUTTON: &str = "button";
    pub const SELECT: &str = "select";

    /// Dispatch name for a raw gateway event, e.g. `GUILD_CREATE` -> `raw_guild_create`.
    pub fn raw(gateway_event: &str) -> String {
        format!("raw_{}", gateway_event.to_ascii_lowercase())
    }
}

/// Immutable event data. Cloning is cheap.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// The event carries no fields.
    Empty,
    /// Undecoded dispatch data straight from the gateway.
    Raw(Arc<Value>),
    Message(Arc<MessagePayload>),
    Guild(Arc<GuildPayload>),
    Component(Arc<ComponentContext>),
}

/// A named event.
#[derive(Debug, Clone)]
pub struct Event {
    name: Arc<str>,
    payload: EventPayload,
}

impl Event {
    pub fn new(name: impl AsRef<str>, payload: EventPayload) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            payload,
        }
    }

    /// An event without fields.
    pub fn empty(name: impl AsRef<str>) -> Self {
        Self::new(name, EventPayload::Empty)
    }

    /// A raw gateway event, named `raw_<event>`.
    pub fn raw(gateway_event: &str, data: Value) -> Self {
        Self::new(names::raw(gateway_event), EventPayload::Raw(Arc::new(data)))
    }

    pub fn message(name: impl AsRef<str>, message: MessagePayload) -> Self {
        Self::new(name, EventPayload::Message(Arc::new(message)))
    }

    pub fn guild(name: impl AsRef<str>, guild: GuildPayload) -> Self {
        Self::new(name, EventPayload::Guild(Arc::new(guild)))
    }

    pub fn component(name: impl AsRef<str>, ctx: Arc<ComponentContext>) -> Self {
        Self::new(name, EventPayload::Component(ctx))
    }

    /// The dispatch key.
    pub fn resolved_name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.payload, EventPayload::Empty)
    }

    pub fn raw_data(&self) -> Option<&Value> {
        match &self.payload {
            EventPayload::Raw(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessagePayload> {
        match &self.payload {
            EventPayload::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_guild(&self) -> Option<&GuildPayload> {
        match &self.payload {
            EventPayload::Guild(guild) => Some(guild),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentContext> {
        match &self.payload {
            EventPayload::Component(ctx) => Some(ctx),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_name() {
        let event = Event::raw("GUILD_CREATE", serde_json::json!({"id": "1"}));
        assert_eq!(event.resolved_name(), "raw_guild_create");
        assert_eq!(event.raw_data().map(|d| d["id"].clone()), Some(serde_json::json!("1")));
        assert!(!event.is_empty());
    }

    #[test]
    fn test_empty_event() {
        let event = Event::empty(names::READY);
        assert!(event.is_empty());
        assert_eq!(event.to_string(), "ready");
        assert!(event.as_message().is_none());
    }
}
