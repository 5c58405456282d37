//! snek client - gateway bot client core
//!
//! This crate keeps a resumable gateway session alive, turns inbound frames
//! into named events, and routes interactions and prefixed messages to
//! registered command handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames  ┌──────────────┐  events  ┌──────────────────┐
//! │ GatewaySession│────────▶│  Dispatcher   │────────▶│ listeners, waits │
//! └──────────────┘          └──────────────┘          └──────────────────┘
//!        ▲                          │ built-in listeners
//!        │ ReconnectLoop            ▼
//!        │                  ┌──────────────┐  ┌────────────┐  ┌────────────┐
//!     Client ──────────────▶│ CommandRouter │  │ GlobalCache │  │ Reconciler │
//!                           └──────────────┘  └────────────┘  └────────────┘
//! ```
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.
//! Panics inside user handlers are caught and reported as errors.

pub mod cache;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gateway;
mod guard;
pub mod hooks;
pub mod manifest;
pub mod ready;
pub mod reconcile;

// Re-exports for convenience
pub use cache::GlobalCache;
pub use client::{Client, ClientBuilder};
pub use command::{
    ArgValue, CommandRegistry, ComponentCommand, ComponentContext, InteractionCommand,
    InteractionContext, MessageCommand, MessageContext, PermissionOverwrite, Prefix,
    PrefixResolver,
};
pub use config::ClientConfig;
pub use dispatch::{DispatchError, Dispatcher, Listener, ListenerOrigin};
pub use error::{Result, SnekError};
pub use event::{names, Event, EventPayload};
pub use guard::{HandlerFuture, HandlerResult};
pub use hooks::{DefaultHooks, Hooks, Invocation};
pub use manifest::{CommandManifest, ManifestHandlers};
pub use ready::{CacheFill, ReadinessGate};
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
