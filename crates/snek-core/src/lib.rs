//! snek core - Shared domain types for the gateway bot client
//!
//! This crate provides the vocabulary shared by the protocol, transport
//! and client crates: identifiers, registration scopes, minimal entities,
//! presence, intents and the protocol constants the router classifies on.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod entity;
pub mod error;
pub mod intents;
pub mod kind;
pub mod presence;
pub mod snowflake;

// Re-exports for convenience
pub use entity::{Application, Channel, Guild, Member, Role, User};
pub use error::{DomainError, DomainResult};
pub use intents::Intents;
pub use kind::{close_code, ComponentType, InteractionType, OptionType};
pub use presence::{Activity, ActivityType, Presence, Status};
pub use snowflake::{Scope, Snowflake, PLATFORM_EPOCH_MS};
