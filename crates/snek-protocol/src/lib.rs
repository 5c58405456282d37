//! snek protocol - Wire payloads for the gateway and command APIs
//!
//! This crate provides the typed frames exchanged over the gateway socket
//! and the payloads decoded at the transport boundary: interactions,
//! messages, guilds and application command declarations. Nothing past
//! this crate inspects untyped JSON maps.

pub mod command;
pub mod error;
pub mod gateway;
pub mod parse;

pub use command::{
    sync_needed, ApplicationCommandPayload, CommandOptionPayload, CommandPermission,
    GuildCommandPermissions, OptionChoice, PermissionTarget,
};
pub use error::ProtocolError;
pub use gateway::{
    ConnectionProperties, GatewayFrame, HelloPayload, IdentifyPayload, OpCode, ReadyPayload,
    ResumePayload,
};
pub use parse::{GuildPayload, InteractionData, MessagePayload, RawInteraction, RawOption};
