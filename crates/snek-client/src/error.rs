//! Error types for the snek client.
//!
//! Only two classes of error are allowed to end the process: the fatal
//! gateway close codes and invalid command registration at setup time.
//! Everything else is retried by the reconnect loop or reported through
//! [`crate::Hooks`].
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use thiserror::Error;

use snek_core::{DomainError, Scope};
use snek_protocol::ProtocolError;
use snek_transport::{HttpError, TransportError};

use crate::dispatch::DispatchError;
use crate::reconcile::ReconcileError;

// ============================================================================
// Client Error Type
// ============================================================================

/// Client errors.
#[derive(Error, Debug)]
pub enum SnekError {
    /// The gateway closed with 4011.
    #[error("Your bot is too large, you must use shards")]
    ShardingRequired,

    /// The gateway closed with 4013.
    #[error("Invalid intents have been passed")]
    InvalidIntents,

    /// The gateway closed with 4014.
    #[error(
        "You have requested privileged intents that have not been enabled or approved. Check the developer dashboard"
    )]
    DisallowedIntents,

    /// The gateway closed with an uncatalogued code.
    #[error("gateway closed with code {code}")]
    GatewayClosed { code: u16 },

    /// An interaction command with this name already exists in the scope.
    #[error("Duplicate Command! {scope}::{name}")]
    DuplicateCommand { scope: Scope, name: String },

    /// A message command with this name already exists.
    #[error("Duplicate Command! Multiple commands share the name `{name}`")]
    DuplicateMessageCommand { name: String },

    /// Another component callback already owns this custom id.
    #[error("Duplicate Component! Multiple component callbacks for `{custom_id}`")]
    DuplicateComponent { custom_id: String },

    /// An interaction arrived with a type the router does not handle.
    #[error("Unknown Interaction Received: {0}")]
    UnknownInteractionType(u8),

    /// A command check denied the invocation.
    #[error("Command check failed for `{command}`")]
    CheckFailed { command: String },

    /// A caller passed an invalid value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation needed the logged-in user or application.
    #[error("client is not logged in")]
    NotLoggedIn,

    /// A command manifest could not be loaded.
    #[error("invalid command manifest: {0}")]
    Manifest(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl SnekError {
    /// Maps a fatal close code to its error.
    pub fn from_close_code(code: u16) -> Self {
        match code {
            snek_core::close_code::SHARDING_REQUIRED => Self::ShardingRequired,
            snek_core::close_code::INVALID_INTENTS => Self::InvalidIntents,
            snek_core::close_code::DISALLOWED_INTENTS => Self::DisallowedIntents,
            code => Self::GatewayClosed { code },
        }
    }

    /// True for errors that must end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ShardingRequired
                | Self::InvalidIntents
                | Self::DisallowedIntents
                | Self::GatewayClosed { .. }
                | Self::DuplicateCommand { .. }
                | Self::DuplicateMessageCommand { .. }
                | Self::DuplicateComponent { .. }
                | Self::UnknownInteractionType(_)
        )
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SnekError>;
