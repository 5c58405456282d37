//! Commands: model, registry and router.

mod args;
mod context;
mod model;
mod registry;
mod router;

pub use args::{first_word, split_args};
pub use context::{ArgValue, ComponentContext, InteractionContext, MessageContext};
pub use model::{
    CheckFn, CommandFn, ComponentCommand, InteractionCommand, MessageCommand, PermissionOverwrite,
};
pub use registry::{CommandRegistry, GuildPermissionPlan};
pub use router::{CommandRouter, Prefix, PrefixResolver, StaticPrefix};
