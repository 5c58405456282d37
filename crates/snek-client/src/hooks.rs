//! Error and after-invoke hooks.
//!
//! Every listener and command invocation reports failures through these
//! hooks instead of propagating them. Override any method to change the
//! default logging behaviour; the per-kind error hooks forward to
//! [`Hooks::on_error`] unless overridden.

use async_trait::async_trait;
use tracing::{error, info};

use crate::command::{ComponentContext, InteractionContext, MessageContext};

/// The context of a message or interaction command invocation.
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'a> {
    Message(&'a MessageContext),
    Interaction(&'a InteractionContext),
}

impl Invocation<'_> {
    /// `@` for message commands, `/` for interaction commands.
    pub fn symbol(&self) -> char {
        match self {
            Self::Message(_) => '@',
            Self::Interaction(_) => '/',
        }
    }

    pub fn invoked_name(&self) -> &str {
        match self {
            Self::Message(ctx) => &ctx.invoked_name,
            Self::Interaction(ctx) => &ctx.invoked_name,
        }
    }

    /// Source label used when forwarding to `on_error`.
    pub fn error_source(&self) -> String {
        match self {
            Self::Message(ctx) => format!("cmd `{}`", ctx.invoked_name),
            Self::Interaction(ctx) => format!("cmd /`{}`", ctx.invoked_name),
        }
    }

    fn describe_args(&self) -> String {
        match self {
            Self::Message(ctx) => format!("{:?}", ctx.args),
            Self::Interaction(ctx) => ctx.describe_args(),
        }
    }
}

/// Client hooks.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Receives every error the client catches.
    async fn on_error(&self, source: &str, error: &anyhow::Error) {
        error!(source, error = %format!("{error:#}"), "Ignoring exception in {source}");
    }

    /// A message or interaction command failed.
    async fn on_command_error(&self, ctx: Invocation<'_>, error: &anyhow::Error) {
        self.on_error(&ctx.error_source(), error).await;
    }

    /// Runs after every command invocation, successful or not.
    async fn on_command(&self, ctx: Invocation<'_>) {
        info!(
            "Command Called: {}{} with args: {}",
            ctx.symbol(),
            ctx.invoked_name(),
            ctx.describe_args()
        );
    }

    /// A component callback failed.
    async fn on_component_error(&self, ctx: &ComponentContext, error: &anyhow::Error) {
        self.on_error(&format!("Component Callback for {}", ctx.custom_id), error)
            .await;
    }

    /// Runs after every component callback.
    async fn on_component(&self, ctx: &ComponentContext) {
        info!(
            "Component Called: ¢{} with values: {:?}",
            ctx.custom_id, ctx.values
        );
    }

    /// An autocomplete callback failed.
    async fn on_autocomplete_error(&self, ctx: &InteractionContext, error: &anyhow::Error) {
        let option = ctx.focused_option.as_deref().unwrap_or_default();
        self.on_error(
            &format!(
                "Autocomplete Callback for /{} - Option: {option}",
                ctx.invoked_name
            ),
            error,
        )
        .await;
    }

    /// Runs after every autocomplete callback.
    async fn on_autocomplete(&self, ctx: &InteractionContext) {
        info!(
            "Autocomplete Called: ${} with args: {}",
            ctx.invoked_name,
            ctx.describe_args()
        );
    }
}

/// Logs everything through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
