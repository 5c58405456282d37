//! Command values: message commands, interaction commands and component callbacks.
//!
//! Commands are plain values built with the methods below and handed to the
//! client's registration API. Handlers are async closures returning
//! [`HandlerResult`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use snek_core::{OptionType, Scope, Snowflake};
use snek_protocol::{CommandOptionPayload, CommandPermission, PermissionTarget};

use crate::guard::{HandlerFuture, HandlerResult};

use super::context::{ComponentContext, InteractionContext, MessageContext};

/// A boxed async handler taking a context by value.
pub type CommandFn<C> = Arc<dyn Fn(C) -> HandlerFuture + Send + Sync>;

/// A synchronous allow/deny check run before an interaction handler.
pub type CheckFn = Arc<dyn Fn(&InteractionContext) -> bool + Send + Sync>;

fn boxed<C, F, Fut>(handler: F) -> CommandFn<C>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| handler(ctx).boxed())
}

// ============================================================================
// Message Commands
// ============================================================================

/// A prefixed text command.
#[derive(Clone)]
pub struct MessageCommand {
    pub name: String,
    pub enabled: bool,
    handler: CommandFn<MessageContext>,
}

impl MessageCommand {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            enabled: true,
            handler: boxed(handler),
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn call(&self, ctx: MessageContext) -> HandlerFuture {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for MessageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCommand")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Interaction Commands
// ============================================================================

/// A permission overwrite for one role or user in one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub guild_id: Snowflake,
    pub target_id: Snowflake,
    pub kind: PermissionTarget,
    pub permission: bool,
}

impl PermissionOverwrite {
    pub fn to_permission(&self) -> CommandPermission {
        CommandPermission {
            id: self.target_id,
            kind: self.kind,
            permission: self.permission,
        }
    }
}

/// A slash command, or a sub-command of one.
///
/// A sub-command carries its base name plus `sub_cmd_name` (and optionally
/// `group_name`); sub-commands sharing a base are merged into one remote
/// command when payloads are built.
#[derive(Clone)]
pub struct InteractionCommand {
    pub name: String,
    pub description: String,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub sub_cmd_name: Option<String>,
    pub sub_cmd_description: Option<String>,
    pub scopes: Vec<Scope>,
    /// Argument options, excluding the sub-command structure.
    pub options: Vec<CommandOptionPayload>,
    pub permissions: Vec<PermissionOverwrite>,
    pub default_permission: bool,
    checks: Vec<CheckFn>,
    autocomplete: HashMap<String, CommandFn<InteractionContext>>,
    handler: CommandFn<InteractionContext>,
}

impl InteractionCommand {
    /// Creates a global command.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            group_name: None,
            group_description: None,
            sub_cmd_name: None,
            sub_cmd_description: None,
            scopes: vec![Scope::Global],
            options: Vec::new(),
            permissions: Vec::new(),
            default_permission: true,
            checks: Vec::new(),
            autocomplete: HashMap::new(),
            handler: boxed(handler),
        }
    }

    /// Replaces the scopes with `scopes`.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    /// Makes this a sub-command of `name`.
    #[must_use]
    pub fn sub_command(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.sub_cmd_name = Some(name.into());
        self.sub_cmd_description = Some(description.into());
        self
    }

    /// Places the sub-command inside a group.
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.group_name = Some(name.into());
        self.group_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: CommandOptionPayload) -> Self {
        self.options.push(option);
        self
    }

    #[must_use]
    pub fn with_permission(mut self, overwrite: PermissionOverwrite) -> Self {
        self.permissions.push(overwrite);
        self
    }

    #[must_use]
    pub fn default_permission(mut self, allowed: bool) -> Self {
        self.default_permission = allowed;
        self
    }

    /// Adds a check; every check must pass before the handler runs.
    #[must_use]
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&InteractionContext) -> bool + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
        self
    }

    /// Registers the autocomplete handler for `option`.
    #[must_use]
    pub fn with_autocomplete<F, Fut>(mut self, option: impl Into<String>, handler: F) -> Self
    where
        F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.autocomplete.insert(option.into(), boxed(handler));
        self
    }

    /// Space-joined name as users invoke it: `base [group] [sub]`.
    pub fn resolved_name(&self) -> String {
        let mut name = self.name.clone();
        if let Some(sub) = &self.sub_cmd_name {
            if let Some(group) = &self.group_name {
                name.push(' ');
                name.push_str(group);
            }
            name.push(' ');
            name.push_str(sub);
        }
        name
    }

    pub fn is_sub_command(&self) -> bool {
        self.sub_cmd_name.is_some()
    }

    /// Option names that have an autocomplete handler.
    pub fn autocomplete_options(&self) -> impl Iterator<Item = &str> {
        self.autocomplete.keys().map(String::as_str)
    }

    /// The sub-command option this command contributes to its base.
    pub(crate) fn sub_command_option(&self) -> Option<CommandOptionPayload> {
        let name = self.sub_cmd_name.as_ref()?;
        let mut option = CommandOptionPayload::new(
            name.clone(),
            self.sub_cmd_description.clone().unwrap_or_default(),
            OptionType::SubCommand,
        );
        option.options = self.options.clone();
        Some(option)
    }

    pub(crate) fn checks_pass(&self, ctx: &InteractionContext) -> bool {
        self.checks.iter().all(|check| check(ctx))
    }

    pub(crate) fn call(&self, ctx: InteractionContext) -> HandlerFuture {
        (self.handler)(ctx)
    }

    pub(crate) fn autocomplete_for(&self, option: &str) -> Option<&CommandFn<InteractionContext>> {
        self.autocomplete.get(option)
    }
}

impl fmt::Debug for InteractionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionCommand")
            .field("name", &self.resolved_name())
            .field("scopes", &self.scopes)
            .field("options", &self.options.len())
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Component Callbacks
// ============================================================================

/// A callback bound to one or more component custom ids.
#[derive(Clone)]
pub struct ComponentCommand {
    pub name: String,
    pub custom_ids: Vec<String>,
    handler: CommandFn<ComponentContext>,
}

impl ComponentCommand {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        custom_ids: impl IntoIterator<Item = impl Into<String>>,
        handler: F,
    ) -> Self
    where
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            custom_ids: custom_ids.into_iter().map(Into::into).collect(),
            handler: boxed(handler),
        }
    }

    pub(crate) fn call(&self, ctx: ComponentContext) -> HandlerFuture {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for ComponentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCommand")
            .field("name", &self.name)
            .field("custom_ids", &self.custom_ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: InteractionContext) -> HandlerResult {
        Ok(())
    }

    #[test]
    fn test_resolved_name() {
        assert_eq!(InteractionCommand::new("ping", "", noop).resolved_name(), "ping");
        assert_eq!(
            InteractionCommand::new("config", "", noop)
                .sub_command("set", "")
                .resolved_name(),
            "config set"
        );
        assert_eq!(
            InteractionCommand::new("admin", "", noop)
                .group("roles", "")
                .sub_command("add", "")
                .resolved_name(),
            "admin roles add"
        );
    }

    #[test]
    fn test_group_without_sub_command_is_ignored() {
        let cmd = InteractionCommand::new("admin", "", noop).group("roles", "");
        assert_eq!(cmd.resolved_name(), "admin");
        assert!(cmd.sub_command_option().is_none());
    }

    #[test]
    fn test_sub_command_option_carries_arguments() {
        let cmd = InteractionCommand::new("config", "", noop)
            .sub_command("set", "Set a value")
            .with_option(CommandOptionPayload::new("key", "Key", OptionType::String).required());
        let option = cmd.sub_command_option().unwrap();
        assert_eq!(option.kind, OptionType::SubCommand);
        assert_eq!(option.options.len(), 1);
    }
}
