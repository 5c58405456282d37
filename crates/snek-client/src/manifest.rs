//! Declarative command manifest.
//!
//! Commands declared in TOML are turned into ordinary command values and
//! registered through [`CommandRegistry`]. Handlers are supplied by the
//! caller; a single handler can route on `ctx.invoked_name`.
//!
//! ```toml
//! [[command]]
//! name = "tag"
//! description = "Manage tags"
//! scopes = ["global", "123456789012345678"]
//! sub_command = "create"
//! sub_command_description = "Create a tag"
//!
//! [[command.options]]
//! name = "text"
//! description = "Tag body"
//! type = "string"
//! required = true
//!
//! [[command.permissions]]
//! guild_id = "123456789012345678"
//! target_id = "42"
//! target = "role"
//! permission = true
//!
//! [[message_command]]
//! name = "ping"
//!
//! [[component]]
//! name = "confirm"
//! custom_ids = ["yes", "no"]
//! ```

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use snek_core::{Scope, Snowflake};
use snek_protocol::{CommandOptionPayload, PermissionTarget};

use crate::command::{
    CommandRegistry, ComponentCommand, ComponentContext, InteractionCommand, InteractionContext,
    MessageCommand, MessageContext, PermissionOverwrite,
};
use crate::error::{Result, SnekError};
use crate::guard::HandlerResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandManifest {
    #[serde(default, rename = "command")]
    pub commands: Vec<InteractionDecl>,
    #[serde(default, rename = "message_command")]
    pub message_commands: Vec<MessageDecl>,
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionDecl {
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub group_description: Option<String>,
    #[serde(default)]
    pub sub_command: Option<String>,
    #[serde(default)]
    pub sub_command_description: Option<String>,
    #[serde(default = "default_true")]
    pub default_permission: bool,
    #[serde(default)]
    pub options: Vec<CommandOptionPayload>,
    #[serde(default)]
    pub permissions: Vec<PermissionDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDecl {
    Role,
    User,
}

impl From<TargetDecl> for PermissionTarget {
    fn from(target: TargetDecl) -> Self {
        match target {
            TargetDecl::Role => Self::Role,
            TargetDecl::User => Self::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecl {
    pub guild_id: Snowflake,
    pub target_id: Snowflake,
    pub target: TargetDecl,
    #[serde(default = "default_true")]
    pub permission: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDecl {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDecl {
    pub name: String,
    pub custom_ids: Vec<String>,
}

fn default_description() -> String {
    "No Description Set".to_string()
}

fn default_scopes() -> Vec<Scope> {
    vec![Scope::Global]
}

fn default_true() -> bool {
    true
}

impl InteractionDecl {
    /// Builds the command with `handler`.
    pub fn to_command<F, Fut>(&self, handler: F) -> InteractionCommand
    where
        F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut command = InteractionCommand::new(&self.name, &self.description, handler)
            .with_scopes(self.scopes.iter().copied())
            .default_permission(self.default_permission);

        if let Some(group) = &self.group {
            command = command.group(
                group,
                self.group_description.clone().unwrap_or_else(default_description),
            );
        }
        if let Some(sub) = &self.sub_command {
            command = command.sub_command(
                sub,
                self.sub_command_description
                    .clone()
                    .unwrap_or_else(default_description),
            );
        }
        for option in &self.options {
            command = command.with_option(option.clone());
        }
        for perm in &self.permissions {
            command = command.with_permission(PermissionOverwrite {
                guild_id: perm.guild_id,
                target_id: perm.target_id,
                kind: perm.target.into(),
                permission: perm.permission,
            });
        }
        command
    }
}

impl CommandManifest {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SnekError::Manifest(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SnekError::Manifest(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Total declarations of every kind.
    pub fn len(&self) -> usize {
        self.commands.len() + self.message_commands.len() + self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers every declaration, stopping at the first conflict.
    pub fn register<I, IF, M, MF, C, CF>(
        &self,
        registry: &mut CommandRegistry,
        handlers: &ManifestHandlers<I, M, C>,
    ) -> Result<usize>
    where
        I: Fn(InteractionContext) -> IF + Clone + Send + Sync + 'static,
        IF: Future<Output = HandlerResult> + Send + 'static,
        M: Fn(MessageContext) -> MF + Clone + Send + Sync + 'static,
        MF: Future<Output = HandlerResult> + Send + 'static,
        C: Fn(ComponentContext) -> CF + Clone + Send + Sync + 'static,
        CF: Future<Output = HandlerResult> + Send + 'static,
    {
        for decl in &self.commands {
            registry.add_interaction(decl.to_command(handlers.interaction.clone()))?;
        }
        for decl in &self.message_commands {
            let mut command = MessageCommand::new(&decl.name, handlers.message.clone());
            if !decl.enabled {
                command = command.disabled();
            }
            registry.add_message_command(command)?;
        }
        for decl in &self.components {
            registry.add_component_callback(ComponentCommand::new(
                &decl.name,
                decl.custom_ids.clone(),
                handlers.component.clone(),
            ))?;
        }
        Ok(self.len())
    }

    /// Every registration conflict, not just the first.
    pub fn check(&self, debug_scope: Option<Snowflake>) -> Vec<SnekError> {
        let mut registry = CommandRegistry::new(debug_scope);
        let mut problems = Vec::new();

        for decl in &self.commands {
            if let Err(err) = registry.add_interaction(decl.to_command(noop::<InteractionContext>)) {
                problems.push(err);
            }
        }
        for decl in &self.message_commands {
            if let Err(err) = registry.add_message_command(MessageCommand::new(&decl.name, noop::<MessageContext>)) {
                problems.push(err);
            }
        }
        for decl in &self.components {
            let command = ComponentCommand::new(&decl.name, decl.custom_ids.clone(), noop::<ComponentContext>);
            if let Err(err) = registry.add_component_callback(command) {
                problems.push(err);
            }
        }
        problems
    }

    /// A registry holding every declaration with no-op handlers.
    pub fn to_registry(&self, debug_scope: Option<Snowflake>) -> Result<CommandRegistry> {
        let mut registry = CommandRegistry::new(debug_scope);
        let handlers = ManifestHandlers {
            interaction: noop::<InteractionContext>,
            message: noop::<MessageContext>,
            component: noop::<ComponentContext>,
        };
        self.register(&mut registry, &handlers)?;
        Ok(registry)
    }
}

async fn noop<C>(_ctx: C) -> HandlerResult {
    Ok(())
}

/// One handler per command kind, cloned into every declaration.
#[derive(Clone)]
pub struct ManifestHandlers<I, M, C> {
    pub interaction: I,
    pub message: M,
    pub component: C,
}
