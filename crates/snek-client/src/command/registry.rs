//! Command registry: registered commands, scope map and remote id cache.
//!
//! The registry enforces the registration invariants (unique resolved
//! names per scope, unique message command names, one callback per
//! component custom id) and builds the payloads the reconciler pushes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use snek_core::{OptionType, Scope, Snowflake};
use snek_protocol::{ApplicationCommandPayload, CommandOptionPayload, CommandPermission};

use crate::error::{Result, SnekError};

use super::model::{ComponentCommand, InteractionCommand, MessageCommand};

/// Permission overwrites destined for one guild, keyed by the scope and
/// base name of the command they apply to.
pub type GuildPermissionPlan = BTreeMap<(Scope, String), Vec<CommandPermission>>;

#[derive(Debug, Default)]
pub struct CommandRegistry {
    interactions: BTreeMap<Scope, Vec<Arc<InteractionCommand>>>,
    message_commands: HashMap<String, Arc<MessageCommand>>,
    components: HashMap<String, Arc<ComponentCommand>>,
    /// Remote command id -> scope it is registered in.
    scope_map: HashMap<Snowflake, Scope>,
    /// (scope, qualified name) -> remote command id.
    command_ids: HashMap<(Scope, String), Snowflake>,
    debug_scope: Option<Scope>,
}

impl CommandRegistry {
    /// Creates an empty registry. With `debug_scope` set, every interaction
    /// command is registered to that guild only.
    pub fn new(debug_scope: Option<Snowflake>) -> Self {
        Self {
            debug_scope: debug_scope.map(Scope::Guild),
            ..Self::default()
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers an interaction command in each of its scopes.
    ///
    /// # Errors
    ///
    /// - `SnekError::DuplicateCommand` if a command with the same resolved
    ///   name already exists in one of the scopes; nothing is registered
    pub fn add_interaction(&mut self, mut command: InteractionCommand) -> Result<()> {
        if let Some(scope) = self.debug_scope {
            debug!(command = %command.resolved_name(), %scope, "Re-scoping command to debug scope");
            command.scopes = vec![scope];
        }
        command.scopes.sort();
        command.scopes.dedup();

        let name = command.resolved_name();
        for scope in &command.scopes {
            if self.interaction(*scope, &name).is_some() {
                return Err(SnekError::DuplicateCommand {
                    scope: *scope,
                    name,
                });
            }
        }

        let command = Arc::new(command);
        for scope in &command.scopes {
            self.interactions
                .entry(*scope)
                .or_default()
                .push(Arc::clone(&command));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// - `SnekError::DuplicateMessageCommand` if the name is taken
    pub fn add_message_command(&mut self, command: MessageCommand) -> Result<()> {
        if self.message_commands.contains_key(&command.name) {
            return Err(SnekError::DuplicateMessageCommand { name: command.name });
        }
        self.message_commands
            .insert(command.name.clone(), Arc::new(command));
        Ok(())
    }

    /// # Errors
    ///
    /// - `SnekError::DuplicateComponent` if another callback owns one of the
    ///   custom ids; nothing is registered
    pub fn add_component_callback(&mut self, command: ComponentCommand) -> Result<()> {
        if let Some(taken) = command
            .custom_ids
            .iter()
            .find(|id| self.components.contains_key(*id))
        {
            return Err(SnekError::DuplicateComponent {
                custom_id: taken.clone(),
            });
        }

        let command = Arc::new(command);
        for id in &command.custom_ids {
            self.components.insert(id.clone(), Arc::clone(&command));
        }
        Ok(())
    }

    /// Removes the command with `resolved_name` from `scope`.
    pub fn remove_interaction(&mut self, scope: Scope, resolved_name: &str) -> bool {
        let Some(commands) = self.interactions.get_mut(&scope) else {
            return false;
        };
        let before = commands.len();
        commands.retain(|c| c.resolved_name() != resolved_name);
        let removed = commands.len() != before;
        if commands.is_empty() {
            self.interactions.remove(&scope);
        }
        removed
    }

    pub fn remove_message_command(&mut self, name: &str) -> bool {
        self.message_commands.remove(name).is_some()
    }

    /// Removes the callback owning `custom_id`, with all of its ids.
    pub fn remove_component_callback(&mut self, custom_id: &str) -> bool {
        let Some(command) = self.components.remove(custom_id) else {
            return false;
        };
        self.components.retain(|_, c| !Arc::ptr_eq(c, &command));
        true
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn interaction(&self, scope: Scope, resolved_name: &str) -> Option<Arc<InteractionCommand>> {
        self.interactions
            .get(&scope)?
            .iter()
            .find(|c| c.resolved_name() == resolved_name)
            .cloned()
    }

    pub fn message_command(&self, name: &str) -> Option<Arc<MessageCommand>> {
        self.message_commands.get(name).cloned()
    }

    pub fn component(&self, custom_id: &str) -> Option<Arc<ComponentCommand>> {
        self.components.get(custom_id).cloned()
    }

    /// Scopes that have at least one local interaction command.
    pub fn scopes(&self) -> Vec<Scope> {
        self.interactions.keys().copied().collect()
    }

    /// Every interaction command, once each, in scope order.
    pub fn application_commands(&self) -> Vec<Arc<InteractionCommand>> {
        let mut seen: Vec<Arc<InteractionCommand>> = Vec::new();
        for command in self.interactions.values().flatten() {
            if !seen.iter().any(|c| Arc::ptr_eq(c, command)) {
                seen.push(Arc::clone(command));
            }
        }
        seen
    }

    pub fn message_command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.message_commands.keys().cloned().collect();
        names.sort();
        names
    }

    // ========================================================================
    // Scope Map and Id Cache
    // ========================================================================

    /// Scope a remote command id was registered in.
    pub fn scope_for(&self, command_id: Snowflake) -> Option<Scope> {
        self.scope_map.get(&command_id).copied()
    }

    pub fn command_id(&self, scope: Scope, qualified_name: &str) -> Option<Snowflake> {
        self.command_ids
            .get(&(scope, qualified_name.to_string()))
            .copied()
    }

    pub(crate) fn record_scope(&mut self, command_id: Snowflake, scope: Scope) {
        self.scope_map.insert(command_id, scope);
    }

    /// Records the remote id for every qualified name `remote` exposes
    /// that a local command in `scope` answers to.
    pub(crate) fn record_remote(&mut self, scope: Scope, remote: &ApplicationCommandPayload) {
        let Some(id) = remote.id else {
            return;
        };
        self.scope_map.insert(id, scope);
        for name in remote.qualified_names() {
            let known = name == remote.name || self.interaction(scope, &name).is_some();
            if known {
                self.command_ids.insert((scope, name), id);
            }
        }
    }

    pub fn scope_map_len(&self) -> usize {
        self.scope_map.len()
    }

    // ========================================================================
    // Payloads
    // ========================================================================

    /// Builds one payload per base command in `scope`, merging sub-commands
    /// and groups into their base.
    pub fn payloads(&self, scope: Scope) -> Vec<ApplicationCommandPayload> {
        let mut payloads: Vec<ApplicationCommandPayload> = Vec::new();
        let Some(commands) = self.interactions.get(&scope) else {
            return payloads;
        };

        for command in commands {
            let index = match payloads.iter().position(|p| p.name == command.name) {
                Some(index) => index,
                None => {
                    let mut base =
                        ApplicationCommandPayload::new(command.name.clone(), command.description.clone());
                    base.default_permission = command.default_permission;
                    payloads.push(base);
                    payloads.len() - 1
                }
            };
            let Some(base) = payloads.get_mut(index) else {
                continue;
            };

            let Some(sub) = command.sub_command_option() else {
                base.options = command.options.clone();
                continue;
            };

            match &command.group_name {
                None => base.options.push(sub),
                Some(group) => {
                    let position = base
                        .options
                        .iter()
                        .position(|o| o.kind == OptionType::SubCommandGroup && &o.name == group);
                    match position.and_then(|i| base.options.get_mut(i)) {
                        Some(existing) => existing.options.push(sub),
                        None => {
                            let mut group_option = CommandOptionPayload::new(
                                group.clone(),
                                command.group_description.clone().unwrap_or_default(),
                                OptionType::SubCommandGroup,
                            );
                            group_option.options.push(sub);
                            base.options.push(group_option);
                        }
                    }
                }
            }
        }
        payloads
    }

    /// Permission overwrites grouped by the guild they target.
    pub fn permission_plan(&self) -> BTreeMap<Snowflake, GuildPermissionPlan> {
        let mut plan: BTreeMap<Snowflake, GuildPermissionPlan> = BTreeMap::new();
        for (scope, commands) in &self.interactions {
            for command in commands {
                for overwrite in &command.permissions {
                    let entry = plan
                        .entry(overwrite.guild_id)
                        .or_default()
                        .entry((*scope, command.name.clone()))
                        .or_default();
                    let permission = overwrite.to_permission();
                    if !entry.contains(&permission) {
                        entry.push(permission);
                    }
                }
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InteractionContext;
    use crate::guard::HandlerResult;

    async fn noop(_: InteractionContext) -> HandlerResult {
        Ok(())
    }

    fn guild(id: u64) -> Scope {
        Scope::Guild(Snowflake::new(id))
    }

    #[test]
    fn test_duplicate_interaction_in_scope() {
        let mut registry = CommandRegistry::default();
        registry
            .add_interaction(InteractionCommand::new("ping", "", noop))
            .unwrap();
        let err = registry
            .add_interaction(InteractionCommand::new("ping", "", noop).with_scopes([Scope::Global, guild(1)]))
            .unwrap_err();
        assert!(matches!(err, SnekError::DuplicateCommand { scope: Scope::Global, .. }));
        assert!(registry.interaction(guild(1), "ping").is_none());
    }

    #[test]
    fn test_same_name_in_different_scopes() {
        let mut registry = CommandRegistry::default();
        registry
            .add_interaction(InteractionCommand::new("ping", "", noop))
            .unwrap();
        registry
            .add_interaction(InteractionCommand::new("ping", "", noop).with_scopes([guild(1)]))
            .unwrap();
        assert_eq!(registry.scopes(), vec![Scope::Global, guild(1)]);
    }

    #[test]
    fn test_debug_scope_rescopes() {
        let mut registry = CommandRegistry::new(Some(Snowflake::new(7)));
        registry
            .add_interaction(InteractionCommand::new("ping", "", noop).with_scopes([Scope::Global, guild(1)]))
            .unwrap();
        assert_eq!(registry.scopes(), vec![guild(7)]);
    }

    #[test]
    fn test_duplicate_component_registers_nothing() {
        let mut registry = CommandRegistry::default();
        registry
            .add_component_callback(ComponentCommand::new("a", ["yes"], |_| async { Ok(()) }))
            .unwrap();
        let err = registry
            .add_component_callback(ComponentCommand::new("b", ["no", "yes"], |_| async { Ok(()) }))
            .unwrap_err();
        assert!(matches!(err, SnekError::DuplicateComponent { custom_id } if custom_id == "yes"));
        assert!(registry.component("no").is_none());
    }

    #[test]
    fn test_payloads_merge_sub_commands() {
        let mut registry = CommandRegistry::default();
        registry
            .add_interaction(InteractionCommand::new("admin", "Admin", noop).sub_command("ban", ""))
            .unwrap();
        registry
            .add_interaction(
                InteractionCommand::new("admin", "Admin", noop)
                    .group("roles", "")
                    .sub_command("add", ""),
            )
            .unwrap();
        registry
            .add_interaction(
                InteractionCommand::new("admin", "Admin", noop)
                    .group("roles", "")
                    .sub_command("remove", ""),
            )
            .unwrap();

        let payloads = registry.payloads(Scope::Global);
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0].qualified_names(),
            vec!["admin", "admin ban", "admin roles add", "admin roles remove"]
        );
    }

    #[test]
    fn test_record_remote_indexes_sub_commands() {
        let mut registry = CommandRegistry::default();
        registry
            .add_interaction(InteractionCommand::new("config", "", noop).sub_command("set", ""))
            .unwrap();
        let mut remote = registry.payloads(Scope::Global).remove(0);
        remote.id = Some(Snowflake::new(55));

        registry.record_remote(Scope::Global, &remote);
        assert_eq!(registry.command_id(Scope::Global, "config set"), Some(Snowflake::new(55)));
        assert_eq!(registry.scope_for(Snowflake::new(55)), Some(Scope::Global));
    }

    #[test]
    fn test_application_commands_dedupes_across_scopes() {
        let mut registry = CommandRegistry::default();
        registry
            .add_interaction(InteractionCommand::new("ping", "", noop).with_scopes([guild(1), guild(2)]))
            .unwrap();
        assert_eq!(registry.application_commands().len(), 1);
    }
}
