//! Command router.
//!
//! Classifies inbound interactions and messages, resolves the target
//! command and its arguments, and runs the handler in its own task wrapped
//! by the error and after-invoke hooks.
//!
//! # Panic-Free Guarantees
//!
//! - Handler, check and hook panics are caught inside the spawned task
//! - Unknown command ids are logged and dropped, never unwrapped

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use snek_core::{ComponentType, InteractionType, OptionType, Scope, Snowflake, User};
use snek_protocol::{MessagePayload, RawInteraction, RawOption};

use crate::cache::GlobalCache;
use crate::dispatch::Dispatcher;
use crate::error::{Result, SnekError};
use crate::event::{names, Event};
use crate::guard::{run_guarded, run_hook};
use crate::hooks::{Hooks, Invocation};

use super::args::{first_word, mention_pattern, split_args};
use super::context::{ArgValue, ComponentContext, InteractionContext, MessageContext};
use super::registry::CommandRegistry;

// ============================================================================
// Prefixes
// ============================================================================

/// Message command prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Prefix {
    /// A leading mention of the bot, `<@id>` or `<@!id>`, followed by whitespace.
    #[default]
    Mention,
    Literal(String),
}

impl Prefix {
    /// The configuration spelling of [`Prefix::Mention`].
    pub const MENTION: &'static str = "@mention";
}

impl From<String> for Prefix {
    fn from(value: String) -> Self {
        if value == Self::MENTION {
            Self::Mention
        } else {
            Self::Literal(value)
        }
    }
}

impl From<&str> for Prefix {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        match prefix {
            Prefix::Mention => Prefix::MENTION.to_string(),
            Prefix::Literal(value) => value,
        }
    }
}

impl FromStr for Prefix {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mention => f.write_str(Self::MENTION),
            Self::Literal(value) => f.write_str(value),
        }
    }
}

/// Computes the prefix for a message, e.g. per guild.
#[async_trait]
pub trait PrefixResolver: Send + Sync {
    async fn prefix(&self, message: &MessagePayload) -> Prefix;
}

/// The same prefix for every message.
#[derive(Debug, Clone)]
pub struct StaticPrefix(pub Prefix);

#[async_trait]
impl PrefixResolver for StaticPrefix {
    async fn prefix(&self, _message: &MessagePayload) -> Prefix {
        self.0.clone()
    }
}

// ============================================================================
// Router
// ============================================================================

pub struct CommandRouter {
    registry: Arc<RwLock<CommandRegistry>>,
    cache: Arc<GlobalCache>,
    dispatcher: Dispatcher,
    hooks: Arc<dyn Hooks>,
    prefixes: Arc<dyn PrefixResolver>,
    mention: RwLock<Option<Regex>>,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<RwLock<CommandRegistry>>,
        cache: Arc<GlobalCache>,
        dispatcher: Dispatcher,
        hooks: Arc<dyn Hooks>,
        prefixes: Arc<dyn PrefixResolver>,
    ) -> Self {
        Self {
            registry,
            cache,
            dispatcher,
            hooks,
            prefixes,
            mention: RwLock::new(None),
        }
    }

    /// Builds the mention prefix pattern for the logged-in user.
    pub async fn set_self_user(&self, user: &User) {
        match mention_pattern(user.id) {
            Ok(pattern) => *self.mention.write().await = Some(pattern),
            Err(err) => error!(error = %err, "Failed to build mention prefix pattern"),
        }
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Routes one interaction.
    ///
    /// Returns the handle of the spawned handler task, if one was started.
    ///
    /// # Errors
    ///
    /// - `SnekError::UnknownInteractionType` for interaction types the
    ///   router does not handle
    pub async fn route_interaction(&self, raw: RawInteraction) -> Result<Option<JoinHandle<()>>> {
        match raw.interaction_type() {
            InteractionType::Ping
            | InteractionType::ApplicationCommand
            | InteractionType::Autocomplete => Ok(self.route_command(&raw).await),
            InteractionType::MessageComponent => Ok(self.route_component(&raw).await),
            InteractionType::Unknown(code) => Err(SnekError::UnknownInteractionType(code)),
        }
    }

    async fn route_command(&self, raw: &RawInteraction) -> Option<JoinHandle<()>> {
        let name = raw
            .data
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or_default();
        let Some(command_id) = raw.command_id() else {
            debug!(interaction = %raw.id, "Interaction carries no command id");
            return None;
        };

        let scope = self.registry.read().await.scope_for(command_id);
        let Some(scope) = scope else {
            error!("Unknown cmd_id received:: {command_id} ({name})");
            return None;
        };

        let ctx = self.build_context(raw, scope).await;
        let command = self.registry.read().await.interaction(scope, &ctx.invoked_name);
        let Some(command) = command else {
            error!(%scope, "No local command for /{}", ctx.invoked_name);
            return None;
        };
        debug!("{scope} :: {} should be called", ctx.invoked_name);

        let hooks = Arc::clone(&self.hooks);
        Some(tokio::spawn(async move {
            if let Some(option) = ctx.focused_option.clone() {
                match command.autocomplete_for(&option) {
                    Some(callback) => {
                        if let Err(err) = run_guarded(callback(ctx.clone())).await {
                            run_hook(hooks.on_autocomplete_error(&ctx, &err)).await;
                        }
                    }
                    None => warn!(option = %option, "No autocomplete callback for /{}", ctx.invoked_name),
                }
                run_hook(hooks.on_autocomplete(&ctx)).await;
                return;
            }

            let result = run_guarded(async {
                if !command.checks_pass(&ctx) {
                    return Err(anyhow::Error::from(SnekError::CheckFailed {
                        command: ctx.invoked_name.clone(),
                    }));
                }
                command.call(ctx.clone()).await
            })
            .await;
            if let Err(err) = result {
                run_hook(hooks.on_command_error(Invocation::Interaction(&ctx), &err)).await;
            }
            run_hook(hooks.on_command(Invocation::Interaction(&ctx))).await;
        }))
    }

    async fn route_component(&self, raw: &RawInteraction) -> Option<JoinHandle<()>> {
        let ctx = Arc::new(ComponentContext::from_interaction(raw));
        self.dispatcher
            .dispatch(Event::component(names::COMPONENT, Arc::clone(&ctx)));

        let callback = self.registry.read().await.component(&ctx.custom_id);
        let handle = callback.map(|callback| {
            let hooks = Arc::clone(&self.hooks);
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                if let Err(err) = run_guarded(callback.call(ctx.as_ref().clone())).await {
                    run_hook(hooks.on_component_error(&ctx, &err)).await;
                }
                run_hook(hooks.on_component(&ctx)).await;
            })
        });

        match ctx.component_type {
            ComponentType::Button => self
                .dispatcher
                .dispatch(Event::component(names::BUTTON, Arc::clone(&ctx))),
            ComponentType::Select => self
                .dispatcher
                .dispatch(Event::component(names::SELECT, Arc::clone(&ctx))),
            _ => {}
        }
        handle
    }

    /// Builds the invocation context: walks the sub-command structure for
    /// the invoked name, then resolves the remaining options as arguments.
    pub async fn build_context(&self, raw: &RawInteraction, scope: Scope) -> InteractionContext {
        let data = raw.data.clone().unwrap_or_default();
        let mut invoked_name = data.name.clone().unwrap_or_default();
        let mut options: &[RawOption] = &data.options;

        if let Some(first) = options.first() {
            match first.kind {
                OptionType::SubCommand => {
                    invoked_name = format!("{invoked_name} {}", first.name);
                    options = &first.options;
                }
                OptionType::SubCommandGroup => {
                    match first.options.iter().find(|o| o.kind == OptionType::SubCommand) {
                        Some(sub) => {
                            invoked_name = format!("{invoked_name} {} {}", first.name, sub.name);
                            options = &sub.options;
                        }
                        None => {
                            invoked_name = format!("{invoked_name} {}", first.name);
                            options = &[];
                        }
                    }
                }
                _ => {}
            }
        }

        let mut args = Vec::with_capacity(options.len());
        let mut focused_option = None;
        for option in options {
            let value = self.resolve_option(raw.guild_id, option).await;
            if option.focused {
                focused_option = Some(option.name.clone());
            }
            args.push((option.name.to_lowercase(), value));
        }

        InteractionContext {
            interaction_id: raw.id,
            kind: raw.interaction_type(),
            command_id: raw.command_id(),
            scope,
            guild_id: raw.guild_id,
            channel_id: raw.channel_id,
            author: raw.author().cloned(),
            token: raw.token.clone(),
            invoked_name,
            args,
            focused_option,
        }
    }

    /// Resolves one option through the cache. Never fails: an entity that
    /// is not cached resolves to its raw id.
    async fn resolve_option(&self, guild_id: Option<Snowflake>, option: &RawOption) -> ArgValue {
        let value = option.value.clone().unwrap_or(Value::Null);
        let Some(id) = Snowflake::from_json(&value) else {
            return ArgValue::Value(value);
        };

        match option.kind {
            OptionType::User => self
                .resolve_user(guild_id, id)
                .await
                .unwrap_or(ArgValue::Id(id)),
            OptionType::Channel => self
                .cache
                .cached_channel(id)
                .await
                .map_or(ArgValue::Id(id), ArgValue::Channel),
            OptionType::Role => self
                .cache
                .cached_role(id)
                .await
                .map_or(ArgValue::Id(id), ArgValue::Role),
            OptionType::Mentionable => {
                if let Some(user) = self.resolve_user(guild_id, id).await {
                    user
                } else {
                    self.cache
                        .cached_role(id)
                        .await
                        .map_or(ArgValue::Id(id), ArgValue::Role)
                }
            }
            _ => ArgValue::Value(value),
        }
    }

    async fn resolve_user(&self, guild_id: Option<Snowflake>, id: Snowflake) -> Option<ArgValue> {
        if let Some(guild_id) = guild_id {
            if let Some(member) = self.cache.cached_member(guild_id, id).await {
                return Some(ArgValue::Member(member));
            }
        }
        self.cache.cached_user(id).await.map(ArgValue::User)
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Routes one message to a message command, if it invokes one.
    pub async fn route_message(&self, message: Arc<MessagePayload>) -> Option<JoinHandle<()>> {
        if message.author.bot {
            return None;
        }

        let prefix = match self.prefixes.prefix(&message).await {
            Prefix::Mention => {
                let pattern = self.mention.read().await;
                let found = pattern.as_ref()?.find(&message.content)?;
                found.as_str().to_string()
            }
            Prefix::Literal(prefix) => prefix,
        };

        let rest = message.content.strip_prefix(prefix.as_str())?;
        let invoked_name = first_word(rest).to_string();
        if invoked_name.is_empty() {
            return None;
        }

        let command = self.registry.read().await.message_command(&invoked_name)?;
        if !command.enabled {
            debug!(command = %invoked_name, "Message command is disabled");
            return None;
        }

        let mut ctx = MessageContext {
            message,
            invoked_name,
            prefix,
            args: Vec::new(),
        };
        ctx.args = split_args(ctx.content_parameters());

        let hooks = Arc::clone(&self.hooks);
        Some(tokio::spawn(async move {
            if let Err(err) = run_guarded(command.call(ctx.clone())).await {
                run_hook(hooks.on_command_error(Invocation::Message(&ctx), &err)).await;
            }
            run_hook(hooks.on_command(Invocation::Message(&ctx))).await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::spawn_dispatcher;
    use crate::hooks::DefaultHooks;
    use serde_json::json;
    use snek_core::{Application, Member, Role};
    use snek_transport::MemoryHttp;
    use tokio_util::sync::CancellationToken;

    fn router() -> (CommandRouter, Arc<GlobalCache>) {
        let http = MemoryHttp::new(
            User::new(1u64, "bot").as_bot(),
            Application {
                id: Snowflake::new(1),
                name: "bot".to_string(),
                owner: None,
            },
        );
        let cache = Arc::new(GlobalCache::new(Arc::new(http)));
        let hooks: Arc<dyn Hooks> = Arc::new(DefaultHooks);
        let router = CommandRouter::new(
            Arc::new(RwLock::new(CommandRegistry::default())),
            Arc::clone(&cache),
            spawn_dispatcher(Arc::clone(&hooks), CancellationToken::new()),
            hooks,
            Arc::new(StaticPrefix(Prefix::Literal("!".to_string()))),
        );
        (router, cache)
    }

    fn interaction(d: Value) -> RawInteraction {
        serde_json::from_value(json!({
            "id": "100",
            "type": 2,
            "token": "t",
            "guild_id": "9",
            "data": d,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_user_option_resolves_from_user_cache() {
        let (router, cache) = router();
        cache.place_user_data(User::new(5u64, "alice")).await;

        let raw = interaction(json!({
            "id": "1", "name": "whois",
            "options": [{"name": "Target", "type": 6, "value": "5"}]
        }));
        let ctx = router.build_context(&raw, Scope::Global).await;

        assert_eq!(ctx.get("target"), Some(&ArgValue::User(User::new(5u64, "alice"))));
    }

    #[tokio::test]
    async fn test_user_option_prefers_member_cache() {
        let (router, cache) = router();
        cache
            .place_member_data(Snowflake::new(9), Member::new(Snowflake::new(9), User::new(5u64, "alice")))
            .await;

        let raw = interaction(json!({
            "id": "1", "name": "whois",
            "options": [{"name": "target", "type": 6, "value": "5"}]
        }));
        let ctx = router.build_context(&raw, Scope::Global).await;
        assert!(ctx.get("target").and_then(ArgValue::as_member).is_some());
    }

    #[tokio::test]
    async fn test_uncached_entities_fall_back_to_raw_id() {
        let (router, _cache) = router();
        let raw = interaction(json!({
            "id": "1", "name": "inspect",
            "options": [
                {"name": "user", "type": 6, "value": "5"},
                {"name": "channel", "type": 7, "value": "6"},
                {"name": "role", "type": 8, "value": "7"},
                {"name": "either", "type": 9, "value": "8"},
                {"name": "text", "type": 3, "value": "hi"}
            ]
        }));
        let ctx = router.build_context(&raw, Scope::Global).await;

        assert_eq!(ctx.get("user"), Some(&ArgValue::Id(Snowflake::new(5))));
        assert_eq!(ctx.get("channel"), Some(&ArgValue::Id(Snowflake::new(6))));
        assert_eq!(ctx.get("role"), Some(&ArgValue::Id(Snowflake::new(7))));
        assert_eq!(ctx.get("either"), Some(&ArgValue::Id(Snowflake::new(8))));
        assert_eq!(ctx.get("text").and_then(ArgValue::as_str), Some("hi"));
    }

    #[tokio::test]
    async fn test_mentionable_falls_back_to_role() {
        let (router, cache) = router();
        let mut guild = snek_protocol::GuildPayload::new(9u64, "g");
        guild.roles.push(Role::new(8u64, "mods"));
        cache.place_guild_data(&guild).await;

        let raw = interaction(json!({
            "id": "1", "name": "ping",
            "options": [{"name": "who", "type": 9, "value": "8"}]
        }));
        let ctx = router.build_context(&raw, Scope::Global).await;
        assert_eq!(ctx.get("who").and_then(ArgValue::as_role).map(|r| r.name.as_str()), Some("mods"));
    }

    #[tokio::test]
    async fn test_sub_command_group_walk() {
        let (router, _cache) = router();
        let raw = interaction(json!({
            "id": "1", "name": "admin",
            "options": [{
                "name": "roles", "type": 2,
                "options": [{
                    "name": "add", "type": 1,
                    "options": [{"name": "name", "type": 3, "value": "mods", "focused": true}]
                }]
            }]
        }));
        let ctx = router.build_context(&raw, Scope::Global).await;

        assert_eq!(ctx.invoked_name, "admin roles add");
        assert_eq!(ctx.focused_option.as_deref(), Some("name"));
        assert_eq!(ctx.args.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_interaction_type_is_an_error() {
        let (router, _cache) = router();
        let mut raw = interaction(json!({"id": "1", "name": "x"}));
        raw.kind = 42;
        let err = router.route_interaction(raw).await.unwrap_err();
        assert!(matches!(err, SnekError::UnknownInteractionType(42)));
    }

    #[tokio::test]
    async fn test_unknown_command_id_is_dropped() {
        let (router, _cache) = router();
        let raw = interaction(json!({"id": "1", "name": "ghost"}));
        assert!(router.route_interaction(raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bot_messages_are_ignored() {
        let (router, _cache) = router();
        let message = MessagePayload::new(1u64, User::new(2u64, "other").as_bot(), "!ping");
        assert!(router.route_message(Arc::new(message)).await.is_none());
    }

    #[test]
    fn test_prefix_spelling() {
        assert_eq!(Prefix::from("@mention"), Prefix::Mention);
        assert_eq!(Prefix::from("!"), Prefix::Literal("!".to_string()));
        assert_eq!(String::from(Prefix::Mention), "@mention");
    }
}
