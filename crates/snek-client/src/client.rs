//! The client orchestrator.
//!
//! Composes the dispatcher, entity cache, command registry and router,
//! reconciler, readiness gate and gateway reconnect loop, and registers
//! the built-in listeners that connect them:
//!
//! | Event | Built-in behaviour |
//! |---|---|
//! | `websocket_ready` | wait for guilds, reconcile or cache commands, mark ready, dispatch `ready` |
//! | `raw_interaction_create` | route through the command router |
//! | `raw_message_create` | decode, cache the author, dispatch `message_create` |
//! | `message_create` | route message commands |
//! | `raw_guild_create` | cache the guild, dispatch `guild_join` |

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use snek_core::{
    close_code, Activity, ActivityType, Application, Channel, Guild, Member, Presence, Snowflake,
    Status, User,
};
use snek_protocol::{GuildPayload, MessagePayload, RawInteraction, ReadyPayload};
use snek_transport::{GatewayConnector, HttpTransport};

use crate::cache::GlobalCache;
use crate::command::{
    CommandRegistry, CommandRouter, ComponentCommand, InteractionCommand, MessageCommand,
    PrefixResolver, StaticPrefix,
};
use crate::config::ClientConfig;
use crate::dispatch::{spawn_dispatcher, Dispatcher, Listener, ListenerOrigin, WaitFuture};
use crate::error::{Result, SnekError};
use crate::event::{names, Event, EventPayload};
use crate::gateway::{ReconnectLoop, RunnerState};
use crate::guard::{run_hook, HandlerResult};
use crate::hooks::{DefaultHooks, Hooks};
use crate::ready::ReadinessGate;
use crate::reconcile::{ReconcileReport, Reconciler};

// ============================================================================
// Builder
// ============================================================================

pub struct ClientBuilder {
    config: ClientConfig,
    http: Arc<dyn HttpTransport>,
    connector: Arc<dyn GatewayConnector>,
    hooks: Arc<dyn Hooks>,
    prefixes: Option<Arc<dyn PrefixResolver>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replaces the static `default_prefix` with a computed one.
    #[must_use]
    pub fn prefix_resolver(mut self, resolver: impl PrefixResolver + 'static) -> Self {
        self.prefixes = Some(Arc::new(resolver));
        self
    }

    /// Builds the client and spawns its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Client {
        let Self {
            config,
            http,
            connector,
            hooks,
            prefixes,
        } = self;

        let cancel = CancellationToken::new();
        let dispatcher = spawn_dispatcher(Arc::clone(&hooks), cancel.clone());
        let registry = Arc::new(RwLock::new(CommandRegistry::new(config.debug_scope)));
        let cache = Arc::new(GlobalCache::new(Arc::clone(&http)));
        let prefixes = prefixes
            .unwrap_or_else(|| Arc::new(StaticPrefix(config.default_prefix.clone())));
        let router = CommandRouter::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            dispatcher.clone(),
            Arc::clone(&hooks),
            prefixes,
        );
        let reconciler = Reconciler::new(
            Arc::clone(&http),
            Arc::clone(&registry),
            config.delete_unused_application_cmds,
        );
        let gate = Arc::new(ReadinessGate::new(
            Arc::clone(&cache),
            config.guild_event_timeout(),
        ));
        let runner = Arc::new(RunnerState::new(config.presence()));

        let inner = Arc::new(ClientInner {
            config,
            http,
            connector,
            hooks,
            dispatcher,
            registry,
            cache,
            router,
            reconciler,
            gate,
            runner,
            cancel,
            login: RwLock::new(None),
        });
        inner.register_built_ins();

        Client { inner }
    }
}

// ============================================================================
// Client
// ============================================================================

struct LoginState {
    token: String,
    user: User,
    app: Application,
    start_time: DateTime<Utc>,
}

struct ClientInner {
    config: ClientConfig,
    http: Arc<dyn HttpTransport>,
    connector: Arc<dyn GatewayConnector>,
    hooks: Arc<dyn Hooks>,
    dispatcher: Dispatcher,
    registry: Arc<RwLock<CommandRegistry>>,
    cache: Arc<GlobalCache>,
    router: CommandRouter,
    reconciler: Reconciler,
    gate: Arc<ReadinessGate>,
    runner: Arc<RunnerState>,
    cancel: CancellationToken,
    login: RwLock<Option<LoginState>>,
}

/// A bot client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(
        http: Arc<dyn HttpTransport>,
        connector: Arc<dyn GatewayConnector>,
    ) -> ClientBuilder {
        ClientBuilder {
            config: ClientConfig::default(),
            http,
            connector,
            hooks: Arc::new(DefaultHooks),
            prefixes: None,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Logs in over REST and dispatches `login`.
    pub async fn login(&self, token: &str) -> Result<User> {
        let inner = &self.inner;
        let token = token.trim().to_string();

        debug!("Attempting to login");
        let user = inner.http.login(&token).await?;
        let user = inner.cache.place_user_data(user).await;
        let app = inner.http.get_current_application().await?;
        inner.router.set_self_user(&user).await;

        info!(user = %user.username, app = %app.id, "Logged in");
        *inner.login.write().await = Some(LoginState {
            token,
            user: user.clone(),
            app,
            start_time: Utc::now(),
        });
        inner.dispatcher.dispatch(Event::empty(names::LOGIN));
        Ok(user)
    }

    /// Logs in and keeps the gateway connected until [`Client::stop`] or a
    /// fatal close code.
    pub async fn start(&self, token: &str) -> Result<()> {
        self.login(token).await?;
        self.run_gateway().await
    }

    /// Runs the reconnect loop for an already logged-in client.
    pub async fn run_gateway(&self) -> Result<()> {
        let inner = &self.inner;
        let token = match inner.login.read().await.as_ref() {
            Some(login) => login.token.clone(),
            None => return Err(SnekError::NotLoggedIn),
        };

        let runner = ReconnectLoop::new(
            Arc::clone(&inner.connector),
            inner.dispatcher.clone(),
            Arc::clone(&inner.gate),
            Arc::clone(&inner.runner),
            token,
            inner.config.intents,
            inner.config.reconnect_delay(),
            inner.cancel.clone(),
        );
        runner.run().await
    }

    /// Closes the gateway with 1001 and stops the reconnect loop.
    pub async fn stop(&self) {
        debug!("Stopping the bot.");
        let inner = &self.inner;
        inner.gate.reset();
        inner.runner.mark_closed();
        if let Some(session) = inner.runner.session().await {
            session.close(close_code::GOING_AWAY);
        }
        inner.cancel.cancel();
    }

    /// Changes status and activity.
    ///
    /// `None` keeps the current value. The new presence is used for the
    /// next IDENTIFY and sent live if a session is active.
    pub async fn change_presence(&self, status: Option<Status>, activity: Option<Activity>) {
        let current = self.inner.runner.presence().await;
        let status = status.unwrap_or(current.status);

        let activity = match activity {
            Some(activity) => {
                if activity.kind == ActivityType::Streaming {
                    if activity.url.is_none() {
                        warn!("Streaming activity cannot be set without a valid URL attribute");
                    }
                } else if !activity.kind.is_bot_supported() {
                    warn!("Activity type `{}` may not be enabled for bots", activity.kind);
                }
                Some(activity)
            }
            None => current.activities.into_iter().next(),
        };

        let presence = Presence::new(status, activity);
        self.inner.runner.set_presence(presence.clone()).await;
        if let Some(session) = self.inner.runner.session().await {
            session.change_presence(presence);
        }
    }

    /// Like [`Client::change_presence`], with the status given by name
    /// (case-insensitive).
    pub async fn change_presence_named(&self, status: &str, activity: Option<Activity>) -> Result<()> {
        let status = status
            .parse::<Status>()
            .map_err(|e| SnekError::InvalidArgument(format!("{e}. Please use the Status enum")))?;
        self.change_presence(Some(status), activity).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.runner.is_closed()
    }

    /// Round trip of the last acknowledged heartbeat.
    pub async fn latency(&self) -> Option<Duration> {
        self.inner.runner.session_info().await.latency
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.login.read().await.as_ref().map(|l| l.user.clone())
    }

    pub async fn app(&self) -> Option<Application> {
        self.inner.login.read().await.as_ref().map(|l| l.app.clone())
    }

    pub async fn owner(&self) -> Option<User> {
        self.app().await.and_then(|app| app.owner)
    }

    pub async fn start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.login.read().await.as_ref().map(|l| l.start_time)
    }

    /// Guilds announced at ready plus every guild cached since.
    pub async fn guild_ids(&self) -> Vec<Snowflake> {
        let mut ids: BTreeSet<Snowflake> = self.inner.gate.expected_guilds().await.into_iter().collect();
        ids.extend(self.inner.cache.guild_ids().await);
        ids.into_iter().collect()
    }

    pub async fn status(&self) -> Status {
        self.inner.runner.presence().await.status
    }

    pub async fn activity(&self) -> Option<Activity> {
        self.inner.runner.presence().await.activities.into_iter().next()
    }

    /// Every registered interaction command, once each.
    pub async fn application_commands(&self) -> Vec<Arc<InteractionCommand>> {
        self.inner.registry.read().await.application_commands()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<GlobalCache> {
        &self.inner.cache
    }

    pub fn registry(&self) -> &Arc<RwLock<CommandRegistry>> {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    pub fn add_listener(&self, listener: Listener) -> Result<()> {
        Ok(self.inner.dispatcher.add_listener(listener)?)
    }

    pub async fn remove_listeners(&self, origin: ListenerOrigin) -> Result<usize> {
        Ok(self.inner.dispatcher.remove_listeners(origin).await?)
    }

    pub async fn add_interaction(&self, command: InteractionCommand) -> Result<()> {
        self.inner.registry.write().await.add_interaction(command)
    }

    pub async fn add_message_command(&self, command: MessageCommand) -> Result<()> {
        self.inner.registry.write().await.add_message_command(command)
    }

    pub async fn add_component_callback(&self, command: ComponentCommand) -> Result<()> {
        self.inner.registry.write().await.add_component_callback(command)
    }

    /// Pushes local commands and permissions now.
    pub async fn synchronise_interactions(&self) -> Result<ReconcileReport> {
        let app_id = self.app().await.ok_or(SnekError::NotLoggedIn)?.id;
        let guilds = self.guild_ids().await;
        Ok(self.inner.reconciler.synchronise(app_id, &guilds).await)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn dispatch(&self, event: Event) {
        self.inner.dispatcher.dispatch(event);
    }

    /// See [`Dispatcher::wait_for`].
    pub fn wait_for<F>(&self, event: impl Into<String>, predicate: F, timeout: Option<Duration>) -> WaitFuture
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.inner.dispatcher.wait_for(event, predicate, timeout)
    }

    /// See [`Dispatcher::wait_for_component`].
    pub fn wait_for_component(
        &self,
        messages: &[Snowflake],
        components: &[String],
        timeout: Option<Duration>,
    ) -> Result<WaitFuture> {
        Ok(self
            .inner
            .dispatcher
            .wait_for_component(messages, components, timeout)?)
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub async fn get_guild(&self, id: Snowflake) -> Result<Guild> {
        Ok(self.inner.cache.get_guild(id).await?)
    }

    pub async fn get_channel(&self, id: Snowflake) -> Result<Channel> {
        Ok(self.inner.cache.get_channel(id).await?)
    }

    pub async fn get_user(&self, id: Snowflake) -> Result<User> {
        Ok(self.inner.cache.get_user(id).await?)
    }

    pub async fn get_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Result<Member> {
        Ok(self.inner.cache.get_member(guild_id, user_id).await?)
    }
}

// ============================================================================
// Built-in listeners
// ============================================================================

/// Wraps a built-in handler so the listener table does not keep the
/// client alive.
fn built_in<F, Fut>(inner: &Arc<ClientInner>, event: &str, handler: F) -> Listener
where
    F: Fn(Arc<ClientInner>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let weak: Weak<ClientInner> = Arc::downgrade(inner);
    Listener::built_in(event, &format!("_on_{event}"), move |event, _token| {
        let fut = weak.upgrade().map(|inner| handler(inner, event));
        async move {
            match fut {
                Some(fut) => fut.await,
                None => Ok(()),
            }
        }
    })
}

impl ClientInner {
    fn register_built_ins(self: &Arc<Self>) {
        let listeners = [
            built_in(self, names::WEBSOCKET_READY, Self::on_websocket_ready),
            built_in(self, names::RAW_INTERACTION_CREATE, Self::on_raw_interaction_create),
            built_in(self, names::RAW_MESSAGE_CREATE, Self::on_raw_message_create),
            built_in(self, names::MESSAGE_CREATE, Self::on_message_create),
            built_in(self, names::RAW_GUILD_CREATE, Self::on_raw_guild_create),
        ];
        for listener in listeners {
            if let Err(err) = self.dispatcher.add_listener(listener) {
                warn!(error = %err, "Failed to register built-in listener");
            }
        }
    }

    async fn on_websocket_ready(self: Arc<Self>, event: Event) -> HandlerResult {
        let data = event
            .raw_data()
            .context("websocket_ready carried no payload")?;
        let ready: ReadyPayload = serde_json::from_value(data.clone()).context("decoding READY")?;

        let expected: HashSet<Snowflake> = ready.guild_ids().into_iter().collect();
        let fill = self.gate.wait_for_guilds(expected).await;
        debug!(?fill, "Guild cache gate opened");

        self.init_interactions().await;

        self.gate.mark_ready();
        self.dispatcher.dispatch(Event::empty(names::READY));
        Ok(())
    }

    async fn init_interactions(&self) {
        let Some(app_id) = self.login.read().await.as_ref().map(|l| l.app.id) else {
            warn!("Skipping interaction setup: client is not logged in");
            return;
        };

        let mut guilds: BTreeSet<Snowflake> = self.gate.expected_guilds().await.into_iter().collect();
        guilds.extend(self.cache.guild_ids().await);
        let guilds: Vec<Snowflake> = guilds.into_iter().collect();

        let report = if self.config.sync_interactions {
            self.reconciler.synchronise(app_id, &guilds).await
        } else {
            self.reconciler.cache_interactions(app_id, &guilds, true).await
        };

        info!(
            pushed = report.pushed.len(),
            up_to_date = report.up_to_date.len(),
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            "Interactions initialised"
        );
        for failure in report.failures {
            let error = anyhow::Error::from(failure);
            run_hook(self.hooks.on_error("Interaction Syncing", &error)).await;
        }
    }

    async fn on_raw_interaction_create(self: Arc<Self>, event: Event) -> HandlerResult {
        let data = event.raw_data().context("interaction carried no payload")?;
        let raw: RawInteraction =
            serde_json::from_value(data.clone()).context("decoding interaction")?;
        self.router.route_interaction(raw).await?;
        Ok(())
    }

    async fn on_raw_message_create(self: Arc<Self>, event: Event) -> HandlerResult {
        let data = event.raw_data().context("message carried no payload")?;
        let message: MessagePayload =
            serde_json::from_value(data.clone()).context("decoding message")?;
        self.cache.place_user_data(message.author.clone()).await;
        self.dispatcher
            .dispatch(Event::message(names::MESSAGE_CREATE, message));
        Ok(())
    }

    async fn on_message_create(self: Arc<Self>, event: Event) -> HandlerResult {
        if let EventPayload::Message(message) = event.payload() {
            self.router.route_message(Arc::clone(message)).await;
        }
        Ok(())
    }

    async fn on_raw_guild_create(self: Arc<Self>, event: Event) -> HandlerResult {
        let data = event.raw_data().context("guild carried no payload")?;
        let guild: GuildPayload = serde_json::from_value(data.clone()).context("decoding guild")?;
        self.cache.place_guild_data(&guild).await;
        self.dispatcher.dispatch(Event::guild(names::GUILD_JOIN, guild));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use snek_transport::{MemoryHttp, ScriptedGateway};

    fn client() -> (Client, MemoryHttp) {
        let http = MemoryHttp::new(
            User::new(1u64, "bot").as_bot(),
            Application {
                id: Snowflake::new(100),
                name: "app".to_string(),
                owner: Some(User::new(7u64, "owner")),
            },
        );
        let client = Client::builder(Arc::new(http.clone()), Arc::new(ScriptedGateway::new())).build();
        (client, http)
    }

    #[tokio::test]
    async fn test_login_populates_state() {
        let (client, _) = client();
        let login = client.wait_for(names::LOGIN, |_| true, Some(Duration::from_secs(1)));

        let user = client.login(" token ").await.unwrap();

        assert_eq!(user.id, Snowflake::new(1));
        assert!(login.await.unwrap().is_empty());
        assert_eq!(client.app().await.unwrap().id, Snowflake::new(100));
        assert_eq!(client.owner().await.unwrap().username, "owner");
        assert!(client.start_time().await.is_some());
        assert!(client.cache().cached_user(Snowflake::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_run_gateway_requires_login() {
        let (client, _) = client();
        assert!(matches!(client.run_gateway().await, Err(SnekError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_built_ins_are_registered() {
        let (client, _) = client();
        for event in [
            names::WEBSOCKET_READY,
            names::RAW_INTERACTION_CREATE,
            names::RAW_MESSAGE_CREATE,
            names::MESSAGE_CREATE,
            names::RAW_GUILD_CREATE,
        ] {
            assert_eq!(client.dispatcher().listener_count(event).await.unwrap(), 1);
        }
        assert_eq!(client.remove_listeners(ListenerOrigin::User).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_change_presence_keeps_previous_values() {
        let (client, _) = client();
        client
            .change_presence(Some(Status::Idle), Some(Activity::create("chess")))
            .await;
        client.change_presence(None, None).await;

        assert_eq!(client.status().await, Status::Idle);
        assert_eq!(client.activity().await.unwrap().name, "chess");

        client.change_presence_named("DND", None).await.unwrap();
        assert_eq!(client.status().await, Status::Dnd);
        assert!(matches!(
            client.change_presence_named("sleepy", None).await,
            Err(SnekError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_guild_create_is_cached_and_rebroadcast() {
        let (client, _) = client();
        let joined = client.wait_for(names::GUILD_JOIN, |_| true, Some(Duration::from_secs(1)));

        client.dispatch(Event::raw("GUILD_CREATE", json!({"id": "55", "name": "snakes"})));

        let event = joined.await.unwrap();
        assert_eq!(event.as_guild().unwrap().id, Snowflake::new(55));
        assert_eq!(client.guild_ids().await, vec![Snowflake::new(55)]);
    }

    #[tokio::test]
    async fn test_message_create_caches_author() {
        let (client, _) = client();
        let created = client.wait_for(names::MESSAGE_CREATE, |_| true, Some(Duration::from_secs(1)));

        client.dispatch(Event::raw(
            "MESSAGE_CREATE",
            json!({
                "id": "9",
                "channel_id": "3",
                "author": {"id": "42", "username": "sam"},
                "content": "hello"
            }),
        ));

        let event = created.await.unwrap();
        assert_eq!(event.as_message().unwrap().content, "hello");
        assert!(client.cache().cached_user(Snowflake::new(42)).await.is_some());
    }
}
