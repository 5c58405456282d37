//! In-memory transports.
//!
//! [`MemoryHttp`] keeps a remote command registry and entity store in a
//! mutex and records every call it serves. [`ScriptedGateway`] replays a
//! list of scripted steps per connection and records what the client
//! sent. Both are cheap to clone; clones share state, so a test can keep
//! one handle while the client owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use snek_core::{Application, Channel, Member, Scope, Snowflake, User};
use snek_protocol::{
    ApplicationCommandPayload, GatewayFrame, GuildCommandPermissions, GuildPayload, OpCode,
};

use crate::error::{HttpError, TransportError};
use crate::gateway::{FrameSocket, GatewayConnector, SocketEvent};
use crate::http::{HttpResult, HttpTransport};

/// First id handed out for newly registered commands.
const FIRST_COMMAND_ID: u64 = 900_000_000_000_000_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn commands_route(app_id: Snowflake, scope: Scope) -> String {
    match scope {
        Scope::Global => format!("/applications/{app_id}/commands"),
        Scope::Guild(guild) => format!("/applications/{app_id}/guilds/{guild}/commands"),
    }
}

// ============================================================================
// Recorded HTTP Calls
// ============================================================================

/// A REST call served by [`MemoryHttp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCall {
    Login,
    GetApplication,
    GetCommands { scope: Scope },
    PostCommands { scope: Scope, names: Vec<String> },
    DeleteCommand { scope: Scope, id: Snowflake },
    SetPermissions { guild_id: Snowflake, commands: usize },
    GetGuild { guild_id: Snowflake },
    GetChannel { channel_id: Snowflake },
    GetUser { user_id: Snowflake },
    GetMember { guild_id: Snowflake, user_id: Snowflake },
}

impl HttpCall {
    /// True for calls that mutate the remote registry.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::PostCommands { .. } | Self::DeleteCommand { .. } | Self::SetPermissions { .. }
        )
    }
}

impl fmt::Display for HttpCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::GetApplication => write!(f, "get application"),
            Self::GetCommands { scope } => write!(f, "get commands [{scope}]"),
            Self::PostCommands { scope, names } => {
                write!(f, "overwrite commands [{scope}]: {}", names.join(", "))
            }
            Self::DeleteCommand { scope, id } => write!(f, "delete command {id} [{scope}]"),
            Self::SetPermissions { guild_id, commands } => {
                write!(f, "set permissions [{guild_id}]: {commands} command(s)")
            }
            Self::GetGuild { guild_id } => write!(f, "get guild {guild_id}"),
            Self::GetChannel { channel_id } => write!(f, "get channel {channel_id}"),
            Self::GetUser { user_id } => write!(f, "get user {user_id}"),
            Self::GetMember { guild_id, user_id } => {
                write!(f, "get member {user_id} in {guild_id}")
            }
        }
    }
}

// ============================================================================
// MemoryHttp
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    commands: HashMap<Scope, Vec<ApplicationCommandPayload>>,
    permissions: HashMap<Snowflake, Vec<GuildCommandPermissions>>,
    forbidden: HashSet<Scope>,
    guilds: HashMap<Snowflake, GuildPayload>,
    channels: HashMap<Snowflake, Channel>,
    users: HashMap<Snowflake, User>,
    members: HashMap<(Snowflake, Snowflake), Member>,
    calls: Vec<HttpCall>,
    next_id: u64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> Snowflake {
        let id = FIRST_COMMAND_ID.saturating_add(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        Snowflake::new(id)
    }

    fn check_access(&self, route: &str, scope: Scope) -> HttpResult<()> {
        if self.forbidden.contains(&scope) {
            return Err(HttpError::forbidden(route));
        }
        Ok(())
    }
}

/// An in-memory REST control plane.
#[derive(Debug, Clone)]
pub struct MemoryHttp {
    user: User,
    application: Application,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHttp {
    /// Creates a store that logs in as `user` and owns `application`.
    pub fn new(user: User, application: Application) -> Self {
        Self {
            user,
            application,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Seeds the remote command list for `scope`. Commands without an id get one.
    #[must_use]
    pub fn with_commands(self, scope: Scope, commands: Vec<ApplicationCommandPayload>) -> Self {
        {
            let mut state = lock(&self.state);
            let mut seeded = Vec::with_capacity(commands.len());
            for mut command in commands {
                if command.id.is_none() {
                    command.id = Some(state.allocate_id());
                }
                command.guild_id = scope.guild_id();
                seeded.push(command);
            }
            state.commands.insert(scope, seeded);
        }
        self
    }

    /// Makes every command call against `scope` fail with Forbidden.
    #[must_use]
    pub fn forbid(self, scope: Scope) -> Self {
        lock(&self.state).forbidden.insert(scope);
        self
    }

    #[must_use]
    pub fn with_guild(self, guild: GuildPayload) -> Self {
        lock(&self.state).guilds.insert(guild.id, guild);
        self
    }

    #[must_use]
    pub fn with_channel(self, channel: Channel) -> Self {
        lock(&self.state).channels.insert(channel.id, channel);
        self
    }

    #[must_use]
    pub fn with_user(self, user: User) -> Self {
        lock(&self.state).users.insert(user.id, user);
        self
    }

    #[must_use]
    pub fn with_member(self, member: Member) -> Self {
        lock(&self.state)
            .members
            .insert((member.guild_id, member.user.id), member);
        self
    }

    /// Every call served so far, in order.
    pub fn calls(&self) -> Vec<HttpCall> {
        lock(&self.state).calls.clone()
    }

    /// Only the calls that mutated the registry.
    pub fn write_calls(&self) -> Vec<HttpCall> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Current remote commands for `scope`.
    pub fn commands(&self, scope: Scope) -> Vec<ApplicationCommandPayload> {
        lock(&self.state)
            .commands
            .get(&scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Last permissions pushed to `guild_id`.
    pub fn permissions(&self, guild_id: Snowflake) -> Vec<GuildCommandPermissions> {
        lock(&self.state)
            .permissions
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: HttpCall) -> MutexGuard<'_, MemoryState> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl HttpTransport for MemoryHttp {
    async fn login(&self, token: &str) -> HttpResult<User> {
        let _state = self.record(HttpCall::Login);
        if token.trim().is_empty() {
            return Err(HttpError::Other("an improper token was passed".to_string()));
        }
        Ok(self.user.clone())
    }

    async fn get_current_application(&self) -> HttpResult<Application> {
        let _state = self.record(HttpCall::GetApplication);
        Ok(self.application.clone())
    }

    async fn get_commands(
        &self,
        app_id: Snowflake,
        scope: Scope,
    ) -> HttpResult<Vec<ApplicationCommandPayload>> {
        let state = self.record(HttpCall::GetCommands { scope });
        state.check_access(&commands_route(app_id, scope), scope)?;
        Ok(state.commands.get(&scope).cloned().unwrap_or_default())
    }

    async fn post_commands(
        &self,
        app_id: Snowflake,
        commands: &[ApplicationCommandPayload],
        scope: Scope,
    ) -> HttpResult<Vec<ApplicationCommandPayload>> {
        let names = commands.iter().map(|c| c.name.clone()).collect();
        let mut state = self.record(HttpCall::PostCommands { scope, names });
        state.check_access(&commands_route(app_id, scope), scope)?;

        let existing: HashMap<String, Snowflake> = state
            .commands
            .get(&scope)
            .map(|cmds| {
                cmds.iter()
                    .filter_map(|c| c.id.map(|id| (c.name.clone(), id)))
                    .collect()
            })
            .unwrap_or_default();

        let mut registered = Vec::with_capacity(commands.len());
        for command in commands {
            let mut command = command.clone();
            command.id = match existing.get(&command.name) {
                Some(id) => Some(*id),
                None => Some(state.allocate_id()),
            };
            command.application_id = Some(app_id);
            command.guild_id = scope.guild_id();
            registered.push(command);
        }

        debug!(scope = %scope, count = registered.len(), "Overwrote remote commands");
        state.commands.insert(scope, registered.clone());
        Ok(registered)
    }

    async fn delete_command(&self, app_id: Snowflake, scope: Scope, id: Snowflake) -> HttpResult<()> {
        let mut state = self.record(HttpCall::DeleteCommand { scope, id });
        let route = format!("{}/{id}", commands_route(app_id, scope));
        state.check_access(&route, scope)?;

        let cmds = state.commands.entry(scope).or_default();
        let before = cmds.len();
        cmds.retain(|c| c.id != Some(id));
        if cmds.len() == before {
            return Err(HttpError::not_found(route));
        }
        Ok(())
    }

    async fn set_permissions(
        &self,
        app_id: Snowflake,
        guild_id: Snowflake,
        data: &[GuildCommandPermissions],
    ) -> HttpResult<()> {
        let mut state = self.record(HttpCall::SetPermissions {
            guild_id,
            commands: data.len(),
        });
        let route = format!("/applications/{app_id}/guilds/{guild_id}/commands/permissions");
        state.check_access(&route, Scope::Guild(guild_id))?;
        state.permissions.insert(guild_id, data.to_vec());
        Ok(())
    }

    async fn get_guild(&self, guild_id: Snowflake) -> HttpResult<GuildPayload> {
        let state = self.record(HttpCall::GetGuild { guild_id });
        state
            .guilds
            .get(&guild_id)
            .cloned()
            .ok_or_else(|| HttpError::not_found(format!("/guilds/{guild_id}")))
    }

    async fn get_channel(&self, channel_id: Snowflake) -> HttpResult<Channel> {
        let state = self.record(HttpCall::GetChannel { channel_id });
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| HttpError::not_found(format!("/channels/{channel_id}")))
    }

    async fn get_user(&self, user_id: Snowflake) -> HttpResult<User> {
        let state = self.record(HttpCall::GetUser { user_id });
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| HttpError::not_found(format!("/users/{user_id}")))
    }

    async fn get_member(&self, guild_id: Snowflake, user_id: Snowflake) -> HttpResult<Member> {
        let state = self.record(HttpCall::GetMember { guild_id, user_id });
        state
            .members
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or_else(|| HttpError::not_found(format!("/guilds/{guild_id}/members/{user_id}")))
    }
}

// ============================================================================
// ScriptedGateway
// ============================================================================

/// One scripted step of a gateway connection, replayed by `recv`.
#[derive(Debug)]
pub enum ScriptStep {
    /// Deliver a frame.
    Frame(GatewayFrame),
    /// The remote closes the socket with this code.
    Close(u16),
    /// The socket fails with this error.
    Fail(TransportError),
    /// Deliver nothing for this long.
    Wait(Duration),
    /// Deliver nothing, ever.
    Pending,
}

impl ScriptStep {
    /// HELLO with the given heartbeat interval.
    pub fn hello(heartbeat_interval: Duration) -> Self {
        let ms = u64::try_from(heartbeat_interval.as_millis()).unwrap_or(u64::MAX);
        Self::Frame(GatewayFrame::hello(ms))
    }

    /// READY for `user` listing `guild_ids` as unavailable guilds.
    pub fn ready(seq: u64, session_id: &str, user: &User, guild_ids: &[Snowflake]) -> Self {
        let guilds: Vec<Value> = guild_ids
            .iter()
            .map(|id| json!({"id": id.to_string(), "unavailable": true}))
            .collect();
        let d = json!({
            "session_id": session_id,
            "user": {"id": user.id.to_string(), "username": user.username, "bot": user.bot},
            "guilds": guilds,
        });
        Self::Frame(GatewayFrame::dispatch("READY", seq, d))
    }

    /// A DISPATCH frame.
    pub fn dispatch(event: &str, seq: u64, d: Value) -> Self {
        Self::Frame(GatewayFrame::dispatch(event, seq, d))
    }
}

#[derive(Debug)]
enum ConnectScript {
    Open(VecDeque<ScriptStep>),
    Refuse(TransportError),
}

#[derive(Debug, Default)]
struct GatewayRecord {
    scripts: VecDeque<ConnectScript>,
    attempts: Vec<Instant>,
    sent: Vec<Vec<GatewayFrame>>,
    closes: Vec<Option<u16>>,
}

/// A gateway whose connections replay pre-recorded scripts.
///
/// Each `connect` consumes the next script. Once the scripts run out,
/// `connect` never completes, which parks the reconnect loop until it is
/// cancelled. Heartbeats sent by the client are acknowledged automatically.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    record: Arc<Mutex<GatewayRecord>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection that replays `steps`.
    #[must_use]
    pub fn with_connection(self, steps: Vec<ScriptStep>) -> Self {
        self.push_connection(steps);
        self
    }

    /// Queues a connection attempt that fails with `err`.
    #[must_use]
    pub fn with_refusal(self, err: TransportError) -> Self {
        lock(&self.record)
            .scripts
            .push_back(ConnectScript::Refuse(err));
        self
    }

    pub fn push_connection(&self, steps: Vec<ScriptStep>) {
        lock(&self.record)
            .scripts
            .push_back(ConnectScript::Open(steps.into()));
    }

    /// Instants of every connect attempt, including refused and parked ones.
    pub fn attempts(&self) -> Vec<Instant> {
        lock(&self.record).attempts.clone()
    }

    /// Number of sockets actually opened.
    pub fn connection_count(&self) -> usize {
        lock(&self.record).sent.len()
    }

    /// Frames the client sent on connection `index`.
    pub fn sent(&self, index: usize) -> Vec<GatewayFrame> {
        lock(&self.record)
            .sent
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Close code the client used on connection `index`, if it closed it.
    pub fn closed_with(&self, index: usize) -> Option<u16> {
        lock(&self.record).closes.get(index).copied().flatten()
    }
}

#[async_trait]
impl GatewayConnector for ScriptedGateway {
    async fn connect(&self) -> Result<Box<dyn FrameSocket>, TransportError> {
        let next = {
            let mut record = lock(&self.record);
            record.attempts.push(Instant::now());
            match record.scripts.pop_front() {
                Some(ConnectScript::Open(steps)) => {
                    let index = record.sent.len();
                    record.sent.push(Vec::new());
                    record.closes.push(None);
                    Some(Ok((index, steps)))
                }
                Some(ConnectScript::Refuse(err)) => Some(Err(err)),
                None => None,
            }
        };

        match next {
            Some(Ok((index, steps))) => Ok(Box::new(ScriptedSocket {
                index,
                steps,
                record: Arc::clone(&self.record),
                wait_until: None,
                pending_acks: 0,
                closed: None,
            })),
            Some(Err(err)) => Err(err),
            None => {
                debug!("Gateway script exhausted, parking connect attempt");
                std::future::pending().await
            }
        }
    }
}

struct ScriptedSocket {
    index: usize,
    steps: VecDeque<ScriptStep>,
    record: Arc<Mutex<GatewayRecord>>,
    wait_until: Option<Instant>,
    pending_acks: usize,
    closed: Option<u16>,
}

#[async_trait]
impl FrameSocket for ScriptedSocket {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError> {
        if self.closed.is_some() {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is closed",
            )));
        }
        if frame.opcode() == OpCode::Heartbeat {
            self.pending_acks = self.pending_acks.saturating_add(1);
        }
        if let Some(sent) = lock(&self.record).sent.get_mut(self.index) {
            sent.push(frame.clone());
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<SocketEvent, TransportError> {
        loop {
            if let Some(code) = self.closed {
                return Ok(SocketEvent::Closed(code));
            }
            if self.pending_acks > 0 {
                self.pending_acks -= 1;
                return Ok(SocketEvent::Frame(GatewayFrame::heartbeat_ack()));
            }

            match self.steps.front() {
                None | Some(ScriptStep::Pending) => std::future::pending::<()>().await,
                Some(ScriptStep::Wait(duration)) => {
                    let duration = *duration;
                    let deadline = *self
                        .wait_until
                        .get_or_insert_with(|| Instant::now() + duration);
                    sleep_until(deadline).await;
                    self.wait_until = None;
                    self.steps.pop_front();
                }
                Some(_) => match self.steps.pop_front() {
                    Some(ScriptStep::Frame(frame)) => return Ok(SocketEvent::Frame(frame)),
                    Some(ScriptStep::Close(code)) => {
                        self.closed = Some(code);
                        return Ok(SocketEvent::Closed(code));
                    }
                    Some(ScriptStep::Fail(err)) => return Err(err),
                    _ => {}
                },
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        self.closed = Some(code);
        if let Some(slot) = lock(&self.record).closes.get_mut(self.index) {
            *slot = Some(code);
        }
        Ok(())
    }
}
