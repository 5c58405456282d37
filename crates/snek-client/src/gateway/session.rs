//! One gateway connection: handshake, heartbeat and inbound frames.
//!
//! ```text
//! connect ──▶ HELLO ──▶ IDENTIFY | RESUME ──▶ run loop ──▶ ends with
//!                                              │           Ok (deliberate close)
//!                                              │           Err(GatewayError)
//!                        select! { socket frame, heartbeat tick, command }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use snek_core::{Intents, Presence};
use snek_protocol::{
    ConnectionProperties, GatewayFrame, HelloPayload, IdentifyPayload, OpCode, ReadyPayload,
    ResumePayload,
};
use snek_transport::{FrameSocket, GatewayConnector, SocketEvent};

use crate::dispatch::Dispatcher;
use crate::event::{names, Event, EventPayload};

use super::GatewayError;

/// Session id and sequence to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeState {
    pub session_id: String,
    pub sequence: Option<u64>,
}

/// Parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub token: String,
    pub intents: Intents,
    /// `Some` to RESUME, `None` to IDENTIFY.
    pub resume: Option<ResumeState>,
    pub presence: Presence,
}

/// Live view of the session state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
    /// Round trip of the last acknowledged heartbeat.
    pub latency: Option<Duration>,
}

impl SessionInfo {
    /// Resume state, if the session has an id.
    pub fn resume_state(&self) -> Option<ResumeState> {
        self.session_id.clone().map(|session_id| ResumeState {
            session_id,
            sequence: self.sequence,
        })
    }
}

#[derive(Debug)]
enum SessionCommand {
    Close { code: u16 },
    Presence(Box<Presence>),
}

// ============================================================================
// Session Handle
// ============================================================================

/// Controls a running session from other tasks.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    info: watch::Receiver<SessionInfo>,
}

impl SessionHandle {
    /// Asks the session to close the socket with `code` and end cleanly.
    ///
    /// Returns false if the session has already ended.
    pub fn close(&self, code: u16) -> bool {
        self.commands.send(SessionCommand::Close { code }).is_ok()
    }

    /// Sends a live presence update.
    pub fn change_presence(&self, presence: Presence) -> bool {
        self.commands
            .send(SessionCommand::Presence(Box::new(presence)))
            .is_ok()
    }

    pub fn info(&self) -> SessionInfo {
        self.info.borrow().clone()
    }

    pub fn latency(&self) -> Option<Duration> {
        self.info.borrow().latency
    }
}

// ============================================================================
// Gateway Session
// ============================================================================

pub struct GatewaySession {
    socket: Box<dyn FrameSocket>,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    info: watch::Sender<SessionInfo>,
    heartbeat_interval: Duration,
    last_heartbeat: Option<Instant>,
    ack_pending: bool,
}

impl GatewaySession {
    /// Opens a socket and performs the handshake.
    ///
    /// # Errors
    ///
    /// Any transport failure, a close before HELLO, or a first frame
    /// other than HELLO.
    pub async fn connect(
        connector: &dyn GatewayConnector,
        params: &SessionParams,
        dispatcher: Dispatcher,
    ) -> Result<(Self, SessionHandle), GatewayError> {
        let mut socket = connector.connect().await?;

        let hello = match socket.recv().await? {
            SocketEvent::Frame(frame) if frame.opcode() == OpCode::Hello => {
                frame.decode::<HelloPayload>("HELLO")?
            }
            SocketEvent::Frame(frame) => {
                return Err(GatewayError::Unexpected(format!(
                    "expected HELLO, got opcode {}",
                    frame.op
                )))
            }
            SocketEvent::Closed(code) => return Err(GatewayError::Closed { code }),
        };
        debug!(interval_ms = hello.heartbeat_interval, "Received HELLO");

        let handshake = match &params.resume {
            Some(state) => {
                info!(session_id = %state.session_id, sequence = ?state.sequence, "Resuming gateway session");
                GatewayFrame::resume(&ResumePayload {
                    token: params.token.clone(),
                    session_id: state.session_id.clone(),
                    seq: state.sequence,
                })?
            }
            None => {
                info!(intents = %params.intents, "Identifying new gateway session");
                GatewayFrame::identify(&IdentifyPayload {
                    token: params.token.clone(),
                    intents: params.intents,
                    properties: ConnectionProperties::default(),
                    presence: params.presence.clone(),
                })?
            }
        };
        socket.send(&handshake).await?;

        let initial = params
            .resume
            .as_ref()
            .map(|state| SessionInfo {
                session_id: Some(state.session_id.clone()),
                sequence: state.sequence,
                latency: None,
            })
            .unwrap_or_default();
        let (info_tx, info_rx) = watch::channel(initial);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let session = Self {
            socket,
            dispatcher,
            commands: cmd_rx,
            info: info_tx,
            heartbeat_interval: hello.interval(),
            last_heartbeat: None,
            ack_pending: false,
        };
        let handle = SessionHandle {
            commands: cmd_tx,
            info: info_rx,
        };
        Ok((session, handle))
    }

    /// Runs until the connection ends.
    ///
    /// Returns `Ok(())` only after a deliberate close through the handle.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let interval = self.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.socket.recv() => match event? {
                    SocketEvent::Frame(frame) => self.handle_frame(frame).await?,
                    SocketEvent::Closed(code) => {
                        info!(code, "Gateway closed the connection");
                        return Err(GatewayError::Closed { code });
                    }
                },
                _ = heartbeat.tick() => {
                    if self.ack_pending {
                        warn!("Heartbeat was not acknowledged, restarting session");
                        return Err(GatewayError::Restart { resume: true });
                    }
                    self.send_heartbeat().await?;
                }
                Some(command) = self.commands.recv() => match command {
                    SessionCommand::Close { code } => {
                        debug!(code, "Closing gateway session");
                        self.socket.close(code).await?;
                        return Ok(());
                    }
                    SessionCommand::Presence(presence) => {
                        self.socket.send(&GatewayFrame::presence_update(&presence)?).await?;
                    }
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: GatewayFrame) -> Result<(), GatewayError> {
        match frame.opcode() {
            OpCode::Dispatch => self.handle_dispatch(frame),
            OpCode::Heartbeat => {
                trace!("Heartbeat requested by gateway");
                self.send_heartbeat().await?;
                Ok(())
            }
            OpCode::HeartbeatAck => {
                self.ack_pending = false;
                if let Some(sent) = self.last_heartbeat {
                    let latency = sent.elapsed();
                    self.info.send_modify(|info| info.latency = Some(latency));
                }
                Ok(())
            }
            OpCode::Reconnect => {
                info!("Gateway requested a reconnect");
                Err(GatewayError::Restart { resume: true })
            }
            OpCode::InvalidSession => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                warn!(resumable, "Gateway invalidated the session");
                Err(GatewayError::Restart { resume: resumable })
            }
            other => {
                debug!(op = other.code(), "Ignoring gateway frame");
                Ok(())
            }
        }
    }

    fn handle_dispatch(&mut self, frame: GatewayFrame) -> Result<(), GatewayError> {
        if let Some(seq) = frame.s {
            self.info.send_modify(|info| info.sequence = Some(seq));
        }
        let name = frame.event_name().unwrap_or_default().to_string();

        match name.as_str() {
            "READY" => {
                let ready: ReadyPayload = frame.decode("READY")?;
                info!(session_id = %ready.session_id, guilds = ready.guilds.len(), "Gateway session ready");
                self.info
                    .send_modify(|info| info.session_id = Some(ready.session_id.clone()));
                self.dispatcher.dispatch(Event::new(
                    names::WEBSOCKET_READY,
                    EventPayload::Raw(Arc::new(frame.d)),
                ));
            }
            "RESUMED" => {
                info!("Gateway session resumed");
                self.dispatcher.dispatch(Event::empty(names::RESUME));
            }
            "" => debug!("Dispatch frame without an event name"),
            _ => self.dispatcher.dispatch(Event::raw(&name, frame.d)),
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), GatewayError> {
        let sequence = self.info.borrow().sequence;
        self.socket.send(&GatewayFrame::heartbeat(sequence)).await?;
        self.last_heartbeat = Some(Instant::now());
        self.ack_pending = true;
        Ok(())
    }
}
