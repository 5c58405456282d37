//! Gateway frames and handshake payloads.
//!
//! Every frame on the socket is a JSON object `{op, d, s, t}`. Only
//! DISPATCH frames carry a sequence number and event name.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use snek_core::{Guild, Intents, Presence, User};

use crate::error::ProtocolError;

// ============================================================================
// Opcodes
// ============================================================================

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Dispatch,
    Heartbeat,
    Identify,
    PresenceUpdate,
    VoiceStateUpdate,
    Resume,
    Reconnect,
    RequestGuildMembers,
    InvalidSession,
    Hello,
    HeartbeatAck,
    Unknown(u8),
}

impl OpCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(code) => code,
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// A single gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Creates a frame with the given opcode and data.
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op.code(),
            d,
            s: None,
            t: None,
        }
    }

    /// Creates a frame whose data is the serialized form of `payload`.
    pub fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, ProtocolError> {
        let d = serde_json::to_value(payload).map_err(|e| ProtocolError::decode("frame data", e))?;
        Ok(Self::new(op, d))
    }

    /// Creates a DISPATCH frame.
    pub fn dispatch(event: impl Into<String>, seq: u64, d: Value) -> Self {
        Self {
            op: OpCode::Dispatch.code(),
            d,
            s: Some(seq),
            t: Some(event.into()),
        }
    }

    /// Creates a HEARTBEAT frame carrying the last seen sequence number.
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, seq.map_or(Value::Null, Value::from))
    }

    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, Value::Null)
    }

    /// Creates a HELLO frame with the heartbeat interval in milliseconds.
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        let mut d = serde_json::Map::new();
        d.insert("heartbeat_interval".to_string(), Value::from(heartbeat_interval_ms));
        Self::new(OpCode::Hello, Value::Object(d))
    }

    pub fn identify(payload: &IdentifyPayload) -> Result<Self, ProtocolError> {
        Self::with_payload(OpCode::Identify, payload)
    }

    pub fn resume(payload: &ResumePayload) -> Result<Self, ProtocolError> {
        Self::with_payload(OpCode::Resume, payload)
    }

    pub fn presence_update(presence: &Presence) -> Result<Self, ProtocolError> {
        Self::with_payload(OpCode::PresenceUpdate, presence)
    }

    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// Creates an INVALID_SESSION frame; `resumable` is carried as the data.
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    pub fn opcode(&self) -> OpCode {
        OpCode::from_code(self.op)
    }

    /// Event name of a DISPATCH frame.
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Decodes the frame data into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self, what: &'static str) -> Result<T, ProtocolError> {
        T::deserialize(&self.d).map_err(|e| ProtocolError::decode(what, e))
    }

    /// Parses a frame from socket text.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::decode("gateway frame", e))
    }

    /// Serializes the frame to socket text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::decode("gateway frame", e))
    }
}

// ============================================================================
// Handshake Payloads
// ============================================================================

/// HELLO payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }
}

/// Client identification sent with IDENTIFY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "snek".to_string(),
            device: "snek".to_string(),
        }
    }
}

/// IDENTIFY payload: starts a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    #[serde(default)]
    pub properties: ConnectionProperties,
    pub presence: Presence,
}

/// RESUME payload: continues a prior session from a sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: Option<u64>,
}

/// READY dispatch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user: User,
    /// Guilds the bot is in; initially unavailable until their GUILD_CREATE.
    #[serde(default)]
    pub guilds: Vec<Guild>,
}

impl ReadyPayload {
    pub fn guild_ids(&self) -> Vec<snek_core::Snowflake> {
        self.guilds.iter().map(|g| g.id).collect()
    }
}
