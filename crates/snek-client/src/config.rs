//! Client configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! intents = 32509
//! default_prefix = "!"          # or "@mention"
//! sync_interactions = true
//! delete_unused_application_cmds = false
//! debug_scope = "123456789012345678"
//! guild_event_timeout_secs = 3
//! reconnect_delay_secs = 5
//! status = "online"
//!
//! [activity]
//! name = "with snakes"
//! type = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use snek_core::{Activity, Intents, Presence, Snowflake, Status};

use crate::command::Prefix;
use crate::error::{Result, SnekError};

const DEFAULT_GUILD_EVENT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub intents: Intents,
    /// Prefix for message commands.
    pub default_prefix: Prefix,
    /// Push local commands to the remote registry on ready. When off, only
    /// command ids are cached.
    pub sync_interactions: bool,
    /// Delete remote commands that have no local counterpart.
    pub delete_unused_application_cmds: bool,
    /// Re-scope every interaction command to this guild.
    pub debug_scope: Option<Snowflake>,
    /// Bound on each wait for a guild during startup.
    pub guild_event_timeout_secs: u64,
    /// Wait before a fresh reconnect after a failure.
    pub reconnect_delay_secs: u64,
    pub status: Status,
    pub activity: Option<Activity>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            intents: Intents::DEFAULT,
            default_prefix: Prefix::Mention,
            sync_interactions: true,
            delete_unused_application_cmds: false,
            debug_scope: None,
            guild_event_timeout_secs: DEFAULT_GUILD_EVENT_TIMEOUT_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            status: Status::Online,
            activity: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SnekError::InvalidArgument(format!("config: {e}")))
    }

    /// Loads a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SnekError::InvalidArgument(format!(
                "config {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn guild_event_timeout(&self) -> Duration {
        Duration::from_secs(self.guild_event_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Presence sent with the first IDENTIFY.
    pub fn presence(&self) -> Presence {
        Presence::new(self.status, self.activity.clone())
    }
}
