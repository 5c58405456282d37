//! Presence: online status and activity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Online status shown for the bot user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    Idle,
    Dnd,
    Invisible,
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Invisible => "invisible",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = DomainError;

    /// Case-insensitive; `afk` is accepted as an alias for idle.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "idle" | "afk" => Ok(Self::Idle),
            "dnd" | "do_not_disturb" => Ok(Self::Dnd),
            "invisible" => Ok(Self::Invisible),
            "offline" => Ok(Self::Offline),
            _ => Err(DomainError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of activity displayed under the bot's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivityType {
    #[default]
    Game,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
}

impl ActivityType {
    pub fn code(self) -> u8 {
        match self {
            Self::Game => 0,
            Self::Streaming => 1,
            Self::Listening => 2,
            Self::Watching => 3,
            Self::Custom => 4,
            Self::Competing => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Game),
            1 => Some(Self::Streaming),
            2 => Some(Self::Listening),
            3 => Some(Self::Watching),
            4 => Some(Self::Custom),
            5 => Some(Self::Competing),
            _ => None,
        }
    }

    /// Bots may only reliably use game, streaming and listening activities.
    pub fn is_bot_supported(self) -> bool {
        matches!(self, Self::Game | Self::Streaming | Self::Listening)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Game => "GAME",
            Self::Streaming => "STREAMING",
            Self::Listening => "LISTENING",
            Self::Watching => "WATCHING",
            Self::Custom => "CUSTOM",
            Self::Competing => "COMPETING",
        };
        f.write_str(name)
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown activity type {code}")))
    }
}

/// An activity shown in the bot's presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Activity {
    /// Creates a "playing" activity with the given name.
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActivityType::Game,
            url: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ActivityType) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl From<&str> for Activity {
    fn from(name: &str) -> Self {
        Self::create(name)
    }
}

impl From<String> for Activity {
    fn from(name: String) -> Self {
        Self::create(name)
    }
}

/// Presence payload sent with IDENTIFY and presence updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub status: Status,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(default)]
    pub afk: bool,
}

impl Presence {
    pub fn new(status: Status, activity: Option<Activity>) -> Self {
        Self {
            status,
            activities: activity.into_iter().collect(),
            since: None,
            afk: false,
        }
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new(Status::Online, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str_case_insensitive() {
        assert_eq!("ONLINE".parse::<Status>().unwrap(), Status::Online);
        assert_eq!("Dnd".parse::<Status>().unwrap(), Status::Dnd);
        assert_eq!("afk".parse::<Status>().unwrap(), Status::Idle);
        assert!(matches!(
            "sleepy".parse::<Status>(),
            Err(DomainError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_activity_serialization() {
        let activity = Activity::create("chess").with_kind(ActivityType::Listening);
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], 2);
        assert_eq!(json["name"], "chess");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_activity_type_support() {
        assert!(ActivityType::Streaming.is_bot_supported());
        assert!(!ActivityType::Watching.is_bot_supported());
    }

    #[test]
    fn test_presence_payload() {
        let presence = Presence::new(Status::Idle, Some(Activity::create("tests")));
        let json = serde_json::to_value(&presence).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["activities"][0]["name"], "tests");
        assert_eq!(json["afk"], false);
    }
}
