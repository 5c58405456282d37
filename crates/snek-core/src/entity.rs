//! Minimal domain entities.
//!
//! Only the fields the client routes on or displays are modelled. Unknown
//! fields are dropped by serde's default deserialization.

use serde::{Deserialize, Serialize};

use crate::Snowflake;

/// A platform user (human or bot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<Snowflake>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            discriminator: None,
            bot: false,
        }
    }

    /// Marks this user as a bot account.
    #[must_use]
    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }

    /// Returns the `<@id>` mention string.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A user's membership in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub guild_id: Snowflake,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
}

impl Member {
    pub fn new(guild_id: Snowflake, user: User) -> Self {
        Self {
            guild_id,
            user,
            nick: None,
            roles: Vec::new(),
        }
    }

    /// Nickname if set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.username)
    }
}

/// A guild or direct-message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

impl Channel {
    pub fn new(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: 0,
            name: Some(name.into()),
            guild_id: None,
        }
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

impl Role {
    pub fn new(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            guild_id: None,
        }
    }
}

/// A guild (server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unavailable: bool,
}

impl Guild {
    pub fn new(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unavailable: false,
        }
    }
}

/// The bot's application record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_decodes_with_missing_fields() {
        let user: User = serde_json::from_str(r#"{"id": "10", "username": "snek"}"#).unwrap();
        assert_eq!(user.id, Snowflake::new(10));
        assert!(!user.bot);
        assert_eq!(user.mention(), "<@10>");
    }

    #[test]
    fn test_member_display_name() {
        let mut member = Member::new(Snowflake::new(1), User::new(2u64, "alice"));
        assert_eq!(member.display_name(), "alice");
        member.nick = Some("al".to_string());
        assert_eq!(member.display_name(), "al");
    }

    #[test]
    fn test_channel_type_field() {
        let channel: Channel =
            serde_json::from_str(r#"{"id": "5", "type": 2, "name": "voice"}"#).unwrap();
        assert_eq!(channel.kind, 2);
        assert_eq!(channel.name.as_deref(), Some("voice"));
    }
}
