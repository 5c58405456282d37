//! Typed payloads for inbound dispatch events.
//!
//! Fields the client never routes on are left out; serde drops them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use snek_core::{
    Channel, ComponentType, Guild, InteractionType, Member, OptionType, Role, Snowflake, User,
};

// ============================================================================
// Interactions
// ============================================================================

/// An inbound INTERACTION_CREATE payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInteraction {
    pub id: Snowflake,
    #[serde(default)]
    pub application_id: Option<Snowflake>,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    /// Present for guild invocations.
    #[serde(default)]
    pub member: Option<Member>,
    /// Present for direct-message invocations.
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: String,
    /// The message a component is attached to.
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

impl RawInteraction {
    pub fn interaction_type(&self) -> InteractionType {
        InteractionType::from_code(self.kind)
    }

    /// The invoking user, from the member object in guilds or the user object in DMs.
    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())
    }

    /// Id of the invoked application command, if any.
    pub fn command_id(&self) -> Option<Snowflake> {
        self.data.as_ref().and_then(|d| d.id)
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.custom_id.as_deref())
    }

    pub fn component_type(&self) -> Option<ComponentType> {
        self.data
            .as_ref()
            .and_then(|d| d.component_type)
            .map(ComponentType::from_code)
    }
}

/// The `data` object of an interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<RawOption>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub component_type: Option<u8>,
    /// Selected values for select menus.
    #[serde(default)]
    pub values: Vec<String>,
}

/// A supplied option, possibly nesting sub-command options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<RawOption>,
    #[serde(default)]
    pub focused: bool,
}

impl RawOption {
    pub fn new(name: impl Into<String>, kind: OptionType, value: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            value: Some(value),
            options: Vec::new(),
            focused: false,
        }
    }

    /// Creates a sub-command or group option wrapping `options`.
    pub fn nested(name: impl Into<String>, kind: OptionType, options: Vec<RawOption>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            options,
            focused: false,
        }
    }

    #[must_use]
    pub fn focused(mut self) -> Self {
        self.focused = true;
        self
    }
}

// ============================================================================
// Messages
// ============================================================================

/// An inbound MESSAGE_CREATE payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: Snowflake,
    #[serde(default)]
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub author: User,
    #[serde(default)]
    pub content: String,
}

impl MessagePayload {
    pub fn new(id: impl Into<Snowflake>, author: User, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: Snowflake::default(),
            guild_id: None,
            author,
            content: content.into(),
        }
    }
}

// ============================================================================
// Guilds
// ============================================================================

/// An inbound GUILD_CREATE payload with the entities the cache keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildPayload {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl GuildPayload {
    pub fn new(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unavailable: false,
            channels: Vec::new(),
            roles: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn guild(&self) -> Guild {
        Guild {
            id: self.id,
            name: self.name.clone(),
            unavailable: self.unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_decode_nested_options() {
        let raw: RawInteraction = serde_json::from_value(serde_json::json!({
            "id": "100",
            "type": 2,
            "guild_id": "5",
            "token": "tok",
            "member": {"user": {"id": "7", "username": "alice"}, "roles": []},
            "data": {
                "id": "55",
                "name": "config",
                "options": [{
                    "name": "set",
                    "type": 1,
                    "options": [{"name": "who", "type": 6, "value": "8"}]
                }]
            }
        }))
        .unwrap();

        assert_eq!(raw.interaction_type(), InteractionType::ApplicationCommand);
        assert_eq!(raw.command_id(), Some(Snowflake::new(55)));
        assert_eq!(raw.author().map(|u| u.id), Some(Snowflake::new(7)));

        let data = raw.data.unwrap();
        let sub = &data.options[0];
        assert_eq!(sub.kind, OptionType::SubCommand);
        assert_eq!(sub.options[0].kind, OptionType::User);
        assert_eq!(sub.options[0].value, Some(serde_json::json!("8")));
    }

    #[test]
    fn test_component_interaction() {
        let raw: RawInteraction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "type": 3,
            "user": {"id": "2", "username": "bob"},
            "data": {"custom_id": "confirm", "component_type": 2},
            "message": {"id": "9", "channel_id": "3", "author": {"id": "4", "bot": true}}
        }))
        .unwrap();

        assert_eq!(raw.custom_id(), Some("confirm"));
        assert_eq!(raw.component_type(), Some(ComponentType::Button));
        assert_eq!(raw.author().map(|u| u.username.as_str()), Some("bob"));
        assert_eq!(raw.message.map(|m| m.id), Some(Snowflake::new(9)));
    }

    #[test]
    fn test_guild_payload_decode() {
        let guild: GuildPayload = serde_json::from_value(serde_json::json!({
            "id": "10",
            "name": "home",
            "channels": [{"id": "11", "type": 0, "name": "general"}],
            "roles": [{"id": "12", "name": "mods"}],
            "members": [{"user": {"id": "13", "username": "carol"}}]
        }))
        .unwrap();
        assert_eq!(guild.guild().name, "home");
        assert_eq!(guild.channels.len(), 1);
        assert_eq!(guild.roles[0].name, "mods");
        assert_eq!(guild.members[0].user.id, Snowflake::new(13));
    }
}
