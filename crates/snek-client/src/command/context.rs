//! Invocation contexts handed to command handlers.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use snek_core::{Channel, ComponentType, InteractionType, Member, Role, Scope, Snowflake, User};
use snek_protocol::{MessagePayload, RawInteraction};

/// A resolved command argument.
///
/// Entity-typed options resolve through the cache; when the entity is not
/// cached the raw id is kept instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Member(Member),
    User(User),
    Channel(Channel),
    Role(Role),
    /// An entity id that was not in the cache.
    Id(Snowflake),
    /// A plain string, number or boolean.
    Value(Value),
}

impl ArgValue {
    /// The user behind a member or user argument.
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::Member(member) => Some(&member.user),
            Self::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&Member> {
        match self {
            Self::Member(member) => Some(member),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(role) => Some(role),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Value(value) => value.as_i64(),
            _ => None,
        }
    }

    /// The id of whatever entity the argument refers to.
    pub fn id(&self) -> Option<Snowflake> {
        match self {
            Self::Member(member) => Some(member.user.id),
            Self::User(user) => Some(user.id),
            Self::Channel(channel) => Some(channel.id),
            Self::Role(role) => Some(role.id),
            Self::Id(id) => Some(*id),
            Self::Value(value) => Snowflake::from_json(value),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member(member) => f.write_str(member.display_name()),
            Self::User(user) => f.write_str(&user.username),
            Self::Channel(channel) => match &channel.name {
                Some(name) => write!(f, "#{name}"),
                None => write!(f, "{}", channel.id),
            },
            Self::Role(role) => write!(f, "@{}", role.name),
            Self::Id(id) => write!(f, "{id}"),
            Self::Value(Value::String(s)) => f.write_str(s),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

// ============================================================================
// Interaction Context
// ============================================================================

/// Context for application commands and autocomplete requests.
#[derive(Debug, Clone)]
pub struct InteractionContext {
    pub interaction_id: Snowflake,
    pub kind: InteractionType,
    pub command_id: Option<Snowflake>,
    /// Scope the command was resolved in.
    pub scope: Scope,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub author: Option<User>,
    pub token: String,
    /// Fully qualified name, e.g. `config set` or `admin roles add`.
    pub invoked_name: String,
    /// Named arguments in the order they were received.
    pub args: Vec<(String, ArgValue)>,
    /// Option the user is typing into, for autocomplete requests.
    pub focused_option: Option<String>,
}

impl InteractionContext {
    /// Returns the argument named `name`.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }

    /// `name=value` pairs for logging.
    pub fn describe_args(&self) -> String {
        self.args
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_autocomplete(&self) -> bool {
        self.focused_option.is_some()
    }
}

// ============================================================================
// Message Context
// ============================================================================

/// Context for prefixed message commands.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub message: Arc<MessagePayload>,
    pub invoked_name: String,
    /// The prefix as it appeared in the message.
    pub prefix: String,
    /// Positional arguments following the command name.
    pub args: Vec<String>,
}

impl MessageContext {
    pub fn author(&self) -> &User {
        &self.message.author
    }

    /// Message content after the prefix and command name.
    pub fn content_parameters(&self) -> &str {
        self.message
            .content
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.trim_start().strip_prefix(self.invoked_name.as_str()))
            .map(str::trim)
            .unwrap_or_default()
    }
}

// ============================================================================
// Component Context
// ============================================================================

/// Context for button and select interactions.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    pub interaction_id: Snowflake,
    pub custom_id: String,
    pub component_type: ComponentType,
    /// Selected values, empty for buttons.
    pub values: Vec<String>,
    /// Message the component is attached to.
    pub message_id: Option<Snowflake>,
    pub author: Option<User>,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub token: String,
}

impl ComponentContext {
    pub fn from_interaction(raw: &RawInteraction) -> Self {
        let data = raw.data.as_ref();
        Self {
            interaction_id: raw.id,
            custom_id: raw.custom_id().unwrap_or_default().to_string(),
            component_type: raw.component_type().unwrap_or(ComponentType::Unknown(0)),
            values: data.map(|d| d.values.clone()).unwrap_or_default(),
            message_id: raw.message.as_ref().map(|m| m.id),
            author: raw.author().cloned(),
            guild_id: raw.guild_id,
            channel_id: raw.channel_id,
            token: raw.token.clone(),
        }
    }
}
