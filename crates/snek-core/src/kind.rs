//! Bit-exact protocol constants: interaction, option and component kinds,
//! gateway close codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

// ============================================================================
// Interaction Types
// ============================================================================

/// Declared type of an inbound interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionType {
    Ping,
    ApplicationCommand,
    MessageComponent,
    Autocomplete,
    /// A type this client does not understand.
    Unknown(u8),
}

impl InteractionType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::Autocomplete,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Ping => 1,
            Self::ApplicationCommand => 2,
            Self::MessageComponent => 3,
            Self::Autocomplete => 4,
            Self::Unknown(code) => code,
        }
    }

    /// True for the kinds routed to application command handlers.
    pub fn is_command(self) -> bool {
        matches!(self, Self::Ping | Self::ApplicationCommand | Self::Autocomplete)
    }
}

// ============================================================================
// Option Types
// ============================================================================

/// Kind of an application command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionType {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl OptionType {
    pub fn code(self) -> u8 {
        match self {
            Self::SubCommand => 1,
            Self::SubCommandGroup => 2,
            Self::String => 3,
            Self::Integer => 4,
            Self::Boolean => 5,
            Self::User => 6,
            Self::Channel => 7,
            Self::Role => 8,
            Self::Mentionable => 9,
            Self::Number => 10,
            Self::Attachment => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::SubCommand),
            2 => Some(Self::SubCommandGroup),
            3 => Some(Self::String),
            4 => Some(Self::Integer),
            5 => Some(Self::Boolean),
            6 => Some(Self::User),
            7 => Some(Self::Channel),
            8 => Some(Self::Role),
            9 => Some(Self::Mentionable),
            10 => Some(Self::Number),
            11 => Some(Self::Attachment),
            _ => None,
        }
    }

    /// Sub-command and sub-command-group options structure the command tree
    /// rather than carrying a value.
    pub fn is_structural(self) -> bool {
        matches!(self, Self::SubCommand | Self::SubCommandGroup)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SubCommand => "sub_command",
            Self::SubCommandGroup => "sub_command_group",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::User => "user",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Mentionable => "mentionable",
            Self::Number => "number",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "sub_command" | "subcommand" => Self::SubCommand,
            "sub_command_group" | "subcommand_group" => Self::SubCommandGroup,
            "string" | "str" => Self::String,
            "integer" | "int" => Self::Integer,
            "boolean" | "bool" => Self::Boolean,
            "user" => Self::User,
            "channel" => Self::Channel,
            "role" => Self::Role,
            "mentionable" => Self::Mentionable,
            "number" | "float" => Self::Number,
            "attachment" => Self::Attachment,
            _ => {
                return Err(DomainError::InvalidFieldValue {
                    field: "option type".to_string(),
                    value: s.to_string(),
                    expected: "an option type name".to_string(),
                })
            }
        };
        Ok(kind)
    }
}

impl Serialize for OptionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKind {
    Code(u8),
    Name(String),
}

impl<'de> Deserialize<'de> for OptionType {
    /// Accepts the numeric wire code or a type name.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawKind::deserialize(deserializer)? {
            RawKind::Code(code) => Self::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown option type {code}"))),
            RawKind::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Component Types
// ============================================================================

/// Kind of a message component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    ActionRow,
    Button,
    Select,
    TextInput,
    Unknown(u8),
}

impl ComponentType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::ActionRow,
            2 => Self::Button,
            3 => Self::Select,
            4 => Self::TextInput,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::ActionRow => 1,
            Self::Button => 2,
            Self::Select => 3,
            Self::TextInput => 4,
            Self::Unknown(code) => code,
        }
    }
}

// ============================================================================
// Close Codes
// ============================================================================

/// Gateway close codes the client classifies explicitly.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Going away; sent by the client when stopping.
    pub const GOING_AWAY: u16 = 1001;
    /// The bot is in too many guilds and must shard.
    pub const SHARDING_REQUIRED: u16 = 4011;
    /// The intents value was invalid.
    pub const INVALID_INTENTS: u16 = 4013;
    /// A privileged intent was requested without being enabled.
    pub const DISALLOWED_INTENTS: u16 = 4014;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_type_codes() {
        assert_eq!(InteractionType::from_code(1), InteractionType::Ping);
        assert_eq!(InteractionType::from_code(2), InteractionType::ApplicationCommand);
        assert_eq!(InteractionType::from_code(3), InteractionType::MessageComponent);
        assert_eq!(InteractionType::from_code(4), InteractionType::Autocomplete);
        assert_eq!(InteractionType::from_code(9), InteractionType::Unknown(9));
        assert!(InteractionType::Autocomplete.is_command());
        assert!(!InteractionType::MessageComponent.is_command());
    }

    #[test]
    fn test_option_type_codes() {
        assert_eq!(OptionType::SubCommand.code(), 1);
        assert_eq!(OptionType::SubCommandGroup.code(), 2);
        assert_eq!(OptionType::User.code(), 6);
        assert_eq!(OptionType::Channel.code(), 7);
        assert_eq!(OptionType::Role.code(), 8);
        assert_eq!(OptionType::Mentionable.code(), 9);
        for code in 1..=11u8 {
            assert_eq!(OptionType::from_code(code).map(OptionType::code), Some(code));
        }
        assert_eq!(OptionType::from_code(0), None);
    }

    #[test]
    fn test_option_type_deserializes_code_or_name() {
        let kinds: Vec<OptionType> = serde_json::from_str(r#"[6, "role", "STRING"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![OptionType::User, OptionType::Role, OptionType::String]
        );
        assert!(serde_json::from_str::<OptionType>("42").is_err());
    }

    #[test]
    fn test_component_type_codes() {
        assert_eq!(ComponentType::from_code(2), ComponentType::Button);
        assert_eq!(ComponentType::from_code(3), ComponentType::Select);
        assert_eq!(ComponentType::Unknown(8).code(), 8);
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(close_code::NORMAL, 1000);
        assert_eq!(close_code::SHARDING_REQUIRED, 4011);
        assert_eq!(close_code::INVALID_INTENTS, 4013);
        assert_eq!(close_code::DISALLOWED_INTENTS, 4014);
    }
}
