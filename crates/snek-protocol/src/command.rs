//! Application command declarations as exchanged with the remote registry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use snek_core::{OptionType, Snowflake};

/// `type` of a chat-input (slash) command.
pub const CHAT_INPUT: u8 = 1;

fn default_command_type() -> u8 {
    CHAT_INPUT
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Commands
// ============================================================================

/// A registered (or to-be-registered) application command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommandPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionPayload>,
    #[serde(default = "default_true")]
    pub default_permission: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Snowflake>,
}

impl ApplicationCommandPayload {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            application_id: None,
            guild_id: None,
            name: name.into(),
            description: description.into(),
            kind: CHAT_INPUT,
            options: Vec::new(),
            default_permission: true,
            version: None,
        }
    }

    #[must_use]
    pub fn with_option(mut self, option: CommandOptionPayload) -> Self {
        self.options.push(option);
        self
    }

    /// Every invocable name this declaration exposes: the top-level name,
    /// `"parent sub"` for sub-commands and `"parent group sub"` for
    /// sub-commands inside groups.
    pub fn qualified_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for option in &self.options {
            match option.kind {
                OptionType::SubCommand => {
                    names.push(format!("{} {}", self.name, option.name));
                }
                OptionType::SubCommandGroup => {
                    for sub in option.options.iter().filter(|o| o.kind == OptionType::SubCommand) {
                        names.push(format!("{} {} {}", self.name, option.name, sub.name));
                    }
                }
                _ => {}
            }
        }
        names
    }

    /// The declaration with server-assigned fields stripped, for comparison.
    ///
    /// Context-menu commands carry no description remotely, so it is
    /// dropped for every non chat-input kind. Sub-commands and groups are
    /// sorted by name at every level; parameter options keep their
    /// declared order, which is part of the command's signature.
    pub fn canonical(&self) -> Self {
        Self {
            id: None,
            application_id: None,
            guild_id: None,
            name: self.name.clone(),
            description: if self.kind == CHAT_INPUT {
                self.description.clone()
            } else {
                String::new()
            },
            kind: self.kind,
            options: canonical_options(&self.options),
            default_permission: self.default_permission,
            version: None,
        }
    }
}

fn canonical_options(options: &[CommandOptionPayload]) -> Vec<CommandOptionPayload> {
    let mut canonical: Vec<CommandOptionPayload> = options
        .iter()
        .map(|option| CommandOptionPayload {
            options: canonical_options(&option.options),
            ..option.clone()
        })
        .collect();
    let nested = |o: &CommandOptionPayload| {
        matches!(o.kind, OptionType::SubCommand | OptionType::SubCommandGroup)
    };
    if canonical.iter().all(nested) {
        canonical.sort_by(|a, b| a.name.cmp(&b.name));
    }
    canonical
}

/// True when `local` differs from its remote counterpart, or none exists.
pub fn sync_needed(local: &ApplicationCommandPayload, remote: Option<&ApplicationCommandPayload>) -> bool {
    match remote {
        None => true,
        Some(remote) => local.canonical() != remote.canonical(),
    }
}

// ============================================================================
// Options
// ============================================================================

/// A declared command option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOptionPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionPayload>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub autocomplete: bool,
}

impl CommandOptionPayload {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            choices: Vec::new(),
            options: Vec::new(),
            autocomplete: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn autocomplete(mut self) -> Self {
        self.autocomplete = true;
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: CommandOptionPayload) -> Self {
        self.options.push(option);
        self
    }
}

/// A fixed choice for an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: Value,
}

// ============================================================================
// Permissions
// ============================================================================

/// What a permission overwrite targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionTarget {
    Role,
    User,
}

impl PermissionTarget {
    pub fn code(self) -> u8 {
        match self {
            Self::Role => 1,
            Self::User => 2,
        }
    }
}

impl Serialize for PermissionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for PermissionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(Self::Role),
            2 => Ok(Self::User),
            other => Err(serde::de::Error::custom(format!(
                "unknown permission target {other}"
            ))),
        }
    }
}

/// A single permission overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPermission {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: PermissionTarget,
    pub permission: bool,
}

/// Overwrites for one command, as pushed in a guild's bulk permission update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildCommandPermissions {
    /// Remote command id.
    pub id: Snowflake,
    pub permissions: Vec<CommandPermission>,
}
