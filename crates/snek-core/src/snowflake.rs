//! Snowflake identifiers and command registration scopes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01).
pub const PLATFORM_EPOCH_MS: u64 = 1_420_070_400_000;

// ============================================================================
// Snowflake
// ============================================================================

/// A 64-bit platform identifier.
///
/// The wire format carries ids as decimal strings; integers are accepted
/// as well when decoding. Serialization always produces a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses a snowflake from its decimal string form.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| DomainError::InvalidSnowflake {
                value: value.to_string(),
            })
    }

    /// Interprets a loosely-typed JSON value (string or integer) as a snowflake.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s).ok(),
            serde_json::Value::Number(n) => n.as_u64().map(Self),
            _ => None,
        }
    }

    /// Creation time encoded in the upper 42 bits.
    pub fn created_at(self) -> Option<DateTime<Utc>> {
        let ms = (self.0 >> 22).checked_add(PLATFORM_EPOCH_MS)?;
        let ms = i64::try_from(ms).ok()?;
        Utc.timestamp_millis_opt(ms).single()
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for Snowflake {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Str(String),
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Int(id) => Ok(Self(id)),
            RawId::Str(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Registration boundary for application commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Scope {
    /// Commands visible in every guild and in direct messages.
    #[default]
    Global,
    /// Commands registered to a single guild.
    Guild(Snowflake),
}

impl Scope {
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Returns the guild id for guild scopes.
    pub fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Self::Global => None,
            Self::Guild(id) => Some(*id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Guild(id) => write!(f, "{id}"),
        }
    }
}

impl From<Snowflake> for Scope {
    fn from(id: Snowflake) -> Self {
        Self::Guild(id)
    }
}

impl FromStr for Scope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("global") {
            return Ok(Self::Global);
        }
        Snowflake::parse(s).map(Self::Guild)
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Int(id) => Ok(Self::Guild(Snowflake(id))),
            RawId::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_parse() {
        assert_eq!(Snowflake::parse("1234").unwrap(), Snowflake::new(1234));
        assert!(Snowflake::parse("12ab").is_err());
        assert!(Snowflake::parse("").is_err());
    }

    #[test]
    fn test_snowflake_accepts_string_and_int() {
        let a: Snowflake = serde_json::from_str("\"42\"").unwrap();
        let b: Snowflake = serde_json::from_str("42").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
    }

    #[test]
    fn test_snowflake_from_json_value() {
        assert_eq!(
            Snowflake::from_json(&serde_json::json!("99")),
            Some(Snowflake::new(99))
        );
        assert_eq!(Snowflake::from_json(&serde_json::json!(true)), None);
    }

    #[test]
    fn test_snowflake_created_at() {
        // 175928847299117063 was created 2016-04-30T11:18:25.796Z
        let ts = Snowflake::new(175_928_847_299_117_063).created_at().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn test_scope_parse_and_display() {
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!(
            "555".parse::<Scope>().unwrap(),
            Scope::Guild(Snowflake::new(555))
        );
        assert_eq!(Scope::Global.to_string(), "global");
        assert_eq!(Scope::Guild(Snowflake::new(7)).to_string(), "7");
        assert!("nowhere".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_serde() {
        let scopes: Vec<Scope> = serde_json::from_str(r#"["global", "12", 13]"#).unwrap();
        assert_eq!(
            scopes,
            vec![
                Scope::Global,
                Scope::Guild(Snowflake::new(12)),
                Scope::Guild(Snowflake::new(13))
            ]
        );
    }
}
