//! Protocol decoding errors.

use thiserror::Error;

/// Errors raised while decoding wire payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload was not valid JSON or did not match the expected shape
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A frame arrived with an opcode that cannot carry the requested payload
    #[error("unexpected opcode {op} (expected {expected})")]
    UnexpectedOpcode { op: u8, expected: &'static str },

    /// A required field was absent
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Wraps a serde error with the name of the payload being decoded.
    pub fn decode(what: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { what, source }
    }
}
