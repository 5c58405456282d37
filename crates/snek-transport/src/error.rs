//! Transport error kinds.
//!
//! REST failures distinguish forbidden from not-found from everything
//! else, so callers branch on the variant rather than on error identity.
//! Gateway failures distinguish a peer reset (resumable) from other
//! network failures.

use std::io;

use snek_protocol::ProtocolError;
use thiserror::Error;

/// Raw OS error codes for "connection reset by peer" (BSD/macOS and Windows).
const RESET_OS_CODES: [i32; 2] = [54, 10054];

// ============================================================================
// HTTP Errors
// ============================================================================

/// Errors returned by [`crate::HttpTransport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The bot lacks access to the resource (403).
    #[error("forbidden: {route}")]
    Forbidden { route: String },

    /// The resource does not exist (404).
    #[error("not found: {route}")]
    NotFound { route: String },

    /// Any other failure.
    #[error("request failed: {0}")]
    Other(String),
}

impl HttpError {
    pub fn forbidden(route: impl Into<String>) -> Self {
        Self::Forbidden {
            route: route.into(),
        }
    }

    pub fn not_found(route: impl Into<String>) -> Self {
        Self::NotFound {
            route: route.into(),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

// ============================================================================
// Gateway Transport Errors
// ============================================================================

/// Errors raised by the gateway socket.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer reset the connection.
    #[error("connection reset by peer: {0}")]
    ConnectionReset(String),

    /// A socket operation timed out.
    #[error("gateway operation timed out")]
    Timeout,

    /// The gateway endpoint could not be located.
    #[error("gateway not found: {0}")]
    GatewayNotFound(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// True for the reset-by-peer class, which is resumable.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let reset = err.kind() == io::ErrorKind::ConnectionReset
            || err
                .raw_os_error()
                .is_some_and(|code| RESET_OS_CODES.contains(&code));
        if reset {
            Self::ConnectionReset(err.to_string())
        } else if err.kind() == io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_reset_classification() {
        let err = TransportError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_reset());

        let err = TransportError::from(io::Error::from_raw_os_error(54));
        assert!(err.is_reset());

        let err = TransportError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(err, TransportError::Timeout));

        let err = TransportError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(matches!(err, TransportError::Io(_)));
        assert!(!err.is_reset());
    }

    #[test]
    fn test_http_error_kinds() {
        assert!(HttpError::forbidden("/commands").is_forbidden());
        assert!(!HttpError::not_found("/commands").is_forbidden());
        assert_eq!(
            HttpError::forbidden("/guilds/1/commands").to_string(),
            "forbidden: /guilds/1/commands"
        );
    }
}
