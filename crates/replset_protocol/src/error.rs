//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Read preference mode is not one of the five known modes.
    #[error("invalid read preference mode: {0}")]
    InvalidReadMode(String),

    /// Handshake document could not be interpreted.
    #[error("malformed handshake document: {0}")]
    MalformedHandshake(String),

    /// Server address is not of the form `host[:port]`.
    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress {
        /// The offending input.
        address: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidReadMode("fastest".into());
        assert_eq!(err.to_string(), "invalid read preference mode: fastest");

        let err = ProtocolError::invalid_address("db1:abc", "port is not a number");
        assert!(err.to_string().contains("db1:abc"));
        assert!(err.to_string().contains("port is not a number"));
    }
}
