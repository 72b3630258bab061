//! Error types for the topology facade.

use crate::event::EventKind;
use replset_protocol::ProtocolError;
use thiserror::Error;

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur while buffering, routing or connecting.
///
/// `Clone` so a single failure can be delivered to many completions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// Seed list or option has the wrong shape.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation buffer overflowed and was drained.
    #[error("operation buffer exceeded its limit of {limit} entries")]
    BufferCapacityExceeded {
        /// Configured limit.
        limit: usize,
    },

    /// The handle was force-closed; nothing is buffered any more.
    #[error("topology was destroyed")]
    ForcedClosed,

    /// No member is available and the operation could not wait.
    #[error("no connection available for operation")]
    NoConnection,

    /// The engine failed before the first successful connect.
    #[error("failed to connect ({event}): {message}")]
    Connect {
        /// Event the engine signalled.
        event: EventKind,
        /// Engine-supplied message.
        message: String,
    },

    /// Network or protocol failure after connecting.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The handle is closed.
    #[error("replica set handle is closed")]
    Closed,

    /// Invalid lifecycle transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: String,
        /// Attempted action.
        to: String,
    },

    /// Protocol value could not be interpreted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TopologyError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TopologyError::Transport { retryable, .. } => *retryable,
            TopologyError::NoConnection => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(TopologyError::transport_retryable("connection reset").is_retryable());
        assert!(!TopologyError::transport_fatal("bad certificate").is_retryable());
        assert!(TopologyError::NoConnection.is_retryable());
        assert!(!TopologyError::ForcedClosed.is_retryable());
        assert!(!TopologyError::BufferCapacityExceeded { limit: 2 }.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = TopologyError::BufferCapacityExceeded { limit: 2 };
        assert_eq!(
            err.to_string(),
            "operation buffer exceeded its limit of 2 entries"
        );

        let err = TopologyError::Connect {
            event: EventKind::Timeout,
            message: "no members reachable".into(),
        };
        assert_eq!(err.to_string(), "failed to connect (timeout): no members reachable");

        let err: TopologyError = ProtocolError::InvalidReadMode("fastest".into()).into();
        assert_eq!(err.to_string(), "invalid read preference mode: fastest");
    }
}
