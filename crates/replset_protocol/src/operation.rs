//! Operation kinds dispatched to the engine.

use crate::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// Database command.
    Command,
    /// Insert batch.
    Insert,
    /// Update batch.
    Update,
    /// Remove batch.
    Remove,
    /// Authentication.
    Auth,
}

impl OpType {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Command => "command",
            OpType::Insert => "insert",
            OpType::Update => "update",
            OpType::Remove => "remove",
            OpType::Auth => "auth",
        }
    }

    /// Returns true for insert, update and remove.
    pub fn is_write(&self) -> bool {
        matches!(self, OpType::Insert | OpType::Update | OpType::Remove)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials for an authentication call.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Mechanism name, e.g. `SCRAM-SHA-1`.
    pub mechanism: String,
    /// Database holding the user.
    pub source: String,
    /// User name.
    pub username: String,
    /// Password, if the mechanism uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Mechanism-specific properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Document>,
}

impl Credentials {
    /// Creates credentials for a password-based mechanism.
    pub fn new(
        mechanism: impl Into<String>,
        source: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            source: source.into(),
            username: username.into(),
            password: Some(password.into()),
            properties: None,
        }
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mechanism", &self.mechanism)
            .field("source", &self.source)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_type_names() {
        assert_eq!(OpType::Command.to_string(), "command");
        assert_eq!(OpType::Auth.as_str(), "auth");
        assert!(OpType::Update.is_write());
        assert!(!OpType::Command.is_write());
        assert!(!OpType::Auth.is_write());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("SCRAM-SHA-1", "admin", "root", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("root"));
        assert!(!rendered.contains("hunter2"));
    }
}
