//! Read preferences.

use crate::error::{ProtocolError, ProtocolResult};
use crate::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which class of members may serve a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    /// Primary only.
    #[default]
    Primary,
    /// Primary, falling back to a secondary.
    PrimaryPreferred,
    /// Secondaries only.
    Secondary,
    /// A secondary, falling back to the primary.
    SecondaryPreferred,
    /// Lowest latency member.
    Nearest,
}

impl ReadMode {
    /// All modes in canonical order.
    pub const ALL: [ReadMode; 5] = [
        ReadMode::Primary,
        ReadMode::PrimaryPreferred,
        ReadMode::Secondary,
        ReadMode::SecondaryPreferred,
        ReadMode::Nearest,
    ];

    /// Canonical mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Primary => "primary",
            ReadMode::PrimaryPreferred => "primaryPreferred",
            ReadMode::Secondary => "secondary",
            ReadMode::SecondaryPreferred => "secondaryPreferred",
            ReadMode::Nearest => "nearest",
        }
    }

    /// Returns true if a primary may serve this mode during replay.
    pub fn is_primary_compatible(&self) -> bool {
        matches!(
            self,
            ReadMode::Primary
                | ReadMode::PrimaryPreferred
                | ReadMode::Nearest
                | ReadMode::SecondaryPreferred
        )
    }

    /// Returns true if a secondary may serve this mode during replay.
    pub fn is_secondary_compatible(&self) -> bool {
        matches!(self, ReadMode::Secondary | ReadMode::SecondaryPreferred)
    }
}

impl FromStr for ReadMode {
    type Err = ProtocolError;

    /// Parses a mode name, ignoring case and `_`/`-` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "primary" => Ok(ReadMode::Primary),
            "primarypreferred" => Ok(ReadMode::PrimaryPreferred),
            "secondary" => Ok(ReadMode::Secondary),
            "secondarypreferred" => Ok(ReadMode::SecondaryPreferred),
            "nearest" => Ok(ReadMode::Nearest),
            _ => Err(ProtocolError::InvalidReadMode(s.to_string())),
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved read preference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPreference {
    /// Member class.
    pub mode: ReadMode,
    /// Tag sets, tried in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Document>,
    /// Maximum replication lag for a secondary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_staleness_seconds: Option<u32>,
}

impl ReadPreference {
    /// Creates a read preference with no tags.
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            tags: Vec::new(),
            max_staleness_seconds: None,
        }
    }

    /// Primary-only read preference.
    pub fn primary() -> Self {
        Self::new(ReadMode::Primary)
    }

    /// Secondary-only read preference.
    pub fn secondary() -> Self {
        Self::new(ReadMode::Secondary)
    }

    /// Adds a tag set.
    pub fn with_tags(mut self, tags: Document) -> Self {
        self.tags.push(tags);
        self
    }

    /// Sets the staleness bound.
    pub fn with_max_staleness(mut self, seconds: u32) -> Self {
        self.max_staleness_seconds = Some(seconds);
        self
    }
}

/// A read preference as supplied by a caller.
///
/// Callers may pass either a mode name or a fully built preference; the
/// facade normalizes both to [`ReadPreference`] before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadPreferenceOption {
    /// A mode name such as `"secondaryPreferred"`.
    Named(String),
    /// An already resolved preference.
    Resolved(ReadPreference),
}

impl ReadPreferenceOption {
    /// Converts to canonical form.
    pub fn normalize(&self) -> ProtocolResult<ReadPreference> {
        match self {
            ReadPreferenceOption::Named(name) => Ok(ReadPreference::new(name.parse()?)),
            ReadPreferenceOption::Resolved(pref) => Ok(pref.clone()),
        }
    }

    /// Returns the resolved preference, if already normalized.
    pub fn resolved(&self) -> Option<&ReadPreference> {
        match self {
            ReadPreferenceOption::Resolved(pref) => Some(pref),
            ReadPreferenceOption::Named(_) => None,
        }
    }
}

impl From<ReadMode> for ReadPreferenceOption {
    fn from(mode: ReadMode) -> Self {
        ReadPreferenceOption::Resolved(ReadPreference::new(mode))
    }
}

impl From<ReadPreference> for ReadPreferenceOption {
    fn from(pref: ReadPreference) -> Self {
        ReadPreferenceOption::Resolved(pref)
    }
}

impl From<&str> for ReadPreferenceOption {
    fn from(name: &str) -> Self {
        ReadPreferenceOption::Named(name.to_string())
    }
}
