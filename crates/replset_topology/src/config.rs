//! Configuration for the replica-set handle.
//!
//! Options are layered: built-in defaults, then user options, then the
//! nested `socketOptions` block. The merge produces an immutable
//! [`ResolvedOptions`] snapshot that is forwarded to the engine unchanged.

use crate::error::{TopologyError, TopologyResult};
use replset_protocol::{ReadMode, ReadPreference, ServerAddress};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Buffering policy for operations issued while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLimit {
    /// Buffer without limit (configured as a negative value).
    Unbounded,
    /// Never buffer (configured as 0).
    Disabled,
    /// Buffer up to this many operations.
    Bounded(usize),
}

impl BufferLimit {
    /// Interprets a `bufferMaxEntries` value.
    pub fn from_entries(entries: i64) -> Self {
        match entries {
            n if n < 0 => BufferLimit::Unbounded,
            0 => BufferLimit::Disabled,
            n => BufferLimit::Bounded(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    /// Returns true if `len` queued operations stay within the limit.
    pub fn admits(&self, len: usize) -> bool {
        match self {
            BufferLimit::Unbounded => true,
            BufferLimit::Disabled => false,
            BufferLimit::Bounded(max) => len <= *max,
        }
    }
}

impl Default for BufferLimit {
    fn default() -> Self {
        BufferLimit::Unbounded
    }
}

impl From<i64> for BufferLimit {
    fn from(entries: i64) -> Self {
        Self::from_entries(entries)
    }
}

/// Socket settings as supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketOptions {
    /// Connect timeout in milliseconds.
    #[serde(rename = "connectTimeoutMS")]
    pub connect_timeout_ms: Option<u64>,
    /// Socket idle timeout in milliseconds.
    #[serde(rename = "socketTimeoutMS")]
    pub socket_timeout_ms: Option<u64>,
    /// TCP keep-alive.
    pub keep_alive: Option<bool>,
    /// Disable Nagle's algorithm.
    pub no_delay: Option<bool>,
}

/// TLS settings, forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Enable TLS.
    #[serde(default)]
    pub ssl: bool,
    /// Validate the server certificate.
    #[serde(rename = "sslValidate", default = "default_true")]
    pub validate: bool,
    /// CA bundle path.
    #[serde(rename = "sslCA", default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// Client certificate path.
    #[serde(rename = "sslCert", default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// Client key path.
    #[serde(rename = "sslKey", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Key passphrase.
    #[serde(rename = "sslPass", default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    /// Check the server host name against its certificate.
    #[serde(rename = "checkServerIdentity", default = "default_true")]
    pub check_server_identity: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ssl: false,
            validate: true,
            ca: None,
            cert: None,
            key: None,
            pass: None,
            check_server_identity: true,
        }
    }
}

/// User-supplied options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplSetOptions {
    /// Buffer bound (negative unbounded, 0 disabled).
    pub buffer_max_entries: Option<i64>,
    /// Connections per member.
    pub pool_size: Option<u32>,
    /// Enable high-availability monitoring.
    pub ha: Option<bool>,
    /// Monitoring interval in milliseconds.
    pub ha_interval: Option<u64>,
    /// Allow connecting while no primary is known.
    pub connect_with_no_primary: Option<bool>,
    /// Expected replica set name.
    pub replica_set: Option<String>,
    /// Latency window for member selection in milliseconds.
    #[serde(rename = "secondaryAcceptableLatencyMS")]
    pub secondary_acceptable_latency_ms: Option<u64>,
    /// Reconnect attempts per member.
    pub reconnect_tries: Option<u32>,
    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_interval: Option<u64>,
    /// Default read preference mode name.
    pub read_preference: Option<String>,
    /// Top-level connect timeout in milliseconds.
    #[serde(rename = "connectTimeoutMS")]
    pub connect_timeout_ms: Option<u64>,
    /// Top-level socket timeout in milliseconds.
    #[serde(rename = "socketTimeoutMS")]
    pub socket_timeout_ms: Option<u64>,
    /// Nested socket block; overrides the top-level socket keys.
    pub socket_options: Option<SocketOptions>,
    /// TLS settings.
    #[serde(flatten)]
    pub tls: TlsOptions,
}

impl ReplSetOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON text.
    pub fn from_json(text: &str) -> TopologyResult<Self> {
        serde_json::from_str(text).map_err(|e| TopologyError::Configuration(e.to_string()))
    }

    /// Sets the buffer bound.
    pub fn with_buffer_max_entries(mut self, entries: i64) -> Self {
        self.buffer_max_entries = Some(entries);
        self
    }

    /// Sets the per-member pool size.
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the replica set name.
    pub fn with_replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    /// Sets the default read preference mode.
    pub fn with_read_preference(mut self, mode: impl Into<String>) -> Self {
        self.read_preference = Some(mode.into());
        self
    }

    /// Sets the monitoring interval.
    pub fn with_ha_interval(mut self, interval: Duration) -> Self {
        self.ha_interval = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Allows connecting without a primary.
    pub fn with_connect_with_no_primary(mut self, allow: bool) -> Self {
        self.connect_with_no_primary = Some(allow);
        self
    }

    /// Sets the nested socket block.
    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket_options = Some(socket);
        self
    }

    /// Merges defaults, these options and derived socket options.
    pub fn resolve(&self) -> TopologyResult<ResolvedOptions> {
        let mut resolved = ResolvedOptions::default();

        if let Some(entries) = self.buffer_max_entries {
            resolved.buffer_limit = BufferLimit::from_entries(entries);
        }
        if let Some(size) = self.pool_size {
            if size == 0 {
                return Err(TopologyError::Configuration(
                    "poolSize must be at least 1".into(),
                ));
            }
            resolved.pool_size = size;
        }
        if let Some(ha) = self.ha {
            resolved.ha = ha;
        }
        if let Some(ms) = self.ha_interval {
            resolved.ha_interval = Duration::from_millis(ms);
        }
        if let Some(allow) = self.connect_with_no_primary {
            resolved.connect_with_no_primary = allow;
        }
        resolved.set_name = self.replica_set.clone();
        if let Some(ms) = self.secondary_acceptable_latency_ms {
            resolved.acceptable_latency = Duration::from_millis(ms);
        }
        if let Some(tries) = self.reconnect_tries {
            resolved.reconnect_tries = tries;
        }
        if let Some(ms) = self.reconnect_interval {
            resolved.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(mode) = &self.read_preference {
            let mode: ReadMode = mode.parse()?;
            resolved.read_preference = ReadPreference::new(mode);
        }
        if let Some(ms) = self.connect_timeout_ms {
            resolved.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.socket_timeout_ms {
            resolved.socket_timeout = Duration::from_millis(ms);
        }

        if let Some(socket) = &self.socket_options {
            if let Some(ms) = socket.connect_timeout_ms {
                resolved.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = socket.socket_timeout_ms {
                resolved.socket_timeout = Duration::from_millis(ms);
            }
            if let Some(keep_alive) = socket.keep_alive {
                resolved.keep_alive = keep_alive;
            }
            if let Some(no_delay) = socket.no_delay {
                resolved.no_delay = no_delay;
            }
        }

        resolved.tls = self.tls.clone();
        Ok(resolved)
    }
}

/// Immutable merged configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    /// Buffering policy.
    pub buffer_limit: BufferLimit,
    /// Connections per member.
    pub pool_size: u32,
    /// High-availability monitoring enabled.
    pub ha: bool,
    /// Monitoring interval.
    pub ha_interval: Duration,
    /// Allow connecting without a primary.
    pub connect_with_no_primary: bool,
    /// Expected replica set name.
    pub set_name: Option<String>,
    /// Member selection latency window.
    pub acceptable_latency: Duration,
    /// Reconnect attempts per member.
    pub reconnect_tries: u32,
    /// Delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Default read preference.
    pub read_preference: ReadPreference,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Socket idle timeout.
    pub socket_timeout: Duration,
    /// TCP keep-alive.
    pub keep_alive: bool,
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// TLS settings.
    pub tls: TlsOptions,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        Self {
            buffer_limit: BufferLimit::Unbounded,
            pool_size: 5,
            ha: true,
            ha_interval: Duration::from_secs(10),
            connect_with_no_primary: false,
            set_name: None,
            acceptable_latency: Duration::from_millis(15),
            reconnect_tries: 30,
            reconnect_interval: Duration::from_secs(1),
            read_preference: ReadPreference::primary(),
            connect_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(360),
            keep_alive: true,
            no_delay: true,
            tls: TlsOptions::default(),
        }
    }
}

/// Per-connect overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    /// Replaces the configured buffer bound for this connection.
    pub buffer_max_entries: Option<i64>,
}

impl ConnectOptions {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the buffer bound.
    pub fn with_buffer_max_entries(mut self, entries: i64) -> Self {
        self.buffer_max_entries = Some(entries);
        self
    }
}

/// Checks the shape of a seed list.
pub fn validate_seeds(seeds: &[ServerAddress]) -> TopologyResult<()> {
    if seeds.is_empty() {
        return Err(TopologyError::Configuration(
            "seed list must contain at least one server".into(),
        ));
    }
    if let Some(bad) = seeds.iter().find(|s| !s.is_valid()) {
        return Err(TopologyError::Configuration(format!(
            "seed list entry {:?}:{} is not a valid server address",
            bad.host, bad.port
        )));
    }
    Ok(())
}

/// Parses and validates a seed list from `host:port` strings.
pub fn parse_seeds<S: AsRef<str>>(seeds: &[S]) -> TopologyResult<Vec<ServerAddress>> {
    let parsed = seeds
        .iter()
        .map(|s| ServerAddress::parse(s.as_ref()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TopologyError::Configuration(e.to_string()))?;
    validate_seeds(&parsed)?;
    Ok(parsed)
}
