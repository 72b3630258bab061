//! Topology events and the observer registry that carries them.
//!
//! Engines own an [`EventBus`] and emit lifecycle and monitoring events on
//! it; the replica-set handle subscribes by [`EventKind`] and re-emits the
//! relayed kinds on its own bus for callers.
//!
//! # Usage
//!
//! ```rust
//! use replset_topology::{EventBus, EventKind, TopologyEvent};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let id = bus.on(EventKind::Joined, Arc::new(|event: &TopologyEvent| {
//!     println!("member joined: {}", event.payload);
//! }));
//!
//! bus.emit(&TopologyEvent::new(EventKind::Joined, serde_json::json!({"host": "db2:27017"})));
//! bus.remove_listener(EventKind::Joined, id);
//! ```

use parking_lot::RwLock;
use replset_protocol::Document;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of topology event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Engine finished its initial connect.
    Connect,
    /// Engine failed.
    Error,
    /// Engine timed out.
    Timeout,
    /// Engine closed.
    Close,
    /// Engine regained a usable member.
    Reconnect,
    /// A server monitor is starting.
    ServerOpening,
    /// A server's description changed.
    ServerDescriptionChanged,
    /// A heartbeat was sent.
    ServerHeartbeatStarted,
    /// A heartbeat succeeded.
    ServerHeartbeatSucceeded,
    /// A heartbeat failed.
    ServerHeartbeatFailed,
    /// A server monitor stopped.
    ServerClosed,
    /// The topology is starting.
    TopologyOpening,
    /// The topology stopped.
    TopologyClosed,
    /// The topology description changed.
    TopologyDescriptionChanged,
    /// A member joined the set.
    Joined,
    /// A member left the set.
    Left,
    /// A member answered a ping.
    Ping,
    /// High-availability check progress.
    Ha,
    /// Every seed has been contacted.
    Fullsetup,
    /// Handle finished connecting (handle bus only).
    Open,
    /// High-availability check started (handle bus only).
    HaConnect,
    /// High-availability check finished (handle bus only).
    HaIsmaster,
}

impl EventKind {
    /// Engine events re-emitted verbatim by the handle.
    pub const RELAYED: [EventKind; 14] = [
        EventKind::ServerOpening,
        EventKind::ServerDescriptionChanged,
        EventKind::ServerHeartbeatStarted,
        EventKind::ServerHeartbeatSucceeded,
        EventKind::ServerHeartbeatFailed,
        EventKind::ServerClosed,
        EventKind::TopologyOpening,
        EventKind::TopologyClosed,
        EventKind::TopologyDescriptionChanged,
        EventKind::Joined,
        EventKind::Left,
        EventKind::Ping,
        EventKind::Ha,
        EventKind::Fullsetup,
    ];

    /// Events that end a connect attempt unsuccessfully.
    pub const CONNECT_FAILURES: [EventKind; 3] =
        [EventKind::Error, EventKind::Timeout, EventKind::Close];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Error => "error",
            EventKind::Timeout => "timeout",
            EventKind::Close => "close",
            EventKind::Reconnect => "reconnect",
            EventKind::ServerOpening => "serverOpening",
            EventKind::ServerDescriptionChanged => "serverDescriptionChanged",
            EventKind::ServerHeartbeatStarted => "serverHeartbeatStarted",
            EventKind::ServerHeartbeatSucceeded => "serverHeartbeatSucceeded",
            EventKind::ServerHeartbeatFailed => "serverHeartbeatFailed",
            EventKind::ServerClosed => "serverClosed",
            EventKind::TopologyOpening => "topologyOpening",
            EventKind::TopologyClosed => "topologyClosed",
            EventKind::TopologyDescriptionChanged => "topologyDescriptionChanged",
            EventKind::Joined => "joined",
            EventKind::Left => "left",
            EventKind::Ping => "ping",
            EventKind::Ha => "ha",
            EventKind::Fullsetup => "fullsetup",
            EventKind::Open => "open",
            EventKind::HaConnect => "ha_connect",
            EventKind::HaIsmaster => "ha_ismaster",
        }
    }

    /// Returns true if the handle relays this kind from the engine.
    pub fn is_relayed(&self) -> bool {
        Self::RELAYED.contains(self)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [EventKind; 22] = [
            EventKind::Connect,
            EventKind::Error,
            EventKind::Timeout,
            EventKind::Close,
            EventKind::Reconnect,
            EventKind::ServerOpening,
            EventKind::ServerDescriptionChanged,
            EventKind::ServerHeartbeatStarted,
            EventKind::ServerHeartbeatSucceeded,
            EventKind::ServerHeartbeatFailed,
            EventKind::ServerClosed,
            EventKind::TopologyOpening,
            EventKind::TopologyClosed,
            EventKind::TopologyDescriptionChanged,
            EventKind::Joined,
            EventKind::Left,
            EventKind::Ping,
            EventKind::Ha,
            EventKind::Fullsetup,
            EventKind::Open,
            EventKind::HaConnect,
            EventKind::HaIsmaster,
        ];
        ALL.into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

/// An event with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyEvent {
    /// Kind of event.
    pub kind: EventKind,
    /// Event payload, passed through unchanged by relays.
    pub payload: Document,
}

impl TopologyEvent {
    /// Creates an event.
    pub fn new(kind: EventKind, payload: Document) -> Self {
        Self { kind, payload }
    }

    /// Creates an event with a null payload.
    pub fn bare(kind: EventKind) -> Self {
        Self::new(kind, Document::Null)
    }

    /// Re-labels the event, keeping the payload.
    pub fn relabel(&self, kind: EventKind) -> Self {
        Self::new(kind, self.payload.clone())
    }

    /// Human-readable message carried by the payload, if any.
    pub fn message(&self) -> String {
        match &self.payload {
            Document::String(s) => s.clone(),
            Document::Object(map) => map
                .get("message")
                .or_else(|| map.get("errmsg"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| self.payload.to_string()),
            Document::Null => self.kind.as_str().to_string(),
            other => other.to_string(),
        }
    }
}

/// Event handler.
pub type Listener = Arc<dyn Fn(&TopologyEvent) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    listener: Listener,
}

/// Observer registry keyed by [`EventKind`].
///
/// Listeners run on the emitting thread, outside the registry lock, in
/// registration order. A `once` listener is unregistered before it runs.
pub struct EventBus {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, kind: EventKind, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            kind,
            once,
            listener,
        });
        id
    }

    /// Registers a listener for every future event of `kind`.
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, false, listener)
    }

    /// Registers a listener for the next event of `kind` only.
    pub fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, true, listener)
    }

    /// Removes one listener. Returns false if it was already gone.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| !(r.kind == kind && r.id == id));
        registrations.len() != before
    }

    /// Removes every listener for `kind`.
    pub fn remove_all_listeners(&self, kind: EventKind) {
        self.registrations.write().retain(|r| r.kind != kind);
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.registrations.write().clear();
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Total number of listeners.
    pub fn total_listeners(&self) -> usize {
        self.registrations.read().len()
    }

    /// Delivers an event. Returns the number of listeners invoked.
    pub fn emit(&self, event: &TopologyEvent) -> usize {
        let targets: Vec<Listener> = {
            let mut registrations = self.registrations.write();
            let targets = registrations
                .iter()
                .filter(|r| r.kind == event.kind)
                .map(|r| Arc::clone(&r.listener))
                .collect();
            registrations.retain(|r| !(r.once && r.kind == event.kind));
            targets
        };

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.total_listeners())
            .finish()
    }
}
