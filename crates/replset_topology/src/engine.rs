//! Abstraction over the topology engine that performs wire I/O.

use crate::completion::Completion;
use crate::config::ResolvedOptions;
use crate::error::TopologyResult;
use crate::event::{EventBus, EventKind, Listener, ListenerId};
use replset_protocol::{
    Credentials, Document, HandshakeDocument, ReadPreference, ReadPreferenceOption, ServerAddress,
};
use std::sync::Arc;

/// Per-operation options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOptions {
    /// Read preference, possibly not yet normalized.
    pub read_preference: Option<ReadPreferenceOption>,
    /// Remaining options, passed through to the engine.
    pub extra: Document,
}

impl OperationOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read preference.
    pub fn with_read_preference(mut self, pref: impl Into<ReadPreferenceOption>) -> Self {
        self.read_preference = Some(pref.into());
        self
    }

    /// Sets the pass-through options.
    pub fn with_extra(mut self, extra: Document) -> Self {
        self.extra = extra;
        self
    }

    /// Replaces a named read preference with its canonical form.
    pub fn normalized(mut self) -> TopologyResult<Self> {
        if let Some(option) = self.read_preference.take() {
            self.read_preference = Some(ReadPreferenceOption::Resolved(option.normalize()?));
        }
        Ok(self)
    }

    /// The resolved read preference, if any.
    pub fn read_preference(&self) -> Option<&ReadPreference> {
        self.read_preference
            .as_ref()
            .and_then(ReadPreferenceOption::resolved)
    }
}

/// A cursor-like object whose calls can be buffered and re-invoked.
pub trait Cursor: Send + Sync {
    /// Namespace the cursor reads from.
    fn namespace(&self) -> &str;

    /// Read preference the cursor was created with.
    fn read_preference(&self) -> Option<&ReadPreference>;

    /// Invokes `method` with `args`, delivering the result to `completion`.
    fn invoke(&self, method: &str, args: Vec<Document>, completion: Completion);
}

/// The engine that talks to replica-set members.
///
/// Engines perform the actual network I/O, monitoring and discovery. They
/// report lifecycle changes as [`EventKind`] events on their own bus and
/// resolve operation completions from their own threads.
pub trait TopologyEngine: Send + Sync {
    /// Bus the engine emits events on.
    fn event_bus(&self) -> &EventBus;

    /// Starts connecting. Must not block; the outcome is reported as exactly
    /// one of the `connect`, `error`, `timeout` or `close` events.
    fn connect(&self, seeds: &[ServerAddress], options: &ResolvedOptions);

    /// Tears down every connection.
    fn destroy(&self, force: bool);

    /// Returns true if a member suitable for `options` is available.
    fn is_connected(&self, options: &OperationOptions) -> bool;

    /// Returns true once the engine has been destroyed.
    fn is_destroyed(&self) -> bool;

    /// Runs a command.
    fn command(&self, ns: &str, cmd: Document, options: OperationOptions, completion: Completion);

    /// Inserts documents.
    fn insert(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion);

    /// Applies updates.
    fn update(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion);

    /// Applies removes.
    fn remove(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion);

    /// Authenticates every connection.
    fn auth(&self, credentials: Credentials, completion: Completion);

    /// Creates a cursor.
    fn cursor(&self, ns: &str, cmd: Document, options: OperationOptions) -> Arc<dyn Cursor>;

    /// Most recent handshake, if any member has answered.
    fn last_handshake(&self) -> Option<HandshakeDocument>;

    /// Registers a listener.
    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.event_bus().on(kind, listener)
    }

    /// Registers a one-shot listener.
    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.event_bus().once(kind, listener)
    }

    /// Removes a listener.
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.event_bus().remove_listener(kind, id)
    }

    /// Removes every listener for `kind`.
    fn remove_all_listeners(&self, kind: EventKind) {
        self.event_bus().remove_all_listeners(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replset_protocol::ReadMode;

    #[test]
    fn normalize_named_read_preference() {
        let options = OperationOptions::new()
            .with_read_preference("secondary_preferred")
            .normalized()
            .unwrap();
        assert_eq!(
            options.read_preference().map(|p| p.mode),
            Some(ReadMode::SecondaryPreferred)
        );
    }

    #[test]
    fn normalize_without_read_preference() {
        let options = OperationOptions::new().normalized().unwrap();
        assert!(options.read_preference().is_none());
    }

    #[test]
    fn normalize_rejects_unknown_mode() {
        assert!(OperationOptions::new()
            .with_read_preference("anywhere")
            .normalized()
            .is_err());
    }

    #[test]
    fn unnormalized_preference_is_not_visible() {
        let options = OperationOptions::new().with_read_preference("secondary");
        assert!(options.read_preference().is_none());
    }
}
