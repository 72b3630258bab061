//! In-memory engine and cursor for tests.

use crate::completion::Completion;
use crate::config::ResolvedOptions;
use crate::engine::{Cursor, OperationOptions, TopologyEngine};
use crate::error::TopologyError;
use crate::event::{EventBus, EventKind, TopologyEvent};
use parking_lot::Mutex;
use replset_protocol::{
    Credentials, Document, HandshakeDocument, OpType, ReadMode, ReadPreference, ServerAddress,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// What [`MockEngine::connect`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Mark connected and emit `connect` immediately.
    Succeed,
    /// Emit the given failure event immediately.
    Fail(EventKind),
    /// Do nothing; the test emits the outcome itself.
    Manual,
}

/// A call the mock engine received.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    /// Operation type.
    pub op_type: OpType,
    /// Namespace (the credential source for auth).
    pub namespace: String,
    /// Read preference mode, if one was attached.
    pub read_mode: Option<ReadMode>,
}

/// A scripted engine.
#[derive(Debug)]
pub struct MockEngine {
    bus: EventBus,
    connected: AtomicBool,
    destroyed: AtomicBool,
    behavior: Mutex<ConnectBehavior>,
    handshake: Mutex<Option<HandshakeDocument>>,
    dispatched: Mutex<Vec<DispatchedCall>>,
    connect_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    last_options: Mutex<Option<ResolvedOptions>>,
}

impl MockEngine {
    /// Creates a disconnected engine that connects successfully.
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            connected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            behavior: Mutex::new(ConnectBehavior::Succeed),
            handshake: Mutex::new(Some(HandshakeDocument::with_wire_versions(0, 5))),
            dispatched: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    /// Creates an engine that is already connected.
    pub fn connected() -> Self {
        let engine = Self::new();
        engine.set_connected(true);
        engine
    }

    /// Sets the connect behavior.
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Sets the handshake returned by `last_handshake`.
    pub fn set_handshake(&self, handshake: Option<HandshakeDocument>) {
        *self.handshake.lock() = handshake;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Emits an event as if the engine raised it.
    pub fn emit(&self, event: TopologyEvent) -> usize {
        self.bus.emit(&event)
    }

    /// Marks the engine connected and emits `reconnect`.
    pub fn simulate_reconnect(&self) {
        self.set_connected(true);
        self.bus.emit(&TopologyEvent::bare(EventKind::Reconnect));
    }

    /// Calls received so far.
    pub fn dispatched(&self) -> Vec<DispatchedCall> {
        self.dispatched.lock().clone()
    }

    /// Number of `connect` calls.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `destroy` calls.
    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    /// Options passed to the last `connect`.
    pub fn last_options(&self) -> Option<ResolvedOptions> {
        self.last_options.lock().clone()
    }

    fn record(&self, op_type: OpType, namespace: &str, options: &OperationOptions) {
        self.dispatched.lock().push(DispatchedCall {
            op_type,
            namespace: namespace.to_string(),
            read_mode: options.read_preference().map(|p| p.mode),
        });
    }

    fn respond(&self, completion: Completion, reply: Document) {
        if self.is_connected(&OperationOptions::default()) {
            completion.complete(Ok(reply));
        } else {
            completion.fail(TopologyError::NoConnection);
        }
    }

    fn write(&self, op_type: OpType, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion) {
        self.record(op_type, ns, &options);
        self.respond(completion, json!({"ok": 1, "n": ops.len()}));
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyEngine for MockEngine {
    fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    fn connect(&self, _seeds: &[ServerAddress], options: &ResolvedOptions) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());

        let behavior = *self.behavior.lock();
        match behavior {
            ConnectBehavior::Succeed => {
                self.destroyed.store(false, Ordering::SeqCst);
                self.set_connected(true);
                let payload = self
                    .handshake
                    .lock()
                    .as_ref()
                    .map(HandshakeDocument::to_document)
                    .unwrap_or(Document::Null);
                self.bus.emit(&TopologyEvent::new(EventKind::Connect, payload));
            }
            ConnectBehavior::Fail(kind) => {
                self.bus.emit(&TopologyEvent::new(
                    kind,
                    json!({"message": "mock connect failure"}),
                ));
            }
            ConnectBehavior::Manual => {}
        }
    }

    fn destroy(&self, _force: bool) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
        self.set_connected(false);
    }

    fn is_connected(&self, _options: &OperationOptions) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.destroyed.load(Ordering::SeqCst)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn command(&self, ns: &str, _cmd: Document, options: OperationOptions, completion: Completion) {
        self.record(OpType::Command, ns, &options);
        self.respond(completion, json!({"ok": 1}));
    }

    fn insert(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion) {
        self.write(OpType::Insert, ns, ops, options, completion);
    }

    fn update(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion) {
        self.write(OpType::Update, ns, ops, options, completion);
    }

    fn remove(&self, ns: &str, ops: Vec<Document>, options: OperationOptions, completion: Completion) {
        self.write(OpType::Remove, ns, ops, options, completion);
    }

    fn auth(&self, credentials: Credentials, completion: Completion) {
        self.record(OpType::Auth, &credentials.source, &OperationOptions::default());
        self.respond(completion, json!({"ok": 1}));
    }

    fn cursor(&self, ns: &str, _cmd: Document, options: OperationOptions) -> Arc<dyn Cursor> {
        Arc::new(MockCursor::new(ns, options.read_preference().cloned()))
    }

    fn last_handshake(&self) -> Option<HandshakeDocument> {
        self.handshake.lock().clone()
    }
}

/// A cursor that records the methods invoked on it.
#[derive(Debug)]
pub struct MockCursor {
    namespace: String,
    read_preference: Option<ReadPreference>,
    invocations: Mutex<Vec<String>>,
}

impl MockCursor {
    /// Creates a cursor.
    pub fn new(namespace: impl Into<String>, read_preference: Option<ReadPreference>) -> Self {
        Self {
            namespace: namespace.into(),
            read_preference,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Method names invoked so far.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }
}

impl Cursor for MockCursor {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.read_preference.as_ref()
    }

    fn invoke(&self, method: &str, args: Vec<Document>, completion: Completion) {
        self.invocations.lock().push(method.to_string());
        completion.complete(Ok(json!({"ok": 1, "method": method, "args": args.len()})));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_engine_connection() {
        let engine = MockEngine::new();
        assert!(!engine.is_connected(&OperationOptions::default()));

        engine.connect(&[], &ResolvedOptions::default());
        assert!(engine.is_connected(&OperationOptions::default()));
        assert_eq!(engine.connect_calls(), 1);

        engine.destroy(false);
        assert!(!engine.is_connected(&OperationOptions::default()));
        assert!(engine.is_destroyed());
        assert_eq!(engine.destroy_calls(), 1);
    }

    #[test]
    fn mock_engine_fails_when_disconnected() {
        let engine = MockEngine::new();
        let (completion, mut rx) = Completion::channel();
        engine.command("admin.$cmd", json!({"ping": 1}), OperationOptions::default(), completion);
        assert_eq!(rx.try_recv().unwrap(), Err(TopologyError::NoConnection));
        assert_eq!(engine.dispatched().len(), 1);
    }

    #[test]
    fn mock_engine_emits_failure() {
        let engine = MockEngine::new();
        engine.set_behavior(ConnectBehavior::Fail(EventKind::Timeout));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        engine.on(
            EventKind::Timeout,
            Arc::new(move |_: &TopologyEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        engine.connect(&[], &ResolvedOptions::default());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!engine.is_connected(&OperationOptions::default()));
    }

    #[test]
    fn mock_cursor_records_invocations() {
        let cursor = MockCursor::new("db.c", None);
        let (completion, mut rx) = Completion::channel();
        cursor.invoke("next", vec![json!(1)], completion);
        assert_eq!(cursor.invocations(), vec!["next".to_string()]);
        assert_eq!(rx.try_recv().unwrap().unwrap()["method"], json!("next"));
    }
}
