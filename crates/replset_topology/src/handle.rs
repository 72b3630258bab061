//! Replica-set handle: lifecycle state machine, routing and event relay.
//!
//! The handle owns the operation buffer and the cached capabilities, and
//! drives an engine through `Idle → Connecting → Connected`, with `Closed`
//! reachable from any state and terminal.
//!
//! ## Key Invariants
//!
//! - The connect callback runs exactly once per `connect` call
//! - A failed connect removes every listener it registered and destroys the
//!   engine
//! - Capabilities are derived once and never recomputed
//! - Replays triggered by `reconnect` never overlap; a signal arriving during
//!   a replay schedules one more pass
//! - After `close`, calls fail fast with [`TopologyError::Closed`], or with
//!   [`TopologyError::ForcedClosed`] after a forced close

use crate::completion::Completion;
use crate::config::{
    parse_seeds, validate_seeds, BufferLimit, ConnectOptions, ReplSetOptions, ResolvedOptions,
};
use crate::engine::{Cursor, OperationOptions, TopologyEngine};
use crate::error::{TopologyError, TopologyResult};
use crate::event::{EventBus, EventKind, Listener, ListenerId, TopologyEvent};
use crate::fault::{self, Fault};
use crate::store::{BufferedOperation, DirectCall, OperationStore, ReplayFilter, StoreStats};
use parking_lot::{Mutex, RwLock};
use replset_protocol::{
    CapabilitySet, Credentials, Document, HandshakeDocument, ReadPreferenceOption, ServerAddress,
};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not connected, no attempt in flight.
    Idle,
    /// Waiting for the engine's connect outcome.
    Connecting,
    /// Connected; reconnects are reported as events.
    Connected,
    /// Closed for good.
    Closed,
}

impl LifecycleState {
    /// Returns true if a `connect` call is accepted.
    pub fn can_connect(&self) -> bool {
        matches!(self, LifecycleState::Idle)
    }

    /// Returns true once the handle is closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Closed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Callback receiving the outcome of [`ReplicaSetHandle::connect`].
pub type ConnectCallback<E> = Box<dyn FnOnce(TopologyResult<Arc<ReplicaSetHandle<E>>>) + Send>;

#[derive(Debug, Clone, Copy)]
struct Registration {
    kind: EventKind,
    id: ListenerId,
}

/// One in-flight connect: its callback and its one-shot listeners.
struct ConnectAttempt<E: TopologyEngine> {
    callback: Mutex<Option<ConnectCallback<E>>>,
    listeners: Mutex<Vec<Registration>>,
}

impl<E: TopologyEngine> ConnectAttempt<E> {
    fn take_callback(&self) -> Option<ConnectCallback<E>> {
        self.callback.lock().take()
    }
}

/// Caller-facing handle to a replica set.
pub struct ReplicaSetHandle<E: TopologyEngine> {
    seeds: Vec<ServerAddress>,
    options: ResolvedOptions,
    engine: Arc<E>,
    store: OperationStore,
    capabilities: OnceLock<CapabilitySet>,
    state: RwLock<LifecycleState>,
    events: EventBus,
    registrations: Mutex<Vec<Registration>>,
    attempt: Mutex<Option<Arc<ConnectAttempt<E>>>>,
    replaying: AtomicBool,
    replay_pending: AtomicBool,
    self_ref: Weak<Self>,
}

impl<E: TopologyEngine + 'static> ReplicaSetHandle<E> {
    /// Creates a handle over `engine`.
    ///
    /// Fails with [`TopologyError::Configuration`] if the seed list is empty
    /// or malformed, or if the options do not resolve.
    pub fn new(
        seeds: Vec<ServerAddress>,
        options: &ReplSetOptions,
        engine: Arc<E>,
    ) -> TopologyResult<Arc<Self>> {
        validate_seeds(&seeds)?;
        let options = options.resolve()?;
        let store = OperationStore::new(options.buffer_limit);

        Ok(Arc::new_cyclic(|self_ref| Self {
            seeds,
            options,
            engine,
            store,
            capabilities: OnceLock::new(),
            state: RwLock::new(LifecycleState::Idle),
            events: EventBus::new(),
            registrations: Mutex::new(Vec::new()),
            attempt: Mutex::new(None),
            replaying: AtomicBool::new(false),
            replay_pending: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    /// Creates a handle from `host:port` strings.
    pub fn from_hosts<S: AsRef<str>>(
        hosts: &[S],
        options: &ReplSetOptions,
        engine: Arc<E>,
    ) -> TopologyResult<Arc<Self>> {
        Self::new(parse_seeds(hosts)?, options, engine)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Seed list.
    pub fn seeds(&self) -> &[ServerAddress] {
        &self.seeds
    }

    /// Merged configuration.
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Number of buffered operations.
    pub fn buffered_len(&self) -> usize {
        self.store.len()
    }

    /// Buffer counters.
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Returns true if the handle is connected and the engine has a member
    /// suitable for `options`.
    pub fn is_connected(&self, options: &OperationOptions) -> bool {
        self.state() == LifecycleState::Connected && self.engine.is_connected(options)
    }

    /// Returns true once closed or once the engine is destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state().is_terminal() || self.engine.is_destroyed()
    }

    /// Most recent handshake reported by the engine.
    pub fn last_handshake(&self) -> Option<HandshakeDocument> {
        self.engine.last_handshake()
    }

    /// Capabilities of the cluster.
    ///
    /// Derived from the first handshake seen and cached for the lifetime of
    /// the handle.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        if let Some(caps) = self.capabilities.get() {
            return Some(*caps);
        }
        let handshake = self.engine.last_handshake()?;
        Some(*self.capabilities.get_or_init(|| CapabilitySet::derive(&handshake)))
    }

    /// Registers a caller listener.
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// Registers a one-shot caller listener.
    pub fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.events.once(kind, listener)
    }

    /// Removes a caller listener.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.remove_listener(kind, id)
    }

    /// Number of caller listeners for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.listener_count(kind)
    }

    /// Connects to the replica set.
    ///
    /// `on_done` runs exactly once, with the handle on success or the
    /// failure otherwise. A panic inside `on_done` is reported to the
    /// [`fault`] channel rather than unwinding into the engine.
    pub fn connect<F>(&self, overrides: ConnectOptions, on_done: F)
    where
        F: FnOnce(TopologyResult<Arc<Self>>) + Send + 'static,
    {
        {
            let mut state = self.state.write();
            if !state.can_connect() {
                let error = if state.is_terminal() {
                    TopologyError::Closed
                } else {
                    TopologyError::InvalidState {
                        from: state.to_string(),
                        to: "connecting".into(),
                    }
                };
                drop(state);
                Self::deliver(Box::new(on_done), Err(error));
                return;
            }
            *state = LifecycleState::Connecting;
        }

        if let Some(entries) = overrides.buffer_max_entries {
            self.store.set_limit(BufferLimit::from_entries(entries));
        }

        self.register_relays();

        let attempt = Arc::new(ConnectAttempt {
            callback: Mutex::new(Some(Box::new(on_done) as ConnectCallback<E>)),
            listeners: Mutex::new(Vec::new()),
        });
        *self.attempt.lock() = Some(Arc::clone(&attempt));

        {
            // Held until every attempt listener is registered.
            let mut listeners = attempt.listeners.lock();
            for kind in EventKind::CONNECT_FAILURES {
                let handle = self.self_ref.clone();
                let this_attempt = Arc::clone(&attempt);
                let id = self.engine.once(
                    kind,
                    Arc::new(move |event: &TopologyEvent| {
                        if let Some(handle) = handle.upgrade() {
                            handle.connect_failed(&this_attempt, event);
                        }
                    }),
                );
                listeners.push(Registration { kind, id });
            }

            let handle = self.self_ref.clone();
            let this_attempt = Arc::clone(&attempt);
            let id = self.engine.once(
                EventKind::Connect,
                Arc::new(move |event: &TopologyEvent| {
                    if let Some(handle) = handle.upgrade() {
                        handle.connect_succeeded(&this_attempt, event);
                    }
                }),
            );
            listeners.push(Registration {
                kind: EventKind::Connect,
                id,
            });
        }

        if self.state().is_terminal() {
            self.abandon_attempt(&attempt);
            return;
        }

        info!(
            seeds = self.seeds.len(),
            set_name = self.options.set_name.as_deref(),
            "connecting to replica set"
        );
        self.engine.connect(&self.seeds, &self.options);
    }

    /// Unwinds an attempt whose handle was closed before the engine started.
    fn abandon_attempt(&self, attempt: &Arc<ConnectAttempt<E>>) {
        self.remove_engine_registrations();
        let callback = attempt.take_callback();
        self.remove_attempt_listeners(attempt);
        if let Some(callback) = callback {
            Self::deliver(callback, Err(TopologyError::Closed));
        }
    }

    fn connect_succeeded(&self, attempt: &Arc<ConnectAttempt<E>>, event: &TopologyEvent) {
        let Some(callback) = attempt.take_callback() else {
            return;
        };
        self.remove_attempt_listeners(attempt);

        {
            let mut state = self.state.write();
            if state.is_terminal() {
                drop(state);
                Self::deliver(callback, Err(TopologyError::Closed));
                return;
            }
            *state = LifecycleState::Connected;
        }

        self.register_runtime_listeners();
        if self.state().is_terminal() {
            self.remove_engine_registrations();
            Self::deliver(callback, Err(TopologyError::Closed));
            return;
        }

        let capabilities = self.capabilities();
        info!(
            max_wire_version = capabilities.map(|c| c.max_wire_version),
            buffered = self.store.len(),
            "connected to replica set"
        );

        self.events.emit(&event.relabel(EventKind::Open));
        // Operations issued while connecting go out now.
        self.replay();

        let result = self.self_ref.upgrade().ok_or(TopologyError::Closed);
        Self::deliver(callback, result);
    }

    fn connect_failed(&self, attempt: &Arc<ConnectAttempt<E>>, event: &TopologyEvent) {
        let Some(callback) = attempt.take_callback() else {
            return;
        };
        self.remove_attempt_listeners(attempt);
        self.remove_engine_registrations();
        self.engine.destroy(false);

        {
            let mut state = self.state.write();
            if *state == LifecycleState::Connecting {
                *state = LifecycleState::Idle;
            }
        }

        let message = event.message();
        warn!(event = %event.kind, %message, "failed to connect to replica set");
        Self::deliver(
            callback,
            Err(TopologyError::Connect {
                event: event.kind,
                message,
            }),
        );
    }

    fn deliver(callback: ConnectCallback<E>, result: TopologyResult<Arc<Self>>) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || callback(result))) {
            fault::report(Fault::from_panic("replica set connect callback", payload));
        }
    }

    fn remove_attempt_listeners(&self, attempt: &ConnectAttempt<E>) {
        for registration in attempt.listeners.lock().drain(..) {
            self.engine
                .remove_listener(registration.kind, registration.id);
        }
        let mut current = self.attempt.lock();
        if current
            .as_ref()
            .is_some_and(|a| std::ptr::eq(Arc::as_ptr(a), attempt))
        {
            *current = None;
        }
    }

    fn register_engine_listener(&self, kind: EventKind, listener: Listener) {
        let id = self.engine.on(kind, listener);
        self.registrations.lock().push(Registration { kind, id });
    }

    fn remove_engine_registrations(&self) {
        let registrations = std::mem::take(&mut *self.registrations.lock());
        for registration in registrations {
            self.engine
                .remove_listener(registration.kind, registration.id);
        }
    }

    fn register_relays(&self) {
        for kind in EventKind::RELAYED {
            let handle = self.self_ref.clone();
            self.register_engine_listener(
                kind,
                Arc::new(move |event: &TopologyEvent| {
                    if let Some(handle) = handle.upgrade() {
                        handle.relay(event);
                    }
                }),
            );
        }
    }

    fn register_runtime_listeners(&self) {
        for kind in EventKind::CONNECT_FAILURES {
            let handle = self.self_ref.clone();
            self.register_engine_listener(
                kind,
                Arc::new(move |event: &TopologyEvent| {
                    if let Some(handle) = handle.upgrade() {
                        debug!(event = %event.kind, message = %event.message(), "engine reported failure");
                        handle.events.emit(event);
                    }
                }),
            );
        }

        let handle = self.self_ref.clone();
        self.register_engine_listener(
            EventKind::Reconnect,
            Arc::new(move |event: &TopologyEvent| {
                if let Some(handle) = handle.upgrade() {
                    handle.reconnected(event);
                }
            }),
        );
    }

    fn relay(&self, event: &TopologyEvent) {
        self.events.emit(event);
        if event.kind == EventKind::Ha {
            match event.payload.get("type").and_then(Document::as_str) {
                Some("start") => {
                    self.events.emit(&event.relabel(EventKind::HaConnect));
                }
                Some("end") => {
                    self.events.emit(&event.relabel(EventKind::HaIsmaster));
                }
                _ => {}
            }
        }
    }

    fn reconnected(&self, event: &TopologyEvent) {
        if self.state() != LifecycleState::Connected {
            return;
        }
        info!(buffered = self.store.len(), "replica set reconnected");
        self.events.emit(event);
        self.replay();
    }

    /// Replays the buffer with the default filter. Single-flight.
    fn replay(&self) {
        self.replay_pending.store(true, Ordering::SeqCst);
        loop {
            if self.replaying.swap(true, Ordering::SeqCst) {
                return;
            }
            while self.replay_pending.swap(false, Ordering::SeqCst) {
                self.store
                    .execute(self.engine.as_ref(), ReplayFilter::default());
            }
            self.replaying.store(false, Ordering::SeqCst);
            if !self.replay_pending.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// Closes the handle.
    ///
    /// Destroys the engine and removes every listener the handle registered
    /// on it. With `force`, buffering is disabled for good and buffered
    /// operations fail with [`TopologyError::ForcedClosed`]; otherwise they
    /// fail with [`TopologyError::Closed`]. Closing twice is a no-op.
    pub fn close(&self, force: bool) {
        let previous = std::mem::replace(&mut *self.state.write(), LifecycleState::Closed);
        if previous.is_terminal() {
            return;
        }

        self.engine.destroy(force);

        let pending_attempt = self.attempt.lock().take();
        if let Some(attempt) = pending_attempt {
            if let Some(callback) = attempt.take_callback() {
                self.remove_attempt_listeners(&attempt);
                Self::deliver(callback, Err(TopologyError::Closed));
            }
        }

        let failed = if force {
            self.store.force_close(TopologyError::ForcedClosed)
        } else {
            self.store.flush(Some(TopologyError::Closed))
        };

        self.remove_engine_registrations();
        for kind in [
            EventKind::Timeout,
            EventKind::Error,
            EventKind::Close,
            EventKind::Joined,
            EventKind::Left,
        ] {
            self.events.remove_all_listeners(kind);
        }

        info!(force, failed, "replica set handle closed");
    }

    fn closed_error(&self) -> TopologyError {
        if self.store.is_forced() {
            TopologyError::ForcedClosed
        } else {
            TopologyError::Closed
        }
    }

    fn route_direct(
        &self,
        namespace: &str,
        call: DirectCall,
        options: OperationOptions,
        completion: Completion,
    ) {
        if self.state().is_terminal() {
            completion.fail(self.closed_error());
            return;
        }
        let options = match options.normalized() {
            Ok(options) => options,
            Err(error) => {
                completion.fail(error);
                return;
            }
        };

        if self.is_connected(&options) {
            call.dispatch(self.engine.as_ref(), namespace, options, completion);
        } else {
            debug!(op = %call.op_type(), namespace, "buffering operation until connected");
            self.store
                .add(BufferedOperation::direct(namespace, call, options, completion));
        }
    }

    /// Runs a command.
    pub fn command(
        &self,
        ns: &str,
        cmd: Document,
        options: OperationOptions,
        completion: Completion,
    ) {
        self.route_direct(ns, DirectCall::Command(cmd), options, completion);
    }

    /// Inserts documents.
    pub fn insert(
        &self,
        ns: &str,
        ops: Vec<Document>,
        options: OperationOptions,
        completion: Completion,
    ) {
        self.route_direct(ns, DirectCall::Insert(ops), options, completion);
    }

    /// Applies updates.
    pub fn update(
        &self,
        ns: &str,
        ops: Vec<Document>,
        options: OperationOptions,
        completion: Completion,
    ) {
        self.route_direct(ns, DirectCall::Update(ops), options, completion);
    }

    /// Applies removes.
    pub fn remove(
        &self,
        ns: &str,
        ops: Vec<Document>,
        options: OperationOptions,
        completion: Completion,
    ) {
        self.route_direct(ns, DirectCall::Remove(ops), options, completion);
    }

    /// Authenticates.
    pub fn auth(&self, credentials: Credentials, completion: Completion) {
        let source = credentials.source.clone();
        self.route_direct(
            &source,
            DirectCall::Auth(credentials),
            OperationOptions::default(),
            completion,
        );
    }

    /// Creates a cursor on the engine.
    pub fn cursor(
        &self,
        ns: &str,
        cmd: Document,
        options: OperationOptions,
    ) -> TopologyResult<Arc<dyn Cursor>> {
        if self.state().is_terminal() {
            return Err(self.closed_error());
        }
        Ok(self.engine.cursor(ns, cmd, options.normalized()?))
    }

    /// Calls `method` on `cursor`, buffering the call while disconnected.
    pub fn cursor_call(
        &self,
        cursor: &Arc<dyn Cursor>,
        method: &str,
        args: Vec<Document>,
        completion: Completion,
    ) {
        if self.state().is_terminal() {
            completion.fail(self.closed_error());
            return;
        }

        let options = OperationOptions {
            read_preference: cursor
                .read_preference()
                .cloned()
                .map(ReadPreferenceOption::Resolved),
            ..OperationOptions::default()
        };
        if self.is_connected(&options) {
            cursor.invoke(method, args, completion);
        } else {
            debug!(namespace = cursor.namespace(), method, "buffering cursor call until connected");
            self.store.add(BufferedOperation::targeted(
                Arc::clone(cursor),
                method,
                args,
                completion,
            ));
        }
    }
}

impl<E: TopologyEngine> fmt::Debug for ReplicaSetHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaSetHandle")
            .field("state", &*self.state.read())
            .field("seeds", &self.seeds)
            .field("store", &self.store)
            .finish()
    }
}
