//! Buffer for operations issued while no member is available.
//!
//! The store keeps operations in FIFO order and resolves each one exactly
//! once: by replaying it against the engine, by delivering an error through
//! its completion, or (during a filtered replay) by dropping it.
//!
//! ## Key Invariants
//!
//! - `len()` equals the number of buffered operations not yet resolved
//! - Once force-closed, the store never buffers again
//! - `execute` swaps the queue out atomically, so an `add` racing with a
//!   replay lands in exactly one of the two queues
//! - Completions are never invoked while the store lock is held

use crate::completion::Completion;
use crate::config::BufferLimit;
use crate::engine::{Cursor, OperationOptions, TopologyEngine};
use crate::error::TopologyError;
use parking_lot::Mutex;
use replset_protocol::{Credentials, Document, OpType, ReadPreference};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The engine call behind a direct operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectCall {
    /// A command document.
    Command(Document),
    /// Documents to insert.
    Insert(Vec<Document>),
    /// Update statements.
    Update(Vec<Document>),
    /// Remove statements.
    Remove(Vec<Document>),
    /// Authentication.
    Auth(Credentials),
}

impl DirectCall {
    /// Operation type.
    pub fn op_type(&self) -> OpType {
        match self {
            DirectCall::Command(_) => OpType::Command,
            DirectCall::Insert(_) => OpType::Insert,
            DirectCall::Update(_) => OpType::Update,
            DirectCall::Remove(_) => OpType::Remove,
            DirectCall::Auth(_) => OpType::Auth,
        }
    }

    /// Sends the call to the engine.
    pub fn dispatch<E: TopologyEngine + ?Sized>(
        self,
        engine: &E,
        namespace: &str,
        options: OperationOptions,
        completion: Completion,
    ) {
        match self {
            DirectCall::Command(cmd) => engine.command(namespace, cmd, options, completion),
            DirectCall::Insert(ops) => engine.insert(namespace, ops, options, completion),
            DirectCall::Update(ops) => engine.update(namespace, ops, options, completion),
            DirectCall::Remove(ops) => engine.remove(namespace, ops, options, completion),
            DirectCall::Auth(credentials) => engine.auth(credentials, completion),
        }
    }
}

/// An operation waiting for a connection.
pub enum BufferedOperation {
    /// A call made directly on the engine.
    Direct {
        /// Target namespace (`db.collection`).
        namespace: String,
        /// The engine call.
        call: DirectCall,
        /// Normalized options.
        options: OperationOptions,
        /// Result sink.
        completion: Completion,
    },
    /// A call re-invoked on a specific cursor.
    Targeted {
        /// The cursor to call.
        target: Arc<dyn Cursor>,
        /// Method name.
        method: String,
        /// Method arguments.
        args: Vec<Document>,
        /// Result sink.
        completion: Completion,
    },
}

impl BufferedOperation {
    /// Creates a direct operation.
    pub fn direct(
        namespace: impl Into<String>,
        call: DirectCall,
        options: OperationOptions,
        completion: Completion,
    ) -> Self {
        BufferedOperation::Direct {
            namespace: namespace.into(),
            call,
            options,
            completion,
        }
    }

    /// Creates a buffered command.
    pub fn command(
        namespace: impl Into<String>,
        cmd: Document,
        options: OperationOptions,
        completion: Completion,
    ) -> Self {
        Self::direct(namespace, DirectCall::Command(cmd), options, completion)
    }

    /// Creates a buffered cursor call.
    pub fn targeted(
        target: Arc<dyn Cursor>,
        method: impl Into<String>,
        args: Vec<Document>,
        completion: Completion,
    ) -> Self {
        BufferedOperation::Targeted {
            target,
            method: method.into(),
            args,
            completion,
        }
    }

    /// Read preference used when filtering a replay.
    pub fn read_preference(&self) -> Option<&ReadPreference> {
        match self {
            BufferedOperation::Direct { options, .. } => options.read_preference(),
            BufferedOperation::Targeted { target, .. } => target.read_preference(),
        }
    }

    /// Namespace the operation targets.
    pub fn namespace(&self) -> &str {
        match self {
            BufferedOperation::Direct { namespace, .. } => namespace,
            BufferedOperation::Targeted { target, .. } => target.namespace(),
        }
    }

    /// Resolves the operation with an error.
    pub fn fail(self, error: TopologyError) {
        match self {
            BufferedOperation::Direct { completion, .. }
            | BufferedOperation::Targeted { completion, .. } => completion.fail(error),
        }
    }

    /// Sends the operation to the engine (or its cursor).
    pub fn dispatch<E: TopologyEngine + ?Sized>(self, engine: &E) {
        match self {
            BufferedOperation::Direct {
                namespace,
                call,
                options,
                completion,
            } => call.dispatch(engine, &namespace, options, completion),
            BufferedOperation::Targeted {
                target,
                method,
                args,
                completion,
            } => target.invoke(&method, args, completion),
        }
    }
}

impl fmt::Debug for BufferedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferedOperation::Direct {
                namespace, call, ..
            } => f
                .debug_struct("Direct")
                .field("op_type", &call.op_type())
                .field("namespace", namespace)
                .finish(),
            BufferedOperation::Targeted { target, method, .. } => f
                .debug_struct("Targeted")
                .field("namespace", &target.namespace())
                .field("method", method)
                .finish(),
        }
    }
}

/// Which member classes a replay may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayFilter {
    /// A primary is available.
    pub execute_primary: bool,
    /// A secondary is available.
    pub execute_secondary: bool,
}

impl ReplayFilter {
    /// Only primary-compatible operations.
    pub fn primary_only() -> Self {
        Self {
            execute_primary: true,
            execute_secondary: false,
        }
    }

    /// Only secondary-compatible operations.
    pub fn secondary_only() -> Self {
        Self {
            execute_primary: false,
            execute_secondary: true,
        }
    }

    /// Returns true if `op` should be replayed under this filter.
    ///
    /// An operation without a read preference, authentication included,
    /// only passes when both classes are allowed.
    pub fn allows(&self, op: &BufferedOperation) -> bool {
        if self.execute_primary && self.execute_secondary {
            return true;
        }
        match op.read_preference() {
            None => false,
            Some(pref) if self.execute_primary => pref.mode.is_primary_compatible(),
            Some(pref) if self.execute_secondary => pref.mode.is_secondary_compatible(),
            Some(_) => false,
        }
    }
}

impl Default for ReplayFilter {
    fn default() -> Self {
        Self {
            execute_primary: true,
            execute_secondary: true,
        }
    }
}

/// Outcome of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Operations sent to the engine.
    pub replayed: usize,
    /// Operations dropped by the filter.
    pub dropped: usize,
}

/// Lifetime counters for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Operations accepted into the queue.
    pub buffered: u64,
    /// Operations replayed against the engine.
    pub replayed: u64,
    /// Operations resolved by `flush` or `force_close`.
    pub flushed: u64,
    /// Operations rejected by `add` (including capacity drains).
    pub rejected: u64,
    /// Operations dropped by a filtered replay.
    pub dropped: u64,
}

struct StoreState {
    queue: VecDeque<BufferedOperation>,
    forced: bool,
    limit: BufferLimit,
    stats: StoreStats,
}

enum Admission {
    Queued,
    Rejected(BufferedOperation, TopologyError),
    Overflow(VecDeque<BufferedOperation>, BufferedOperation, usize),
}

/// Bounded FIFO buffer of pending operations.
pub struct OperationStore {
    state: Mutex<StoreState>,
}

impl OperationStore {
    /// Creates a store with the given limit.
    pub fn new(limit: BufferLimit) -> Self {
        Self {
            state: Mutex::new(StoreState {
                queue: VecDeque::new(),
                forced: false,
                limit,
                stats: StoreStats::default(),
            }),
        }
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once the store has been force-closed.
    pub fn is_forced(&self) -> bool {
        self.state.lock().forced
    }

    /// Current limit.
    pub fn limit(&self) -> BufferLimit {
        self.state.lock().limit
    }

    /// Replaces the limit. Already queued operations are kept.
    pub fn set_limit(&self, limit: BufferLimit) {
        self.state.lock().limit = limit;
    }

    /// Lifetime counters.
    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats.clone()
    }

    /// Buffers an operation.
    ///
    /// Rejects it through its completion when the store is force-closed or
    /// buffering is disabled. When the bound would be exceeded, every queued
    /// operation and `op` itself fail with
    /// [`TopologyError::BufferCapacityExceeded`].
    pub fn add(&self, op: BufferedOperation) {
        let admission = {
            let mut state = self.state.lock();
            if state.forced {
                state.stats.rejected += 1;
                Admission::Rejected(op, TopologyError::ForcedClosed)
            } else {
                match state.limit {
                    BufferLimit::Disabled => {
                        state.stats.rejected += 1;
                        Admission::Rejected(op, TopologyError::NoConnection)
                    }
                    BufferLimit::Bounded(max) if !state.limit.admits(state.queue.len() + 1) => {
                        let drained = std::mem::take(&mut state.queue);
                        state.stats.rejected += drained.len() as u64 + 1;
                        Admission::Overflow(drained, op, max)
                    }
                    _ => {
                        state.queue.push_back(op);
                        state.stats.buffered += 1;
                        Admission::Queued
                    }
                }
            }
        };

        match admission {
            Admission::Queued => {}
            Admission::Rejected(op, error) => {
                debug!(namespace = op.namespace(), %error, "operation not buffered");
                op.fail(error);
            }
            Admission::Overflow(drained, op, limit) => {
                warn!(
                    limit,
                    drained = drained.len(),
                    "operation buffer full, failing all buffered operations"
                );
                let error = TopologyError::BufferCapacityExceeded { limit };
                for pending in drained {
                    pending.fail(error.clone());
                }
                op.fail(error);
            }
        }
    }

    /// Fails every buffered operation, oldest first.
    ///
    /// Uses [`TopologyError::NoConnection`] when no error is given. Returns
    /// the number of operations resolved.
    pub fn flush(&self, error: Option<TopologyError>) -> usize {
        let error = error.unwrap_or(TopologyError::NoConnection);
        let mut flushed = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let op = state.queue.pop_front();
                if op.is_some() {
                    state.stats.flushed += 1;
                }
                op
            };
            match next {
                Some(op) => {
                    op.fail(error.clone());
                    flushed += 1;
                }
                None => break,
            }
        }
        flushed
    }

    /// Permanently disables buffering and fails everything queued.
    ///
    /// The flag flips in the same critical section that empties the queue.
    pub fn force_close(&self, error: TopologyError) -> usize {
        let drained = {
            let mut state = self.state.lock();
            state.forced = true;
            let drained = std::mem::take(&mut state.queue);
            state.stats.flushed += drained.len() as u64;
            drained
        };
        let count = drained.len();
        for op in drained {
            op.fail(error.clone());
        }
        count
    }

    /// Replays buffered operations against `engine`.
    ///
    /// Operations the filter rejects are dropped without resolving their
    /// completion.
    pub fn execute<E: TopologyEngine + ?Sized>(
        &self,
        engine: &E,
        filter: ReplayFilter,
    ) -> ReplayReport {
        let ops = std::mem::take(&mut self.state.lock().queue);
        let mut report = ReplayReport::default();

        for op in ops {
            if filter.allows(&op) {
                op.dispatch(engine);
                report.replayed += 1;
            } else {
                warn!(
                    namespace = op.namespace(),
                    mode = op.read_preference().map(|p| p.mode.as_str()),
                    "dropping buffered operation that does not match replay filter"
                );
                report.dropped += 1;
            }
        }

        {
            let mut state = self.state.lock();
            state.stats.replayed += report.replayed as u64;
            state.stats.dropped += report.dropped as u64;
        }
        if report.replayed + report.dropped > 0 {
            debug!(
                replayed = report.replayed,
                dropped = report.dropped,
                "replayed buffered operations"
            );
        }
        report
    }
}

impl Default for OperationStore {
    fn default() -> Self {
        Self::new(BufferLimit::Unbounded)
    }
}

impl fmt::Debug for OperationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OperationStore")
            .field("len", &state.queue.len())
            .field("forced", &state.forced)
            .field("limit", &state.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionReceiver, OpResult};
    use crate::mock::{MockCursor, MockEngine};
    use proptest::prelude::*;
    use replset_protocol::ReadMode;
    use serde_json::json;
    use tokio::sync::oneshot::error::TryRecvError;

    fn command(ns: &str) -> (BufferedOperation, CompletionReceiver) {
        let (completion, rx) = Completion::channel();
        (
            BufferedOperation::command(ns, json!({"ping": 1}), OperationOptions::new(), completion),
            rx,
        )
    }

    fn command_with_mode(ns: &str, mode: ReadMode) -> (BufferedOperation, CompletionReceiver) {
        let (completion, rx) = Completion::channel();
        let options = OperationOptions::new()
            .with_read_preference(mode)
            .normalized()
            .unwrap();
        (
            BufferedOperation::command(ns, json!({"find": "users"}), options, completion),
            rx,
        )
    }

    fn ordered_sink(
        log: &Arc<Mutex<Vec<(usize, OpResult)>>>,
        index: usize,
    ) -> Completion {
        let log = Arc::clone(log);
        Completion::new(move |result| log.lock().push((index, result)))
    }

    #[test]
    fn add_buffers_operations() {
        let store = OperationStore::default();
        let (a, _ra) = command("db.a");
        let (b, _rb) = command("db.b");

        store.add(a);
        store.add(b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().buffered, 2);
    }

    #[test]
    fn capacity_overflow_fails_everything() {
        let store = OperationStore::new(BufferLimit::Bounded(2));
        let (a, mut ra) = command("db.a");
        let (b, mut rb) = command("db.b");
        let (c, mut rc) = command("db.c");

        store.add(a);
        store.add(b);
        assert_eq!(store.len(), 2);
        assert!(matches!(ra.try_recv(), Err(TryRecvError::Empty)));

        store.add(c);
        let expected = Err(TopologyError::BufferCapacityExceeded { limit: 2 });
        assert_eq!(ra.try_recv().unwrap(), expected);
        assert_eq!(rb.try_recv().unwrap(), expected);
        assert_eq!(rc.try_recv().unwrap(), expected);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().rejected, 3);
    }

    #[test]
    fn capacity_drain_is_fifo() {
        let store = OperationStore::new(BufferLimit::Bounded(3));
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            store.add(BufferedOperation::command(
                "db.c",
                json!({"i": i}),
                OperationOptions::new(),
                ordered_sink(&log, i),
            ));
        }
        let order: Vec<usize> = log.lock().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn disabled_store_never_buffers() {
        let store = OperationStore::new(BufferLimit::Disabled);
        let (a, mut ra) = command("db.a");

        store.add(a);
        assert_eq!(store.len(), 0);
        assert_eq!(ra.try_recv().unwrap(), Err(TopologyError::NoConnection));
    }

    #[test]
    fn flush_resolves_in_order() {
        let store = OperationStore::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            store.add(BufferedOperation::command(
                "db.c",
                json!({"i": i}),
                OperationOptions::new(),
                ordered_sink(&log, i),
            ));
        }

        let flushed = store.flush(Some(TopologyError::transport_fatal("gone")));
        assert_eq!(flushed, 5);
        assert_eq!(store.len(), 0);

        let log = log.lock();
        assert_eq!(log.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(log
            .iter()
            .all(|(_, r)| *r == Err(TopologyError::transport_fatal("gone"))));
    }

    #[test]
    fn flush_defaults_to_no_connection() {
        let store = OperationStore::default();
        let (a, mut ra) = command("db.a");
        store.add(a);

        assert_eq!(store.flush(None), 1);
        assert_eq!(ra.try_recv().unwrap(), Err(TopologyError::NoConnection));
        assert_eq!(store.flush(None), 0);
    }

    #[test]
    fn force_close_is_sticky() {
        let store = OperationStore::default();
        let (a, mut ra) = command("db.a");
        store.add(a);

        assert_eq!(store.force_close(TopologyError::ForcedClosed), 1);
        assert!(store.is_forced());
        assert_eq!(ra.try_recv().unwrap(), Err(TopologyError::ForcedClosed));

        for _ in 0..3 {
            let (op, mut rx) = command("db.b");
            store.add(op);
            assert_eq!(rx.try_recv().unwrap(), Err(TopologyError::ForcedClosed));
            assert_eq!(store.len(), 0);
        }

        store.set_limit(BufferLimit::Unbounded);
        assert!(store.is_forced());
    }

    #[test]
    fn execute_replays_everything_by_default() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        let (a, mut ra) = command("db.a");
        let (b, mut rb) = command_with_mode("db.b", ReadMode::Secondary);
        store.add(a);
        store.add(b);

        let report = store.execute(&engine, ReplayFilter::default());
        assert_eq!(report, ReplayReport { replayed: 2, dropped: 0 });
        assert_eq!(store.len(), 0);
        assert!(ra.try_recv().unwrap().is_ok());
        assert!(rb.try_recv().unwrap().is_ok());

        let namespaces: Vec<_> = engine.dispatched().into_iter().map(|c| c.namespace).collect();
        assert_eq!(namespaces, vec!["db.a", "db.b"]);
    }

    #[test]
    fn execute_drops_secondary_ops_for_primary_filter() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        let (op, mut rx) = command_with_mode("db.users", ReadMode::Secondary);
        store.add(op);

        let report = store.execute(&engine, ReplayFilter::primary_only());
        assert_eq!(report, ReplayReport { replayed: 0, dropped: 1 });
        assert_eq!(store.len(), 0);
        assert!(engine.dispatched().is_empty());
        // Dropped, never resolved.
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));

        let report = store.execute(&engine, ReplayFilter::default());
        assert_eq!(report, ReplayReport::default());
        assert_eq!(store.stats().dropped, 1);
    }

    #[test]
    fn primary_filter_keeps_primary_compatible_modes() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        for mode in ReadMode::ALL {
            let (op, _rx) = command_with_mode(mode.as_str(), mode);
            store.add(op);
        }
        let (plain, _rx) = command("db.plain");
        store.add(plain);

        let report = store.execute(&engine, ReplayFilter::primary_only());
        assert_eq!(report, ReplayReport { replayed: 4, dropped: 2 });
        let namespaces: Vec<_> = engine.dispatched().into_iter().map(|c| c.namespace).collect();
        assert_eq!(
            namespaces,
            vec!["primary", "primaryPreferred", "secondaryPreferred", "nearest"]
        );
    }

    #[test]
    fn secondary_filter_keeps_secondary_compatible_modes() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        for mode in ReadMode::ALL {
            let (op, _rx) = command_with_mode(mode.as_str(), mode);
            store.add(op);
        }

        let report = store.execute(&engine, ReplayFilter::secondary_only());
        assert_eq!(report, ReplayReport { replayed: 2, dropped: 3 });
        let namespaces: Vec<_> = engine.dispatched().into_iter().map(|c| c.namespace).collect();
        assert_eq!(namespaces, vec!["secondary", "secondaryPreferred"]);
    }

    #[test]
    fn auth_without_read_preference_needs_unfiltered_replay() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        let (completion, mut rx) = Completion::channel();
        store.add(BufferedOperation::direct(
            "admin",
            DirectCall::Auth(Credentials::new("SCRAM-SHA-1", "admin", "root", "pw")),
            OperationOptions::new(),
            completion,
        ));

        let report = store.execute(&engine, ReplayFilter::primary_only());
        assert_eq!(report, ReplayReport { replayed: 0, dropped: 1 });
        assert!(store.is_empty());
        assert!(engine.dispatched().is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));

        let (completion, mut rx) = Completion::channel();
        store.add(BufferedOperation::direct(
            "admin",
            DirectCall::Auth(Credentials::new("SCRAM-SHA-1", "admin", "root", "pw")),
            OperationOptions::new(),
            completion,
        ));
        let report = store.execute(&engine, ReplayFilter::default());
        assert_eq!(report.replayed, 1);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(engine.dispatched()[0].op_type, OpType::Auth);
    }

    #[test]
    fn targeted_ops_use_cursor_read_preference() {
        let engine = MockEngine::connected();
        let store = OperationStore::default();
        let primary = Arc::new(MockCursor::new("db.p", Some(ReadPreference::primary())));
        let secondary = Arc::new(MockCursor::new("db.s", Some(ReadPreference::secondary())));

        let (c1, mut r1) = Completion::channel();
        let (c2, mut r2) = Completion::channel();
        store.add(BufferedOperation::targeted(primary.clone(), "next", vec![], c1));
        store.add(BufferedOperation::targeted(secondary.clone(), "next", vec![], c2));

        let report = store.execute(&engine, ReplayFilter::primary_only());
        assert_eq!(report, ReplayReport { replayed: 1, dropped: 1 });
        assert_eq!(primary.invocations(), vec!["next".to_string()]);
        assert!(secondary.invocations().is_empty());
        assert!(r1.try_recv().unwrap().is_ok());
        assert!(matches!(r2.try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn concurrent_adds_and_replays_lose_nothing() {
        let engine = Arc::new(MockEngine::connected());
        let store = Arc::new(OperationStore::default());
        let threads = 4;
        let per_thread = 250;

        let producers: Vec<_> = (0..threads)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        store.add(BufferedOperation::command(
                            format!("db.t{t}"),
                            json!({"i": i}),
                            OperationOptions::new(),
                            Completion::ignore(),
                        ));
                    }
                })
            })
            .collect();

        let replayer = {
            let store = Arc::clone(&store);
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let mut replayed = 0;
                for _ in 0..200 {
                    replayed += store.execute(engine.as_ref(), ReplayFilter::default()).replayed;
                    std::thread::yield_now();
                }
                replayed
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let mut replayed = replayer.join().unwrap();
        replayed += store.execute(engine.as_ref(), ReplayFilter::default()).replayed;

        assert_eq!(replayed, threads * per_thread);
        assert_eq!(engine.dispatched().len(), threads * per_thread);
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn len_tracks_unresolved_operations(count in 0usize..64, flush_at in proptest::option::of(0usize..64)) {
            let store = OperationStore::default();
            let resolved = Arc::new(Mutex::new(0usize));

            for i in 0..count {
                if flush_at == Some(i) {
                    store.flush(None);
                }
                let sink = Arc::clone(&resolved);
                store.add(BufferedOperation::command(
                    "db.c",
                    json!({"i": i}),
                    OperationOptions::new(),
                    Completion::new(move |_| *sink.lock() += 1),
                ));
                prop_assert_eq!(store.len(), i + 1 - *resolved.lock());
            }
        }

        #[test]
        fn overflow_leaves_store_empty(bound in 1usize..16) {
            let store = OperationStore::new(BufferLimit::Bounded(bound));
            let failures = Arc::new(Mutex::new(0usize));
            for i in 0..=bound {
                let failures = Arc::clone(&failures);
                store.add(BufferedOperation::command(
                    "db.c",
                    json!({"i": i}),
                    OperationOptions::new(),
                    Completion::new(move |r| {
                        if r == Err(TopologyError::BufferCapacityExceeded { limit: bound }) {
                            *failures.lock() += 1;
                        }
                    }),
                ));
            }
            prop_assert_eq!(store.len(), 0);
            prop_assert_eq!(*failures.lock(), bound + 1);
        }
    }
}
