//! # Replica-Set Topology
//!
//! Caller-facing facade over a replica-set topology engine.
//!
//! This crate provides:
//! - Replica-set handle (idle → connecting → connected, closed from anywhere)
//! - Bounded operation buffer with backpressure, flush and filtered replay
//! - Capability flags derived once from the first handshake
//! - Event relay from the engine bus to the handle bus
//! - Configuration merging and seed validation
//! - An in-memory engine for tests
//!
//! ## Architecture
//!
//! The handle never touches the network. A [`TopologyEngine`] performs the
//! wire I/O and reports lifecycle changes as events; the handle:
//! 1. Buffers operations while no suitable member is reachable
//! 2. Forwards operations straight to the engine once connected
//! 3. Replays the buffer in FIFO order on every reconnect
//!
//! ## Key Invariants
//!
//! - The buffer never holds more than its bound; overflow fails everything
//! - A forced close disables buffering permanently
//! - Each connect callback runs exactly once
//! - Capabilities are never recomputed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod completion;
mod config;
mod engine;
mod error;
mod event;
pub mod fault;
mod handle;
mod mock;
mod store;

pub use completion::{Completion, CompletionReceiver, OpResult};
pub use config::{
    parse_seeds, validate_seeds, BufferLimit, ConnectOptions, ReplSetOptions, ResolvedOptions,
    SocketOptions, TlsOptions,
};
pub use engine::{Cursor, OperationOptions, TopologyEngine};
pub use error::{TopologyError, TopologyResult};
pub use event::{EventBus, EventKind, Listener, ListenerId, TopologyEvent};
pub use handle::{ConnectCallback, LifecycleState, ReplicaSetHandle};
pub use mock::{ConnectBehavior, DispatchedCall, MockCursor, MockEngine};
pub use store::{
    BufferedOperation, DirectCall, OperationStore, ReplayFilter, ReplayReport, StoreStats,
};

pub use replset_protocol::{
    CapabilitySet, Credentials, Document, HandshakeDocument, OpType, ReadMode, ReadPreference,
    ReadPreferenceOption, ServerAddress,
};
