//! # Replica-set protocol types
//!
//! Pure data types shared by the replica-set facade and the topology engines
//! it drives.
//!
//! This crate provides:
//! - `HandshakeDocument` for a node's capability-probe response
//! - `CapabilitySet` derived from wire protocol versions
//! - `ReadPreference` and its canonical mode names
//! - `OpType` and `Credentials` for dispatched operations
//! - `ServerAddress` for seed lists
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod capability;
mod error;
mod handshake;
mod operation;
mod read_preference;

pub use address::ServerAddress;
pub use capability::{CapabilitySet, DEFAULT_MAX_BATCH_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use handshake::HandshakeDocument;
pub use operation::{Credentials, OpType};
pub use read_preference::{ReadMode, ReadPreference, ReadPreferenceOption};

/// A document exchanged with the engine.
///
/// BSON encoding is the engine's concern; the facade only carries values.
pub type Document = serde_json::Value;
