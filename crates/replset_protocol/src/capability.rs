//! Feature flags derived from wire protocol versions.

use crate::handshake::HandshakeDocument;

/// Batch size assumed when the handshake carries no hint.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 1000;

/// Capabilities of the connected cluster.
///
/// Derived once from the first successful handshake and never recomputed
/// for the lifetime of the owning handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Lowest wire version (0 when absent).
    pub min_wire_version: i32,
    /// Highest wire version (0 when absent).
    pub max_wire_version: i32,
    /// Maximum documents per write batch.
    pub max_batch_size: u32,
    /// Text search is available.
    pub text_search: bool,
    /// Aggregation can return a cursor.
    pub aggregation_cursor: bool,
    /// Authentication is done with commands.
    pub auth_commands: bool,
    /// Writes are sent as commands.
    pub write_commands: bool,
    /// `listCollections` is available.
    pub list_collections: bool,
    /// `listIndexes` is available.
    pub list_indexes: bool,
    /// Commands accept a write concern.
    pub commands_take_write_concern: bool,
    /// Commands accept a collation.
    pub commands_take_collation: bool,
}

impl CapabilitySet {
    /// Derives the capability flags from a handshake.
    ///
    /// A missing minimum version counts as satisfying `>= 0`.
    pub fn derive(handshake: &HandshakeDocument) -> Self {
        let min_wire_version = handshake.min_wire_version.unwrap_or(0);
        let max_wire_version = handshake.max_wire_version.unwrap_or(0);

        Self {
            min_wire_version,
            max_wire_version,
            max_batch_size: handshake
                .max_write_batch_size
                .unwrap_or(DEFAULT_MAX_BATCH_SIZE),
            text_search: min_wire_version >= 0,
            aggregation_cursor: max_wire_version >= 1,
            auth_commands: max_wire_version >= 1,
            write_commands: max_wire_version >= 2,
            list_collections: max_wire_version >= 3,
            list_indexes: max_wire_version >= 3,
            commands_take_write_concern: max_wire_version >= 5,
            commands_take_collation: max_wire_version >= 5,
        }
    }
}

impl From<&HandshakeDocument> for CapabilitySet {
    fn from(handshake: &HandshakeDocument) -> Self {
        Self::derive(handshake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flags(caps: &CapabilitySet) -> [bool; 8] {
        [
            caps.text_search,
            caps.aggregation_cursor,
            caps.auth_commands,
            caps.write_commands,
            caps.list_collections,
            caps.list_indexes,
            caps.commands_take_write_concern,
            caps.commands_take_collation,
        ]
    }

    #[test]
    fn wire_version_table() {
        let cases: [(i32, [bool; 8]); 5] = [
            (0, [true, false, false, false, false, false, false, false]),
            (1, [true, true, true, false, false, false, false, false]),
            (2, [true, true, true, true, false, false, false, false]),
            (3, [true, true, true, true, true, true, false, false]),
            (5, [true, true, true, true, true, true, true, true]),
        ];

        for (max, expected) in cases {
            let caps = CapabilitySet::derive(&HandshakeDocument::with_wire_versions(0, max));
            assert_eq!(flags(&caps), expected, "maxWireVersion {max}");
            assert_eq!(caps.max_wire_version, max);
        }
    }

    #[test]
    fn wire_version_three_scenario() {
        let caps = CapabilitySet::derive(&HandshakeDocument::with_wire_versions(0, 3));
        assert!(caps.text_search);
        assert!(caps.aggregation_cursor);
        assert!(caps.auth_commands);
        assert!(caps.write_commands);
        assert!(caps.list_collections);
        assert!(caps.list_indexes);
        assert!(!caps.commands_take_write_concern);
        assert!(!caps.commands_take_collation);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let caps = CapabilitySet::derive(&HandshakeDocument::default());
        assert_eq!(caps.min_wire_version, 0);
        assert_eq!(caps.max_wire_version, 0);
        assert_eq!(caps.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(flags(&caps), [true, false, false, false, false, false, false, false]);
    }

    #[test]
    fn batch_size_hint_is_used() {
        let handshake = HandshakeDocument::with_wire_versions(0, 2).with_max_write_batch_size(250);
        assert_eq!(CapabilitySet::from(&handshake).max_batch_size, 250);
    }

    #[test]
    fn negative_min_version_disables_text_search() {
        let caps = CapabilitySet::derive(&HandshakeDocument::with_wire_versions(-1, 0));
        assert!(!caps.text_search);
    }

    proptest! {
        #[test]
        fn derive_is_deterministic(min in proptest::option::of(-2i32..10), max in proptest::option::of(-2i32..10), batch in proptest::option::of(1u32..100_000)) {
            let handshake = HandshakeDocument {
                min_wire_version: min,
                max_wire_version: max,
                max_write_batch_size: batch,
                ..HandshakeDocument::default()
            };
            prop_assert_eq!(CapabilitySet::derive(&handshake), CapabilitySet::derive(&handshake.clone()));
        }

        #[test]
        fn flags_are_monotonic_in_max_version(max in 0i32..10) {
            let lower = CapabilitySet::derive(&HandshakeDocument::with_wire_versions(0, max));
            let higher = CapabilitySet::derive(&HandshakeDocument::with_wire_versions(0, max + 1));
            for (low, high) in flags(&lower).iter().zip(flags(&higher).iter()) {
                prop_assert!(!low || *high);
            }
        }
    }
}
