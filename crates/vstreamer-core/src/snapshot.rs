// crates/vstreamer-core/src/snapshot.rs
// ============================================================================
// Module: Schema Snapshot
// Description: Immutable routing schema bound to the engine keyspace.
// Purpose: Share one consistent routing view with running event streams.
// Dependencies: crate::routing
// ============================================================================

//! ## Overview
//! A [`SchemaSnapshot`] pairs a compiled [`RoutingSchema`] with the keyspace
//! the engine serves. Snapshots are replaced wholesale on every topology
//! update and shared as `Arc<SchemaSnapshot>`; an old snapshot is dropped
//! once the last stream holding it lets go.

use std::sync::Arc;

use crate::routing::RoutingSchema;
use crate::routing::TableRoute;

/// Immutable routing schema view.
///
/// # Invariants
/// - Fields are never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    /// Keyspace served by the engine.
    keyspace: String,
    /// Compiled routing schema.
    schema: Arc<RoutingSchema>,
}

impl SchemaSnapshot {
    /// Creates a snapshot for the keyspace.
    #[must_use]
    pub fn new(keyspace: impl Into<String>, schema: RoutingSchema) -> Self {
        Self {
            keyspace: keyspace.into(),
            schema: Arc::new(schema),
        }
    }

    /// Returns the empty snapshot installed before the first topology fetch.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the keyspace the snapshot applies to.
    #[must_use]
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Returns the compiled routing schema.
    #[must_use]
    pub fn schema(&self) -> &RoutingSchema {
        &self.schema
    }

    /// Returns the route for a table in the snapshot's own keyspace.
    #[must_use]
    pub fn local_table(&self, table: &str) -> Option<&TableRoute> {
        self.schema.table(&self.keyspace, table)
    }
}
