// crates/vstreamer-core/src/topology.rs
// ============================================================================
// Module: Topology Watch
// Description: Routing document watch interface and in-memory topology.
// Purpose: Decouple the schema watcher from the topology transport.
// Dependencies: async-trait, thiserror, crate::routing
// ============================================================================

//! ## Overview
//! [`TopologyWatch`] is the seam to the cluster topology service. A watch
//! delivers the current routing document for a cell once before
//! `watch_routing` returns, then delivers every later change on the
//! publisher's context.
//!
//! [`MemoryTopology`] implements the contract in process for tests and
//! embedded deployments. Deliveries are serialized so watchers always observe
//! documents in publish order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use thiserror::Error;

use crate::routing::RoutingDocument;

// ============================================================================
// SECTION: Interface
// ============================================================================

/// Topology watch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// No routing document exists for the cell.
    #[error("no routing document for cell {cell}")]
    NoNode {
        /// Cell name.
        cell: String,
    },
    /// The topology service could not be reached or returned an error.
    #[error("topology unavailable: {0}")]
    Unavailable(String),
}

impl TopologyError {
    /// Returns true when the error means "no document" rather than a failure.
    #[must_use]
    pub const fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode { .. })
    }
}

/// A routing document or the error that replaced it.
pub type RoutingNotification = Result<RoutingDocument, TopologyError>;

/// Callback invoked on every routing notification.
pub type RoutingCallback = Arc<dyn Fn(RoutingNotification) + Send + Sync>;

/// Routing document watch provided by the topology service.
#[async_trait]
pub trait TopologyWatch: Send + Sync {
    /// Starts watching routing documents for a cell.
    ///
    /// The callback is invoked at least once before this call returns and
    /// again for every later change.
    async fn watch_routing(&self, cell: &str, callback: RoutingCallback);
}

// ============================================================================
// SECTION: In-Memory Topology
// ============================================================================

/// Per-cell watch state.
#[derive(Default)]
struct CellEntry {
    /// Current routing document, when one exists.
    current: Option<RoutingDocument>,
    /// Registered watch callbacks.
    watchers: Vec<RoutingCallback>,
}

/// In-memory topology service.
///
/// # Invariants
/// - Callbacks run outside the cell map lock but one delivery at a time, so
///   a callback must not publish back into the same topology.
#[derive(Default)]
pub struct MemoryTopology {
    /// Cell state keyed by cell name.
    cells: Mutex<BTreeMap<String, CellEntry>>,
    /// Serializes deliveries across publishers and new watchers.
    delivery: Mutex<()>,
}

impl MemoryTopology {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the topology with an initial document for the cell.
    #[must_use]
    pub fn with_document(self, cell: impl Into<String>, document: RoutingDocument) -> Self {
        self.lock_cells().entry(cell.into()).or_default().current = Some(document);
        self
    }

    /// Publishes a new routing document and returns the number of watchers notified.
    pub fn publish(&self, cell: &str, document: RoutingDocument) -> usize {
        self.deliver(cell, Some(document.clone()), Ok(document))
    }

    /// Delivers a transient error without changing the stored document.
    pub fn publish_error(&self, cell: &str, error: TopologyError) -> usize {
        let _delivery = self.lock_delivery();
        let watchers = self.lock_cells().get(cell).map(|entry| entry.watchers.clone());
        let watchers = watchers.unwrap_or_default();
        for watcher in &watchers {
            watcher(Err(error.clone()));
        }
        watchers.len()
    }

    /// Deletes the routing document for the cell and notifies watchers.
    pub fn remove(&self, cell: &str) -> usize {
        self.deliver(
            cell,
            None,
            Err(TopologyError::NoNode {
                cell: cell.to_string(),
            }),
        )
    }

    /// Returns the number of watchers registered for the cell.
    #[must_use]
    pub fn watcher_count(&self, cell: &str) -> usize {
        self.lock_cells().get(cell).map_or(0, |entry| entry.watchers.len())
    }

    /// Stores the document and notifies every watcher of the cell.
    fn deliver(
        &self,
        cell: &str,
        current: Option<RoutingDocument>,
        notification: RoutingNotification,
    ) -> usize {
        let _delivery = self.lock_delivery();
        let watchers = {
            let mut cells = self.lock_cells();
            let entry = cells.entry(cell.to_string()).or_default();
            entry.current = current;
            entry.watchers.clone()
        };
        for watcher in &watchers {
            watcher(notification.clone());
        }
        watchers.len()
    }

    /// Locks the cell map, recovering from poisoning.
    fn lock_cells(&self) -> MutexGuard<'_, BTreeMap<String, CellEntry>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the delivery gate, recovering from poisoning.
    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TopologyWatch for MemoryTopology {
    async fn watch_routing(&self, cell: &str, callback: RoutingCallback) {
        let _delivery = self.lock_delivery();
        let current = {
            let mut cells = self.lock_cells();
            let entry = cells.entry(cell.to_string()).or_default();
            entry.watchers.push(Arc::clone(&callback));
            entry.current.clone()
        };
        let notification = current.ok_or_else(|| TopologyError::NoNode {
            cell: cell.to_string(),
        });
        callback(notification);
    }
}
