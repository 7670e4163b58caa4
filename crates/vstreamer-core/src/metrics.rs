// crates/vstreamer-core/src/metrics.rs
// ============================================================================
// Module: Schema Counters
// Description: Monotonic counters for routing schema updates and errors.
// Purpose: Expose schema watcher health without a metrics backend dependency.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Two counters track the schema watcher: `VSchemaUpdates` counts installed
//! schemas and `VSchemaErrors` counts fetch or compile failures. The
//! process-wide pair is registered once through [`SchemaCounters::global`];
//! engines built without explicit counters share it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Process-wide counters.
static GLOBAL_COUNTERS: OnceLock<Arc<SchemaCounters>> = OnceLock::new();

// ============================================================================
// SECTION: Counter
// ============================================================================

/// Monotonically increasing counter.
///
/// # Invariants
/// - The value never decreases.
#[derive(Debug)]
pub struct Counter {
    /// Current value.
    value: AtomicU64,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Adds `delta`, saturating at `u64::MAX`.
    pub fn add(&self, delta: u64) {
        let _ = self.value.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            Some(current.saturating_add(delta))
        });
    }

    /// Adds one.
    pub fn increment(&self) {
        self.add(1);
    }
}

// ============================================================================
// SECTION: Schema Counters
// ============================================================================

/// Counter pair maintained by the schema watcher.
#[derive(Debug)]
pub struct SchemaCounters {
    /// Successful schema installs.
    updates: Counter,
    /// Fetch and compile failures.
    errors: Counter,
}

impl Default for SchemaCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCounters {
    /// Creates a fresh, unregistered counter pair.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            updates: Counter::new(),
            errors: Counter::new(),
        }
    }

    /// Returns the process-wide counters, registering them on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_COUNTERS.get_or_init(|| Arc::new(Self::new())))
    }

    /// Returns the update counter.
    #[must_use]
    pub const fn updates(&self) -> &Counter {
        &self.updates
    }

    /// Returns the error counter.
    #[must_use]
    pub const fn errors(&self) -> &Counter {
        &self.errors
    }

    /// Returns a serializable view of both counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            vschema_updates: self.updates.get(),
            vschema_errors: self.errors.get(),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// `VSchemaUpdates` value.
    #[serde(rename = "VSchemaUpdates")]
    pub vschema_updates: u64,
    /// `VSchemaErrors` value.
    #[serde(rename = "VSchemaErrors")]
    pub vschema_errors: u64,
}
