// crates/vstreamer-core/src/watcher.rs
// ============================================================================
// Module: Schema Watcher
// Description: One-time topology subscription and notification triage.
// Purpose: Turn routing notifications into compiled schemas, counting and
//          logging every failure.
// Dependencies: thiserror, tokio, crate::{metrics, routing, telemetry, topology}
// ============================================================================

//! ## Overview
//! The watcher owns the single topology subscription for an engine. The
//! first caller launches it on a detached task behind a `OnceLock`; every
//! caller then waits on a shared ready flag until the first notification has
//! been handled. A caller that gives up while waiting leaves the task
//! running, so the subscription is made exactly once.
//!
//! Each notification is triaged here: a missing document compiles to the
//! empty schema, transport and compile failures are counted in
//! `VSchemaErrors` and logged, and a compiled schema is handed back to the
//! engine for installation and broadcast.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::OnceLock;

use thiserror::Error;
use tokio::sync::watch;

use crate::metrics::SchemaCounters;
use crate::routing::CompileError;
use crate::routing::RoutingSchema;
use crate::routing::SchemaCompiler;
use crate::telemetry::EngineEvent;
use crate::telemetry::EngineLogRecord;
use crate::telemetry::EngineLogSink;
use crate::topology::RoutingCallback;
use crate::topology::RoutingNotification;
use crate::topology::TopologyError;
use crate::topology::TopologyWatch;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema refresh failures; never surfaced to stream callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The topology watch reported an error.
    #[error("routing schema fetch failed: {0}")]
    Fetch(#[from] TopologyError),
    /// The routing document did not compile.
    #[error("routing schema compile failed: {0}")]
    Compile(#[from] CompileError),
}

impl SchemaError {
    /// Converts the failure into its log event.
    fn into_event(self, cell: &str) -> EngineEvent {
        match self {
            Self::Fetch(error) => EngineEvent::SchemaFetchFailed {
                cell: cell.to_string(),
                error: error.to_string(),
            },
            Self::Compile(error) => EngineEvent::SchemaCompileFailed {
                cell: cell.to_string(),
                error: error.to_string(),
            },
        }
    }
}

// ============================================================================
// SECTION: Watcher
// ============================================================================

/// Lazily started routing schema subscription.
pub(crate) struct SchemaWatcher {
    /// Topology service.
    topology: Arc<dyn TopologyWatch>,
    /// Routing document compiler.
    compiler: Arc<dyn SchemaCompiler>,
    /// Update and error counters.
    counters: Arc<SchemaCounters>,
    /// Log destination.
    log: Arc<dyn EngineLogSink>,
    /// Subscription launched for the first cell; set exactly once.
    started: OnceLock<Subscription>,
}

/// A launched topology subscription.
struct Subscription {
    /// Watched cell.
    cell: String,
    /// Flips to true after the first notification has been handled.
    ready: watch::Receiver<bool>,
}

impl SchemaWatcher {
    /// Creates an unstarted watcher.
    pub(crate) fn new(
        topology: Arc<dyn TopologyWatch>,
        compiler: Arc<dyn SchemaCompiler>,
        counters: Arc<SchemaCounters>,
        log: Arc<dyn EngineLogSink>,
    ) -> Self {
        Self {
            topology,
            compiler,
            counters,
            log,
            started: OnceLock::new(),
        }
    }

    /// Starts the subscription on first use and waits for its first notification.
    ///
    /// Only the first call launches the subscription and builds `callback`;
    /// every call waits for the same first notification. Cancelling a waiting
    /// caller does not cancel the subscription.
    pub(crate) async fn ensure_started<F>(&self, cell: &str, callback: F)
    where
        F: FnOnce(String) -> RoutingCallback,
    {
        let subscription = self.started.get_or_init(|| self.launch(cell, callback));
        let mut ready = subscription.ready.clone();
        // Err only when the subscription task died before its first delivery.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Spawns the topology subscription for `cell`.
    fn launch<F>(&self, cell: &str, callback: F) -> Subscription
    where
        F: FnOnce(String) -> RoutingCallback,
    {
        let (ready_tx, ready) = watch::channel(false);
        let topology = Arc::clone(&self.topology);
        let watched = cell.to_string();
        let callback = callback(watched.clone());
        tokio::spawn(async move {
            topology.watch_routing(&watched, callback).await;
            ready_tx.send_replace(true);
        });
        Subscription {
            cell: cell.to_string(),
            ready,
        }
    }

    /// Returns true once the subscription has delivered its first notification.
    pub(crate) fn is_started(&self) -> bool {
        self.started.get().is_some_and(|subscription| *subscription.ready.borrow())
    }

    /// Returns the cell the subscription watches, once launched.
    pub(crate) fn watched_cell(&self) -> Option<&str> {
        self.started.get().map(|subscription| subscription.cell.as_str())
    }

    /// Returns the counters maintained by this watcher.
    pub(crate) const fn counters(&self) -> &Arc<SchemaCounters> {
        &self.counters
    }

    /// Compiles a notification, or counts and logs why it could not be.
    pub(crate) fn resolve(&self, cell: &str, notification: RoutingNotification) -> Option<RoutingSchema> {
        match self.build_schema(notification) {
            Ok(schema) => Some(schema),
            Err(error) => {
                self.counters.errors().increment();
                self.log.record(&EngineLogRecord::now(error.into_event(cell)));
                None
            }
        }
    }

    /// Counts and logs an installed schema.
    pub(crate) fn record_update(&self, keyspace: &str, schema: &RoutingSchema, broadcast: usize) {
        self.counters.updates().increment();
        self.log.record(&EngineLogRecord::now(EngineEvent::SchemaUpdated {
            keyspace: keyspace.to_string(),
            keyspaces: schema.keyspace_count(),
            tables: schema.table_count(),
            broadcast,
        }));
    }

    /// Builds the compiled schema a notification stands for.
    fn build_schema(&self, notification: RoutingNotification) -> Result<RoutingSchema, SchemaError> {
        match notification {
            Ok(document) => Ok(self.compiler.compile(&document)?),
            Err(TopologyError::NoNode {
                ..
            }) => Ok(RoutingSchema::default()),
            Err(error) => Err(SchemaError::Fetch(error)),
        }
    }
}
