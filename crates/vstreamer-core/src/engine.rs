// crates/vstreamer-core/src/engine.rs
// ============================================================================
// Module: Stream Engine
// Description: Lifecycle coordinator admitting, running, and draining streams.
// Purpose: Own the open flag, session registry, and routing schema snapshot.
// Dependencies: thiserror, tokio-util, crate::{handle, registry, watcher}
// ============================================================================

//! ## Overview
//! [`VStreamEngine`] is the single authority for starting and stopping the
//! streaming subsystem. Every admission follows the same protocol:
//!
//! 1. Event and row admissions start the schema watcher once and wait for its
//!    first notification.
//! 2. Under the state lock the engine checks the open flag, builds the handle
//!    with the current snapshot, and registers it.
//! 3. The handle runs with no lock held.
//! 4. A [`SessionGuard`] removes the session when `run` returns, when it
//!    panics, or when the admission future is dropped.
//!
//! `close` signals every registered handle under the lock, clears the open
//! flag, releases the lock, and only then waits for the in-flight count to
//! reach zero. Stream cleanup needs the same lock, so draining while holding
//! it would deadlock.
//!
//! Invariants:
//! - The state lock is never held across an `.await`.
//! - A schema push under the lock reaches exactly the event streams
//!   registered before it; later registrations start from the new snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::Weak;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::conn::ConnParams;
use crate::handle::Emit;
use crate::handle::EventStreamRequest;
use crate::handle::ResultStreamRequest;
use crate::handle::RowStreamRequest;
use crate::handle::StreamError;
use crate::handle::StreamFactory;
use crate::handle::StreamKind;
use crate::metrics::SchemaCounters;
use crate::payload::ChangeEvent;
use crate::payload::EventFilter;
use crate::payload::ResultBatch;
use crate::payload::RowBatch;
use crate::payload::SqlValue;
use crate::registry::RegisteredStream;
use crate::registry::SessionId;
use crate::registry::SessionInfo;
use crate::registry::StreamRegistry;
use crate::routing::DocumentCompiler;
use crate::routing::SchemaCompiler;
use crate::snapshot::SchemaSnapshot;
use crate::telemetry::EngineEvent;
use crate::telemetry::EngineLogRecord;
use crate::telemetry::EngineLogSink;
use crate::telemetry::StderrLogSink;
use crate::telemetry::StreamOutcome;
use crate::topology::RoutingCallback;
use crate::topology::RoutingNotification;
use crate::topology::TopologyWatch;
use crate::watcher::SchemaWatcher;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine was closed at admission time.
    #[error("stream engine is not open")]
    NotOpen,
    /// Connection parameters were already installed.
    #[error("connection parameters already configured")]
    AlreadyConfigured,
    /// The admitted stream failed; the error is passed through unchanged.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl EngineError {
    /// Returns true when the stream ended because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Stream(StreamError::Cancelled))
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`VStreamEngine`].
pub struct EngineBuilder {
    /// Topology service watched for routing documents.
    topology: Arc<dyn TopologyWatch>,
    /// Stream handle factory.
    factory: Arc<dyn StreamFactory>,
    /// Routing document compiler.
    compiler: Arc<dyn SchemaCompiler>,
    /// Counters; process-wide when unset.
    counters: Option<Arc<SchemaCounters>>,
    /// Log destination.
    log_sink: Arc<dyn EngineLogSink>,
}

impl EngineBuilder {
    /// Sets the routing document compiler.
    #[must_use]
    pub fn compiler(mut self, compiler: Arc<dyn SchemaCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Uses dedicated counters instead of the process-wide pair.
    #[must_use]
    pub fn counters(mut self, counters: Arc<SchemaCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Sets the log destination.
    #[must_use]
    pub fn log_sink(mut self, log_sink: Arc<dyn EngineLogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    /// Builds a closed engine with an empty schema snapshot.
    #[must_use]
    pub fn build(self) -> VStreamEngine {
        let counters = self.counters.unwrap_or_else(SchemaCounters::global);
        let watcher =
            SchemaWatcher::new(self.topology, self.compiler, counters, Arc::clone(&self.log_sink));
        VStreamEngine {
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState {
                    open: false,
                    keyspace: String::new(),
                    cell: String::new(),
                    snapshot: Arc::new(SchemaSnapshot::empty()),
                    registry: StreamRegistry::new(),
                }),
                conn: OnceLock::new(),
                factory: self.factory,
                watcher,
                log: self.log_sink,
            }),
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// State guarded by the engine lock.
struct EngineState {
    /// Open flag.
    open: bool,
    /// Keyspace served; set by the first `open`.
    keyspace: String,
    /// Topology cell watched; set by the first `open`.
    cell: String,
    /// Current routing schema snapshot.
    snapshot: Arc<SchemaSnapshot>,
    /// Running sessions.
    registry: StreamRegistry,
}

/// State shared by engine clones, session guards, and the topology callback.
struct EngineShared {
    /// Lock-guarded mutable state.
    state: Mutex<EngineState>,
    /// Connection parameters installed once.
    conn: OnceLock<Arc<ConnParams>>,
    /// Stream handle factory.
    factory: Arc<dyn StreamFactory>,
    /// Schema subscription.
    watcher: SchemaWatcher,
    /// Log destination.
    log: Arc<dyn EngineLogSink>,
}

impl EngineShared {
    /// Locks engine state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emits a log record.
    fn log(&self, event: EngineEvent) {
        self.log.record(&EngineLogRecord::now(event));
    }

    /// Installs and broadcasts the schema a topology notification stands for.
    fn on_routing_notification(&self, cell: &str, notification: RoutingNotification) {
        let Some(schema) = self.watcher.resolve(cell, notification) else {
            return;
        };
        let (snapshot, broadcast) = {
            let mut state = self.lock_state();
            let snapshot = Arc::new(SchemaSnapshot::new(state.keyspace.clone(), schema));
            state.snapshot = Arc::clone(&snapshot);
            let broadcast = state.registry.broadcast_schema(&snapshot);
            (snapshot, broadcast)
        };
        self.watcher.record_update(snapshot.keyspace(), snapshot.schema(), broadcast);
    }
}

/// Stream lifecycle coordinator; clones share one engine.
#[derive(Clone)]
pub struct VStreamEngine {
    /// Shared engine state.
    shared: Arc<EngineShared>,
}

impl VStreamEngine {
    /// Starts building an engine over a topology service and stream factory.
    #[must_use]
    pub fn builder(
        topology: Arc<dyn TopologyWatch>,
        factory: Arc<dyn StreamFactory>,
    ) -> EngineBuilder {
        EngineBuilder {
            topology,
            factory,
            compiler: Arc::new(DocumentCompiler),
            counters: None,
            log_sink: Arc::new(StderrLogSink),
        }
    }

    /// Installs connection parameters used by every stream built afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyConfigured`] when parameters were
    /// installed before.
    pub fn init_db_config(&self, params: ConnParams) -> Result<(), EngineError> {
        self.shared.conn.set(Arc::new(params)).map_err(|_| EngineError::AlreadyConfigured)
    }

    /// Returns the installed connection parameters.
    #[must_use]
    pub fn conn_params(&self) -> Option<Arc<ConnParams>> {
        self.shared.conn.get().cloned()
    }

    /// Opens the engine; a no-op when it is already open.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the lifecycle surface uniform.
    pub fn open(&self, keyspace: &str, cell: &str) -> Result<(), EngineError> {
        {
            let mut state = self.shared.lock_state();
            if state.open {
                return Ok(());
            }
            state.open = true;
            keyspace.clone_into(&mut state.keyspace);
            cell.clone_into(&mut state.cell);
        }
        self.shared.log(EngineEvent::EngineOpened {
            keyspace: keyspace.to_string(),
            cell: cell.to_string(),
        });
        Ok(())
    }

    /// Returns the open flag.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.lock_state().open
    }

    /// Stops every running stream and waits until all have deregistered.
    ///
    /// Idempotent. A call on a closed engine still waits for streams that an
    /// earlier close signalled. There is no timeout: a stream that ignores
    /// its stop request keeps `close` waiting.
    pub async fn close(&self) {
        let (drain, signalled) = {
            let mut state = self.shared.lock_state();
            let signalled = if state.open {
                state.open = false;
                Some(state.registry.request_stop_all())
            } else {
                None
            };
            (state.registry.drain_signal(), signalled)
        };
        drain.wait().await;
        if let Some(signalled) = signalled {
            self.shared.log(EngineEvent::EngineClosed {
                signalled,
            });
        }
    }

    /// Streams change events from `start_position` until done, cancelled, or failed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotOpen`] when the engine is closed, otherwise
    /// the stream's own error.
    pub async fn stream_events(
        &self,
        ctx: &CancellationToken,
        start_position: &str,
        filter: EventFilter,
        emit: Emit<Vec<ChangeEvent>>,
    ) -> Result<(), EngineError> {
        self.start_watcher().await?;
        let factory = Arc::clone(&self.shared.factory);
        let start_position = start_position.to_string();
        self.admit(ctx, StreamKind::Event, move |cancel, conn, schema| {
            RegisteredStream::Event(factory.event_stream(EventStreamRequest {
                cancel,
                conn,
                start_position,
                filter,
                schema,
                emit,
            }))
        })
        .await
    }

    /// Streams table rows for `query`, resuming after `resume_key` when non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotOpen`] when the engine is closed, otherwise
    /// the stream's own error.
    pub async fn stream_rows(
        &self,
        ctx: &CancellationToken,
        query: &str,
        resume_key: Vec<SqlValue>,
        emit: Emit<RowBatch>,
    ) -> Result<(), EngineError> {
        self.shared.log(EngineEvent::RowStreamRequested {
            query: query.to_string(),
            resume_key: resume_key.clone(),
        });
        self.start_watcher().await?;
        let factory = Arc::clone(&self.shared.factory);
        let query = query.to_string();
        self.admit(ctx, StreamKind::Row, move |cancel, conn, _schema| {
            RegisteredStream::Row(factory.row_stream(RowStreamRequest {
                cancel,
                conn,
                query,
                resume_key,
                emit,
            }))
        })
        .await
    }

    /// Streams the results of `query`. Does not start the schema watcher.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotOpen`] when the engine is closed, otherwise
    /// the stream's own error.
    pub async fn stream_results(
        &self,
        ctx: &CancellationToken,
        query: &str,
        emit: Emit<ResultBatch>,
    ) -> Result<(), EngineError> {
        let factory = Arc::clone(&self.shared.factory);
        let query = query.to_string();
        self.admit(ctx, StreamKind::Result, move |cancel, conn, _schema| {
            RegisteredStream::Result(factory.result_stream(ResultStreamRequest {
                cancel,
                conn,
                query,
                emit,
            }))
        })
        .await
    }

    /// Returns the current routing schema snapshot.
    #[must_use]
    pub fn schema(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.shared.lock_state().snapshot)
    }

    /// Returns the running sessions ordered by identifier.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.shared.lock_state().registry.sessions()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.lock_state().registry.len()
    }

    /// Returns the in-flight session count.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.lock_state().registry.in_flight()
    }

    /// Returns true once the schema watcher has delivered its first notification.
    #[must_use]
    pub fn watcher_started(&self) -> bool {
        self.shared.watcher.is_started()
    }

    /// Returns the cell the schema watcher subscribed to, once started.
    ///
    /// Fixed by the first admission; a later reopen on another cell keeps it.
    #[must_use]
    pub fn watched_cell(&self) -> Option<String> {
        self.shared.watcher.watched_cell().map(str::to_string)
    }

    /// Returns the schema counters this engine updates.
    #[must_use]
    pub fn counters(&self) -> Arc<SchemaCounters> {
        Arc::clone(self.shared.watcher.counters())
    }

    /// Starts the schema watcher for the configured cell once.
    async fn start_watcher(&self) -> Result<(), EngineError> {
        let cell = {
            let state = self.shared.lock_state();
            if !state.open {
                return Err(EngineError::NotOpen);
            }
            state.cell.clone()
        };
        let weak = Arc::downgrade(&self.shared);
        self.shared.watcher.ensure_started(&cell, move |cell| routing_callback(weak, cell)).await;
        Ok(())
    }

    /// Registers a stream built by `build`, runs it, and deregisters it.
    async fn admit<F>(
        &self,
        ctx: &CancellationToken,
        kind: StreamKind,
        build: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(
            CancellationToken,
            Option<Arc<ConnParams>>,
            Arc<SchemaSnapshot>,
        ) -> RegisteredStream,
    {
        let (stream, mut guard) = {
            let mut state = self.shared.lock_state();
            if !state.open {
                return Err(EngineError::NotOpen);
            }
            let stream =
                build(ctx.child_token(), self.conn_params(), Arc::clone(&state.snapshot));
            let session = state.registry.register(stream.clone());
            (stream, SessionGuard::new(Arc::clone(&self.shared), kind, session))
        };
        self.shared.log(EngineEvent::StreamStarted {
            session_id: guard.session,
            kind,
        });
        let result = stream.run().await;
        guard.finish(&result);
        drop(guard);
        result.map_err(EngineError::from)
    }
}

/// Builds the topology callback; it holds the engine weakly.
fn routing_callback(engine: Weak<EngineShared>, cell: String) -> RoutingCallback {
    Arc::new(move |notification| {
        if let Some(shared) = engine.upgrade() {
            shared.on_routing_notification(&cell, notification);
        }
    })
}

// ============================================================================
// SECTION: Session Guard
// ============================================================================

/// Deregisters a session when dropped.
struct SessionGuard {
    /// Engine state.
    shared: Arc<EngineShared>,
    /// Stream kind.
    kind: StreamKind,
    /// Session identifier.
    session: SessionId,
    /// Completion outcome; unset when the admission was abandoned.
    outcome: Option<(StreamOutcome, Option<String>)>,
}

impl SessionGuard {
    /// Creates a guard for a registered session.
    const fn new(shared: Arc<EngineShared>, kind: StreamKind, session: SessionId) -> Self {
        Self {
            shared,
            kind,
            session,
            outcome: None,
        }
    }

    /// Records how the stream ended.
    fn finish(&mut self, result: &Result<(), StreamError>) {
        self.outcome = Some(match result {
            Ok(()) => (StreamOutcome::Ok, None),
            Err(StreamError::Cancelled) => (StreamOutcome::Cancelled, None),
            Err(error) => (StreamOutcome::Error, Some(error.to_string())),
        });
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let removed = self.shared.lock_state().registry.remove(self.kind, self.session);
        if !removed {
            return;
        }
        let (outcome, error) = self.outcome.take().unwrap_or_else(|| {
            (StreamOutcome::Cancelled, Some("admission dropped before completion".to_string()))
        });
        self.shared.log(EngineEvent::StreamFinished {
            session_id: self.session,
            kind: self.kind,
            outcome,
            error,
        });
    }
}
