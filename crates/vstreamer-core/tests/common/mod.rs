// crates/vstreamer-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Scripted stream doubles and engine fixtures for core tests.
// Purpose: Drive the engine deterministically without real stream internals.
// Dependencies: vstreamer-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`ScriptedFactory`] builds [`ScriptedHandle`]s that follow a [`Script`]:
//! emit a fixed number of batches, park until stopped, or fail. Every handle
//! records the schema pushes it receives and the number of stop requests, and
//! the factory records the requests it was built from.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vstreamer_core::ChangeEvent;
use vstreamer_core::ChangeEventKind;
use vstreamer_core::ConnParams;
use vstreamer_core::Emit;
use vstreamer_core::EventStreamHandle;
use vstreamer_core::EventStreamRequest;
use vstreamer_core::MemoryLogSink;
use vstreamer_core::MemoryTopology;
use vstreamer_core::ResultBatch;
use vstreamer_core::ResultStreamRequest;
use vstreamer_core::RoutingDocument;
use vstreamer_core::RowBatch;
use vstreamer_core::RowStreamRequest;
use vstreamer_core::SchemaCounters;
use vstreamer_core::SchemaSnapshot;
use vstreamer_core::SqlValue;
use vstreamer_core::StreamError;
use vstreamer_core::StreamFactory;
use vstreamer_core::StreamHandle;
use vstreamer_core::StreamKind;
use vstreamer_core::VStreamEngine;

// ============================================================================
// SECTION: Scripted Streams
// ============================================================================

/// Behavior of a scripted handle's `run`.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit this many batches, then finish.
    Emit(usize),
    /// Park until stopped or cancelled, then report cancellation.
    UntilStopped,
    /// Fail immediately with the error.
    Fail(StreamError),
}

/// Type-erased emit over the batch index.
type EmitIndex = Box<dyn Fn(usize) -> Result<(), StreamError> + Send + Sync>;

/// Stream double following a [`Script`].
pub struct ScriptedHandle {
    /// Stream kind.
    pub kind: StreamKind,
    /// Behavior.
    script: Script,
    /// Token owned by the stream.
    pub cancel: CancellationToken,
    /// Batch emitter.
    emit: EmitIndex,
    /// Schema snapshots pushed while registered.
    pub schemas: Mutex<Vec<Arc<SchemaSnapshot>>>,
    /// Stop requests received.
    pub stops: AtomicUsize,
    /// Set once `run` has been entered.
    pub running: AtomicBool,
}

impl ScriptedHandle {
    /// Returns the number of schema pushes received.
    pub fn schema_pushes(&self) -> usize {
        self.schemas.lock().unwrap().len()
    }

    /// Returns the number of stop requests received.
    pub fn stop_requests(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamHandle for ScriptedHandle {
    async fn run(&self) -> Result<(), StreamError> {
        self.running.store(true, Ordering::SeqCst);
        match &self.script {
            Script::Emit(count) => {
                for index in 0..*count {
                    if self.cancel.is_cancelled() {
                        return Err(StreamError::Cancelled);
                    }
                    (self.emit)(index)?;
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
            Script::UntilStopped => {
                self.cancel.cancelled().await;
                Err(StreamError::Cancelled)
            }
            Script::Fail(error) => Err(error.clone()),
        }
    }

    fn request_stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

impl EventStreamHandle for ScriptedHandle {
    fn apply_schema(&self, snapshot: Arc<SchemaSnapshot>) {
        self.schemas.lock().unwrap().push(snapshot);
    }
}

// ============================================================================
// SECTION: Scripted Factory
// ============================================================================

/// Event request fields captured at construction.
#[derive(Debug, Clone)]
pub struct EventRequestRecord {
    /// Start position.
    pub start_position: String,
    /// Snapshot installed at admission.
    pub schema: Arc<SchemaSnapshot>,
    /// Connection parameters passed through.
    pub conn: Option<Arc<ConnParams>>,
}

/// Row request fields captured at construction.
#[derive(Debug, Clone)]
pub struct RowRequestRecord {
    /// Scan query.
    pub query: String,
    /// Resume key.
    pub resume_key: Vec<SqlValue>,
}

/// Factory building scripted handles.
pub struct ScriptedFactory {
    /// Script given to the next handles.
    script: Mutex<Script>,
    /// Every handle built, in construction order.
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
    /// Recorded event requests.
    pub event_requests: Mutex<Vec<EventRequestRecord>>,
    /// Recorded row requests.
    pub row_requests: Mutex<Vec<RowRequestRecord>>,
    /// Recorded result queries.
    pub result_queries: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    /// Creates a factory whose handles follow `script`.
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            handles: Mutex::new(Vec::new()),
            event_requests: Mutex::new(Vec::new()),
            row_requests: Mutex::new(Vec::new()),
            result_queries: Mutex::new(Vec::new()),
        })
    }

    /// Changes the script used for handles built afterwards.
    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Returns every handle built so far.
    pub fn handles(&self) -> Vec<Arc<ScriptedHandle>> {
        self.handles.lock().unwrap().clone()
    }

    /// Returns the handles of one kind.
    pub fn handles_of(&self, kind: StreamKind) -> Vec<Arc<ScriptedHandle>> {
        self.handles().into_iter().filter(|handle| handle.kind == kind).collect()
    }

    fn build(&self, kind: StreamKind, cancel: CancellationToken, emit: EmitIndex) -> Arc<ScriptedHandle> {
        let handle = Arc::new(ScriptedHandle {
            kind,
            script: self.script.lock().unwrap().clone(),
            cancel,
            emit,
            schemas: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        handle
    }
}

impl StreamFactory for ScriptedFactory {
    fn event_stream(&self, request: EventStreamRequest) -> Arc<dyn EventStreamHandle> {
        self.event_requests.lock().unwrap().push(EventRequestRecord {
            start_position: request.start_position.clone(),
            schema: Arc::clone(&request.schema),
            conn: request.conn.clone(),
        });
        let emit = request.emit;
        let keyspace = request.schema.keyspace().to_string();
        self.build(
            StreamKind::Event,
            request.cancel,
            Box::new(move |index| {
                emit(vec![ChangeEvent {
                    kind: ChangeEventKind::Row,
                    position: Some(format!("pos-{index}")),
                    keyspace: keyspace.clone(),
                    table: Some("customer".to_string()),
                    body: json!({ "index": index }),
                }])
            }),
        )
    }

    fn row_stream(&self, request: RowStreamRequest) -> Arc<dyn StreamHandle> {
        self.row_requests.lock().unwrap().push(RowRequestRecord {
            query: request.query.clone(),
            resume_key: request.resume_key.clone(),
        });
        let emit = request.emit;
        self.build(
            StreamKind::Row,
            request.cancel,
            Box::new(move |index| {
                emit(RowBatch {
                    rows: vec![vec![json!(index)]],
                    last_key: vec![json!(index)],
                    ..RowBatch::default()
                })
            }),
        )
    }

    fn result_stream(&self, request: ResultStreamRequest) -> Arc<dyn StreamHandle> {
        self.result_queries.lock().unwrap().push(request.query.clone());
        let emit = request.emit;
        self.build(
            StreamKind::Result,
            request.cancel,
            Box::new(move |index| {
                emit(ResultBatch {
                    rows: vec![vec![json!(index)]],
                    ..ResultBatch::default()
                })
            }),
        )
    }
}

// ============================================================================
// SECTION: Engine Fixtures
// ============================================================================

/// Engine wired to scripted collaborators.
pub struct Fixture {
    /// Engine under test.
    pub engine: VStreamEngine,
    /// Topology feeding the watcher.
    pub topology: Arc<MemoryTopology>,
    /// Stream factory.
    pub factory: Arc<ScriptedFactory>,
    /// Engine-local counters.
    pub counters: Arc<SchemaCounters>,
    /// Captured log records.
    pub log: Arc<MemoryLogSink>,
}

/// Builds an unopened engine over `topology` with handles following `script`.
pub fn fixture_with(topology: MemoryTopology, script: Script) -> Fixture {
    let topology = Arc::new(topology);
    let factory = ScriptedFactory::new(script);
    let counters = Arc::new(SchemaCounters::new());
    let log = Arc::new(MemoryLogSink::new());
    let engine = VStreamEngine::builder(topology.clone(), factory.clone())
        .counters(Arc::clone(&counters))
        .log_sink(log.clone())
        .build();
    Fixture {
        engine,
        topology,
        factory,
        counters,
        log,
    }
}

/// Builds an unopened engine over an empty topology.
pub fn fixture(script: Script) -> Fixture {
    fixture_with(MemoryTopology::new(), script)
}

/// Collecting emit callback.
pub fn collector<T: Send + 'static>() -> (Emit<T>, Arc<Mutex<Vec<T>>>) {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let target = Arc::clone(&sink);
    let emit: Emit<T> = Arc::new(move |batch| {
        target.lock().unwrap().push(batch);
        Ok(())
    });
    (emit, sink)
}

/// Emit callback that discards batches.
pub fn discard<T: 'static>() -> Emit<T> {
    Arc::new(|_batch| Ok(()))
}

/// Sharded `customer` keyspace with a hash primary vindex.
pub fn customer_document() -> RoutingDocument {
    serde_json::from_value(json!({
        "keyspaces": {
            "customer": {
                "sharded": true,
                "vindexes": { "hash": { "type": "hash" } },
                "tables": {
                    "customer": { "column_vindexes": [{ "column": "id", "name": "hash" }] }
                }
            }
        }
    }))
    .unwrap()
}

/// Customer keyspace extended with an `orders` table.
pub fn customer_orders_document() -> RoutingDocument {
    serde_json::from_value(json!({
        "keyspaces": {
            "customer": {
                "sharded": true,
                "vindexes": { "hash": { "type": "hash" } },
                "tables": {
                    "customer": { "column_vindexes": [{ "column": "id", "name": "hash" }] },
                    "orders": { "column_vindexes": [{ "column": "customer_id", "name": "hash" }] }
                }
            }
        }
    }))
    .unwrap()
}

/// Document whose table references an undeclared vindex.
pub fn broken_document() -> RoutingDocument {
    serde_json::from_value(json!({
        "keyspaces": {
            "customer": {
                "sharded": true,
                "tables": {
                    "customer": { "column_vindexes": [{ "column": "id", "name": "missing" }] }
                }
            }
        }
    }))
    .unwrap()
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached before deadline");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
