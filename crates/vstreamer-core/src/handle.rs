// crates/vstreamer-core/src/handle.rs
// ============================================================================
// Module: Stream Handles
// Description: Lifecycle surface shared by event, row, and result streams.
// Purpose: Let the engine register, run, and cancel streams uniformly.
// Dependencies: async-trait, thiserror, tokio-util
// ============================================================================

//! ## Overview
//! Every admitted stream is a [`StreamHandle`]: `run` drives the stream to
//! completion and `request_stop` asks it to finish early. Event streams add
//! [`EventStreamHandle::apply_schema`] so the schema watcher can hot-swap the
//! routing schema while they run. Row and result streams never see schema
//! pushes.
//!
//! Concrete streams are built by a [`StreamFactory`]. The engine calls the
//! factory while holding its registry lock, so construction must not block;
//! all I/O belongs in `run`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::conn::ConnParams;
use crate::payload::ChangeEvent;
use crate::payload::EventFilter;
use crate::payload::ResultBatch;
use crate::payload::RowBatch;
use crate::payload::SqlValue;
use crate::snapshot::SchemaSnapshot;

// ============================================================================
// SECTION: Stream Kinds
// ============================================================================

/// Stream kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Continuous change-event feed.
    Event,
    /// Resumable table row scan.
    Row,
    /// Query result stream.
    Result,
}

impl StreamKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Row => "row",
            Self::Result => "result",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by running streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream was cancelled by its caller or by engine shutdown.
    #[error("stream cancelled")]
    Cancelled,
    /// Network or database transport failure.
    #[error("stream transport error: {0}")]
    Transport(String),
    /// Replication protocol violation.
    #[error("stream protocol error: {0}")]
    Protocol(String),
    /// Invalid request parameters (malformed query, bad position).
    #[error("invalid stream request: {0}")]
    InvalidRequest(String),
    /// The caller's emit callback rejected a batch.
    #[error("stream emit failed: {0}")]
    Emit(String),
}

// ============================================================================
// SECTION: Handle Traits
// ============================================================================

/// Callback receiving successive output batches from a stream.
pub type Emit<T> = Arc<dyn Fn(T) -> Result<(), StreamError> + Send + Sync>;

/// Lifecycle surface of an admitted stream.
#[async_trait]
pub trait StreamHandle: Send + Sync {
    /// Runs the stream until it ends, is cancelled, or fails.
    ///
    /// Called exactly once per handle.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Cancelled`] after a stop request or caller
    /// cancellation, or the error that terminated the stream.
    async fn run(&self) -> Result<(), StreamError>;

    /// Requests the stream to stop; never blocks and may be repeated.
    fn request_stop(&self);
}

/// Event stream handle accepting routing schema hot-swaps.
pub trait EventStreamHandle: StreamHandle {
    /// Installs a new schema for events processed after this call.
    ///
    /// Called under the engine lock; implementations must not block.
    fn apply_schema(&self, snapshot: Arc<SchemaSnapshot>);
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Construction inputs for an event stream.
pub struct EventStreamRequest {
    /// Cancellation token owned by the stream; child of the caller context.
    pub cancel: CancellationToken,
    /// Connection parameters, when configured.
    pub conn: Option<Arc<ConnParams>>,
    /// Replication position to start from.
    pub start_position: String,
    /// Table filter.
    pub filter: EventFilter,
    /// Routing schema installed at admission time.
    pub schema: Arc<SchemaSnapshot>,
    /// Output callback.
    pub emit: Emit<Vec<ChangeEvent>>,
}

/// Construction inputs for a row stream.
pub struct RowStreamRequest {
    /// Cancellation token owned by the stream; child of the caller context.
    pub cancel: CancellationToken,
    /// Connection parameters, when configured.
    pub conn: Option<Arc<ConnParams>>,
    /// Scan query.
    pub query: String,
    /// Primary key to resume after; empty for a full scan.
    pub resume_key: Vec<SqlValue>,
    /// Output callback.
    pub emit: Emit<RowBatch>,
}

/// Construction inputs for a result stream.
pub struct ResultStreamRequest {
    /// Cancellation token owned by the stream; child of the caller context.
    pub cancel: CancellationToken,
    /// Connection parameters, when configured.
    pub conn: Option<Arc<ConnParams>>,
    /// Query whose results are streamed.
    pub query: String,
    /// Output callback.
    pub emit: Emit<ResultBatch>,
}

/// Builds concrete stream handles.
pub trait StreamFactory: Send + Sync {
    /// Builds an event stream handle.
    fn event_stream(&self, request: EventStreamRequest) -> Arc<dyn EventStreamHandle>;

    /// Builds a row stream handle.
    fn row_stream(&self, request: RowStreamRequest) -> Arc<dyn StreamHandle>;

    /// Builds a result stream handle.
    fn result_stream(&self, request: ResultStreamRequest) -> Arc<dyn StreamHandle>;
}
