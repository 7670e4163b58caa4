// crates/vstreamer-core/src/lib.rs
// ============================================================================
// Module: VStreamer Core Library
// Description: Stream lifecycle coordination and routing schema hot-reload.
// Purpose: Admit, run, cancel, and drain change-data-capture streams.
// Dependencies: async-trait, serde, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! `vstreamer-core` is the coordination core of a tablet-embedded
//! change-data-capture engine. [`VStreamEngine`] admits three kinds of
//! streams (change events, row scans, query results), tracks them in a
//! session registry, and drains them on close. A lazily started schema
//! watcher keeps the routing schema current and pushes every new
//! [`SchemaSnapshot`] to the running event streams.
//!
//! Stream internals (binlog decoding, row chunking, query execution) live
//! behind the [`StreamFactory`] seam; topology transport lives behind
//! [`TopologyWatch`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod conn;
pub mod engine;
pub mod handle;
pub mod metrics;
pub mod payload;
pub mod registry;
pub mod routing;
pub mod snapshot;
pub mod telemetry;
pub mod topology;
pub mod watcher;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use conn::ConnParams;
pub use engine::EngineBuilder;
pub use engine::EngineError;
pub use engine::VStreamEngine;
pub use handle::Emit;
pub use handle::EventStreamHandle;
pub use handle::EventStreamRequest;
pub use handle::ResultStreamRequest;
pub use handle::RowStreamRequest;
pub use handle::StreamError;
pub use handle::StreamFactory;
pub use handle::StreamHandle;
pub use handle::StreamKind;
pub use metrics::Counter;
pub use metrics::CounterSnapshot;
pub use metrics::SchemaCounters;
pub use payload::ChangeEvent;
pub use payload::ChangeEventKind;
pub use payload::EventFilter;
pub use payload::Field;
pub use payload::FilterRule;
pub use payload::ResultBatch;
pub use payload::RowBatch;
pub use payload::SqlValue;
pub use registry::RegisteredStream;
pub use registry::SessionId;
pub use registry::SessionInfo;
pub use registry::StreamRegistry;
pub use routing::ColumnRoute;
pub use routing::ColumnVindexDocument;
pub use routing::CompileError;
pub use routing::DocumentCompiler;
pub use routing::KeyspaceDocument;
pub use routing::KeyspaceSchema;
pub use routing::RoutingDocument;
pub use routing::RoutingSchema;
pub use routing::SchemaCompiler;
pub use routing::TableDocument;
pub use routing::TableRoute;
pub use routing::VindexDocument;
pub use snapshot::SchemaSnapshot;
pub use telemetry::EngineEvent;
pub use telemetry::EngineLogRecord;
pub use telemetry::EngineLogSink;
pub use telemetry::FileLogSink;
pub use telemetry::LogLevel;
pub use telemetry::MemoryLogSink;
pub use telemetry::NoopLogSink;
pub use telemetry::StderrLogSink;
pub use telemetry::StreamOutcome;
pub use topology::MemoryTopology;
pub use topology::RoutingCallback;
pub use topology::RoutingNotification;
pub use topology::TopologyError;
pub use topology::TopologyWatch;
pub use watcher::SchemaError;
