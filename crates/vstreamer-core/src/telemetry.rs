// crates/vstreamer-core/src/telemetry.rs
// ============================================================================
// Module: Engine Telemetry
// Description: Structured JSON-line log records for engine lifecycle events.
// Purpose: Record admissions, completions, and schema reloads without a
//          logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The engine reports lifecycle and schema events as [`EngineLogRecord`]s to
//! an [`EngineLogSink`]. Records serialize to a single JSON object with the
//! event tag flattened next to the timestamp and level, one record per line.
//! Security posture: stream queries are logged verbatim; connection
//! credentials never are.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::handle::StreamKind;
use crate::registry::SessionId;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine lifecycle event.
    Info,
    /// Recoverable failure.
    Warn,
    /// Failure surfaced to a caller.
    Error,
}

/// Stream completion classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The stream ended normally.
    Ok,
    /// The stream was cancelled by its caller or by shutdown.
    Cancelled,
    /// The stream failed.
    Error,
}

/// Engine event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The engine transitioned to open.
    EngineOpened {
        /// Keyspace served.
        keyspace: String,
        /// Topology cell watched.
        cell: String,
    },
    /// The engine closed and drained.
    EngineClosed {
        /// Sessions signalled to stop.
        signalled: usize,
    },
    /// A row stream was requested.
    RowStreamRequested {
        /// Scan query.
        query: String,
        /// Resume key, empty for a full scan.
        resume_key: Vec<serde_json::Value>,
    },
    /// A stream was admitted and is about to run.
    StreamStarted {
        /// Session identifier.
        session_id: SessionId,
        /// Stream kind.
        kind: StreamKind,
    },
    /// A stream returned and was deregistered.
    StreamFinished {
        /// Session identifier.
        session_id: SessionId,
        /// Stream kind.
        kind: StreamKind,
        /// Completion classification.
        outcome: StreamOutcome,
        /// Error text for failed streams.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A new routing schema was installed.
    SchemaUpdated {
        /// Keyspace served.
        keyspace: String,
        /// Keyspaces in the compiled schema.
        keyspaces: usize,
        /// Tables in the compiled schema.
        tables: usize,
        /// Event streams the schema was pushed to.
        broadcast: usize,
    },
    /// The topology watch reported an error.
    SchemaFetchFailed {
        /// Topology cell.
        cell: String,
        /// Error text.
        error: String,
    },
    /// A routing document failed to compile.
    SchemaCompileFailed {
        /// Topology cell.
        cell: String,
        /// Error text.
        error: String,
    },
}

impl EngineEvent {
    /// Returns the default severity for the event.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        match self {
            Self::SchemaFetchFailed { .. } | Self::SchemaCompileFailed { .. } => LogLevel::Warn,
            Self::StreamFinished {
                outcome: StreamOutcome::Error,
                ..
            } => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Timestamped log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineLogRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Severity.
    pub level: LogLevel,
    /// Event payload.
    #[serde(flatten)]
    pub event: EngineEvent,
}

impl EngineLogRecord {
    /// Stamps an event with the current time and its default level.
    #[must_use]
    pub fn now(event: EngineEvent) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            timestamp_ms,
            level: event.level(),
            event,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for engine log records.
pub trait EngineLogSink: Send + Sync {
    /// Records one log entry.
    fn record(&self, record: &EngineLogRecord);
}

/// Sink that writes JSON lines to stderr.
pub struct StderrLogSink;

impl EngineLogSink for StderrLogSink {
    fn record(&self, record: &EngineLogRecord) {
        if let Ok(payload) = serde_json::to_string(record) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// Append-only file handle.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EngineLogSink for FileLogSink {
    fn record(&self, record: &EngineLogRecord) {
        if let Ok(payload) = serde_json::to_string(record)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that discards records.
pub struct NoopLogSink;

impl EngineLogSink for NoopLogSink {
    fn record(&self, _record: &EngineLogRecord) {}
}

/// Sink that keeps records in memory.
#[derive(Default)]
pub struct MemoryLogSink {
    /// Captured records in arrival order.
    records: Mutex<Vec<EngineLogRecord>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured records.
    #[must_use]
    pub fn records(&self) -> Vec<EngineLogRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the captured events without timestamps.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.records().into_iter().map(|record| record.event).collect()
    }
}

impl EngineLogSink for MemoryLogSink {
    fn record(&self, record: &EngineLogRecord) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::EngineEvent;
    use super::EngineLogRecord;
    use super::EngineLogSink;
    use super::FileLogSink;
    use super::LogLevel;
    use super::MemoryLogSink;
    use super::StreamOutcome;
    use crate::handle::StreamKind;
    use crate::registry::SessionId;

    #[test]
    fn record_flattens_event_tag() {
        let record = EngineLogRecord {
            timestamp_ms: 7,
            level: LogLevel::Warn,
            event: EngineEvent::SchemaFetchFailed {
                cell: "zone1".to_string(),
                error: "boom".to_string(),
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "timestamp_ms": 7,
                "level": "warn",
                "event": "schema_fetch_failed",
                "cell": "zone1",
                "error": "boom",
            })
        );
    }

    #[test]
    fn failed_streams_log_at_error_level() {
        let event = EngineEvent::StreamFinished {
            session_id: SessionId::from_raw(3),
            kind: StreamKind::Row,
            outcome: StreamOutcome::Error,
            error: Some("lost connection".to_string()),
        };
        assert_eq!(EngineLogRecord::now(event).level, LogLevel::Error);
        let opened = EngineEvent::EngineOpened {
            keyspace: "ks".to_string(),
            cell: "zone1".to_string(),
        };
        assert_eq!(opened.level(), LogLevel::Info);
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        let sink = FileLogSink::new(&path).unwrap();
        sink.record(&EngineLogRecord::now(EngineEvent::EngineClosed {
            signalled: 2,
        }));
        sink.record(&EngineLogRecord::now(EngineEvent::EngineClosed {
            signalled: 0,
        }));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "engine_closed");
        assert_eq!(first["signalled"], 2);
    }

    #[test]
    fn memory_sink_keeps_arrival_order() {
        let sink = MemoryLogSink::new();
        for signalled in 0..3 {
            sink.record(&EngineLogRecord::now(EngineEvent::EngineClosed {
                signalled,
            }));
        }
        let signalled: Vec<usize> = sink
            .events()
            .into_iter()
            .map(|event| match event {
                EngineEvent::EngineClosed {
                    signalled,
                } => signalled,
                _ => usize::MAX,
            })
            .collect();
        assert_eq!(signalled, vec![0, 1, 2]);
    }
}
