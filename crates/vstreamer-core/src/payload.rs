// crates/vstreamer-core/src/payload.rs
// ============================================================================
// Module: Stream Payloads
// Description: Batch types delivered through stream emit callbacks.
// Purpose: Give the three stream kinds typed output without fixing a codec.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The coordinator never inspects stream output; these types only give emit
//! callbacks a concrete shape. Row values are carried as JSON values so the
//! wire codec stays a concern of the stream implementations.

use serde::Deserialize;
use serde::Serialize;

/// A single SQL value as carried in row and result batches.
pub type SqlValue = serde_json::Value;

// ============================================================================
// SECTION: Event Streams
// ============================================================================

/// Change event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    /// Transaction begin.
    Begin,
    /// Transaction commit.
    Commit,
    /// Transaction rollback.
    Rollback,
    /// Row change (insert, update, delete).
    Row,
    /// Table field metadata.
    Field,
    /// Schema change statement.
    Ddl,
    /// Replication position marker.
    Gtid,
    /// Keep-alive heartbeat.
    Heartbeat,
    /// Unclassified event.
    Other,
}

/// A change event produced by an event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event classification.
    pub kind: ChangeEventKind,
    /// Replication position after this event, when known.
    #[serde(default)]
    pub position: Option<String>,
    /// Keyspace the event belongs to.
    pub keyspace: String,
    /// Table name for row and field events.
    #[serde(default)]
    pub table: Option<String>,
    /// Opaque event body.
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Table filter rule for event streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Table name or pattern the rule matches.
    pub table: String,
    /// Filter expression applied to matching tables.
    #[serde(default)]
    pub filter: String,
}

/// Event stream filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Ordered filter rules.
    pub rules: Vec<FilterRule>,
}

impl EventFilter {
    /// Returns a filter with a single rule.
    #[must_use]
    pub fn table(table: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            rules: vec![FilterRule {
                table: table.into(),
                filter: filter.into(),
            }],
        }
    }
}

// ============================================================================
// SECTION: Row and Result Streams
// ============================================================================

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type label.
    pub column_type: String,
}

/// A batch of rows produced by a row stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    /// Column metadata; sent on the first batch only.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Row values.
    pub rows: Vec<Vec<SqlValue>>,
    /// Primary key of the last row, used to resume the scan.
    #[serde(default)]
    pub last_key: Vec<SqlValue>,
    /// Replication position the scan is consistent with.
    #[serde(default)]
    pub position: String,
}

/// A batch of rows produced by a result stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBatch {
    /// Column metadata; sent on the first batch only.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Row values.
    pub rows: Vec<Vec<SqlValue>>,
    /// Replication position the result is consistent with.
    #[serde(default)]
    pub position: String,
}
