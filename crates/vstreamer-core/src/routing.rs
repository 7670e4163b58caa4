// crates/vstreamer-core/src/routing.rs
// ============================================================================
// Module: Routing Schema
// Description: Routing document model and the compiled routing schema.
// Purpose: Turn topology routing documents into queryable table routes.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The topology service publishes a [`RoutingDocument`] per cell. A
//! [`SchemaCompiler`] validates it and resolves every table's column vindexes
//! into a [`RoutingSchema`], which event streams use to decide row routing.
//! The coordinator treats the compiled schema as opaque apart from
//! introspection output.
//!
//! Invariants:
//! - Compilation is pure; a failed compile never yields a partial schema.
//! - An empty [`RoutingSchema`] serializes to `{}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Vindex types that map every key to at most one keyspace id.
const UNIQUE_VINDEX_TYPES: &[&str] = &[
    "binary",
    "binary_md5",
    "consistent_lookup_unique",
    "hash",
    "lookup_hash_unique",
    "lookup_unique",
    "null",
    "numeric",
    "numeric_static_map",
    "reverse_bits",
    "unicode_loose_md5",
    "unicode_loose_xxhash",
    "xxhash",
];

// ============================================================================
// SECTION: Routing Document
// ============================================================================

/// Routing document as published by the topology service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDocument {
    /// Keyspace definitions keyed by keyspace name.
    #[serde(default)]
    pub keyspaces: BTreeMap<String, KeyspaceDocument>,
}

/// Keyspace definition inside a routing document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceDocument {
    /// Whether the keyspace is sharded.
    #[serde(default)]
    pub sharded: bool,
    /// Vindex declarations keyed by vindex name.
    #[serde(default)]
    pub vindexes: BTreeMap<String, VindexDocument>,
    /// Table definitions keyed by table name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableDocument>,
}

/// Vindex declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VindexDocument {
    /// Vindex type name (for example `hash` or `lookup_unique`).
    #[serde(rename = "type")]
    pub vindex_type: String,
    /// Type-specific parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Owning table for lookup vindexes.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Table definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDocument {
    /// Column vindexes; the first entry is the primary vindex.
    #[serde(default)]
    pub column_vindexes: Vec<ColumnVindexDocument>,
    /// Hex keyspace id for tables pinned to a single shard.
    #[serde(default)]
    pub pinned: Option<String>,
}

/// Column to vindex binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVindexDocument {
    /// Column name.
    pub column: String,
    /// Vindex name declared in the keyspace.
    pub name: String,
}

// ============================================================================
// SECTION: Compiled Schema
// ============================================================================

/// Compiled routing schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingSchema {
    /// Compiled keyspaces keyed by keyspace name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub keyspaces: BTreeMap<String, KeyspaceSchema>,
}

impl RoutingSchema {
    /// Returns true when no keyspace is routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyspaces.is_empty()
    }

    /// Returns the route for a table, when defined.
    #[must_use]
    pub fn table(&self, keyspace: &str, table: &str) -> Option<&TableRoute> {
        self.keyspaces.get(keyspace).and_then(|ks| ks.tables.get(table))
    }

    /// Returns the number of routed keyspaces.
    #[must_use]
    pub fn keyspace_count(&self) -> usize {
        self.keyspaces.len()
    }

    /// Returns the number of routed tables across all keyspaces.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.keyspaces.values().map(|ks| ks.tables.len()).sum()
    }
}

/// Compiled keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyspaceSchema {
    /// Whether the keyspace is sharded.
    pub sharded: bool,
    /// Table routes keyed by table name.
    pub tables: BTreeMap<String, TableRoute>,
}

/// Compiled table route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRoute {
    /// Owning keyspace.
    pub keyspace: String,
    /// Table name.
    pub name: String,
    /// Resolved column vindexes; the first entry is the primary vindex.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub column_vindexes: Vec<ColumnRoute>,
    /// Pinned keyspace id, when the table lives on a single shard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<String>,
}

impl TableRoute {
    /// Returns the primary vindex, when the table has one.
    #[must_use]
    pub fn primary(&self) -> Option<&ColumnRoute> {
        self.column_vindexes.first()
    }
}

/// Resolved column vindex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRoute {
    /// Column name.
    pub column: String,
    /// Vindex name.
    pub vindex: String,
    /// Vindex type name.
    pub vindex_type: String,
    /// Whether the vindex is unique.
    pub unique: bool,
    /// Whether this table owns the vindex.
    pub owned: bool,
}

// ============================================================================
// SECTION: Compiler
// ============================================================================

/// Routing document compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A vindex declaration has no type.
    #[error("keyspace {keyspace}: vindex {vindex} has no type")]
    InvalidVindex {
        /// Keyspace name.
        keyspace: String,
        /// Vindex name.
        vindex: String,
    },
    /// A table references a vindex the keyspace does not declare.
    #[error("keyspace {keyspace}: table {table} references unknown vindex {vindex}")]
    UnknownVindex {
        /// Keyspace name.
        keyspace: String,
        /// Table name.
        table: String,
        /// Vindex name.
        vindex: String,
    },
    /// A sharded, unpinned table has no column vindex.
    #[error("keyspace {keyspace}: table {table} has no primary vindex")]
    MissingPrimaryVindex {
        /// Keyspace name.
        keyspace: String,
        /// Table name.
        table: String,
    },
    /// A table's primary vindex is not unique.
    #[error("keyspace {keyspace}: table {table} primary vindex {vindex} is not unique")]
    NonUniquePrimaryVindex {
        /// Keyspace name.
        keyspace: String,
        /// Table name.
        table: String,
        /// Vindex name.
        vindex: String,
    },
    /// An unsharded keyspace declares column vindexes.
    #[error("keyspace {keyspace}: unsharded table {table} cannot have column vindexes")]
    UnshardedVindex {
        /// Keyspace name.
        keyspace: String,
        /// Table name.
        table: String,
    },
}

/// Compiles routing documents into routing schemas.
pub trait SchemaCompiler: Send + Sync {
    /// Compiles a routing document.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when the document is malformed.
    fn compile(&self, document: &RoutingDocument) -> Result<RoutingSchema, CompileError>;
}

/// Default routing document compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCompiler;

impl SchemaCompiler for DocumentCompiler {
    fn compile(&self, document: &RoutingDocument) -> Result<RoutingSchema, CompileError> {
        let mut keyspaces = BTreeMap::new();
        for (name, keyspace) in &document.keyspaces {
            keyspaces.insert(name.clone(), compile_keyspace(name, keyspace)?);
        }
        Ok(RoutingSchema {
            keyspaces,
        })
    }
}

/// Compiles a single keyspace.
fn compile_keyspace(name: &str, keyspace: &KeyspaceDocument) -> Result<KeyspaceSchema, CompileError> {
    for (vindex, declaration) in &keyspace.vindexes {
        if declaration.vindex_type.trim().is_empty() {
            return Err(CompileError::InvalidVindex {
                keyspace: name.to_string(),
                vindex: vindex.clone(),
            });
        }
    }
    let mut tables = BTreeMap::new();
    for (table, definition) in &keyspace.tables {
        let route = compile_table(name, keyspace, table, definition)?;
        tables.insert(table.clone(), route);
    }
    Ok(KeyspaceSchema {
        sharded: keyspace.sharded,
        tables,
    })
}

/// Compiles a single table route.
fn compile_table(
    keyspace_name: &str,
    keyspace: &KeyspaceDocument,
    table: &str,
    definition: &TableDocument,
) -> Result<TableRoute, CompileError> {
    if !keyspace.sharded && !definition.column_vindexes.is_empty() {
        return Err(CompileError::UnshardedVindex {
            keyspace: keyspace_name.to_string(),
            table: table.to_string(),
        });
    }
    let mut column_vindexes = Vec::with_capacity(definition.column_vindexes.len());
    for binding in &definition.column_vindexes {
        let Some(declaration) = keyspace.vindexes.get(&binding.name) else {
            return Err(CompileError::UnknownVindex {
                keyspace: keyspace_name.to_string(),
                table: table.to_string(),
                vindex: binding.name.clone(),
            });
        };
        column_vindexes.push(ColumnRoute {
            column: binding.column.clone(),
            vindex: binding.name.clone(),
            vindex_type: declaration.vindex_type.clone(),
            unique: is_unique_vindex(&declaration.vindex_type),
            owned: declaration.owner.as_deref() == Some(table),
        });
    }
    if keyspace.sharded && definition.pinned.is_none() {
        let Some(primary) = column_vindexes.first() else {
            return Err(CompileError::MissingPrimaryVindex {
                keyspace: keyspace_name.to_string(),
                table: table.to_string(),
            });
        };
        if !primary.unique {
            return Err(CompileError::NonUniquePrimaryVindex {
                keyspace: keyspace_name.to_string(),
                table: table.to_string(),
                vindex: primary.vindex.clone(),
            });
        }
    }
    Ok(TableRoute {
        keyspace: keyspace_name.to_string(),
        name: table.to_string(),
        column_vindexes,
        pinned: definition.pinned.clone(),
    })
}

/// Returns true when the vindex type is unique.
fn is_unique_vindex(vindex_type: &str) -> bool {
    UNIQUE_VINDEX_TYPES.contains(&vindex_type)
}
