// crates/vstreamer-config/src/lib.rs
// ============================================================================
// Module: VStreamer Config Library
// Description: Canonical config model and validation for vstreamer.toml.
// Purpose: Single source of truth for engine deployment settings.
// Dependencies: serde, toml, vstreamer-core
// ============================================================================

//! ## Overview
//! `vstreamer-config` defines the configuration model for a stream engine
//! deployment: engine identity, database connection, the debug HTTP surface,
//! and the engine log destination. Validation is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
