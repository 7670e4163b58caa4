// crates/vstreamer-debug/src/lib.rs
// ============================================================================
// Module: VStreamer Debug Library
// Description: HTTP introspection surface for the stream engine.
// Purpose: Serve the installed routing schema and schema counters.
// Dependencies: axum, sha2, tokio, vstreamer-config, vstreamer-core
// ============================================================================

//! ## Overview
//! `vstreamer-debug` exposes read-only debug endpoints over axum. Access is
//! limited to callers holding the debugging capability, as decided by
//! [`DebugAccess`], and every decision is audited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access::AccessAuditEvent;
pub use access::AccessAuditSink;
pub use access::AccessError;
pub use access::AccessGrant;
pub use access::AccessMethod;
pub use access::DebugAccess;
pub use access::DefaultDebugAccess;
pub use access::NoopAccessAuditSink;
pub use access::RequestContext;
pub use access::StderrAccessAuditSink;
pub use server::DebugServerError;
pub use server::DebugState;
pub use server::TABLET_VSCHEMA_PATH;
pub use server::VSCHEMA_COUNTERS_PATH;
pub use server::debug_router;
pub use server::render_json;
pub use server::serve_debug;
pub use server::serve_on;
pub use server::tablet_vschema;
pub use server::vschema_counters;
