// crates/vstreamer-debug/src/server.rs
// ============================================================================
// Module: Debug HTTP Server
// Description: Introspection endpoints for the engine routing schema.
// Purpose: Expose the installed schema and schema counters to operators.
// Dependencies: axum, serde_json, tokio, vstreamer-config, vstreamer-core
// ============================================================================

//! ## Overview
//! Two read-only endpoints:
//! - `GET /debug/tablet_vschema` renders the schema of the engine's current
//!   snapshot as two-space indented JSON, HTML-escaped so it can be embedded
//!   in pages. An empty schema renders as `{}`.
//! - `GET /debug/vschema_counters` renders the `VSchemaUpdates` and
//!   `VSchemaErrors` counters.
//!
//! Both check the debugging capability first and answer 401 or 403 without
//! touching engine state when it is missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Serialize;
use thiserror::Error;
use vstreamer_config::DebugServerConfig;
use vstreamer_core::VStreamEngine;

use crate::access::AccessAuditEvent;
use crate::access::AccessAuditSink;
use crate::access::AccessError;
use crate::access::DebugAccess;
use crate::access::DefaultDebugAccess;
use crate::access::RequestContext;
use crate::access::StderrAccessAuditSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Routing schema endpoint path.
pub const TABLET_VSCHEMA_PATH: &str = "/debug/tablet_vschema";
/// Schema counter endpoint path.
pub const VSCHEMA_COUNTERS_PATH: &str = "/debug/vschema_counters";
/// Content type of every debug response body.
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for debug handlers.
#[derive(Clone)]
pub struct DebugState {
    /// Engine being inspected.
    engine: VStreamEngine,
    /// Capability check.
    access: Arc<dyn DebugAccess>,
    /// Access decision audit sink.
    audit: Arc<dyn AccessAuditSink>,
}

impl DebugState {
    /// Creates handler state.
    #[must_use]
    pub fn new(
        engine: VStreamEngine,
        access: Arc<dyn DebugAccess>,
        audit: Arc<dyn AccessAuditSink>,
    ) -> Self {
        Self {
            engine,
            access,
            audit,
        }
    }

    /// Checks the debugging capability and audits the decision.
    fn authorize(&self, ctx: &RequestContext) -> Result<(), AccessError> {
        match self.access.authorize(ctx) {
            Ok(grant) => {
                self.audit.record(&AccessAuditEvent::allowed(ctx, &grant));
                Ok(())
            }
            Err(error) => {
                self.audit.record(&AccessAuditEvent::denied(ctx, &error));
                Err(error)
            }
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the debug router.
pub fn debug_router(state: DebugState) -> Router {
    Router::new()
        .route(TABLET_VSCHEMA_PATH, get(tablet_vschema))
        .route(VSCHEMA_COUNTERS_PATH, get(vschema_counters))
        .with_state(Arc::new(state))
}

/// Serves the debug endpoints until the listener fails.
///
/// # Errors
///
/// Returns [`DebugServerError`] when the configuration is unusable or the
/// listener cannot be bound.
pub async fn serve_debug(
    config: &DebugServerConfig,
    engine: VStreamEngine,
) -> Result<(), DebugServerError> {
    if !config.enabled {
        return Err(DebugServerError::Config("debug server is disabled".to_string()));
    }
    let addr = config.bind_addr().map_err(|err| DebugServerError::Config(err.to_string()))?;
    let state = DebugState::new(
        engine,
        Arc::new(DefaultDebugAccess::from_config(&config.auth)),
        Arc::new(StderrAccessAuditSink),
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| DebugServerError::Transport("debug bind failed".to_string()))?;
    serve_on(listener, state).await
}

/// Serves the debug endpoints on an already bound listener.
///
/// # Errors
///
/// Returns [`DebugServerError::Transport`] when the server fails.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: DebugState,
) -> Result<(), DebugServerError> {
    let app = debug_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|_| DebugServerError::Transport("debug server failed".to_string()))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `GET /debug/tablet_vschema`.
pub async fn tablet_vschema(
    State(state): State<Arc<DebugState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(peer, &headers, TABLET_VSCHEMA_PATH);
    if let Err(error) = state.authorize(&ctx) {
        return denied(&error);
    }
    let snapshot = state.engine.schema();
    json_response(snapshot.schema())
}

/// Handles `GET /debug/vschema_counters`.
pub async fn vschema_counters(
    State(state): State<Arc<DebugState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(peer, &headers, VSCHEMA_COUNTERS_PATH);
    if let Err(error) = state.authorize(&ctx) {
        return denied(&error);
    }
    json_response(&state.engine.counters().snapshot())
}

/// Renders a value as indented, HTML-escaped JSON.
///
/// # Errors
///
/// Returns the serializer error when the value cannot be rendered.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let pretty = serde_json::to_string_pretty(value)?;
    Ok(escape_html(&pretty))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the access context from connection and headers.
fn request_context(peer: SocketAddr, headers: &HeaderMap, path: &str) -> RequestContext {
    let auth_header =
        headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).map(str::to_string);
    RequestContext::new(Some(peer.ip()), auth_header, path)
}

/// Maps an access denial to its status response.
fn denied(error: &AccessError) -> Response {
    let status = match error {
        AccessError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        AccessError::Unauthorized(_) => StatusCode::FORBIDDEN,
    };
    (status, error.to_string()).into_response()
}

/// Renders a JSON body or a 500 on serialization failure.
fn json_response<T: Serialize + ?Sized>(value: &T) -> Response {
    match render_json(value) {
        Ok(body) => {
            let mut response = (StatusCode::OK, body).into_response();
            response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(error) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("json rendering failed: {error}"))
                .into_response()
        }
    }
}

/// Escapes characters that are unsafe inside HTML script contexts.
fn escape_html(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Debug server errors.
#[derive(Debug, Error)]
pub enum DebugServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
