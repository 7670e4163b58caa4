// crates/vstreamer-debug/src/access.rs
// ============================================================================
// Module: Debug Access Control
// Description: Debugging-capability checks for introspection endpoints.
// Purpose: Fail-closed access decisions with audited outcomes.
// Dependencies: serde, sha2, thiserror, vstreamer-config
// ============================================================================

//! ## Overview
//! Every debug request is checked for the debugging capability before any
//! engine state is read. Local-only mode grants it to loopback peers; bearer
//! mode grants it to callers presenting a configured token. Each decision is
//! written to an [`AccessAuditSink`], with tokens recorded only as sha256
//! fingerprints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::net::IpAddr;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use vstreamer_config::DebugAuthConfig;
use vstreamer_config::DebugAuthMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest accepted `Authorization` header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request inputs to access decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// `Authorization` header value.
    pub auth_header: Option<String>,
    /// Request path, for auditing.
    pub path: String,
}

impl RequestContext {
    /// Builds a request context.
    #[must_use]
    pub fn new(peer_ip: Option<IpAddr>, auth_header: Option<String>, path: impl Into<String>) -> Self {
        Self {
            peer_ip,
            auth_header,
            path: path.into(),
        }
    }

    /// Returns true when the peer IP is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

/// Granted access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// How the caller was admitted.
    pub method: AccessMethod,
    /// sha256 fingerprint of the presented bearer token.
    pub token_fingerprint: Option<String>,
}

/// How a caller was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    /// Loopback peer.
    Loopback,
    /// Configured bearer token.
    BearerToken,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Access denials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The caller lacks the debugging capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Debugging-capability check.
pub trait DebugAccess: Send + Sync {
    /// Grants the debugging capability or explains the denial.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the caller may not read debug state.
    fn authorize(&self, ctx: &RequestContext) -> Result<AccessGrant, AccessError>;
}

/// Audit sink for access decisions.
pub trait AccessAuditSink: Send + Sync {
    /// Records an access decision.
    fn record(&self, event: &AccessAuditEvent);
}

// ============================================================================
// SECTION: Default Policy
// ============================================================================

/// Access policy derived from the debug auth configuration.
pub struct DefaultDebugAccess {
    /// Access mode.
    mode: DebugAuthMode,
    /// Accepted bearer tokens.
    bearer_tokens: BTreeSet<String>,
}

impl DefaultDebugAccess {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &DebugAuthConfig) -> Self {
        Self {
            mode: config.mode,
            bearer_tokens: config.bearer_tokens.iter().cloned().collect(),
        }
    }
}

impl DebugAccess for DefaultDebugAccess {
    fn authorize(&self, ctx: &RequestContext) -> Result<AccessGrant, AccessError> {
        match self.mode {
            DebugAuthMode::LocalOnly => {
                if ctx.peer_is_loopback() {
                    Ok(AccessGrant {
                        method: AccessMethod::Loopback,
                        token_fingerprint: None,
                    })
                } else {
                    Err(AccessError::Unauthorized(
                        "debugging capability requires loopback access".to_string(),
                    ))
                }
            }
            DebugAuthMode::BearerToken => {
                let token = parse_bearer_token(ctx.auth_header.as_deref())?;
                self.bearer_tokens
                    .contains(token)
                    .then(|| AccessGrant {
                        method: AccessMethod::BearerToken,
                        token_fingerprint: Some(fingerprint(token)),
                    })
                    .ok_or_else(|| AccessError::Unauthenticated("invalid bearer token".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Access audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Decision outcome.
    pub decision: &'static str,
    /// Request path.
    pub path: String,
    /// Caller IP address.
    pub peer_ip: Option<String>,
    /// Admission method for allowed requests.
    pub method: Option<AccessMethod>,
    /// Bearer token fingerprint (sha256).
    pub token_fingerprint: Option<String>,
    /// Denial reason.
    pub reason: Option<String>,
}

impl AccessAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, grant: &AccessGrant) -> Self {
        Self {
            event: "debug_access",
            decision: "allow",
            path: ctx.path.clone(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            method: Some(grant.method),
            token_fingerprint: grant.token_fingerprint.clone(),
            reason: None,
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, error: &AccessError) -> Self {
        Self {
            event: "debug_access",
            decision: "deny",
            path: ctx.path.clone(),
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            method: None,
            token_fingerprint: None,
            reason: Some(error.to_string()),
        }
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAccessAuditSink;

impl AccessAuditSink for StderrAccessAuditSink {
    fn record(&self, event: &AccessAuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

/// No-op audit sink.
pub struct NoopAccessAuditSink;

impl AccessAuditSink for NoopAccessAuditSink {
    fn record(&self, _event: &AccessAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the lowercase hex sha256 digest of a token.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Extracts the token from an `Authorization: Bearer` header.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<&str, AccessError> {
    let rejected = |reason: &str| AccessError::Unauthenticated(reason.to_string());
    let header = auth_header.ok_or_else(|| rejected("missing authorization"))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(rejected("authorization header too large"));
    }
    header
        .trim()
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| rejected("invalid authorization header"))
}

#[cfg(test)]
mod tests;
