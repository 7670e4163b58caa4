// crates/vstreamer-debug/src/access/tests.rs
// ============================================================================
// Module: Debug Access Unit Tests
// Description: Unit tests for loopback and bearer access decisions.
// Purpose: Validate fail-closed capability checks and token fingerprints.
// Dependencies: vstreamer-debug
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::net::IpAddr;
use std::net::Ipv4Addr;

use vstreamer_config::DebugAuthConfig;
use vstreamer_config::DebugAuthMode;

use super::AccessAuditEvent;
use super::AccessError;
use super::AccessMethod;
use super::DebugAccess;
use super::DefaultDebugAccess;
use super::RequestContext;
use super::fingerprint;
use super::parse_bearer_token;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));

fn bearer_policy() -> DefaultDebugAccess {
    DefaultDebugAccess::from_config(&DebugAuthConfig {
        mode: DebugAuthMode::BearerToken,
        bearer_tokens: vec!["debug-token".to_string()],
    })
}

#[test]
fn local_only_admits_loopback_and_rejects_remote() {
    let policy = DefaultDebugAccess::from_config(&DebugAuthConfig::default());
    let grant = policy.authorize(&RequestContext::new(Some(LOOPBACK), None, "/x")).unwrap();
    assert_eq!(grant.method, AccessMethod::Loopback);
    let err = policy.authorize(&RequestContext::new(Some(REMOTE), None, "/x")).unwrap_err();
    assert!(matches!(err, AccessError::Unauthorized(_)));
    let err = policy.authorize(&RequestContext::new(None, None, "/x")).unwrap_err();
    assert!(matches!(err, AccessError::Unauthorized(_)));
}

#[test]
fn bearer_mode_checks_token_regardless_of_peer() {
    let policy = bearer_policy();
    let ctx = RequestContext::new(Some(REMOTE), Some("Bearer debug-token".to_string()), "/x");
    let grant = policy.authorize(&ctx).unwrap();
    assert_eq!(grant.method, AccessMethod::BearerToken);
    assert_eq!(grant.token_fingerprint.as_deref(), Some(fingerprint("debug-token").as_str()));

    let ctx = RequestContext::new(Some(LOOPBACK), Some("Bearer wrong".to_string()), "/x");
    assert_eq!(
        policy.authorize(&ctx).unwrap_err(),
        AccessError::Unauthenticated("invalid bearer token".to_string())
    );
    let ctx = RequestContext::new(Some(LOOPBACK), None, "/x");
    assert!(matches!(policy.authorize(&ctx), Err(AccessError::Unauthenticated(_))));
}

#[test]
fn bearer_header_parsing_is_strict() {
    assert_eq!(parse_bearer_token(Some("bearer  abc ")).unwrap(), "abc");
    assert!(parse_bearer_token(Some("Basic abc")).is_err());
    assert!(parse_bearer_token(Some("Bearer")).is_err());
    assert!(parse_bearer_token(Some(&format!("Bearer {}", "a".repeat(9_000)))).is_err());
}

#[test]
fn fingerprint_is_sha256_hex() {
    assert_eq!(
        fingerprint("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn audit_events_never_carry_raw_tokens() {
    let policy = bearer_policy();
    let ctx = RequestContext::new(Some(REMOTE), Some("Bearer debug-token".to_string()), "/x");
    let grant = policy.authorize(&ctx).unwrap();
    let allowed = serde_json::to_string(&AccessAuditEvent::allowed(&ctx, &grant)).unwrap();
    assert!(!allowed.contains("debug-token"));
    assert!(allowed.contains("\"decision\":\"allow\""));

    let denied_ctx = RequestContext::new(Some(REMOTE), Some("Bearer leaked".to_string()), "/x");
    let err = policy.authorize(&denied_ctx).unwrap_err();
    let denied = serde_json::to_string(&AccessAuditEvent::denied(&denied_ctx, &err)).unwrap();
    assert!(!denied.contains("leaked"));
    assert!(denied.contains("\"decision\":\"deny\""));
}
