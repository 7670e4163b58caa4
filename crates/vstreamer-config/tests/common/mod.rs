// crates/vstreamer-config/tests/common/mod.rs
// ============================================================================
// Module: Common Config Test Fixtures
// Description: Shared TOML fixtures and temp-file helpers.
// Purpose: Keep config tests focused on one rule each.
// Dependencies: tempfile, vstreamer-config
// ============================================================================

//! ## Overview
//! Provides a minimal valid config and helpers for writing config text to a
//! temporary file and asserting on validation failures.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::io::Write;

use tempfile::NamedTempFile;
use vstreamer_config::ConfigError;
use vstreamer_config::VStreamerConfig;

/// Result type used by config tests.
pub type TestResult = Result<(), String>;

/// Smallest valid configuration.
pub const MINIMAL: &str = r#"
[engine]
keyspace = "customer"
cell = "zone1"
"#;

/// Writes config text to a temporary file.
pub fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

/// Appends `extra` to the minimal config and parses it.
pub fn parse_with(extra: &str) -> Result<VStreamerConfig, ConfigError> {
    VStreamerConfig::from_toml(&format!("{MINIMAL}\n{extra}"))
}

/// Checks that `result` failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
