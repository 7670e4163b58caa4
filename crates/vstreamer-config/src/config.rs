// crates/vstreamer-config/src/config.rs
// ============================================================================
// Module: VStreamer Configuration
// Description: Configuration loading and validation for the stream engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, thiserror, toml, vstreamer-core
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Unknown keys are rejected
//! so typos never silently fall back to defaults.
//! Security posture: config inputs are untrusted, and debug bearer tokens
//! are never echoed in error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use vstreamer_core::ConnParams;
use vstreamer_core::EngineLogSink;
use vstreamer_core::FileLogSink;
use vstreamer_core::NoopLogSink;
use vstreamer_core::StderrLogSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "vstreamer.toml";
/// Environment variable naming the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "VSTREAMER_CONFIG";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1 << 20;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of debug bearer tokens.
pub(crate) const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a debug bearer token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum length of keyspace and cell names.
pub(crate) const MAX_NAME_LENGTH: usize = 256;

// ============================================================================
// SECTION: Config Root
// ============================================================================

/// Root configuration for a stream engine deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VStreamerConfig {
    /// Engine identity.
    pub engine: EngineConfig,
    /// Database connection parameters.
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
    /// Debug HTTP surface.
    #[serde(default)]
    pub debug: DebugServerConfig,
    /// Engine log destination.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VStreamerConfig {
    /// Loads configuration from `path`, `VSTREAMER_CONFIG`, or `vstreamer.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds limits,
    /// fails to parse, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_path(path);
        check_path_limits("config path", &path)?;
        let content = read_bounded(&path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text fails to parse or validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if let Some(connection) = &self.connection {
            connection.validate()?;
        }
        self.debug.validate()?;
        self.logging.validate()
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Engine identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Keyspace served by the engine.
    pub keyspace: String,
    /// Topology cell watched for routing documents.
    pub cell: String,
}

impl EngineConfig {
    /// Validates engine identity.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_name("engine.keyspace", &self.keyspace)?;
        validate_name("engine.cell", &self.cell)
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Database connection section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// TCP host.
    #[serde(default)]
    pub host: Option<String>,
    /// TCP port; required with `host`.
    #[serde(default)]
    pub port: u16,
    /// User name.
    #[serde(default)]
    pub user: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Default database.
    #[serde(default)]
    pub database: String,
    /// Unix socket path; used instead of `host` when set.
    #[serde(default)]
    pub unix_socket: Option<String>,
    /// Connection character set.
    #[serde(default)]
    pub charset: Option<String>,
}

impl ConnectionConfig {
    /// Validates the connection section.
    fn validate(&self) -> Result<(), ConfigError> {
        let host = self.host.as_deref().map(str::trim).filter(|host| !host.is_empty());
        let socket = self.unix_socket.as_deref().map(str::trim).filter(|path| !path.is_empty());
        match (host, socket) {
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "connection requires host or unix_socket".to_string(),
                ));
            }
            (Some(_), _) if self.port == 0 => {
                return Err(ConfigError::Invalid(
                    "connection.port must be non-zero when host is set".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(socket) = socket {
            check_path_limits("connection.unix_socket", Path::new(socket))?;
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Invalid("connection.user must be non-empty".to_string()));
        }
        Ok(())
    }

    /// Converts the section into engine connection parameters.
    #[must_use]
    pub fn to_conn_params(&self) -> ConnParams {
        ConnParams {
            host: self.host.clone().unwrap_or_default(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            unix_socket: self.unix_socket.clone(),
            charset: self.charset.clone(),
        }
    }
}

// ============================================================================
// SECTION: Debug Server
// ============================================================================

/// Debug HTTP surface configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugServerConfig {
    /// Serve the debug endpoints.
    #[serde(default)]
    pub enabled: bool,
    /// Bind address; required when enabled.
    #[serde(default)]
    pub bind: Option<String>,
    /// Access control.
    #[serde(default)]
    pub auth: DebugAuthConfig,
}

impl DebugServerConfig {
    /// Validates the debug section.
    fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;
        if !self.enabled {
            return Ok(());
        }
        let addr = self.bind_addr()?;
        if !addr.ip().is_loopback() && self.auth.mode == DebugAuthMode::LocalOnly {
            return Err(ConfigError::Invalid(
                "non-loopback debug bind requires bearer_token auth".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is missing or malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or_default().trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("debug server requires bind address".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid("invalid debug bind address".to_string()))
    }
}

/// Debug access modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebugAuthMode {
    /// Loopback peers only.
    #[default]
    LocalOnly,
    /// Bearer token authentication.
    BearerToken,
}

/// Debug access configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugAuthConfig {
    /// Access mode.
    #[serde(default)]
    pub mode: DebugAuthMode,
    /// Accepted bearer tokens; required for `bearer_token` mode.
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
}

impl DebugAuthConfig {
    /// Validates access configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bearer_tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid(format!(
                "debug.auth.bearer_tokens holds more than {MAX_AUTH_TOKENS} tokens"
            )));
        }
        self.bearer_tokens.iter().enumerate().try_for_each(|(index, token)| {
            let problem = if token.trim().is_empty() {
                "is blank"
            } else if token.trim() != token {
                "has surrounding whitespace"
            } else if token.len() > MAX_AUTH_TOKEN_LENGTH {
                "is too long"
            } else {
                return Ok(());
            };
            Err(ConfigError::Invalid(format!("debug.auth.bearer_tokens[{index}] {problem}")))
        })?;
        if self.mode == DebugAuthMode::BearerToken && self.bearer_tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "debug.auth.mode bearer_token needs at least one bearer token".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Engine log destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `path`.
    File,
    /// Discard records.
    None,
}

/// Engine log configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Destination.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl LoggingConfig {
    /// Validates the logging section.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("file log sink requires logging.path".to_string()))
            }
            (LogSinkKind::File, Some(path)) => check_path_limits("logging.path", path),
            (_, Some(_)) => {
                Err(ConfigError::Invalid("logging.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured engine log sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn EngineLogSink>, ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::Stderr, _) => Ok(Arc::new(StderrLogSink)),
            (LogSinkKind::None, _) => Ok(Arc::new(NoopLogSink)),
            (LogSinkKind::File, Some(path)) => FileLogSink::new(path)
                .map(|sink| Arc::new(sink) as Arc<dyn EngineLogSink>)
                .map_err(|err| ConfigError::Io(err.to_string())),
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("file log sink requires logging.path".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Picks the config path: explicit argument, then environment, then default.
fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Rejects paths beyond the total and per-segment length limits.
fn check_path_limits(label: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{label} is longer than {MAX_TOTAL_PATH_LENGTH} bytes"
        )));
    }
    let oversized =
        path.components().any(|segment| segment.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH);
    if oversized {
        return Err(ConfigError::Invalid(format!(
            "{label} segment is longer than {MAX_PATH_COMPONENT_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Reads at most one byte past the size limit and decodes it as UTF-8.
fn read_bounded(path: &Path) -> Result<String, ConfigError> {
    let file = fs::File::open(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let limit = u64::try_from(MAX_CONFIG_FILE_SIZE).map_or(u64::MAX, |size| size + 1);
    let mut bytes = Vec::new();
    file.take(limit)
        .read_to_end(&mut bytes)
        .map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid(format!(
            "config file is larger than {MAX_CONFIG_FILE_SIZE} bytes"
        )));
    }
    String::from_utf8(bytes)
        .map_err(|_| ConfigError::Invalid("config file is not valid utf-8".to_string()))
}

/// Validates a keyspace or cell name.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed != value {
        return Err(ConfigError::Invalid(format!("{field} must not contain surrounding whitespace")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}
