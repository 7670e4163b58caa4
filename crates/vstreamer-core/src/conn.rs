// crates/vstreamer-core/src/conn.rs
// ============================================================================
// Module: Connection Parameters
// Description: Database connection parameters handed to stream handles.
// Purpose: Carry read-only connection settings from init to every stream.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ConnParams`] is installed once through
//! [`crate::VStreamEngine::init_db_config`] and shared read-only with every
//! stream constructed afterwards. The core never opens connections itself.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Connection parameters for the local database.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnParams {
    /// Host name or address; empty when a unix socket is used.
    pub host: String,
    /// TCP port; zero when a unix socket is used.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password; never logged.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Database name.
    pub database: String,
    /// Optional unix socket path.
    #[serde(default)]
    pub unix_socket: Option<String>,
    /// Connection character set.
    #[serde(default)]
    pub charset: Option<String>,
}

impl fmt::Debug for ConnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("unix_socket", &self.unix_socket)
            .field("charset", &self.charset)
            .finish()
    }
}
