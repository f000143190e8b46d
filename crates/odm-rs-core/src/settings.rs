//! Connection settings for odm-rs.
//!
//! [`Settings`] holds everything needed to open a connection: store hosts and
//! credentials, the locale used to render validation messages, and logging
//! options. Settings are plain values handed to the connection builder; there is
//! no process-wide settings instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Store ────────────────────────────────────────────────────────
    //
    // Dial parameters for driver-backed `Store` implementations, which read
    // them when opening their client. The in-memory store ignores them; the
    // connection builder only logs `database_name`.

    /// Store hosts as `host:port` strings.
    pub database_hosts: Vec<String>,
    /// The database name on the store.
    pub database_name: String,
    /// The user to authenticate as. Empty disables authentication.
    pub database_user: String,
    /// The password for `database_user`.
    pub database_password: String,
    /// Seconds to wait when dialing the store.
    pub connect_timeout_secs: u64,

    // ── Messages ─────────────────────────────────────────────────────

    /// Locale used to pick validation messages (e.g. "en-US").
    pub locale: String,
    /// Optional JSON message file keyed by locale.
    pub messages_file: Option<PathBuf>,
    /// Per-key message overrides applied on top of the catalog.
    pub messages: HashMap<String, String>,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
    /// Enables human-readable log output.
    pub debug: bool,
}

impl Settings {
    /// Returns the dial timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns `true` if credentials are configured.
    pub fn has_credentials(&self) -> bool {
        !self.database_user.is_empty()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_hosts: vec!["localhost:27017".to_string()],
            database_name: String::new(),
            database_user: String::new(),
            database_password: String::new(),
            connect_timeout_secs: 3,
            locale: "en-US".to_string(),
            messages_file: None,
            messages: HashMap::new(),
            log_level: "info".to_string(),
            debug: false,
        }
    }
}
