//! Runtime configuration for the routing engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of candidate accounts scanned when picking a default.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// Transport timeout used when a provider does not configure one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the `SQLite` database holding providers and accounts.
    pub database_path: String,
    /// Run default selection once before serving any request.
    pub set_default_on_mount: bool,
    /// Fallback verify/send timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound on candidates tried by default selection.
    pub candidate_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "mailroute.db".to_string(),
            set_default_on_mount: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }
}

impl Config {
    /// Fallback transport timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
