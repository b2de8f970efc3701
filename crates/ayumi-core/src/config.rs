//! Configuration and settings management
//!
//! Loads the runtime settings from layered config files and environment
//! variables, and defines the defaults for every optional knob.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Cooldown for the `support` action: 15 minutes.
pub const SUPPORT_COOLDOWN_SECS: u64 = 900;
/// Absolute lifetime of a paginated session.
pub const SESSION_TTL_SECS: u64 = 120;
/// Upper bound for a single reachability probe.
pub const PROBE_TIMEOUT_SECS: u64 = 8;
/// Maximum number of tracked cooldown entries.
pub const COOLDOWN_MAX_ENTRIES: u64 = 100_000;
/// Largest batch a single `purge` may delete.
pub const PURGE_MAX_COUNT: i64 = 100;
/// Rows shown by the leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// Runtime settings shared by every transport.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreSettings {
    /// Comma-separated user IDs holding the elevated capability everywhere.
    #[serde(rename = "elevated_users", default)]
    pub elevated_users_str: Option<String>,

    /// Prefix that marks a message as a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Directory for the local JSON store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Chat that receives forwarded support requests.
    #[serde(default)]
    pub support_chat_id: Option<i64>,

    /// Seconds between two admitted `support` requests of one user.
    #[serde(default = "default_support_cooldown")]
    pub support_cooldown_secs: u64,

    /// Lifetime of a paginated session in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Reachability probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// R2 Storage access key ID
    #[serde(default)]
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    #[serde(default)]
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    #[serde(default)]
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    #[serde(default)]
    pub r2_bucket_name: Option<String>,
}

fn default_command_prefix() -> String {
    "/".to_string()
}

fn default_data_dir() -> String {
    ".".to_string()
}

const fn default_support_cooldown() -> u64 {
    SUPPORT_COOLDOWN_SECS
}

const fn default_session_ttl() -> u64 {
    SESSION_TTL_SECS
}

const fn default_probe_timeout() -> u64 {
    PROBE_TIMEOUT_SECS
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            elevated_users_str: None,
            command_prefix: default_command_prefix(),
            data_dir: default_data_dir(),
            support_chat_id: None,
            support_cooldown_secs: SUPPORT_COOLDOWN_SECS,
            session_ttl_secs: SESSION_TTL_SECS,
            probe_timeout_secs: PROBE_TIMEOUT_SECS,
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_endpoint_url: None,
            r2_bucket_name: None,
        }
    }
}

/// Build the layered configuration shared by every settings struct.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps onto snake_case; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl CoreSettings {
    /// Load settings from config files and the environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ayumi_core::config::CoreSettings;
    ///
    /// let settings = CoreSettings::new().expect("Failed to load configuration");
    /// assert_eq!(settings.command_prefix, "/");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Returns the set of user IDs that always hold the elevated capability
    #[must_use]
    pub fn elevated_users(&self) -> HashSet<i64> {
        parse_id_list(self.elevated_users_str.as_deref())
    }

    /// Whether every R2 setting is present.
    #[must_use]
    pub fn r2_configured(&self) -> bool {
        self.r2_access_key_id.is_some()
            && self.r2_secret_access_key.is_some()
            && self.r2_endpoint_url.is_some()
            && self.r2_bucket_name.is_some()
    }

    /// Cooldown window of the `support` action.
    #[must_use]
    pub const fn support_cooldown(&self) -> Duration {
        Duration::from_secs(self.support_cooldown_secs)
    }

    /// Lifetime of paginated sessions.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Upper bound of a reachability probe.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Parse a list of numeric IDs separated by commas, semicolons or whitespace.
///
/// Tokens that are not valid integers are skipped.
#[must_use]
pub fn parse_id_list(raw: Option<&str>) -> HashSet<i64> {
    raw.map(|s| {
        s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    })
    .unwrap_or_default()
}
