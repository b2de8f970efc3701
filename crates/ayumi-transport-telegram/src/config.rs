//! Telegram transport settings.

use ayumi_core::config::{build_config, CoreSettings};
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Port of the HTTP alive endpoint when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3000;

/// Initial delay before retrying a failed Telegram API call.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for the retry delay.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4_000;
/// Retries after the first failed attempt.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Time-to-live (seconds) of a username directory entry.
/// Default: 24 hours.
pub const DIRECTORY_TTL_SECS: u64 = 86_400;
/// Maximum number of remembered usernames.
pub const DIRECTORY_MAX_SIZE: u64 = 50_000;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    #[serde(default)]
    pub token: String,
    /// Bot username, used to recognise `/command@bot` addressing.
    #[serde(default)]
    pub client_id: String,
    /// Port of the HTTP alive endpoint.
    #[serde(default = "default_port")]
    pub port: u16,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Check that every required setting is present.
    ///
    /// # Errors
    ///
    /// Returns the name of the first missing variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("TOKEN", &self.token), ("CLIENT_ID", &self.client_id)] {
            if value.trim().is_empty() {
                return Err(ConfigError::NotFound(name.to_string()));
            }
        }
        Ok(())
    }

    /// Bot username without a leading `@`, lowercase.
    #[must_use]
    pub fn bot_username(&self) -> String {
        self.client_id.trim().trim_start_matches('@').to_lowercase()
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Runtime settings shared with the core.
    pub core: Arc<CoreSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(core: CoreSettings, telegram: TelegramSettings) -> Self {
        Self {
            core: Arc::new(core),
            telegram: Arc::new(telegram),
        }
    }

    /// Load and validate both halves.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let telegram = TelegramSettings::new()?;
        telegram.validate()?;
        Ok(Self::new(CoreSettings::new()?, telegram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_rejected() {
        let settings = TelegramSettings {
            client_id: "ayumi_bot".to_string(),
            ..TelegramSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::NotFound(name)) if name == "TOKEN"));
    }

    #[test]
    fn test_blank_client_id_is_rejected() {
        let settings = TelegramSettings {
            token: "123:abc".to_string(),
            client_id: "   ".to_string(),
            port: DEFAULT_PORT,
        };
        assert!(
            matches!(settings.validate(), Err(ConfigError::NotFound(name)) if name == "CLIENT_ID")
        );
    }

    #[test]
    fn test_bot_username_normalized() {
        let settings = TelegramSettings {
            token: "123:abc".to_string(),
            client_id: "@Ayumi_Bot".to_string(),
            port: DEFAULT_PORT,
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bot_username(), "ayumi_bot");
    }

    #[test]
    fn test_load_requires_client_id() {
        std::env::set_var("TOKEN", "123:abc");
        std::env::remove_var("CLIENT_ID");
        assert!(
            matches!(BotSettings::load(), Err(ConfigError::NotFound(name)) if name == "CLIENT_ID")
        );

        std::env::set_var("CLIENT_ID", "@Ayumi_Bot");
        let settings = BotSettings::load().expect("complete configuration");
        assert_eq!(settings.telegram.bot_username(), "ayumi_bot");
        assert_eq!(settings.core.command_prefix, "/");

        std::env::remove_var("TOKEN");
        std::env::remove_var("CLIENT_ID");
    }
}
