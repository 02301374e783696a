//! Bridge configuration, read from environment variables.

use std::time::Duration;

use crate::error::ConfigError;

/// Runtime configuration for the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Telegram Bot API token (source transport).
    pub telegram_bot_token: String,
    /// Telegram user id of the single privileged admin.
    pub admin_id: i64,
    /// Bale Bot API token (destination transport).
    pub bale_bot_token: String,
    /// Keyword allow-list; empty means open admission.
    pub keywords: Vec<String>,
    /// Literal substrings stripped from every forwarded message.
    pub remove_patterns: Vec<String>,
    /// Pause after each successful dispatch.
    pub send_delay: Duration,
    /// Path of the SQLite database file.
    pub db_path: String,
}

impl BridgeConfig {
    /// Build a config from environment variables.
    ///
    /// `TELEGRAM_BOT_TOKEN`, `ADMIN_ID` and `BALE_BOT_TOKEN` are required;
    /// everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = require_env("TELEGRAM_BOT_TOKEN")?;
        let bale_bot_token = require_env("BALE_BOT_TOKEN")?;

        let admin_id: i64 = require_env("ADMIN_ID")?
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "ADMIN_ID".into(),
                message: format!("expected a numeric user id: {e}"),
            })?;

        let keywords = parse_list(&std::env::var("KEYWORDS").unwrap_or_default());
        let remove_patterns = parse_list(&std::env::var("REMOVE_PATTERNS").unwrap_or_default());

        let delay_secs: f64 = match std::env::var("SEND_DELAY_SECONDS") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "SEND_DELAY_SECONDS".into(),
                message: format!("expected seconds as a number: {e}"),
            })?,
            Err(_) => 1.5,
        };
        // Duration::from_secs_f64 panics on negative or non-finite input.
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "SEND_DELAY_SECONDS".into(),
                message: format!("expected a non-negative number of seconds, got {delay_secs}"),
            });
        }

        let db_path =
            std::env::var("DB_PATH").unwrap_or_else(|_| "./data/bridge.db".to_string());

        Ok(Self {
            telegram_bot_token,
            admin_id,
            bale_bot_token,
            keywords,
            remove_patterns,
            send_delay: Duration::from_secs_f64(delay_secs),
            db_path,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Split a comma-separated env value, trimming entries and dropping empties.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
