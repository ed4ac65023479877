//! Application settings loading from config.toml
//!
//! Settings cover where the database lives, which users are admins (admins may edit
//! settled purchases and override contributions), how amounts are rendered and the
//! default lookback window for the cost report.

use crate::core::permissions::Actor;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Database URL; `DATABASE_URL` in the environment takes precedence
    #[serde(default)]
    pub database_url: Option<String>,
    /// User ids with admin rights
    #[serde(default)]
    pub admin_user_ids: Vec<String>,
    /// Symbol used when formatting money
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Cost report settings
    #[serde(default)]
    pub report: ReportConfig,
}

/// Settings for the cost report
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReportConfig {
    /// Only include purchases from the last N days; all purchases when absent
    #[serde(default)]
    pub days: Option<u32>,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

impl AppConfig {
    /// Whether `user_id` is listed as an admin.
    #[must_use]
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }

    /// Builds the [`Actor`] for a user, resolving admin rights from this config.
    #[must_use]
    pub fn actor(&self, user_id: &str) -> Actor {
        Actor::new(user_id, self.is_admin(user_id))
    }
}

/// Loads application settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.as_ref().display()),
    })?;

    parse_config(&contents)
}

/// Parses application settings from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from `TOKEN_TRACKER_CONFIG` or `./config.toml`.
///
/// A missing file is not an error: defaults are used instead.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("TOKEN_TRACKER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        tracing::info!("No config file at {path}, using defaults");
        Ok(AppConfig {
            currency_symbol: default_currency_symbol(),
            ..AppConfig::default()
        })
    }
}
