use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::FixedOffset;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{FlomoError, Result};

/// Environment variable holding the `Authorization` value.
pub const TOKEN_ENV: &str = "FLOMO_TOKEN";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "FLOMO_BASE_URL";

/// Application configuration settings.
///
/// Every component receives this value explicitly; nothing is read from global state.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Base URL of the private API, without a trailing slash
    pub base_url: String,

    /// Prefix of the web link for a single note; the slug is appended
    pub web_url: String,

    /// Value sent verbatim as the `Authorization` header
    pub token: Option<String>,

    /// Shared secret appended to the canonical string before hashing
    pub secret: String,

    /// Fixed `api_key` literal
    pub api_key: String,

    /// Fixed `app_version` literal
    pub app_version: String,

    /// Fixed `platform` literal
    pub platform: String,

    /// Fixed `webp` feature flag
    pub webp: String,

    /// Timezone parameter in the service's `hours:minutes` notation
    pub tz: String,

    /// Page size used when walking the note collection
    pub page_size: usize,

    /// Delay between successive page requests, in milliseconds
    pub request_delay_ms: u64,

    /// Delay between successive recommendation lookups, in milliseconds
    pub seed_delay_ms: u64,

    /// Similarity above which a recommendation becomes a graph edge
    pub similarity_threshold: f64,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://flomoapp.com/api/v1".to_string(),
            web_url: "https://v.flomoapp.com/mine/?memo_id=".to_string(),
            token: None,
            secret: "dbbc3dd73364b4084c3a69346e0ce2b2".to_string(),
            api_key: "flomo_web".to_string(),
            app_version: "4.0".to_string(),
            platform: "web".to_string(),
            webp: "1".to_string(),
            tz: "8:0".to_string(),
            page_size: 200,
            request_delay_ms: 0,
            seed_delay_ms: 1000,
            similarity_threshold: 0.85,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one, the default location under the
    /// user's config directory is used when present, otherwise built-in defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        Ok(config.with_env_overrides())
    }

    /// Reads a JSON configuration file. Missing keys take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| FlomoError::ConfigError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;

        serde_json::from_str(&content).map_err(|e| FlomoError::ConfigError {
            message: format!("Invalid configuration in {}: {}", path.display(), e),
        })
    }

    /// `<config dir>/flomokit/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flomokit").join("config.json"))
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            debug!("Base URL overridden from {}", BASE_URL_ENV);
            self.base_url = base_url;
        }
        self
    }

    // Configured token first, then the environment.
    pub fn get_token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            return Ok(token);
        }

        Err(FlomoError::ConfigError {
            message: format!(
                "No authorization token configured; set `token` or {}",
                TOKEN_ENV
            ),
        })
    }

    /// The `tz` parameter as a fixed UTC offset, used to interpret naive timestamps.
    ///
    /// `"8:0"` is UTC+08:00, `"-5:30"` is UTC-05:30.
    pub fn tz_offset(&self) -> Result<FixedOffset> {
        let invalid = || FlomoError::ConfigError {
            message: format!("Invalid tz value: {}", self.tz),
        };

        let raw = self.tz.trim();
        let (sign, rest) = match raw.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }
}
