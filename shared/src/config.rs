use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::{AppError, ErrorKind};

pub const DEFAULT_REPORTS_COLLECTION: &str = "Reports";
pub const DEFAULT_TRENDS_COLLECTION: &str = "trend_analyses";
pub const DEFAULT_PROFILES_COLLECTION: &str = "user_profiles";
pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_COLLECTION_NAME_LENGTH: usize = 63;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend url is missing")]
    MissingUrl,

    #[error("invalid backend url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme '{0}' (expected https or http)")]
    UnsupportedScheme(String),

    #[error("backend anon key is missing")]
    MissingAnonKey,

    #[error("invalid {field} collection name '{name}'")]
    InvalidCollection { field: &'static str, name: String },
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::of_kind(ErrorKind::Config).with_internal(e.to_string())
    }
}

fn default_reports_collection() -> String {
    DEFAULT_REPORTS_COLLECTION.to_string()
}

fn default_trends_collection() -> String {
    DEFAULT_TRENDS_COLLECTION.to_string()
}

fn default_profiles_collection() -> String {
    DEFAULT_PROFILES_COLLECTION.to_string()
}

/// Backend connection settings handed over by the shell at start-up.
///
/// The shell builds its own backend client from `url` and `anon_key`; the core
/// only needs the collection names, but refuses to run at all when the
/// connection settings are missing.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    #[serde(default = "default_reports_collection")]
    pub reports_collection: String,
    #[serde(default = "default_trends_collection")]
    pub trends_collection: String,
    #[serde(default = "default_profiles_collection")]
    pub profiles_collection: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            reports_collection: default_reports_collection(),
            trends_collection: default_trends_collection(),
            profiles_collection: default_profiles_collection(),
        }
        .validate()
    }

    #[must_use]
    pub fn with_collections(mut self, reports: impl Into<String>, trends: impl Into<String>) -> Self {
        self.reports_collection = reports.into();
        self.trends_collection = trends.into();
        self
    }

    /// Normalizes and checks every field, returning the config on success.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(ConfigError::InvalidUrl {
                url: url.chars().take(64).collect::<String>() + "...",
                reason: format!("exceeds {MAX_URL_LENGTH} characters"),
            });
        }

        let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "https" | "http" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        self.url = parsed.to_string();

        self.anon_key = self.anon_key.trim().to_string();
        if self.anon_key.is_empty() {
            return Err(ConfigError::MissingAnonKey);
        }

        self.reports_collection = validate_collection("reports", &self.reports_collection)?;
        self.trends_collection = validate_collection("trends", &self.trends_collection)?;
        self.profiles_collection = validate_collection("profiles", &self.profiles_collection)?;
        Ok(self)
    }

    #[must_use]
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
    }
}

fn validate_collection(field: &'static str, name: &str) -> Result<String, ConfigError> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(ConfigError::InvalidCollection {
            field,
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("reports_collection", &self.reports_collection)
            .field("trends_collection", &self.trends_collection)
            .field("profiles_collection", &self.profiles_collection)
            .finish()
    }
}
