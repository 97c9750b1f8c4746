//! Offline layer configuration with layered loading.
//!
//! Loading precedence (highest wins):
//! 1. Environment variables (ECRITURE_OFFLINE_*)
//! 2. TOML config file (if ECRITURE_OFFLINE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Offline cache controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Name of the cache generation this deployment serves from.
    ///
    /// A build-time version tag: bumping it on deploy is what retires the
    /// previous generation at activation.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the application shell is served from. Manifest paths and
    /// shell-relative intercepted URLs resolve against it.
    #[serde(default = "default_shell_origin")]
    pub shell_origin: String,

    /// URLs prefetched into a new generation at install, at minimum the
    /// shell root. Paths resolve against `shell_origin`.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Path to the SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest response body the cache will admit, in bytes. Larger
    /// responses are still served, just never cached.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,
}

fn default_cache_name() -> String {
    format!("ecriture-v{}", env!("CARGO_PKG_VERSION"))
}

fn default_shell_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_manifest() -> Vec<String> {
    vec!["/".into()]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./ecriture-offline.sqlite")
}

fn default_user_agent() -> String {
    format!("ecriture/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_entry_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            shell_origin: default_shell_origin(),
            manifest: default_manifest(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

impl OfflineConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or validation fails
    /// after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ECRITURE_OFFLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ECRITURE_OFFLINE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_name`, `user_agent`, or `manifest` is empty
    /// - `shell_origin` does not parse as an http(s) URL
    /// - `timeout_ms` is under 100ms or over 5 minutes
    /// - `max_entry_bytes` is 0 or exceeds 50MB
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }

        match url::Url::parse(&self.shell_origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(origin) => {
                return Err(ConfigError::Invalid {
                    field: "shell_origin".into(),
                    reason: format!("unsupported scheme: {}", origin.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "shell_origin".into(), reason: e.to_string() });
            }
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Invalid {
                field: "manifest".into(),
                reason: "must list at least the shell root".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_entry_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_entry_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_entry_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid {
                field: "max_entry_bytes".into(),
                reason: "must not exceed 50MB".into(),
            });
        }

        Ok(())
    }
}
