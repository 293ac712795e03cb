//! config
//!
//! Configuration loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (applied by the CLI, not here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$GITPROVIDER_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitprovider/config.toml`
//! 3. `~/.gitprovider/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use gitprovider::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("Provider: {}", config.provider_name());
//! println!("Retries: {}", config.retry_config().retry_max);
//! ```

pub mod schema;

pub use schema::{PaginationSettings, ProviderConfig, RetrySettings};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::pagination::PageOptions;
use crate::transport::RetryConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GITPROVIDER_CONFIG";

/// Environment variable consulted for a token when none is configured.
pub const TOKEN_ENV: &str = "GITPROVIDER_TOKEN";

/// API root used for GitHub when none is configured.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Settings as read from the file
    pub settings: ProviderConfig,
    /// Path the settings were loaded from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Build a config from settings already in memory.
    pub fn new(settings: ProviderConfig) -> Self {
        Self {
            settings,
            path: None,
        }
    }

    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Self::read_config(path)?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(Self {
            settings,
            path: Some(path.to_path_buf()),
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        // 1. Check $GITPROVIDER_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/gitprovider/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("gitprovider/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.gitprovider/config.toml
        let path = dirs::home_dir()?.join(".gitprovider/config.toml");
        path.exists().then_some(path)
    }

    fn read_config(path: &Path) -> Result<ProviderConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Canonical config path, `~/.gitprovider/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".gitprovider/config.toml"))
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Provider name. Defaults to "github".
    pub fn provider_name(&self) -> &str {
        self.settings.provider.as_deref().unwrap_or("github")
    }

    /// API root. GitHub falls back to the public API; other providers have no
    /// default.
    pub fn base_url(&self) -> Option<&str> {
        match self.settings.base_url.as_deref() {
            Some(url) => Some(url),
            None if self.provider_name().eq_ignore_ascii_case("github") => Some(GITHUB_API_URL),
            None => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.settings.username.as_deref()
    }

    /// Access token: inline value, then `token_env`, then `$GITPROVIDER_TOKEN`.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = &self.settings.token {
            return Some(token.clone());
        }
        let env_name = self.settings.token_env.as_deref().unwrap_or(TOKEN_ENV);
        std::env::var(env_name).ok().filter(|t| !t.is_empty())
    }

    /// Per-attempt timeout. Defaults to 30 seconds.
    pub fn timeout(&self) -> Duration {
        self.settings
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.settings
            .retry
            .as_ref()
            .map(RetrySettings::to_retry_config)
            .unwrap_or_default()
    }

    pub fn page_options(&self) -> PageOptions {
        self.settings
            .pagination
            .as_ref()
            .map(PaginationSettings::to_page_options)
            .unwrap_or_default()
    }

    /// Path the config was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
