//! config::schema
//!
//! Configuration file schema.
//!
//! # Validation
//!
//! Values are checked after parsing so that a bad file fails at load time
//! rather than on the first request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::pagination::PageOptions;
use crate::transport::RetryConfig;

/// Provider connection settings.
///
/// # Example
///
/// ```toml
/// provider = "stash"
/// base_url = "https://stash.example.com"
/// username = "deploy-bot"
/// token_env = "STASH_TOKEN"
/// timeout_secs = 30
///
/// [retry]
/// max = 4
/// wait_min_ms = 1000
/// wait_max_ms = 30000
/// retryable_statuses = [429, 500, 502, 503, 504]
///
/// [pagination]
/// limit = 100
/// max_pages = 500
/// ```
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider name (`github`, `stash`)
    pub provider: Option<String>,

    /// API root, e.g. `https://stash.example.com` or `https://api.github.com`
    pub base_url: Option<String>,

    /// Username for basic authentication
    pub username: Option<String>,

    /// Access token stored inline
    pub token: Option<String>,

    /// Environment variable holding the access token
    pub token_env: Option<String>,

    /// Per-attempt HTTP timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Retry settings
    pub retry: Option<RetrySettings>,

    /// Pagination settings
    pub pagination: Option<PaginationSettings>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_env", &self.token_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl ProviderConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            let valid = crate::provider::valid_provider_names();
            if !valid.contains(&provider.to_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid provider '{}', must be one of: {}",
                    provider,
                    valid.join(", ")
                )));
            }
        }

        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "base_url '{url}' must start with http:// or https://"
                )));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if let Some(pagination) = &self.pagination {
            pagination.validate()?;
        }

        Ok(())
    }
}

/// Retry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max: Option<u32>,

    /// Shortest wait between attempts, in milliseconds
    pub wait_min_ms: Option<u64>,

    /// Longest wait between attempts, in milliseconds
    pub wait_max_ms: Option<u64>,

    /// HTTP statuses to retry
    pub retryable_statuses: Option<Vec<u16>>,
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(min), Some(max)) = (self.wait_min_ms, self.wait_max_ms) {
            if min > max {
                return Err(ConfigError::InvalidValue(format!(
                    "retry.wait_min_ms ({min}) is greater than retry.wait_max_ms ({max})"
                )));
            }
        }
        if let Some(statuses) = &self.retryable_statuses {
            if let Some(bad) = statuses.iter().find(|s| !(100..=599).contains(*s)) {
                return Err(ConfigError::InvalidValue(format!(
                    "retry.retryable_statuses contains invalid status {bad}"
                )));
            }
        }
        Ok(())
    }

    /// Overlay these settings on the default retry configuration.
    pub fn to_retry_config(&self) -> RetryConfig {
        let mut config = RetryConfig::default();
        if let Some(max) = self.max {
            config.retry_max = max;
        }
        if let Some(ms) = self.wait_min_ms {
            config.wait_min = Duration::from_millis(ms);
        }
        if let Some(ms) = self.wait_max_ms {
            config.wait_max = Duration::from_millis(ms);
        }
        if let Some(statuses) = &self.retryable_statuses {
            config.retryable_statuses = statuses.clone();
        }
        config
    }
}

/// Pagination settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationSettings {
    /// Page size to request
    pub limit: Option<u64>,

    /// Give up after this many pages
    pub max_pages: Option<usize>,
}

impl PaginationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == Some(0) {
            return Err(ConfigError::InvalidValue(
                "pagination.limit must be greater than zero".to_string(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::InvalidValue(
                "pagination.max_pages must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_page_options(&self) -> PageOptions {
        PageOptions {
            limit: self.limit,
            max_pages: self.max_pages,
            max_items: None,
        }
    }
}
