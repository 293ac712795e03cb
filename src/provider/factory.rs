//! provider::factory
//!
//! Provider selection and creation.
//!
//! # Design
//!
//! Commands use [`create_provider`] instead of constructing a backend
//! directly. The factory builds the shared [`HttpTransport`] from config
//! (credentials, retry budget, timeout, provider headers) and hands it to the
//! chosen backend.
//!
//! # Example
//!
//! ```
//! use gitprovider::config::{Config, ProviderConfig};
//! use gitprovider::provider::create_provider;
//!
//! let config = Config::new(ProviderConfig {
//!     provider: Some("stash".into()),
//!     base_url: Some("https://stash.example.com".into()),
//!     ..Default::default()
//! });
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.name(), "stash");
//! ```

use std::sync::Arc;

use super::github::GitHubProvider;
use super::stash::StashProvider;
use super::GitProvider;
use crate::config::Config;
use crate::error::ProviderError;
use crate::pagination::PageOptions;
use crate::transport::{Auth, HttpTransport, Transport};

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// GitHub and GitHub Enterprise
    GitHub,
    /// Bitbucket Server (formerly Stash)
    Stash,
}

impl ProviderKind {
    /// Get all providers.
    ///
    /// ```
    /// use gitprovider::provider::ProviderKind;
    ///
    /// assert!(ProviderKind::all().contains(&ProviderKind::Stash));
    /// ```
    pub fn all() -> &'static [ProviderKind] {
        &[ProviderKind::GitHub, ProviderKind::Stash]
    }

    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Stash => "stash",
        }
    }

    /// Parse a provider name. `bitbucket-server` is accepted for Stash.
    ///
    /// ```
    /// use gitprovider::provider::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("Bitbucket-Server"), Some(ProviderKind::Stash));
    /// assert_eq!(ProviderKind::parse("gitea"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(ProviderKind::GitHub),
            "stash" | "bitbucket-server" => Some(ProviderKind::Stash),
            _ => None,
        }
    }

    /// Headers every request to this provider carries.
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProviderKind::GitHub => &[
                ("Accept", "application/vnd.github+json"),
                ("X-GitHub-Api-Version", "2022-11-28"),
            ],
            ProviderKind::Stash => &[("X-Atlassian-Token", "no-check")],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Provider names accepted in configuration.
pub fn valid_provider_names() -> &'static [&'static str] {
    &["github", "stash", "bitbucket-server"]
}

/// Create a provider from configuration.
///
/// # Errors
///
/// `InvalidRequest` if the provider name is unknown, no base URL is
/// configured, or the transport cannot be built.
pub fn create_provider(config: &Config) -> Result<Box<dyn GitProvider>, ProviderError> {
    let kind = ProviderKind::parse(config.provider_name()).ok_or_else(|| {
        ProviderError::InvalidRequest(format!(
            "unknown provider '{}', available providers: {}",
            config.provider_name(),
            valid_provider_names().join(", ")
        ))
    })?;
    let base_url = config.base_url().ok_or_else(|| {
        ProviderError::InvalidRequest(format!("no base_url configured for provider '{kind}'"))
    })?;

    let mut builder = HttpTransport::builder(base_url)
        .auth(auth_for(kind, config))
        .retry(config.retry_config())
        .timeout(config.timeout());
    for (name, value) in kind.default_headers() {
        builder = builder.header(*name, *value);
    }
    let transport = builder.build()?;

    tracing::debug!(provider = %kind, base_url, "created provider");
    Ok(create_provider_with_transport(
        kind,
        Arc::new(transport),
        config.page_options(),
    ))
}

/// Create a provider over an existing transport.
pub fn create_provider_with_transport(
    kind: ProviderKind,
    transport: Arc<dyn Transport>,
    pages: PageOptions,
) -> Box<dyn GitProvider> {
    match kind {
        ProviderKind::GitHub => Box::new(GitHubProvider::new(transport, pages)),
        ProviderKind::Stash => Box::new(StashProvider::new(transport, pages)),
    }
}

/// Basic auth when a username is configured, bearer otherwise. GitHub always
/// takes the token as bearer.
fn auth_for(kind: ProviderKind, config: &Config) -> Auth {
    match (kind, config.username(), config.token()) {
        (ProviderKind::Stash, Some(username), Some(token)) => Auth::Basic {
            username: username.to_string(),
            password: token,
        },
        (_, _, Some(token)) => Auth::Bearer(token),
        (_, _, None) => Auth::None,
    }
}
