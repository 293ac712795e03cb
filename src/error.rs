//! error
//!
//! Error taxonomy shared by the transport, paginator, resource handles and
//! provider clients.
//!
//! # Matching
//!
//! Callers match on [`ErrorKind`] rather than on message text. Wrapping
//! variants ([`ProviderError::RetriesExhausted`]) report the kind of the error
//! they wrap, so `err.kind() == ErrorKind::NotFound` holds no matter how many
//! layers the error passed through.
//!
//! ```
//! use gitprovider::{ErrorKind, ProviderError};
//!
//! let inner = ProviderError::Http { status: 503, body: "busy".into() };
//! let err = ProviderError::RetriesExhausted { attempts: 4, source: Box::new(inner) };
//! assert_eq!(err.kind(), ErrorKind::Http);
//! assert!(!err.is_not_found());
//! ```

use thiserror::Error;

/// A single missing or malformed field in a decoded server object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    /// Field path, e.g. `project.key`
    pub field: String,
    /// What was wrong with it
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from provider operations.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// A create conflicted with an existing resource (HTTP 409).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The provider rejected the request body (HTTP 400).
    #[error("validation failed ({status_text}): {message}")]
    Validation {
        /// Canonical reason phrase for the status
        status_text: String,
        /// Message extracted from the provider's error body
        message: String,
    },

    /// Authentication or authorization failed (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Any other non-2xx response.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Leading part of the response body
        body: String,
    },

    /// A decoded object failed required-field validation.
    #[error("invalid server data: {}", join_field_errors(.0))]
    InvalidServerData(Vec<FieldError>),

    /// A permission string or level has no mapping for this provider.
    #[error("invalid permission level: {0}")]
    InvalidPermissionLevel(String),

    /// The backend does not implement this capability.
    #[error("{provider} does not support {capability}")]
    NoProviderSupport {
        /// Provider name
        provider: &'static str,
        /// What was asked for
        capability: String,
    },

    /// An update carried a version the provider no longer considers current.
    #[error("version conflict on {resource}: version {sent} is stale ({message})")]
    VersionConflict {
        /// Resource description
        resource: String,
        /// Version that was sent
        sent: u64,
        /// Provider message
        message: String,
    },

    /// A delete-then-recreate update deleted the resource but could not
    /// recreate it. The resource is now absent.
    #[error("{resource} was deleted but recreating it failed; it is now absent: {source}")]
    RecreateFailed {
        /// Resource description
        resource: String,
        /// Error from the recreate step
        #[source]
        source: Box<ProviderError>,
    },

    /// Connection-level failure (DNS, TLS, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built (bad header value, bad spec).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retryable failures persisted past the retry budget.
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// The last error observed
        #[source]
        source: Box<ProviderError>,
    },

    /// The paginator hit its page budget before the provider reported the
    /// last page.
    #[error("pagination stopped after {0} pages without reaching the last page")]
    TooManyPages(usize),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Classification of a [`ProviderError`], stable across wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    AuthFailed,
    Http,
    InvalidServerData,
    InvalidPermissionLevel,
    NoProviderSupport,
    VersionConflict,
    RecreateFailed,
    Network,
    Decode,
    InvalidRequest,
    TooManyPages,
    Cancelled,
    DeadlineExceeded,
}

impl ProviderError {
    /// Classify this error, looking through retry wrappers.
    ///
    /// `RecreateFailed` is reported as its own kind: the resource is gone and
    /// that matters more than why the recreate failed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ProviderError::Validation { .. } => ErrorKind::Validation,
            ProviderError::AuthFailed(_) => ErrorKind::AuthFailed,
            ProviderError::Http { .. } => ErrorKind::Http,
            ProviderError::InvalidServerData(_) => ErrorKind::InvalidServerData,
            ProviderError::InvalidPermissionLevel(_) => ErrorKind::InvalidPermissionLevel,
            ProviderError::NoProviderSupport { .. } => ErrorKind::NoProviderSupport,
            ProviderError::VersionConflict { .. } => ErrorKind::VersionConflict,
            ProviderError::RecreateFailed { .. } => ErrorKind::RecreateFailed,
            ProviderError::Network(_) => ErrorKind::Network,
            ProviderError::Decode(_) => ErrorKind::Decode,
            ProviderError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProviderError::RetriesExhausted { source, .. } => source.kind(),
            ProviderError::TooManyPages(_) => ErrorKind::TooManyPages,
            ProviderError::Cancelled => ErrorKind::Cancelled,
            ProviderError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// True for cancellation and deadline expiry.
    pub fn is_context_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::NotFound(_) => Some(404),
            ProviderError::AlreadyExists(_) => Some(409),
            ProviderError::Validation { .. } => Some(400),
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Shorthand for a [`ProviderError::NoProviderSupport`].
    pub fn unsupported(provider: &'static str, capability: impl Into<String>) -> Self {
        ProviderError::NoProviderSupport {
            provider,
            capability: capability.into(),
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects required-field failures while validating a decoded object.
///
/// Produces a single [`ProviderError::InvalidServerData`] carrying every
/// failure, or `Ok(())` when nothing was recorded.
#[derive(Debug, Default)]
pub struct FieldValidator {
    errors: Vec<FieldError>,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `field` if `value` is empty.
    pub fn require_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(FieldError::new(field, "must not be empty"));
        }
        self
    }

    /// Record an error for `field` if `value` is `None`.
    pub fn require_some<T>(&mut self, field: &str, value: Option<&T>) -> &mut Self {
        if value.is_none() {
            self.errors.push(FieldError::new(field, "is required"));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ProviderError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::InvalidServerData(std::mem::take(
                &mut self.errors,
            )))
        }
    }
}
