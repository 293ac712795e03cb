//! transport::http
//!
//! `reqwest`-backed [`Transport`] with retries.
//!
//! # Retry Semantics
//!
//! - Network failures and statuses in [`RetryConfig::retryable_statuses`] are
//!   retried up to `retry_max` times with exponential backoff bounded by
//!   `[wait_min, wait_max]`.
//! - Every other status is classified and returned immediately.
//! - Cancellation and deadline expiry abort both an in-flight attempt and a
//!   backoff sleep, and never start another attempt.
//! - When the budget runs out the last error is wrapped in
//!   `ProviderError::RetriesExhausted`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gitprovider::transport::{Auth, HttpTransport, Request, RetryConfig, Transport};
//! use gitprovider::CallContext;
//!
//! # async fn run() -> Result<(), gitprovider::ProviderError> {
//! let transport = HttpTransport::builder("https://stash.example.com")
//!     .auth(Auth::Bearer("token".into()))
//!     .retry(RetryConfig::new(Duration::from_millis(500), Duration::from_secs(10), 3))
//!     .build()?;
//!
//! let resp = transport
//!     .execute(&CallContext::new(), &Request::get("rest/api/1.0/projects"))
//!     .await?;
//! println!("status {}", resp.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, LINK};
use reqwest::{Client, StatusCode};

use super::{next_page_from_link, Request, Response, ResponseMeta, RetryConfig, Session, Transport};
use crate::context::CallContext;
use crate::error::ProviderError;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("gitprovider/", env!("CARGO_PKG_VERSION"));

/// Maximum number of characters of an error body kept in errors.
const BODY_SNIPPET_LEN: usize = 512;

/// Credentials applied to every request.
#[derive(Clone, Default)]
pub enum Auth {
    /// No authentication
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// HTTP basic authentication
    Basic { username: String, password: String },
}

// Custom Debug to avoid exposing credentials
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl Auth {
    fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    base_url: String,
    auth: Auth,
    headers: Vec<(String, String)>,
    retry: RetryConfig,
    timeout: Option<Duration>,
    user_agent: String,
}

impl HttpTransportBuilder {
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt timeout enforced by the HTTP client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::InvalidRequest` if a header is malformed or
    /// the HTTP client cannot be constructed.
    pub fn build(self) -> Result<HttpTransport, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }

        let mut client = Client::builder().user_agent(self.user_agent);
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        let client = client
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("HTTP client: {e}")))?;

        Ok(HttpTransport {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth: self.auth,
            headers,
            retry: self.retry,
        })
    }
}

/// HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth: Auth,
    headers: HeaderMap,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpTransport {
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            base_url: base_url.into(),
            auth: Auth::None,
            headers: Vec::new(),
            retry: RetryConfig::default(),
            timeout: None,
            user_agent: USER_AGENT_VALUE.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn is_retryable(&self, err: &ProviderError) -> bool {
        match err {
            ProviderError::Network(_) => true,
            other => other
                .status()
                .is_some_and(|status| self.retry.is_retryable_status(status)),
        }
    }

    /// One attempt: send, read the body, classify the status.
    async fn attempt(&self, url: &str, request: &Request) -> Result<Response, ProviderError> {
        // Request headers replace transport defaults of the same name
        let mut headers = self.headers.clone();
        for (name, value) in request.headers() {
            let (name, value) = header_pair(name, value)?;
            headers.insert(name, value);
        }

        let mut builder = self
            .client
            .request(request.method().into(), url)
            .headers(headers);
        builder = self.auth.apply(builder);
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let session = Session::from_headers(response.headers());
        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_from_link);
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

        if status.is_success() {
            Ok(Response::new(
                body,
                ResponseMeta {
                    status: status.as_u16(),
                    session,
                    next_page,
                },
            ))
        } else {
            Err(classify_status(status, &body))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Response, ProviderError> {
        let url = self.url_for(request.path());
        let mut delays = self.retry.schedule();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            tracing::debug!(method = %request.method(), %url, attempt = attempts, "sending request");

            let err = match ctx.run(self.attempt(&url, request)).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !self.is_retryable(&err) {
                return Err(err);
            }

            let Some(delay) = delays.next() else {
                if attempts == 1 {
                    return Err(err);
                }
                tracing::warn!(method = %request.method(), %url, attempts, error = %err, "retry budget exhausted");
                return Err(ProviderError::RetriesExhausted {
                    attempts,
                    source: Box::new(err),
                });
            };

            tracing::warn!(
                method = %request.method(),
                %url,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            ctx.sleep(delay).await?;
        }
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ProviderError> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        ProviderError::InvalidRequest(format!("invalid header name '{name}': {e}"))
    })?;
    let value = HeaderValue::from_str(value).map_err(|e| {
        ProviderError::InvalidRequest(format!("invalid value for header '{name}': {e}"))
    })?;
    Ok((name, value))
}

fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        ProviderError::InvalidRequest(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Map a non-2xx status and its body to an error.
pub(crate) fn classify_status(status: StatusCode, body: &[u8]) -> ProviderError {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::CONFLICT => ProviderError::AlreadyExists(message),
        StatusCode::BAD_REQUEST => ProviderError::Validation {
            status_text: status
                .canonical_reason()
                .unwrap_or("Bad Request")
                .to_string(),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthFailed(message),
        _ => ProviderError::Http {
            status: status.as_u16(),
            body: message,
        },
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// GitHub sends `{"message": ...}`; Bitbucket Server sends
/// `{"errors": [{"message": ...}]}`. Anything else is returned as a snippet.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let details: Vec<&str> = value
            .get("errors")
            .and_then(|e| e.as_array())
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        match value.get("message").and_then(|m| m.as_str()) {
            Some(message) if details.is_empty() => return message.to_string(),
            Some(message) => return format!("{message} ({})", details.join("; ")),
            None if !details.is_empty() => return details.join("; "),
            None => {}
        }
    }
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_SNIPPET_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn classify_maps_sentinels() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, b"").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_status(StatusCode::CONFLICT, b"").kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, b"").kind(),
            ErrorKind::AuthFailed
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, b"boom").kind(),
            ErrorKind::Http
        );
    }

    #[test]
    fn classify_bad_request_keeps_status_text() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            br#"{"errors":[{"message":"slug taken"},{"message":"name too long"}]}"#,
        );
        match err {
            ProviderError::Validation {
                status_text,
                message,
            } => {
                assert_eq!(status_text, "Bad Request");
                assert_eq!(message, "slug taken; name too long");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn github_message_is_extracted() {
        assert_eq!(error_message(br#"{"message":"Not Found"}"#), "Not Found");
        assert_eq!(
            error_message(
                br#"{"message":"Validation Failed","errors":[{"message":"name already exists on this account"}]}"#
            ),
            "Validation Failed (name already exists on this account)"
        );
    }

    #[test]
    fn plain_body_is_truncated() {
        let body = "x".repeat(BODY_SNIPPET_LEN * 2);
        assert_eq!(error_message(body.as_bytes()).len(), BODY_SNIPPET_LEN);
    }

    #[test]
    fn url_joining() {
        let transport = HttpTransport::builder("https://stash.example.com/")
            .build()
            .unwrap();
        assert_eq!(
            transport.url_for("/rest/api/1.0/projects"),
            "https://stash.example.com/rest/api/1.0/projects"
        );
        assert_eq!(
            transport.url_for("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = HttpTransport::builder("https://example.com")
            .header("bad header", "v")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn debug_redacts_credentials() {
        let transport = HttpTransport::builder("https://example.com")
            .auth(Auth::Basic {
                username: "bot".into(),
                password: "hunter2".into(),
            })
            .build()
            .unwrap();
        let debug = format!("{transport:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("bot"));

        let bearer = format!("{:?}", Auth::Bearer("ghp_secret".into()));
        assert!(!bearer.contains("ghp_secret"));
    }

    #[test]
    fn retryability() {
        let transport = HttpTransport::builder("https://example.com")
            .build()
            .unwrap();
        assert!(transport.is_retryable(&ProviderError::Network("reset".into())));
        assert!(transport.is_retryable(&ProviderError::Http {
            status: 503,
            body: String::new()
        }));
        assert!(!transport.is_retryable(&ProviderError::NotFound(String::new())));
        assert!(!transport.is_retryable(&ProviderError::Cancelled));
    }
}
