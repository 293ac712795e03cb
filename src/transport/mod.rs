//! transport
//!
//! Uniform request/response contract over provider REST APIs.
//!
//! # Design
//!
//! Provider clients never touch `reqwest` directly. They build an immutable
//! [`Request`] and hand it to a [`Transport`], which returns a [`Response`]
//! (body bytes plus [`ResponseMeta`]) or a classified
//! [`ProviderError`](crate::ProviderError).
//!
//! - [`HttpTransport`]: the real implementation, with retries and backoff
//! - [`RetryConfig`]: construction-time retry budget
//!
//! # Example
//!
//! ```
//! use gitprovider::transport::{Method, Request};
//!
//! let req = Request::get("rest/api/1.0/projects/PRJ/repos")
//!     .with_query("start", 25)
//!     .with_query("limit", 100);
//! assert_eq!(req.method(), Method::Get);
//! assert_eq!(req.query().len(), 2);
//! ```

mod http;
mod retry;

pub use http::{Auth, HttpTransport, HttpTransportBuilder};
pub use retry::RetryConfig;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::CallContext;
use crate::error::ProviderError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single API request.
///
/// Built once with the `with_*` methods and then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter when `value` is present.
    pub fn with_optional_query(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` and attach it.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::InvalidRequest` if serialization fails.
    pub fn with_json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, ProviderError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ProviderError::InvalidRequest(format!("unserializable body: {e}")))?;
        Ok(self.with_body(value))
    }

    /// Override or add a header for this request only.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Per-request identifiers some providers echo back.
///
/// Attached to domain objects for audit and debugging. Never compared when
/// deciding whether a resource changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl Session {
    /// Extract session identifiers from response headers.
    ///
    /// Understands Bitbucket Server's `X-AUSERID`/`X-ASESSIONID`/`X-AREQUESTID`
    /// and GitHub's `X-GitHub-Request-Id`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Self {
            user_id: get("x-auserid"),
            session_id: get("x-asessionid"),
            request_id: get("x-arequestid").or_else(|| get("x-github-request-id")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.session_id.is_none() && self.request_id.is_none()
    }
}

/// Response metadata returned alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// HTTP status code
    pub status: u16,
    /// Session identifiers echoed by the provider
    pub session: Session,
    /// Page number from a `Link: <...>; rel="next"` header, if any
    pub next_page: Option<u64>,
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Response {
    body: Vec<u8>,
    meta: ResponseMeta,
}

impl Response {
    pub fn new(body: Vec<u8>, meta: ResponseMeta) -> Self {
        Self { body, meta }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Decode` if the body is not valid JSON for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ProviderError::Decode(format!(
                "{} (status {}, {} bytes)",
                e,
                self.meta.status,
                self.body.len()
            ))
        })
    }
}

/// Issues one logical request, including any retries.
///
/// Implementations hold no per-call mutable state and are safe to share
/// across tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request`, honoring `ctx` cancellation and deadline.
    ///
    /// # Errors
    ///
    /// - `NotFound` for 404, `AlreadyExists` for 409, `Validation` for 400
    /// - `AuthFailed` for 401/403, `Http` for other non-2xx statuses
    /// - `RetriesExhausted` when retryable failures outlast the budget
    /// - `Cancelled` / `DeadlineExceeded` when `ctx` ends first
    async fn execute(&self, ctx: &CallContext, request: &Request)
        -> Result<Response, ProviderError>;
}

/// Parse the `page` parameter of the `rel="next"` target in a `Link` header.
pub(crate) fn next_page_from_link(link: &str) -> Option<u64> {
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let url = target.trim_start_matches('<').trim_end_matches('>');
        let query = url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key == "page" {
                value.parse().ok()
            } else {
                None
            }
        })
    })
}
