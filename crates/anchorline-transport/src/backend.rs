//! The HTTP seam.
//!
//! [`HttpBackend`] performs exactly one exchange and reports what came
//! back. Classification, retries and logging all live above it in
//! [`ResilientTransport`](crate::ResilientTransport), so a backend stays
//! trivial and tests can script one in a few lines.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::BackendError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one logical request, shared by all its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

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
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request. Reused as is for every retry.
#[derive(Clone)]
pub struct HttpRequest {
    pub id: RequestId,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Looks up a header value by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Headers carry the bearer credential; keep them out of Debug output.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// What came back: a status and the raw body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs single HTTP exchanges.
///
/// Any status code, including 5xx, is an `Ok` response. `Err` means no
/// response arrived at all.
pub trait HttpBackend: Send + Sync + 'static {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, BackendError>> + Send;
}

impl<B: HttpBackend> HttpBackend for std::sync::Arc<B> {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, BackendError>> + Send {
        (**self).send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_unique_and_displays_prefixed() {
        let a = RequestId::next();
        let b = RequestId::next();

        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("req-{}", a.into_inner()));
    }

    #[test]
    fn test_request_debug_hides_headers() {
        let request = HttpRequest {
            id: RequestId::next(),
            method: Method::Get,
            url: "http://localhost/x".into(),
            headers: vec![("authorization", "Bearer secret".into())],
            body: None,
            timeout: Duration::from_secs(1),
        };

        assert!(!format!("{request:?}").contains("secret"));
        assert_eq!(request.header("Authorization"), Some("Bearer secret"));
    }

    #[test]
    fn test_is_success_range() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(503, "").is_success());
    }
}
