//! [`HttpBackend`] over `reqwest`.

use crate::{BackendError, HttpBackend, HttpRequest, HttpResponse, Method};

/// The production backend.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Builds a backend with a fresh connection pool.
    pub fn new() -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client (custom TLS roots, proxies, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpBackend for ReqwestBackend {
    async fn send(
        &self,
        request: &HttpRequest,
    ) -> Result<HttpResponse, BackendError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_builder() {
        BackendError::InvalidRequest(e.to_string())
    } else {
        BackendError::NoResponse(e.to_string())
    }
}
