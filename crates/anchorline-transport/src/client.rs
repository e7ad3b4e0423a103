//! The resilient transport: every outbound call goes through here.
//!
//! A call runs in three stages:
//!
//! 1. **Request interceptor**: reads the session store. A missing or
//!    expired credential short-circuits the call with
//!    [`TransportError::AuthExpired`] before anything is sent, and the
//!    session manager is signalled.
//! 2. **Exchange loop**: sends the request through the
//!    [`HttpBackend`], retrying 5xx and no-response outcomes with
//!    exponential backoff. The [`RetryContext`] lives exactly as long as
//!    the call.
//! 3. **Response interceptor**: classifies the final outcome into
//!    a typed error, signalling the session manager on 401 and cooling
//!    down on 429.
//!
//! Bodies are logged only after redaction.

use std::sync::Arc;
use std::time::Duration;

use anchorline_session::{AuthSignal, AuthSignals, SessionStore};
use anchorline_token::{
    Clock, Credential, DEFAULT_SKEW, SystemClock, TokenCodec, TokenStatus,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::classify::{Disposition, classify};
use crate::redact::{redact_text, redact_url};
use crate::{
    BackendError, HttpBackend, HttpRequest, HttpResponse, Method, RequestId,
    RetryContext, RetryPolicy, TransportError,
};

/// What to do with a request whose credential is inside the skew
/// window but not yet expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NearExpiryPolicy {
    /// Send it, and ask the session manager to refresh in the
    /// background.
    #[default]
    Proceed,
    /// Refuse it with `AuthExpired` until the refresh lands.
    Block,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Prefix for relative request paths.
    ///
    /// Default: `http://localhost:8000/api/v1`.
    pub base_url: String,

    /// Per-attempt timeout, unless a request overrides it.
    ///
    /// Default: 30 seconds.
    pub request_timeout: Duration,

    pub retry: RetryPolicy,

    /// Fixed wait applied to a 429 before it is surfaced.
    ///
    /// Default: 2 seconds.
    pub rate_limit_cooldown: Duration,

    /// Skew window used to classify the credential.
    pub skew: Duration,

    pub near_expiry: NearExpiryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit_cooldown: Duration::from_secs(2),
            skew: DEFAULT_SKEW,
            near_expiry: NearExpiryPolicy::default(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Attach the session credential. Default: `true`.
    pub authenticated: bool,
    /// Use this credential instead of the session's. The session gate
    /// is skipped and a 401 is not signalled.
    pub bearer: Option<Credential>,
    /// Allow automatic retries of 5xx/no-response. Default: `true`.
    pub retry: bool,
    /// Overrides [`TransportConfig::request_timeout`].
    pub timeout: Option<Duration>,
    /// Cancels pending retry and cooldown waits. A request already on
    /// the wire is not interrupted.
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            authenticated: true,
            bearer: None,
            retry: true,
            timeout: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    /// Options for a call that needs no credential.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bearer(mut self, credential: Credential) -> Self {
        self.authenticated = true;
        self.bearer = Some(credential);
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// HTTP client with session-aware interceptors and bounded retries.
///
/// Cheap to clone; clones share the backend and configuration.
/// Unrelated requests are not serialized against each other.
pub struct ResilientTransport<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for ResilientTransport<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<B> {
    backend: B,
    store: SessionStore,
    signals: AuthSignals,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    config: TransportConfig,
}

/// Where the credential for one call came from.
enum Authorization {
    None,
    Session(Credential),
    Explicit(Credential),
}

impl<B: HttpBackend> ResilientTransport<B> {
    pub fn new(
        backend: B,
        store: SessionStore,
        signals: AuthSignals,
        config: TransportConfig,
    ) -> Self {
        Self::with_clock(backend, store, signals, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: B,
        store: SessionStore,
        signals: AuthSignals,
        config: TransportConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                signals,
                codec: TokenCodec::new(config.skew),
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Sends a request and decodes the JSON response body into `T`.
    ///
    /// An empty body decodes as JSON `null`, so `T = ()` or
    /// `Option<_>` work for bodiless responses.
    ///
    /// # Errors
    /// See [`TransportError`]. A 2xx body that does not decode into `T`
    /// is [`TransportError::ServerIntegrity`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, TransportError> {
        let response = self.send(method, path, body, options).await?;
        let text = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(text).map_err(|e| {
            TransportError::ServerIntegrity(format!(
                "response body did not decode: {e}"
            ))
        })
    }

    /// Sends a request and returns the raw successful response.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse, TransportError> {
        let authorization = self.authorize(&options)?;

        let id = RequestId::next();
        let mut headers = vec![
            ("x-request-id", id.to_string()),
            ("accept", "application/json".to_owned()),
        ];
        match &authorization {
            Authorization::Session(c) | Authorization::Explicit(c) => {
                headers.push(("authorization", format!("Bearer {}", c.expose())));
            }
            Authorization::None => {}
        }

        let request = HttpRequest {
            id,
            method,
            url: self.url(path),
            headers,
            body,
            timeout: options.timeout.unwrap_or(self.inner.config.request_timeout),
        };
        let logged_body = request
            .body
            .as_ref()
            .map(|b| redact_text(&b.to_string()))
            .unwrap_or_default();
        tracing::debug!(
            request_id = %id,
            %method,
            url = %redact_url(&request.url),
            body = %logged_body,
            "sending request"
        );

        let policy = if options.retry {
            self.inner.config.retry.clone()
        } else {
            RetryPolicy::none()
        };
        let mut retry = RetryContext::new(policy);

        loop {
            let reason = match self.inner.backend.send(&request).await {
                Ok(response) => {
                    tracing::debug!(
                        request_id = %id,
                        status = response.status,
                        attempt = retry.attempts(),
                        body = %redact_text(&response.body),
                        "received response"
                    );
                    match classify(response.status, &response.body) {
                        Disposition::Success => return Ok(response),
                        Disposition::Retry(reason) => reason,
                        Disposition::Unauthorized => {
                            if let Authorization::Session(_) = authorization {
                                self.inner.signals.emit(AuthSignal::Unauthorized);
                            }
                            return Err(TransportError::AuthExpired);
                        }
                        Disposition::RateLimited => {
                            let cooldown = self.inner.config.rate_limit_cooldown;
                            tracing::warn!(
                                request_id = %id,
                                cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
                                "rate limited, cooling down"
                            );
                            wait(cooldown, options.cancel.as_ref()).await?;
                            return Err(TransportError::RateLimited { cooldown });
                        }
                        Disposition::Fail(e) => return Err(e),
                    }
                }
                Err(BackendError::InvalidRequest(reason)) => {
                    return Err(TransportError::InvalidRequest(reason));
                }
                Err(e) => {
                    tracing::debug!(request_id = %id, error = %e, "no response");
                    e.to_string()
                }
            };

            let Some(delay) = retry.next_delay() else {
                tracing::warn!(
                    request_id = %id,
                    attempts = retry.attempts(),
                    last = %reason,
                    "retry budget exhausted"
                );
                return Err(TransportError::TransientNetwork {
                    attempts: retry.attempts(),
                    last: reason,
                });
            };
            tracing::warn!(
                request_id = %id,
                attempt = retry.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                reason = %reason,
                "retrying after transient failure"
            );
            wait(delay, options.cancel.as_ref()).await?;
        }
    }

    /// The request interceptor.
    fn authorize(
        &self,
        options: &RequestOptions,
    ) -> Result<Authorization, TransportError> {
        if !options.authenticated {
            return Ok(Authorization::None);
        }
        if let Some(credential) = &options.bearer {
            return Ok(Authorization::Explicit(credential.clone()));
        }

        let Some(credential) = self.inner.store.credential() else {
            tracing::debug!("no credential, request short-circuited");
            self.inner.signals.emit(AuthSignal::CredentialExpired);
            return Err(TransportError::AuthExpired);
        };

        let status = self
            .inner
            .codec
            .inspect(credential.expose(), self.inner.clock.now())
            .map(|(_, status)| status)
            .unwrap_or(TokenStatus::Expired);

        match (status, self.inner.config.near_expiry) {
            (TokenStatus::Valid, _) => Ok(Authorization::Session(credential)),
            (TokenStatus::NearExpiry, NearExpiryPolicy::Proceed) => {
                self.inner.signals.emit(AuthSignal::NearExpiry);
                Ok(Authorization::Session(credential))
            }
            (TokenStatus::NearExpiry, NearExpiryPolicy::Block) => {
                tracing::debug!("credential near expiry, request held back");
                self.inner.signals.emit(AuthSignal::NearExpiry);
                Err(TransportError::AuthExpired)
            }
            (TokenStatus::Expired, _) => {
                tracing::info!("credential expired, request short-circuited");
                self.inner.signals.emit(AuthSignal::CredentialExpired);
                Err(TransportError::AuthExpired)
            }
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        let base = self.inner.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
async fn wait(
    delay: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), TransportError> {
    let Some(token) = cancel else {
        tokio::time::sleep(delay).await;
        return Ok(());
    };
    tokio::select! {
        _ = token.cancelled() => {
            tracing::debug!("pending wait cancelled by caller");
            Err(TransportError::Cancelled)
        }
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
