//! [`IdentityProvider`] over the resilient transport.
//!
//! Identity calls bypass the session gate (they either need no
//! credential or carry an explicit one) and are never retried: a login
//! that fails is reported, not replayed.

use anchorline_session::{IdentityProvider, LoginResponse, SessionError};
use anchorline_token::Credential;
use serde_json::json;

use crate::{HttpBackend, Method, RequestOptions, ResilientTransport, TransportError};

/// Paths of the identity endpoints, relative to the transport's base
/// URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEndpoints {
    pub health: String,
    pub login: String,
    pub refresh: String,
    pub logout: String,
    pub current_identity: String,
}

impl Default for IdentityEndpoints {
    fn default() -> Self {
        Self {
            health: "/health".into(),
            login: "/auth/login".into(),
            refresh: "/auth/refresh".into(),
            logout: "/auth/logout".into(),
            current_identity: "/auth/me".into(),
        }
    }
}

/// The identity provider reached over HTTP.
pub struct HttpIdentityProvider<B> {
    transport: ResilientTransport<B>,
    endpoints: IdentityEndpoints,
}

impl<B: HttpBackend> HttpIdentityProvider<B> {
    pub fn new(transport: ResilientTransport<B>) -> Self {
        Self::with_endpoints(transport, IdentityEndpoints::default())
    }

    pub fn with_endpoints(
        transport: ResilientTransport<B>,
        endpoints: IdentityEndpoints,
    ) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &IdentityEndpoints {
        &self.endpoints
    }
}

impl<B: HttpBackend> IdentityProvider for HttpIdentityProvider<B> {
    async fn health(&self) -> Result<(), SessionError> {
        self.transport
            .send(
                Method::Get,
                &self.endpoints.health,
                None,
                RequestOptions::anonymous().without_retry(),
            )
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Connectivity(e.to_string()))
    }

    async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<LoginResponse, SessionError> {
        self.transport
            .request(
                Method::Post,
                &self.endpoints.login,
                Some(json!({ "email": identifier, "password": secret })),
                RequestOptions::anonymous().without_retry(),
            )
            .await
            .map_err(into_session_error)
    }

    async fn refresh(
        &self,
        current: &Credential,
    ) -> Result<LoginResponse, SessionError> {
        self.transport
            .request(
                Method::Post,
                &self.endpoints.refresh,
                None,
                RequestOptions::default()
                    .with_bearer(current.clone())
                    .without_retry(),
            )
            .await
            .map_err(into_session_error)
    }

    async fn logout_notify(
        &self,
        credential: &Credential,
    ) -> Result<(), SessionError> {
        self.transport
            .send(
                Method::Post,
                &self.endpoints.logout,
                None,
                RequestOptions::default()
                    .with_bearer(credential.clone())
                    .without_retry(),
            )
            .await
            .map(|_| ())
            .map_err(into_session_error)
    }

    async fn current_identity(
        &self,
        credential: &Credential,
    ) -> Result<serde_json::Value, SessionError> {
        self.transport
            .request(
                Method::Get,
                &self.endpoints.current_identity,
                None,
                RequestOptions::default()
                    .with_bearer(credential.clone())
                    .without_retry(),
            )
            .await
            .map_err(into_session_error)
    }
}

fn into_session_error(e: TransportError) -> SessionError {
    match e {
        TransportError::TransientNetwork { .. } | TransportError::Cancelled => {
            SessionError::Connectivity(e.to_string())
        }
        TransportError::ServerIntegrity(reason) => {
            SessionError::ServerIntegrity(reason)
        }
        TransportError::InvalidRequest(reason) => SessionError::Validation(reason),
        TransportError::AuthExpired
        | TransportError::Forbidden { .. }
        | TransportError::NotFound { .. }
        | TransportError::Validation { .. }
        | TransportError::RateLimited { .. }
        | TransportError::Status { .. } => SessionError::Rejected(e.to_string()),
    }
}
