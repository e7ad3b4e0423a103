//! The identity provider seam.
//!
//! The session manager needs five things from the server: a health
//! check, login, refresh, logout notification and the current profile.
//! It does not care how they travel, so they sit behind
//! [`IdentityProvider`]. The transport crate ships the HTTP
//! implementation; tests plug in scripted ones.

use std::future::Future;

use anchorline_token::Credential;
use serde::Deserialize;

use crate::SessionError;

/// What login and refresh return.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// The freshly issued credential. Still undecoded: the manager
    /// checks it before accepting it.
    #[serde(alias = "access_token", alias = "token")]
    pub credential: Credential,

    /// Profile document, when the server includes one.
    #[serde(default, alias = "user")]
    pub profile: Option<serde_json::Value>,
}

/// Server calls the session lifecycle depends on.
///
/// # Error mapping
///
/// Implementations should map "could not reach the server" to
/// [`SessionError::Connectivity`], explicit refusals (wrong secret,
/// revoked credential) to [`SessionError::Rejected`], and undecodable
/// responses to [`SessionError::ServerIntegrity`].
///
/// The futures are `Send` because the manager drives refresh and logout
/// notification from background tasks.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Cheap reachability check run before login.
    fn health(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Exchanges user credentials for a session credential.
    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, SessionError>> + Send;

    /// Exchanges the current credential for a new one.
    fn refresh(
        &self,
        current: &Credential,
    ) -> impl Future<Output = Result<LoginResponse, SessionError>> + Send;

    /// Tells the server the credential is no longer in use.
    fn logout_notify(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Fetches the signed-in subject's profile.
    fn current_identity(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<serde_json::Value, SessionError>> + Send;
}

/// Lets callers keep a handle on a provider they hand to the manager.
impl<P: IdentityProvider> IdentityProvider for std::sync::Arc<P> {
    fn health(&self) -> impl Future<Output = Result<(), SessionError>> + Send {
        (**self).health()
    }

    fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<LoginResponse, SessionError>> + Send {
        (**self).login(identifier, secret)
    }

    fn refresh(
        &self,
        current: &Credential,
    ) -> impl Future<Output = Result<LoginResponse, SessionError>> + Send {
        (**self).refresh(current)
    }

    fn logout_notify(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), SessionError>> + Send {
        (**self).logout_notify(credential)
    }

    fn current_identity(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<serde_json::Value, SessionError>> + Send
    {
        (**self).current_identity(credential)
    }
}
