//! Resilient HTTP transport for Anchorline.
//!
//! Every outbound call the product makes goes through
//! [`ResilientTransport`], which adds session-aware request and response
//! interceptors, a bounded retry loop and redacted logging on top of an
//! [`HttpBackend`].
//!
//! The crate also provides [`HttpIdentityProvider`], the HTTP
//! implementation of the session layer's
//! [`IdentityProvider`](anchorline_session::IdentityProvider) seam.
//!
//! # Feature Flags
//!
//! - `reqwest` (default): [`ReqwestBackend`], the production backend

mod backend;
mod classify;
mod client;
mod error;
mod identity;
pub mod redact;
#[cfg(feature = "reqwest")]
mod reqwest_backend;
mod retry;

pub use backend::{HttpBackend, HttpRequest, HttpResponse, Method, RequestId};
pub use client::{
    NearExpiryPolicy, RequestOptions, ResilientTransport, TransportConfig,
};
pub use error::{BackendError, TransportError};
pub use identity::{HttpIdentityProvider, IdentityEndpoints};
#[cfg(feature = "reqwest")]
pub use reqwest_backend::ReqwestBackend;
pub use retry::{RetryContext, RetryPolicy};
