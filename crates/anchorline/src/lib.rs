//! # Anchorline
//!
//! A client-side session and resilient communication stack.
//!
//! Anchorline keeps one authoritative session for the signed-in user,
//! sends every HTTP request through an interceptor pipeline that
//! attaches the credential, classifies failures and retries transient
//! ones, and holds a push channel for server notifications that follows
//! the session's lifecycle.
//!
//! ## Layers
//!
//! - [`token`]: credential decoding and expiry classification
//! - [`session`]: the session store, manager and client-local storage
//! - [`transport`]: the resilient HTTP transport and identity provider
//! - [`notify`]: the notification channel
//!
//! This crate wires them together ([`Client`]), loads configuration
//! from the environment ([`ClientConfig`]) and sets up logging
//! ([`init_tracing`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), anchorline::AnchorlineError> {
//! anchorline::init_tracing();
//!
//! let client = anchorline::Client::builder()
//!     .config(anchorline::ClientConfig::from_env()?)
//!     .build()
//!     .await?;
//!
//! client.notifications.add_listener(|n| println!("{}: {}", n.category, n.message));
//! client.session.login("ada@example.com", "hunter22").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod telemetry;

pub use anchorline_notify as notify;
pub use anchorline_session as session;
pub use anchorline_token as token;
pub use anchorline_transport as transport;

pub use client::{Client, ClientBuilder};
pub use config::{
    ClientConfig, ConfigError, ENV_BASE_URL, ENV_PUSH_URL, ENV_REQUEST_TIMEOUT_MS,
    ENV_RETRY_ATTEMPTS, ENV_RETRY_BASE_DELAY_MS, ENV_STORAGE_DIR,
};
pub use error::AnchorlineError;
pub use telemetry::init_tracing;

/// The types most callers need.
pub mod prelude {
    pub use crate::{AnchorlineError, Client, ClientConfig};
    pub use anchorline_notify::{NotificationEnvelope, Severity};
    pub use anchorline_session::{SessionError, SessionPhase, SessionState};
    pub use anchorline_token::Identity;
    pub use anchorline_transport::{Method, RequestOptions, TransportError};
}
