//! Server push notifications for Anchorline clients.
//!
//! A [`NotificationChannel`] keeps one push connection open for the
//! signed-in user, authenticates it with the session credential,
//! reconnects with bounded linear backoff and fans incoming
//! [`NotificationEnvelope`]s out to listeners and an [`AlertSink`].
//!
//! # Key types
//!
//! - [`NotificationChannel`]: connection lifecycle, history, listeners
//! - [`Connector`] / [`PushConnection`]: the transport seam; the
//!   `websocket` feature provides [`WebSocketConnector`]
//! - [`History`]: bounded, de-duplicated, persisted notification list
//! - [`AlertSink`]: where transient alerts go ([`TracingAlertSink`] by
//!   default)

mod alert;
mod channel;
mod connector;
mod envelope;
mod error;
mod history;

pub use alert::{AlertSink, TracingAlertSink};
pub use channel::{ChannelConfig, ConnectionState, ListenerHandle, NotificationChannel};
pub use connector::{Connector, PushConnection};
#[cfg(feature = "websocket")]
pub use connector::{WebSocketConnection, WebSocketConnector};
pub use envelope::{NotificationEnvelope, Severity};
pub use error::NotifyError;
pub use history::History;
