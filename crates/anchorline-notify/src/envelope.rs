//! Notification envelopes and the push-channel wire frames.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// How loudly a notification should be surfaced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl Severity {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One notification, as delivered to listeners and kept in history.
///
/// On the wire `type` doubles as the severity when no explicit
/// `severity` is sent and its value is a severity name, and `timestamp`
/// may be epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireEnvelope")]
pub struct NotificationEnvelope {
    /// Unique id. Used to de-duplicate replays after a reconnect.
    pub id: String,

    /// Free-form category (`"task_assigned"`, `"system"`, ...).
    pub category: String,

    pub severity: Severity,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub message: String,

    /// Milliseconds since the Unix epoch. Stamped on arrival if the
    /// server left it out.
    pub timestamp: i64,

    pub read: bool,

    /// Opaque payload linking the notification to a resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default)]
    id: String,
    #[serde(default = "default_category", alias = "type")]
    category: String,
    #[serde(default, alias = "priority")]
    severity: Option<Severity>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: i64,
    #[serde(default)]
    read: bool,
    #[serde(default, alias = "metadata")]
    correlation: Option<Value>,
}

impl From<WireEnvelope> for NotificationEnvelope {
    fn from(wire: WireEnvelope) -> Self {
        let severity = wire
            .severity
            .or_else(|| Severity::from_name(&wire.category))
            .unwrap_or_default();
        Self {
            id: wire.id,
            category: wire.category,
            severity,
            title: wire.title,
            message: wire.message,
            timestamp: wire.timestamp,
            read: wire.read,
            correlation: wire.correlation,
        }
    }
}

fn default_category() -> String {
    "general".to_owned()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

/// Epoch millis, a numeric string or RFC 3339, normalised to millis.
/// `null` reads as 0 so the channel stamps it on arrival.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireTimestamp>::deserialize(deserializer)? {
        None => Ok(0),
        Some(WireTimestamp::Millis(ms)) => Ok(ms),
        Some(WireTimestamp::Text(text)) => {
            if let Ok(ms) = text.parse::<i64>() {
                return Ok(ms);
            }
            DateTime::parse_from_rfc3339(&text)
                .map(|at| at.timestamp_millis())
                .map_err(|e| D::Error::custom(format!("invalid timestamp `{text}`: {e}")))
        }
    }
}

impl NotificationEnvelope {
    /// Builds an envelope stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            severity,
            title: None,
            message: message.into(),
            timestamp: now_millis(),
            read: false,
            correlation: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation: Value) -> Self {
        self.correlation = Some(correlation);
        self
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// A frame received on the push channel.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Notification(NotificationEnvelope),
    AuthAccepted,
    AuthRejected(String),
    /// Keep-alives and frame types this client does not handle.
    Ignored,
}

/// Parses one text frame.
///
/// Accepted shapes: a typed control frame (`{"type":"auth_ok"}`), a
/// wrapped notification (`{"type":"notification","data":{...}}`) or a
/// bare envelope object.
pub(crate) fn parse_frame(text: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value.get("type").and_then(Value::as_str);
    Ok(match kind {
        Some("auth_ok" | "auth_success" | "authenticated") => Inbound::AuthAccepted,
        Some("auth_error" | "auth_failed" | "unauthorized") => {
            let reason = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("authentication rejected");
            Inbound::AuthRejected(reason.to_owned())
        }
        Some("ping" | "pong" | "heartbeat") => Inbound::Ignored,
        Some("notification") => match value.get("data") {
            Some(data) => Inbound::Notification(serde_json::from_value(data.clone())?),
            None => Inbound::Notification(serde_json::from_value(value)?),
        },
        _ if value.get("message").is_some() => {
            Inbound::Notification(serde_json::from_value(value)?)
        }
        _ => Inbound::Ignored,
    })
}

/// The authentication frame sent first on every open.
pub(crate) fn auth_frame(token: &str) -> String {
    serde_json::json!({ "type": "auth", "token": token }).to_string()
}
