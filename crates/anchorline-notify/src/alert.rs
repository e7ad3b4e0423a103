//! Transient user-facing alerts.

use crate::{NotificationEnvelope, Severity};

/// Shows a short-lived alert for an incoming notification.
///
/// The product UI plugs in its toast implementation. Called after
/// history and listeners, on the channel's task; implementations must
/// not block.
pub trait AlertSink: Send + Sync + 'static {
    fn alert(&self, notification: &NotificationEnvelope);
}

/// Default sink: one `tracing` event per notification, at a level
/// matching its severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, n: &NotificationEnvelope) {
        let title = n.title.as_deref().unwrap_or_default();
        match n.severity {
            Severity::Error => tracing::error!(
                id = %n.id, category = %n.category, title, message = %n.message,
                "notification"
            ),
            Severity::Warning => tracing::warn!(
                id = %n.id, category = %n.category, title, message = %n.message,
                "notification"
            ),
            Severity::Info | Severity::Success => tracing::info!(
                id = %n.id, category = %n.category, severity = %n.severity, title,
                message = %n.message, "notification"
            ),
        }
    }
}

impl<F> AlertSink for F
where
    F: Fn(&NotificationEnvelope) + Send + Sync + 'static,
{
    fn alert(&self, notification: &NotificationEnvelope) {
        self(notification)
    }
}
