//! Outbound Notifications
//!
//! The manager decides what to announce; delivery to chat or email happens
//! behind a [`NotificationSink`].

use crate::model::{AlertInstance, Severity};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub tenant_id: String,
    pub alert_id: i64,
    pub title: String,
    pub severity: Severity,
    pub details: String,
}

impl Notification {
    pub(crate) fn opened(instance: &AlertInstance, title: &str, details: &str) -> Self {
        Self {
            tenant_id: instance.tenant_id.clone(),
            alert_id: instance.id,
            title: format!("[{}] {}", instance.severity.as_str().to_uppercase(), title),
            severity: instance.severity,
            details: details.to_string(),
        }
    }

    pub(crate) fn resolved(instance: &AlertInstance, title: &str) -> Self {
        Self {
            tenant_id: instance.tenant_id.clone(),
            alert_id: instance.id,
            title: format!("[RESOLVED] {}", title),
            severity: instance.severity,
            details: format!("Alert {} ({}) resolved", instance.id, instance.dedupe_key),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Hands notifications to a background task over an unbounded channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            warn!("Notification for alert {} dropped: receiver closed", e.0.alert_id);
        }
    }
}
