//! Alerting System
//!
//! Matches inbound monitoring events against tenant rules, derives a dedup
//! key for "the same underlying problem", and drives alert instances through
//! open -> ack -> resolved while appending an immutable event trail.
//!
//! Uniqueness of the active instance per (tenant, dedup key) is the store's
//! job; [`AlertManager`] treats a lost race as a refresh.

mod event;
mod manager;
mod model;
mod notify;
mod rules;
mod store;
mod template;

pub use event::{EventStatus, InboundEvent, NormalizedEvent};
pub use manager::{AlertConfig, AlertManager, AlertOutcome};
pub use model::{
    AlertEvent, AlertInstance, AlertRule, AlertStatus, EventKind, Matcher, NewAlert, NewRule,
    Severity, DEFAULT_DEDUPE_TEMPLATE,
};
pub use notify::{ChannelSink, Notification, NotificationSink};
pub use rules::select_rule;
pub use store::{AlertStore, InstanceRef, MemoryAlertStore, OpenOutcome, Transition};
pub use template::render_dedupe_key;

use thiserror::Error;

/// Alerting errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Alert {0} not found")]
    NotFound(i64),
    #[error("Alert {id} is {status}; cannot {action}")]
    InvalidTransition {
        id: i64,
        status: AlertStatus,
        action: &'static str,
    },
    #[error("Gave up opening alert {0} after repeated conflicts")]
    Contention(String),
    #[error("Store error: {0}")]
    Store(String),
}
