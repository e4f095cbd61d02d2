use serde::Serialize;

use crate::notifier::DeliveryReport;

use super::state::{AlertSession, SessionId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AlertEvent {
    #[serde(rename_all = "camelCase")]
    AlertStateChanged { session: AlertSession },
    #[serde(rename_all = "camelCase")]
    AlertTick {
        session_id: SessionId,
        seconds_remaining: u32,
    },
    #[serde(rename_all = "camelCase")]
    DeliveryCompleted {
        session_id: SessionId,
        report: DeliveryReport,
    },
    #[serde(rename_all = "camelCase")]
    DeliveryFailed { session_id: SessionId, error: String },
}

impl AlertEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            AlertEvent::AlertStateChanged { session } => session.id,
            AlertEvent::AlertTick { session_id, .. }
            | AlertEvent::DeliveryCompleted { session_id, .. }
            | AlertEvent::DeliveryFailed { session_id, .. } => *session_id,
        }
    }

    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            AlertEvent::DeliveryCompleted { .. } | AlertEvent::DeliveryFailed { .. }
        )
    }
}
