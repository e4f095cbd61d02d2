//! Persisted alert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertSession, AlertStatus, DispatchTrigger, EmergencyType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertRecordStatus {
    CountingDown,
    Dispatched,
    Cancelled,
    /// Still counting down when the process went away.
    Interrupted,
}

impl AlertRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertRecordStatus::CountingDown => "CountingDown",
            AlertRecordStatus::Dispatched => "Dispatched",
            AlertRecordStatus::Cancelled => "Cancelled",
            AlertRecordStatus::Interrupted => "Interrupted",
        }
    }
}

impl From<AlertStatus> for AlertRecordStatus {
    fn from(status: AlertStatus) -> Self {
        match status {
            AlertStatus::Idle | AlertStatus::CountingDown => AlertRecordStatus::CountingDown,
            AlertStatus::Dispatched => AlertRecordStatus::Dispatched,
            AlertStatus::Cancelled => AlertRecordStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub emergency_type: EmergencyType,
    pub status: AlertRecordStatus,
    pub message: Option<String>,
    pub notify_sms: bool,
    pub notify_witnesses: bool,
    pub seconds_remaining: u32,
    pub dispatch_trigger: Option<DispatchTrigger>,
    pub delivery_status: Option<DeliveryStatus>,
    pub delivery_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn from_session(session: &AlertSession, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: session.id.to_string(),
            emergency_type: session.emergency_type,
            status: session.status.into(),
            message: session.message.clone(),
            notify_sms: session.options.notify_via_sms,
            notify_witnesses: session.options.notify_witnesses,
            seconds_remaining: session.seconds_remaining,
            dispatch_trigger: session.dispatch_trigger,
            delivery_status: (session.status == AlertStatus::Dispatched)
                .then_some(DeliveryStatus::Pending),
            delivery_error: None,
            started_at: session.started_at,
            ended_at: session.ended_at,
            updated_at,
        }
    }
}

/// Per-status totals for the alerts dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertCounts {
    pub total: u64,
    pub counting_down: u64,
    pub dispatched: u64,
    pub cancelled: u64,
    pub interrupted: u64,
    pub delivery_failed: u64,
}
