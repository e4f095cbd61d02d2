use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::error::AlertError;

/// Length of the countdown before an alert goes out on its own.
pub const COUNTDOWN_SECS: u32 = 10;

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EmergencyType {
    Medical,
    Security,
    Accident,
    Lost,
}

impl EmergencyType {
    pub const ALL: [EmergencyType; 4] = [
        EmergencyType::Medical,
        EmergencyType::Security,
        EmergencyType::Accident,
        EmergencyType::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyType::Medical => "medical",
            EmergencyType::Security => "security",
            EmergencyType::Accident => "accident",
            EmergencyType::Lost => "lost",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            EmergencyType::Medical => "Medical",
            EmergencyType::Security => "Security",
            EmergencyType::Accident => "Accident",
            EmergencyType::Lost => "Lost",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            EmergencyType::Medical => "Health emergency",
            EmergencyType::Security => "Threat or danger",
            EmergencyType::Accident => "Traffic or injury",
            EmergencyType::Lost => "Need assistance",
        }
    }

    /// Local emergency line quoted in the outgoing alert text.
    pub fn hotline(&self) -> &'static str {
        match self {
            EmergencyType::Medical => "108",
            EmergencyType::Security => "100",
            EmergencyType::Accident | EmergencyType::Lost => "112",
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmergencyType {
    type Err = AlertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AlertError::InvalidInput(
                "select an emergency type first".into(),
            ));
        }

        EmergencyType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                AlertError::InvalidInput(format!("unknown emergency type '{trimmed}'"))
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AlertStatus {
    #[default]
    Idle,
    CountingDown,
    Dispatched,
    Cancelled,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Dispatched | AlertStatus::Cancelled)
    }
}

/// Which path sent the alert out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DispatchTrigger {
    Countdown,
    SendNow,
}

impl DispatchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchTrigger::Countdown => "Countdown",
            DispatchTrigger::SendNow => "SendNow",
        }
    }
}

/// Notification channels, captured once when the countdown starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertOptions {
    pub notify_via_sms: bool,
    pub notify_witnesses: bool,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            notify_via_sms: true,
            notify_witnesses: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue { seconds_remaining: u32 },
    Dispatched,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertSession {
    pub id: SessionId,
    pub emergency_type: EmergencyType,
    pub status: AlertStatus,
    pub seconds_remaining: u32,
    pub message: Option<String>,
    pub options: AlertOptions,
    pub dispatch_trigger: Option<DispatchTrigger>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AlertSession {
    pub fn begin(
        id: SessionId,
        emergency_type: EmergencyType,
        options: AlertOptions,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            emergency_type,
            status: AlertStatus::CountingDown,
            seconds_remaining: COUNTDOWN_SECS,
            message: None,
            options,
            dispatch_trigger: None,
            started_at,
            ended_at: None,
        }
    }

    pub fn is_counting_down(&self) -> bool {
        self.status == AlertStatus::CountingDown
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, AlertError> {
        self.ensure_counting_down("tick")?;

        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining == 0 {
            self.finish(AlertStatus::Dispatched, Some(DispatchTrigger::Countdown), now);
            return Ok(TickOutcome::Dispatched);
        }

        Ok(TickOutcome::Continue {
            seconds_remaining: self.seconds_remaining,
        })
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), AlertError> {
        self.ensure_counting_down("cancel")?;
        self.finish(AlertStatus::Cancelled, None, now);
        Ok(())
    }

    /// "Send Now": dispatch without waiting for the countdown. The remaining
    /// seconds are left as they were so history shows when the user pressed it.
    pub fn dispatch_now(&mut self, now: DateTime<Utc>) -> Result<(), AlertError> {
        self.ensure_counting_down("send")?;
        self.finish(AlertStatus::Dispatched, Some(DispatchTrigger::SendNow), now);
        Ok(())
    }

    pub fn attach_message(&mut self, message: Option<String>) -> Result<(), AlertError> {
        self.ensure_counting_down("attach a message to")?;
        self.message = message
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        Ok(())
    }

    fn finish(
        &mut self,
        status: AlertStatus,
        trigger: Option<DispatchTrigger>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.dispatch_trigger = trigger;
        self.ended_at = Some(now);
    }

    fn ensure_counting_down(&self, action: &str) -> Result<(), AlertError> {
        if self.status != AlertStatus::CountingDown {
            return Err(AlertError::InvalidState {
                session_id: self.id,
                status: self.status,
                action: action.to_string(),
            });
        }
        Ok(())
    }
}
