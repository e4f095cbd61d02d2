mod log_notifier;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    alert::{AlertOptions, AlertSession, EmergencyType, SessionId},
    settings::EmergencyContact,
};

pub use log_notifier::LogNotifier;

/// Everything the outside world needs to deliver one alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub session_id: SessionId,
    pub emergency_type: EmergencyType,
    pub message: Option<String>,
    pub options: AlertOptions,
    /// Empty unless SMS is enabled.
    pub contacts: Vec<EmergencyContact>,
    pub witness_radius_m: u32,
    pub text: String,
}

impl DispatchRequest {
    pub fn for_session(
        session: &AlertSession,
        contacts: &[EmergencyContact],
        witness_radius_m: u32,
    ) -> Self {
        let contacts = if session.options.notify_via_sms {
            contacts.to_vec()
        } else {
            Vec::new()
        };

        Self {
            session_id: session.id,
            emergency_type: session.emergency_type,
            message: session.message.clone(),
            options: session.options,
            contacts,
            witness_radius_m,
            text: compose_alert_text(session.emergency_type, session.message.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub sms_sent: usize,
    pub witnesses_alerted: bool,
}

/// Delivers a dispatched alert. Invoked at most once per session; the result
/// is informational and never changes the session state.
#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    async fn notify(&self, request: &DispatchRequest) -> Result<DeliveryReport>;
}

pub fn compose_alert_text(kind: EmergencyType, message: Option<&str>) -> String {
    let mut text = format!(
        "SOS: {} emergency ({}). Local emergency line: {}.",
        kind.title(),
        kind.subtitle().to_lowercase(),
        kind.hotline()
    );
    if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
        text.push_str(" Details: ");
        text.push_str(message);
    }
    text
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;

    /// Records every request; optionally fails delivery.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub calls: Mutex<Vec<DispatchRequest>>,
        pub fail_with: Option<String>,
    }

    impl RecordingNotifier {
        pub fn failing(reason: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_with: Some(reason.to_string()),
            }
        }

        pub fn calls(&self) -> Vec<DispatchRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DispatchNotifier for RecordingNotifier {
        async fn notify(&self, request: &DispatchRequest) -> Result<DeliveryReport> {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(reason) = &self.fail_with {
                bail!("{reason}");
            }
            Ok(DeliveryReport {
                sms_sent: request.contacts.len(),
                witnesses_alerted: request.options.notify_witnesses,
            })
        }
    }
}
