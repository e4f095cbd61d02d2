use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{info, warn};

use super::{DeliveryReport, DispatchNotifier, DispatchRequest};

/// Host notifier that writes the outgoing alert to the log instead of a
/// telephony or push backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl DispatchNotifier for LogNotifier {
    async fn notify(&self, request: &DispatchRequest) -> Result<DeliveryReport> {
        let sms_requested = request.options.notify_via_sms;
        let witnesses = request.options.notify_witnesses;

        if sms_requested && request.contacts.is_empty() {
            warn!(
                "SMS requested for alert {} but no emergency contacts are configured",
                request.session_id
            );
        }
        if request.contacts.is_empty() && !witnesses {
            bail!("no delivery channel available: add an emergency contact or enable witness alerts");
        }

        for contact in &request.contacts {
            info!(
                "SMS to {} ({}) at {}: {}",
                contact.name, contact.relation, contact.phone, request.text
            );
        }

        if witnesses {
            info!(
                "Witness broadcast within {}m for alert {}: {}",
                request.witness_radius_m, request.session_id, request.text
            );
        }

        Ok(DeliveryReport {
            sms_sent: request.contacts.len(),
            witnesses_alerted: witnesses,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        alert::{AlertOptions, AlertSession, EmergencyType},
        settings::EmergencyContact,
    };

    fn request(options: AlertOptions, contacts: &[EmergencyContact]) -> DispatchRequest {
        let session =
            AlertSession::begin(Uuid::new_v4(), EmergencyType::Accident, options, Utc::now());
        DispatchRequest::for_session(&session, contacts, 500)
    }

    #[tokio::test]
    async fn reports_sms_and_witness_delivery() {
        let contacts = [EmergencyContact {
            name: "John Doe".into(),
            relation: "Brother".into(),
            phone: "+1 234 567 8900".into(),
        }];
        let report = LogNotifier
            .notify(&request(AlertOptions::default(), &contacts))
            .await
            .unwrap();
        assert_eq!(
            report,
            DeliveryReport {
                sms_sent: 1,
                witnesses_alerted: true
            }
        );
    }

    #[tokio::test]
    async fn fails_when_nothing_can_be_delivered() {
        let options = AlertOptions {
            notify_via_sms: true,
            notify_witnesses: false,
        };
        assert!(LogNotifier.notify(&request(options, &[])).await.is_err());
    }
}
