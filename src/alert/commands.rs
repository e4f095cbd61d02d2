use uuid::Uuid;

use crate::{
    alert::{AlertController, AlertSession, SessionId},
    db::{AlertCounts, AlertRecord},
    settings::{AlertSettings, EmergencyContact},
    AppState,
};

const DEFAULT_HISTORY_LIMIT: u32 = 20;

fn controller_from_state(state: &AppState) -> AlertController {
    state.alerts.clone()
}

fn parse_session_id(session_id: &str) -> Result<SessionId, String> {
    Uuid::parse_str(session_id.trim()).map_err(|_| format!("'{session_id}' is not an alert id"))
}

pub async fn get_alert_state(state: &AppState) -> Result<Option<AlertSession>, String> {
    Ok(controller_from_state(state).active_session().await)
}

/// SOS button: starts the countdown with the saved notification settings.
pub async fn trigger_sos(
    state: &AppState,
    emergency_type: String,
    message: Option<String>,
) -> Result<AlertSession, String> {
    let controller = controller_from_state(state);
    let config = state.settings.alerts();
    let session = controller
        .start(&emergency_type, &config)
        .await
        .map_err(|e| e.to_string())?;

    match message {
        Some(message) => controller
            .attach_message(session.id, Some(message))
            .await
            .map_err(|e| e.to_string()),
        None => Ok(session),
    }
}

pub async fn attach_alert_message(
    state: &AppState,
    session_id: String,
    message: String,
) -> Result<AlertSession, String> {
    let session_id = parse_session_id(&session_id)?;
    controller_from_state(state)
        .attach_message(session_id, Some(message))
        .await
        .map_err(|e| e.to_string())
}

pub async fn cancel_sos(state: &AppState, session_id: String) -> Result<AlertSession, String> {
    let session_id = parse_session_id(&session_id)?;
    controller_from_state(state)
        .cancel(session_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn send_sos_now(state: &AppState, session_id: String) -> Result<AlertSession, String> {
    let session_id = parse_session_id(&session_id)?;
    controller_from_state(state)
        .dispatch_now(session_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn list_alert_history(
    state: &AppState,
    limit: Option<u32>,
) -> Result<Vec<AlertRecord>, String> {
    state
        .db
        .list_alerts(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_alert_counts(state: &AppState) -> Result<AlertCounts, String> {
    state.db.alert_counts().await.map_err(|e| e.to_string())
}

pub fn get_alert_settings(state: &AppState) -> Result<AlertSettings, String> {
    Ok(state.settings.alerts())
}

pub fn set_notify_via_sms(state: &AppState, enabled: bool) -> Result<AlertSettings, String> {
    let mut settings = state.settings.alerts();
    settings.notify_via_sms = enabled;
    update_alert_settings(state, settings)
}

pub fn set_notify_witnesses(state: &AppState, enabled: bool) -> Result<AlertSettings, String> {
    let mut settings = state.settings.alerts();
    settings.notify_witnesses = enabled;
    update_alert_settings(state, settings)
}

pub fn update_alert_settings(
    state: &AppState,
    settings: AlertSettings,
) -> Result<AlertSettings, String> {
    state
        .settings
        .update_alerts(settings)
        .map_err(|e| e.to_string())?;
    Ok(state.settings.alerts())
}

pub fn add_emergency_contact(
    state: &AppState,
    contact: EmergencyContact,
) -> Result<AlertSettings, String> {
    state
        .settings
        .add_contact(contact)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        alert::{AlertStatus, ManualClock},
        db::Database,
        notifier::testing::RecordingNotifier,
        settings::SettingsStore,
    };

    fn app_state() -> (AppState, Arc<RecordingNotifier>) {
        let db = Database::open_in_memory().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let alerts = AlertController::with_clock(
            notifier.clone(),
            db.clone(),
            Arc::new(ManualClock::new()),
        );
        let dir = std::env::temp_dir().join(format!("tourguard-commands-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let settings = SettingsStore::new(dir.join("settings.json")).unwrap();
        (
            AppState {
                db,
                alerts,
                settings,
            },
            notifier,
        )
    }

    #[tokio::test]
    async fn trigger_uses_saved_flags_and_message() {
        let (state, _) = app_state();
        set_notify_witnesses(&state, false).unwrap();

        let session = trigger_sos(&state, "Medical".into(), Some("chest pain".into()))
            .await
            .unwrap();
        assert_eq!(session.status, AlertStatus::CountingDown);
        assert!(session.options.notify_via_sms);
        assert!(!session.options.notify_witnesses);
        assert_eq!(session.message.as_deref(), Some("chest pain"));

        let active = get_alert_state(&state).await.unwrap().unwrap();
        assert_eq!(active.id, session.id);
    }

    #[tokio::test]
    async fn errors_are_reported_as_text() {
        let (state, notifier) = app_state();
        let err = trigger_sos(&state, String::new(), None).await.unwrap_err();
        assert!(err.contains("select an emergency type"));

        assert!(cancel_sos(&state, "not-an-id".into()).await.is_err());

        let session = trigger_sos(&state, "lost".into(), None).await.unwrap();
        cancel_sos(&state, session.id.to_string()).await.unwrap();
        let err = send_sos_now(&state, session.id.to_string())
            .await
            .unwrap_err();
        assert!(err.contains("Cancelled"));
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn history_and_counts_follow_alerts() {
        let (state, _) = app_state();
        let first = trigger_sos(&state, "security".into(), None).await.unwrap();
        cancel_sos(&state, first.id.to_string()).await.unwrap();
        let second = trigger_sos(&state, "accident".into(), None).await.unwrap();
        send_sos_now(&state, second.id.to_string()).await.unwrap();

        let history = list_alert_history(&state, None).await.unwrap();
        assert_eq!(history.len(), 2);
        let counts = get_alert_counts(&state).await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.dispatched, 1);
    }

    #[tokio::test]
    async fn contacts_are_validated() {
        let (state, _) = app_state();
        let added = add_emergency_contact(
            &state,
            EmergencyContact {
                name: "John Doe".into(),
                relation: "Brother".into(),
                phone: "+1 234 567 8900".into(),
            },
        )
        .unwrap();
        assert_eq!(added.emergency_contacts.len(), 1);

        let rejected = add_emergency_contact(
            &state,
            EmergencyContact {
                name: " ".into(),
                relation: "Friend".into(),
                phone: "555 0100".into(),
            },
        );
        assert!(rejected.is_err());
        assert_eq!(get_alert_settings(&state).unwrap().emergency_contacts.len(), 1);
    }
}
