pub mod alert;
pub mod console;
pub mod db;
pub mod notifier;
pub mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use alert::{
    commands::{
        add_emergency_contact, attach_alert_message, cancel_sos, get_alert_counts,
        get_alert_settings, get_alert_state, list_alert_history, send_sos_now,
        set_notify_via_sms, set_notify_witnesses, trigger_sos,
    },
    AlertController,
};
use console::{parse_command, ConsoleCommand, HELP};
use db::Database;
use notifier::LogNotifier;
use settings::SettingsStore;

const DEFAULT_DATA_DIR: &str = "tourguard-data";

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) alerts: AlertController,
    pub(crate) settings: SettingsStore,
}

fn data_dir() -> PathBuf {
    std::env::var_os("TOURGUARD_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Alerts still counting down belong to a process that died mid-countdown.
/// They are closed out as interrupted rather than resumed or sent.
async fn recover_interrupted_alerts(db: &Database) -> Result<usize> {
    let leftovers = db.get_counting_down_alerts().await?;
    let now = Utc::now();
    for alert in &leftovers {
        warn!(
            "Recovered unfinished alert {} ({}); marking as Interrupted",
            alert.id, alert.emergency_type
        );
        db.mark_alert_interrupted(&alert.id, now).await?;
    }
    Ok(leftovers.len())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!("Failed to render output: {err}"),
    }
}

async fn active_session_id(state: &AppState) -> Result<String, String> {
    get_alert_state(state)
        .await?
        .map(|session| session.id.to_string())
        .ok_or_else(|| "no alert is counting down".to_string())
}

/// Runs one console command. Returns `false` once the user asks to quit.
async fn handle_command(state: &AppState, command: ConsoleCommand) -> Result<bool, String> {
    match command {
        ConsoleCommand::Sos {
            emergency_type,
            message,
        } => print_json(&trigger_sos(state, emergency_type, message).await?),
        ConsoleCommand::Note(text) => {
            let session_id = active_session_id(state).await?;
            print_json(&attach_alert_message(state, session_id, text).await?);
        }
        ConsoleCommand::Cancel => {
            let session_id = active_session_id(state).await?;
            print_json(&cancel_sos(state, session_id).await?);
        }
        ConsoleCommand::Send => {
            let session_id = active_session_id(state).await?;
            print_json(&send_sos_now(state, session_id).await?);
        }
        ConsoleCommand::Status => match get_alert_state(state).await? {
            Some(session) => print_json(&session),
            None => println!("no alert is counting down"),
        },
        ConsoleCommand::History(limit) => print_json(&list_alert_history(state, limit).await?),
        ConsoleCommand::Stats => print_json(&get_alert_counts(state).await?),
        ConsoleCommand::Sms(enabled) => print_json(&set_notify_via_sms(state, enabled)?),
        ConsoleCommand::Witnesses(enabled) => {
            print_json(&set_notify_witnesses(state, enabled)?)
        }
        ConsoleCommand::AddContact(contact) => {
            print_json(&add_emergency_contact(state, contact)?.emergency_contacts)
        }
        ConsoleCommand::Contacts => {
            print_json(&get_alert_settings(state)?.emergency_contacts)
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn run_console(state: AppState) -> Result<()> {
    let mut events = state.alerts.subscribe();
    let event_printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{json}"),
                    Err(err) => warn!("Failed to render event: {err}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event printer skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match handle_command(&state, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => eprintln!("{err}"),
        }
    }

    if let Some(session) = state.alerts.active_session().await {
        warn!(
            "Exiting with alert {} still counting down; it will be marked Interrupted on next start",
            session.id
        );
    }
    event_printer.abort();
    Ok(())
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("TourGuard starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(start(data_dir()))
}

async fn start(data_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("tourguard.sqlite3"))?;
    let recovered = recover_interrupted_alerts(&database).await?;
    if recovered > 0 {
        info!("Closed {recovered} interrupted alert(s) from a previous run");
    }

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let alerts = AlertController::new(Arc::new(LogNotifier), database.clone());

    run_console(AppState {
        db: database,
        alerts,
        settings,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alert::{AlertOptions, AlertSession, EmergencyType},
        db::{AlertRecord, AlertRecordStatus},
    };

    #[tokio::test]
    async fn recovery_marks_leftover_countdowns_interrupted() {
        let db = Database::open_in_memory().unwrap();
        let session = AlertSession::begin(
            uuid::Uuid::new_v4(),
            EmergencyType::Security,
            AlertOptions::default(),
            Utc::now(),
        );
        db.insert_alert(&AlertRecord::from_session(&session, Utc::now()))
            .await
            .unwrap();

        assert_eq!(recover_interrupted_alerts(&db).await.unwrap(), 1);
        assert_eq!(recover_interrupted_alerts(&db).await.unwrap(), 0);

        let stored = db.get_alert(&session.id.to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertRecordStatus::Interrupted);
    }

    #[tokio::test]
    async fn console_commands_drive_the_running_alert() {
        let db = Database::open_in_memory().unwrap();
        let alerts = AlertController::with_clock(
            Arc::new(notifier::testing::RecordingNotifier::default()),
            db.clone(),
            Arc::new(alert::ManualClock::new()),
        );
        let dir = std::env::temp_dir().join(format!("tourguard-lib-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let state = AppState {
            db,
            alerts,
            settings: SettingsStore::new(dir.join("settings.json")).unwrap(),
        };

        assert!(handle_command(&state, ConsoleCommand::Cancel).await.is_err());
        let sos = parse_command("sos security followed since the station")
            .unwrap()
            .unwrap();
        assert!(handle_command(&state, sos).await.unwrap());
        let running = state.alerts.active_session().await.unwrap();
        assert_eq!(running.message.as_deref(), Some("followed since the station"));

        assert!(handle_command(&state, ConsoleCommand::Cancel).await.unwrap());
        assert!(state.alerts.active_session().await.is_none());
        assert!(!handle_command(&state, ConsoleCommand::Quit).await.unwrap());
    }
}
