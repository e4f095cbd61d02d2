use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, error, info, log, warn, Level};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{AlertRecord, Database, DeliveryStatus},
    notifier::{DispatchNotifier, DispatchRequest},
    settings::{AlertSettings, EmergencyContact},
};

use super::{
    clock::{Clock, IntervalClock},
    error::{AlertError, AlertResult},
    events::AlertEvent,
    state::{AlertSession, EmergencyType, SessionId, TickOutcome},
};

const EVENT_CAPACITY: usize = 64;

struct TrackedAlert {
    session: AlertSession,
    contacts: Vec<EmergencyContact>,
    witness_radius_m: u32,
}

impl TrackedAlert {
    fn dispatch_request(&self) -> DispatchRequest {
        DispatchRequest::for_session(&self.session, &self.contacts, self.witness_radius_m)
    }
}

#[derive(Default)]
struct ControllerState {
    active: Option<SessionId>,
    alerts: HashMap<SessionId, TrackedAlert>,
}

impl ControllerState {
    fn tracked_mut(&mut self, session_id: SessionId) -> AlertResult<&mut TrackedAlert> {
        self.alerts
            .get_mut(&session_id)
            .ok_or(AlertError::SessionNotFound(session_id))
    }
}

/// The one timer a counting-down alert owns.
struct TickerHandle {
    session_id: SessionId,
    token: CancellationToken,
    _task: JoinHandle<()>,
}

/// Owns the countdown-to-dispatch flow for a single user: at most one alert
/// counts down at a time, and each alert reaches the notifier at most once.
#[derive(Clone)]
pub struct AlertController {
    state: Arc<Mutex<ControllerState>>,
    ticker: Arc<Mutex<Option<TickerHandle>>>,
    notifier: Arc<dyn DispatchNotifier>,
    clock: Arc<dyn Clock>,
    db: Database,
    events: broadcast::Sender<AlertEvent>,
    tick_interval: Duration,
    tick_log_level: Level,
}

impl AlertController {
    pub fn new(notifier: Arc<dyn DispatchNotifier>, db: Database) -> Self {
        Self::with_clock(notifier, db, Arc::new(IntervalClock))
    }

    pub fn with_clock(
        notifier: Arc<dyn DispatchNotifier>,
        db: Database,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let debug_mode = std::env::var("TOURGUARD_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(ControllerState::default())),
            ticker: Arc::new(Mutex::new(None)),
            notifier,
            clock,
            db,
            events,
            tick_interval: Duration::from_secs(1),
            tick_log_level: if debug_mode { Level::Info } else { Level::Debug },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub async fn active_session(&self) -> Option<AlertSession> {
        let guard = self.state.lock().await;
        guard
            .active
            .and_then(|id| guard.alerts.get(&id))
            .map(|tracked| tracked.session.clone())
    }

    pub async fn session(&self, session_id: SessionId) -> AlertResult<AlertSession> {
        let guard = self.state.lock().await;
        guard
            .alerts
            .get(&session_id)
            .map(|tracked| tracked.session.clone())
            .ok_or(AlertError::SessionNotFound(session_id))
    }

    pub async fn start(
        &self,
        emergency_type: &str,
        config: &AlertSettings,
    ) -> AlertResult<AlertSession> {
        let emergency_type: EmergencyType = emergency_type.parse()?;

        let mut guard = self.state.lock().await;
        if let Some(active_id) = guard.active {
            return Err(AlertError::AlreadyActive(active_id));
        }

        let now = Utc::now();
        let session = AlertSession::begin(Uuid::new_v4(), emergency_type, config.options(), now);
        let session_id = session.id;

        if let Err(err) = self
            .db
            .insert_alert(&AlertRecord::from_session(&session, now))
            .await
        {
            error!("Failed to record alert {session_id} in history: {err:#}");
        }

        guard.alerts.insert(
            session_id,
            TrackedAlert {
                session: session.clone(),
                contacts: config.emergency_contacts.clone(),
                witness_radius_m: config.witness_radius_m,
            },
        );
        guard.active = Some(session_id);
        self.spawn_ticker(session_id).await;
        drop(guard);

        info!(
            "Alert {session_id} ({emergency_type}) counting down from {}s",
            session.seconds_remaining
        );
        self.emit(AlertEvent::AlertStateChanged {
            session: session.clone(),
        });

        Ok(session)
    }

    /// Advances one second. Driven by the ticker task; a tick that arrives
    /// after the alert left the countdown is rejected and has no effect.
    pub(crate) async fn tick(&self, session_id: SessionId) -> AlertResult<TickOutcome> {
        let mut guard = self.state.lock().await;
        let tracked = guard.tracked_mut(session_id)?;
        let outcome = tracked.session.tick(Utc::now())?;

        match outcome {
            TickOutcome::Continue { seconds_remaining } => {
                drop(guard);
                log!(
                    self.tick_log_level,
                    "Alert {session_id}: {seconds_remaining}s remaining"
                );
                self.emit(AlertEvent::AlertTick {
                    session_id,
                    seconds_remaining,
                });
            }
            TickOutcome::Dispatched => {
                let session = tracked.session.clone();
                let request = tracked.dispatch_request();
                guard.active = None;
                self.release_ticker(session_id).await;
                self.persist(&session).await;
                drop(guard);

                info!("Alert {session_id} countdown reached zero; dispatching");
                self.emit(AlertEvent::AlertTick {
                    session_id,
                    seconds_remaining: 0,
                });
                self.emit(AlertEvent::AlertStateChanged { session });
                self.deliver(request);
            }
        }

        Ok(outcome)
    }

    pub async fn cancel(&self, session_id: SessionId) -> AlertResult<AlertSession> {
        let mut guard = self.state.lock().await;
        let tracked = guard.tracked_mut(session_id)?;
        tracked.session.cancel(Utc::now())?;
        let session = tracked.session.clone();
        guard.active = None;
        self.release_ticker(session_id).await;
        self.persist(&session).await;
        drop(guard);

        info!(
            "Alert {session_id} cancelled by user with {}s remaining",
            session.seconds_remaining
        );
        self.emit(AlertEvent::AlertStateChanged {
            session: session.clone(),
        });
        Ok(session)
    }

    /// "Send Now": dispatches immediately whatever the countdown shows.
    pub async fn dispatch_now(&self, session_id: SessionId) -> AlertResult<AlertSession> {
        let mut guard = self.state.lock().await;
        let tracked = guard.tracked_mut(session_id)?;
        tracked.session.dispatch_now(Utc::now())?;
        let session = tracked.session.clone();
        let request = tracked.dispatch_request();
        guard.active = None;
        self.release_ticker(session_id).await;
        self.persist(&session).await;
        drop(guard);

        info!(
            "Alert {session_id} sent by user with {}s remaining",
            session.seconds_remaining
        );
        self.emit(AlertEvent::AlertStateChanged {
            session: session.clone(),
        });
        self.deliver(request);
        Ok(session)
    }

    pub async fn attach_message(
        &self,
        session_id: SessionId,
        message: Option<String>,
    ) -> AlertResult<AlertSession> {
        let mut guard = self.state.lock().await;
        let tracked = guard.tracked_mut(session_id)?;
        tracked.session.attach_message(message)?;
        let session = tracked.session.clone();
        drop(guard);

        self.emit(AlertEvent::AlertStateChanged {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Callers hold the state lock, so a new countdown cannot claim the slot
    /// in between.
    async fn spawn_ticker(&self, session_id: SessionId) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(stale) = ticker_guard.take() {
            warn!("Replacing stale ticker for alert {}", stale.session_id);
            stale.token.cancel();
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut ticks = self.clock.ticker(self.tick_interval);
        let controller = self.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {}
                }

                match controller.tick(session_id).await {
                    Ok(TickOutcome::Continue { .. }) => {}
                    Ok(TickOutcome::Dispatched) => break,
                    Err(err) => {
                        debug!("Discarding tick for alert {session_id}: {err}");
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(TickerHandle {
            session_id,
            token,
            _task: task,
        });
    }

    /// Stops the ticker owned by `session_id`; never touches another alert's.
    async fn release_ticker(&self, session_id: SessionId) {
        let mut ticker_guard = self.ticker.lock().await;
        if ticker_guard
            .as_ref()
            .is_some_and(|ticker| ticker.session_id == session_id)
        {
            if let Some(ticker) = ticker_guard.take() {
                ticker.token.cancel();
            }
        }
    }

    async fn persist(&self, session: &AlertSession) {
        let record = AlertRecord::from_session(session, Utc::now());
        if let Err(err) = self.db.update_alert_state(&record).await {
            error!("Failed to update alert {} in history: {err:#}", session.id);
        }
    }

    /// Fire-and-forget: the session is already dispatched, the outcome is
    /// only recorded and announced.
    fn deliver(&self, request: DispatchRequest) {
        let notifier = self.notifier.clone();
        let db = self.db.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let session_id = request.session_id;
            let alert_id = session_id.to_string();

            let event = match notifier.notify(&request).await {
                Ok(report) => {
                    info!(
                        "Alert {session_id} delivered: {} SMS, witnesses alerted: {}",
                        report.sms_sent, report.witnesses_alerted
                    );
                    if let Err(err) = db
                        .record_delivery(&alert_id, DeliveryStatus::Delivered, None, Utc::now())
                        .await
                    {
                        error!("Failed to record delivery of alert {session_id}: {err:#}");
                    }
                    AlertEvent::DeliveryCompleted { session_id, report }
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    let failure = AlertError::DeliveryFailure {
                        session_id,
                        reason: reason.clone(),
                    };
                    warn!("{failure}");
                    if let Err(db_err) = db
                        .record_delivery(
                            &alert_id,
                            DeliveryStatus::Failed,
                            Some(reason),
                            Utc::now(),
                        )
                        .await
                    {
                        error!("Failed to record delivery failure of alert {session_id}: {db_err:#}");
                    }
                    AlertEvent::DeliveryFailed {
                        session_id,
                        error: failure.to_string(),
                    }
                }
            };

            let _ = events.send(event);
        });
    }

    fn emit(&self, event: AlertEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
