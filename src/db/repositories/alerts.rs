use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        parse_datetime, parse_delivery_status, parse_emergency_type, parse_optional_datetime,
        parse_status, parse_trigger, to_u32,
    },
    models::{AlertCounts, AlertRecord, AlertRecordStatus, DeliveryStatus},
};

const ALERT_COLUMNS: &str = "id, emergency_type, status, message, notify_sms, notify_witnesses,
     seconds_remaining, dispatch_trigger, delivery_status, delivery_error,
     started_at, ended_at, updated_at";

fn row_to_alert(row: &Row) -> Result<AlertRecord> {
    let emergency_type: String = row.get("emergency_type")?;
    let status: String = row.get("status")?;
    let seconds_remaining: i64 = row.get("seconds_remaining")?;
    let dispatch_trigger: Option<String> = row.get("dispatch_trigger")?;
    let delivery_status: Option<String> = row.get("delivery_status")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(AlertRecord {
        id: row.get("id")?,
        emergency_type: parse_emergency_type(&emergency_type)?,
        status: parse_status(&status)?,
        message: row.get("message")?,
        notify_sms: row.get("notify_sms")?,
        notify_witnesses: row.get("notify_witnesses")?,
        seconds_remaining: to_u32(seconds_remaining, "seconds_remaining")?,
        dispatch_trigger: dispatch_trigger.as_deref().map(parse_trigger).transpose()?,
        delivery_status: delivery_status
            .as_deref()
            .map(parse_delivery_status)
            .transpose()?,
        delivery_error: row.get("delivery_error")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO alerts (id, emergency_type, status, message, notify_sms, notify_witnesses,
                     seconds_remaining, dispatch_trigger, delivery_status, delivery_error,
                     started_at, ended_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    record.emergency_type.as_str(),
                    record.status.as_str(),
                    record.message,
                    record.notify_sms,
                    record.notify_witnesses,
                    record.seconds_remaining,
                    record.dispatch_trigger.map(|t| t.as_str()),
                    record.delivery_status.map(|s| s.as_str()),
                    record.delivery_error,
                    record.started_at.to_rfc3339(),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .context("failed to insert alert")?;
            Ok(())
        })
        .await
    }

    /// Writes the state-machine side of a record; delivery columns are only
    /// set when still empty so a fast notifier result is never overwritten.
    pub async fn update_alert_state(&self, alert: &AlertRecord) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE alerts
                 SET status = ?1,
                     message = ?2,
                     seconds_remaining = ?3,
                     dispatch_trigger = ?4,
                     delivery_status = COALESCE(delivery_status, ?5),
                     ended_at = ?6,
                     updated_at = ?7
                 WHERE id = ?8",
                params![
                    record.status.as_str(),
                    record.message,
                    record.seconds_remaining,
                    record.dispatch_trigger.map(|t| t.as_str()),
                    record.delivery_status.map(|s| s.as_str()),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.updated_at.to_rfc3339(),
                    record.id,
                ],
            )
            .context("failed to update alert")?;
            Ok(())
        })
        .await
    }

    pub async fn record_delivery(
        &self,
        alert_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let alert_id = alert_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE alerts
                 SET delivery_status = ?1,
                     delivery_error = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), error, updated_at.to_rfc3339(), alert_id],
            )
            .context("failed to record alert delivery")?;
            Ok(())
        })
        .await
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>> {
        let alert_id = alert_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![alert_id])?;
            let alert = match rows.next()? {
                Some(row) => Some(row_to_alert(row)?),
                None => None,
            };
            Ok(alert)
        })
        .await
    }

    pub async fn list_alerts(&self, limit: u32) -> Result<Vec<AlertRecord>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY started_at DESC, rowid DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![limit])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    pub async fn get_counting_down_alerts(&self) -> Result<Vec<AlertRecord>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = 'CountingDown' ORDER BY started_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    pub async fn mark_alert_interrupted(&self, alert_id: &str, now: DateTime<Utc>) -> Result<()> {
        let alert_id = alert_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE alerts
                 SET status = ?1,
                     ended_at = COALESCE(ended_at, ?2),
                     updated_at = ?2
                 WHERE id = ?3 AND status = 'CountingDown'",
                params![
                    AlertRecordStatus::Interrupted.as_str(),
                    now.to_rfc3339(),
                    alert_id
                ],
            )
            .context("failed to mark alert interrupted")?;
            Ok(())
        })
        .await
    }

    pub async fn alert_counts(&self) -> Result<AlertCounts> {
        self.execute(|conn| {
            let counts = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(status = 'CountingDown'), 0),
                            COALESCE(SUM(status = 'Dispatched'), 0),
                            COALESCE(SUM(status = 'Cancelled'), 0),
                            COALESCE(SUM(status = 'Interrupted'), 0),
                            COALESCE(SUM(delivery_status = 'Failed'), 0)
                     FROM alerts",
                    [],
                    |row| {
                        Ok(AlertCounts {
                            total: row.get::<_, i64>(0)? as u64,
                            counting_down: row.get::<_, i64>(1)? as u64,
                            dispatched: row.get::<_, i64>(2)? as u64,
                            cancelled: row.get::<_, i64>(3)? as u64,
                            interrupted: row.get::<_, i64>(4)? as u64,
                            delivery_failed: row.get::<_, i64>(5)? as u64,
                        })
                    },
                )
                .optional()?
                .unwrap_or_default();
            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::alert::{AlertOptions, AlertSession, EmergencyType};

    fn session(kind: EmergencyType, started_at: DateTime<Utc>) -> AlertSession {
        AlertSession::begin(Uuid::new_v4(), kind, AlertOptions::default(), started_at)
    }

    #[tokio::test]
    async fn insert_then_finish_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let mut alert = session(EmergencyType::Medical, Utc::now());
        db.insert_alert(&AlertRecord::from_session(&alert, Utc::now()))
            .await
            .unwrap();

        alert.attach_message(Some("fell on the stairs".into())).unwrap();
        alert.dispatch_now(Utc::now()).unwrap();
        db.update_alert_state(&AlertRecord::from_session(&alert, Utc::now()))
            .await
            .unwrap();

        let stored = db.get_alert(&alert.id.to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertRecordStatus::Dispatched);
        assert_eq!(stored.message.as_deref(), Some("fell on the stairs"));
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::Pending));
        assert_eq!(stored.seconds_remaining, 10);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn delivery_result_is_not_overwritten_by_late_state_write() {
        let db = Database::open_in_memory().unwrap();
        let mut alert = session(EmergencyType::Security, Utc::now());
        db.insert_alert(&AlertRecord::from_session(&alert, Utc::now()))
            .await
            .unwrap();
        alert.dispatch_now(Utc::now()).unwrap();

        let id = alert.id.to_string();
        db.record_delivery(&id, DeliveryStatus::Failed, Some("offline".into()), Utc::now())
            .await
            .unwrap();
        db.update_alert_state(&AlertRecord::from_session(&alert, Utc::now()))
            .await
            .unwrap();

        let stored = db.get_alert(&id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::Failed));
        assert_eq!(stored.delivery_error.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn lists_newest_first_and_counts_by_status() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();

        let mut cancelled = session(EmergencyType::Lost, base);
        db.insert_alert(&AlertRecord::from_session(&cancelled, base))
            .await
            .unwrap();
        cancelled.cancel(base).unwrap();
        db.update_alert_state(&AlertRecord::from_session(&cancelled, base))
            .await
            .unwrap();

        let pending = session(EmergencyType::Accident, base + Duration::seconds(30));
        db.insert_alert(&AlertRecord::from_session(&pending, base))
            .await
            .unwrap();

        let listed = db.list_alerts(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, pending.id.to_string());
        assert_eq!(db.list_alerts(1).await.unwrap().len(), 1);

        let counts = db.alert_counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.counting_down, 1);
        assert_eq!(counts.dispatched, 0);
    }

    #[tokio::test]
    async fn leftover_countdowns_can_be_interrupted() {
        let db = Database::open_in_memory().unwrap();
        let alert = session(EmergencyType::Medical, Utc::now());
        db.insert_alert(&AlertRecord::from_session(&alert, Utc::now()))
            .await
            .unwrap();

        let open = db.get_counting_down_alerts().await.unwrap();
        assert_eq!(open.len(), 1);

        db.mark_alert_interrupted(&open[0].id, Utc::now()).await.unwrap();
        assert!(db.get_counting_down_alerts().await.unwrap().is_empty());
        let stored = db.get_alert(&open[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertRecordStatus::Interrupted);
        assert_eq!(db.alert_counts().await.unwrap().interrupted, 1);
    }

    #[tokio::test]
    async fn empty_history_counts_zero() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.alert_counts().await.unwrap(), AlertCounts::default());
        assert!(db.get_alert("missing").await.unwrap().is_none());
    }
}
