use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::{
    alert::{DispatchTrigger, EmergencyType},
    db::models::{AlertRecordStatus, DeliveryStatus},
};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<AlertRecordStatus> {
    match value {
        "CountingDown" => Ok(AlertRecordStatus::CountingDown),
        "Dispatched" => Ok(AlertRecordStatus::Dispatched),
        "Cancelled" => Ok(AlertRecordStatus::Cancelled),
        "Interrupted" => Ok(AlertRecordStatus::Interrupted),
        other => Err(anyhow!("unknown alert status {other}")),
    }
}

pub fn parse_delivery_status(value: &str) -> Result<DeliveryStatus> {
    match value {
        "Pending" => Ok(DeliveryStatus::Pending),
        "Delivered" => Ok(DeliveryStatus::Delivered),
        "Failed" => Ok(DeliveryStatus::Failed),
        other => Err(anyhow!("unknown delivery status {other}")),
    }
}

pub fn parse_trigger(value: &str) -> Result<DispatchTrigger> {
    match value {
        "Countdown" => Ok(DispatchTrigger::Countdown),
        "SendNow" => Ok(DispatchTrigger::SendNow),
        other => Err(anyhow!("unknown dispatch trigger {other}")),
    }
}

pub fn parse_emergency_type(value: &str) -> Result<EmergencyType> {
    value
        .parse::<EmergencyType>()
        .map_err(|err| anyhow!("stored emergency type: {err}"))
}
