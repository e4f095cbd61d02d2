use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::alert::AlertOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub relation: String,
    pub phone: String,
}

impl EmergencyContact {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("contact name is required");
        }
        let digits = self.phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < 3 {
            bail!("'{}' is not a phone number", self.phone);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    pub notify_via_sms: bool,
    pub notify_witnesses: bool,
    pub witness_radius_m: u32,
    pub emergency_contacts: Vec<EmergencyContact>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            notify_via_sms: true,
            notify_witnesses: true,
            witness_radius_m: 500,
            emergency_contacts: Vec::new(),
        }
    }
}

impl AlertSettings {
    pub fn options(&self) -> AlertOptions {
        AlertOptions {
            notify_via_sms: self.notify_via_sms,
            notify_witnesses: self.notify_witnesses,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    alerts: AlertSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn alerts(&self) -> AlertSettings {
        self.read().alerts.clone()
    }

    pub fn update_alerts(&self, settings: AlertSettings) -> Result<()> {
        for contact in &settings.emergency_contacts {
            contact.validate()?;
        }
        let mut guard = self.write();
        guard.alerts = settings;
        self.persist(&guard)
    }

    pub fn add_contact(&self, contact: EmergencyContact) -> Result<AlertSettings> {
        contact.validate()?;
        let mut guard = self.write();
        guard.alerts.emergency_contacts.push(contact);
        self.persist(&guard)?;
        Ok(guard.alerts.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tourguard-settings-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn contact() -> EmergencyContact {
        EmergencyContact {
            name: "John Doe".into(),
            relation: "Brother".into(),
            phone: "+1 234 567 8900".into(),
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let store = SettingsStore::new(scratch_path("settings.json")).unwrap();
        let alerts = store.alerts();
        assert_eq!(alerts, AlertSettings::default());
        assert_eq!(alerts.options(), AlertOptions::default());
    }

    #[test]
    fn updates_survive_reopen() {
        let path = scratch_path("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut alerts = store.alerts();
        alerts.notify_witnesses = false;
        store.update_alerts(alerts).unwrap();
        store.add_contact(contact()).unwrap();

        let reopened = SettingsStore::new(path).unwrap().alerts();
        assert!(!reopened.notify_witnesses);
        assert!(reopened.notify_via_sms);
        assert_eq!(reopened.emergency_contacts, vec![contact()]);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch_path("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.alerts(), AlertSettings::default());
    }

    #[test]
    fn rejects_contact_without_phone_number() {
        let store = SettingsStore::new(scratch_path("settings.json")).unwrap();
        let mut bad = contact();
        bad.phone = "n/a".into();
        assert!(store.add_contact(bad).is_err());
        assert!(store.alerts().emergency_contacts.is_empty());
    }
}
