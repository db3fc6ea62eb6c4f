use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::error::{Error, Result};

/// Flat keyed record stores backing the hub: one JSON file per collection,
/// read and written whole per operation. Dispatch and trigger evaluation
/// always work on a fresh snapshot, never on a shared mutable structure.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAction {
    pub id: String,
    pub name: String,
    /// Command template; may contain an `{app}` placeholder resolved with
    /// the device's app label at dispatch time.
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub app: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub actions: Vec<DeviceAction>,
}

fn default_icon() -> String {
    "📱".to_string()
}

fn default_status() -> String {
    "idle".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    #[default]
    Once,
    Daily,
    Weekdays,
    Weekends,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: String,
    pub name: String,
    pub device_id: String,
    pub action_id: String,
    /// Local wall-clock time, "HH:MM".
    pub time: String,
    #[serde(default)]
    pub repeat: RepeatKind,
    /// Only consulted for `weekly`; 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Fields accepted when creating or updating a schedule rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRuleInput {
    pub name: String,
    pub device_id: String,
    pub action_id: String,
    pub time: String,
    #[serde(default)]
    pub repeat: RepeatKind,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

macro_rules! json_file_store {
    ($store:ident, $record:ty) => {
        pub struct $store {
            path: PathBuf,
            // Serializes read-modify-write cycles; readers still take the
            // lock so a half-written file is never observed.
            lock: Mutex<()>,
        }

        impl $store {
            pub fn new(path: impl Into<PathBuf>) -> Self {
                Self {
                    path: path.into(),
                    lock: Mutex::new(()),
                }
            }

            pub async fn list(&self) -> Result<Vec<$record>> {
                let _guard = self.lock.lock().await;
                self.read().await
            }

            async fn read(&self) -> Result<Vec<$record>> {
                match tokio::fs::read(&self.path).await {
                    Ok(bytes) => {
                        serde_json::from_slice(&bytes).map_err(|e| Error::Parse(e.to_string()))
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                    Err(e) => Err(Error::Configuration(format!(
                        "reading {}: {e}",
                        self.path.display()
                    ))),
                }
            }

            async fn write(&self, records: &[$record]) -> Result<()> {
                if let Some(parent) = self.path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        Error::Configuration(format!("creating {}: {e}", parent.display()))
                    })?;
                }
                let bytes = serde_json::to_vec_pretty(records)?;
                tokio::fs::write(&self.path, bytes).await.map_err(|e| {
                    Error::Configuration(format!("writing {}: {e}", self.path.display()))
                })
            }
        }
    };
}

json_file_store!(DeviceStore, Device);
json_file_store!(ScheduleStore, ScheduleRule);

impl DeviceStore {
    pub async fn get(&self, id: &str) -> Result<Option<Device>> {
        Ok(self.list().await?.into_iter().find(|d| d.id == id))
    }

    pub async fn insert(&self, device: Device) -> Result<Device> {
        let _guard = self.lock.lock().await;
        let mut devices = self.read().await?;
        if devices.iter().any(|d| d.id == device.id) {
            return Err(Error::Configuration(format!(
                "device id '{}' already exists",
                device.id
            )));
        }
        devices.push(device.clone());
        self.write(&devices).await?;
        Ok(device)
    }

    pub async fn update(&self, device: Device) -> Result<Device> {
        let _guard = self.lock.lock().await;
        let mut devices = self.read().await?;
        let slot = devices
            .iter_mut()
            .find(|d| d.id == device.id)
            .ok_or_else(|| Error::NotFound(format!("device '{}'", device.id)))?;
        *slot = device.clone();
        self.write(&devices).await?;
        Ok(device)
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut devices = self.read().await?;
        let before = devices.len();
        devices.retain(|d| d.id != id);
        let removed = devices.len() != before;
        if removed {
            self.write(&devices).await?;
        }
        Ok(removed)
    }
}

impl ScheduleStore {
    pub async fn get(&self, id: &str) -> Result<Option<ScheduleRule>> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }

    pub async fn create(&self, input: ScheduleRuleInput) -> Result<ScheduleRule> {
        let _guard = self.lock.lock().await;
        let mut rules = self.read().await?;
        let rule = ScheduleRule {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            name: input.name,
            device_id: input.device_id,
            action_id: input.action_id,
            time: input.time,
            repeat: input.repeat,
            weekdays: input.weekdays,
            enabled: input.enabled,
            created_at: Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            updated_at: None,
        };
        rules.push(rule.clone());
        self.write(&rules).await?;
        Ok(rule)
    }

    pub async fn update(&self, id: &str, input: ScheduleRuleInput) -> Result<ScheduleRule> {
        let _guard = self.lock.lock().await;
        let mut rules = self.read().await?;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("schedule '{id}'")))?;
        rule.name = input.name;
        rule.device_id = input.device_id;
        rule.action_id = input.action_id;
        rule.time = input.time;
        rule.repeat = input.repeat;
        rule.weekdays = input.weekdays;
        rule.enabled = input.enabled;
        rule.updated_at = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        let updated = rule.clone();
        self.write(&rules).await?;
        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut rules = self.read().await?;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        let removed = rules.len() != before;
        if removed {
            self.write(&rules).await?;
        }
        Ok(removed)
    }
}
