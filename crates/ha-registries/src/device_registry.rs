//! Device Registry
//!
//! Devices are matched by any of their identifiers or connections, so an
//! integration re-announcing a device updates the existing entry instead of
//! creating a duplicate.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Device identifier tuple (domain, id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// Device connection tuple (type, id), e.g. ("mac", "aa:bb:cc:dd:ee:ff")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceConnection(pub String, pub String);

impl DeviceConnection {
    /// MAC addresses are lowercased so the same device always matches
    pub fn new(conn_type: impl Into<String>, id: impl Into<String>) -> Self {
        let conn_type = conn_type.into();
        let id = id.into();
        let id = if conn_type == "mac" {
            id.to_lowercase()
        } else {
            id
        };
        Self(conn_type, id)
    }

    fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// What an integration knows about the device behind an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub identifiers: HashSet<DeviceIdentifier>,
    #[serde(default)]
    pub connections: HashSet<DeviceConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    /// Identifier of the parent device, e.g. a hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device: Option<DeviceIdentifier>,
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal UUID
    pub id: String,

    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,
    #[serde(default)]
    pub connections: Vec<DeviceConnection>,

    /// Config entries that announced this device
    #[serde(default)]
    pub config_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device_id: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: Vec::new(),
            connections: Vec::new(),
            config_entries: Vec::new(),
            name: None,
            manufacturer: None,
            model: None,
            sw_version: None,
            via_device_id: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn has_identifier(&self, domain: &str, id: &str) -> bool {
        self.identifiers
            .iter()
            .any(|i| i.domain() == domain && i.id() == id)
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device registry
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: connection key -> device_id
    by_connection: DashMap<String, String>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_connection: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<DeviceRegistryData>().await? {
            info!(
                "Loading {} devices from storage (v{}.{})",
                storage_file.data.devices.len(),
                storage_file.version,
                storage_file.minor_version
            );
            for device in storage_file.data.devices {
                self.index_device(Arc::new(device));
            }
        }
        Ok(())
    }

    /// Save to storage, oldest device first
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.by_id.iter().map(|d| (**d.value()).clone()).collect();
        devices.sort_by_key(|d| d.created_at);
        let count = devices.len();

        self.storage.save(&DeviceRegistryData { devices }).await?;
        debug!("Saved {} devices to storage", count);
        Ok(())
    }

    fn index_device(&self, device: Arc<DeviceEntry>) {
        for identifier in &device.identifiers {
            self.by_identifier
                .insert(identifier.key(), device.id.clone());
        }
        for connection in &device.connections {
            self.by_connection
                .insert(connection.key(), device.id.clone());
        }
        self.by_id.insert(device.id.clone(), device);
    }

    fn unindex_device(&self, device: &DeviceEntry) {
        for identifier in &device.identifiers {
            self.by_identifier.remove(&identifier.key());
        }
        for connection in &device.connections {
            self.by_connection.remove(&connection.key());
        }
        self.by_id.remove(&device.id);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|d| d.clone())
    }

    /// Find a device by one of its identifiers
    pub fn get_device(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let device_id = self
            .by_identifier
            .get(&DeviceIdentifier::new(domain, id).key())
            .map(|d| d.clone())?;
        self.get(&device_id)
    }

    fn find(&self, info: &DeviceInfo) -> Option<Arc<DeviceEntry>> {
        let by_identifier = info
            .identifiers
            .iter()
            .find_map(|i| self.by_identifier.get(&i.key()).map(|d| d.clone()));
        let device_id = by_identifier.or_else(|| {
            info.connections
                .iter()
                .find_map(|c| self.by_connection.get(&c.key()).map(|d| d.clone()))
        })?;
        self.get(&device_id)
    }

    /// Register a device for a config entry, or update the matching one
    ///
    /// Identifiers and connections are merged; every other field given in
    /// `info` overwrites the stored value.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = self.find(info);
        let mut device = match &existing {
            Some(device) => {
                self.unindex_device(device);
                (**device).clone()
            }
            None => DeviceEntry::new(),
        };

        for identifier in &info.identifiers {
            if !device.identifiers.contains(identifier) {
                device.identifiers.push(identifier.clone());
            }
        }
        for connection in &info.connections {
            if !device.connections.contains(connection) {
                device.connections.push(connection.clone());
            }
        }
        if !device.config_entries.iter().any(|id| id == config_entry_id) {
            device.config_entries.push(config_entry_id.to_string());
        }

        if info.name.is_some() {
            device.name = info.name.clone();
        }
        if info.manufacturer.is_some() {
            device.manufacturer = info.manufacturer.clone();
        }
        if info.model.is_some() {
            device.model = info.model.clone();
        }
        if info.sw_version.is_some() {
            device.sw_version = info.sw_version.clone();
        }
        if let Some(via) = &info.via_device {
            device.via_device_id = self.get_device(via.domain(), via.id()).map(|d| d.id.clone());
        }
        device.modified_at = Utc::now();

        if existing.is_none() {
            info!(device_id = %device.id, name = ?device.name, "Registered new device");
        }

        let device = Arc::new(device);
        self.index_device(device.clone());
        device
    }

    pub fn devices_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        let mut devices: Vec<_> = self
            .by_id
            .iter()
            .filter(|d| d.config_entries.iter().any(|id| id == config_entry_id))
            .map(|d| d.value().clone())
            .collect();
        devices.sort_by_key(|d| d.created_at);
        devices
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let device = self.get(device_id)?;
        self.unindex_device(&device);
        debug!(device_id, "Removed device");
        Some(device)
    }

    /// Detach a config entry from its devices
    ///
    /// Devices left without any config entry are removed.
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        for device in self.devices_for_config_entry(config_entry_id) {
            let mut updated = (*device).clone();
            updated.config_entries.retain(|id| id != config_entry_id);

            self.unindex_device(&device);
            if updated.config_entries.is_empty() {
                debug!(device_id = %device.id, "Removed orphaned device");
            } else {
                updated.modified_at = Utc::now();
                self.index_device(Arc::new(updated));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
