//! Home Assistant Registries
//!
//! Persistent registries for:
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//!
//! Both use versioned JSON persistence in the `.storage/` directory.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{EntityEntry, EntityRegistry, EntityRegistryData, RegistryEntryOptions};

pub use device_registry::{
    DeviceConnection, DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry,
    DeviceRegistryData,
};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            storage,
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }
}
