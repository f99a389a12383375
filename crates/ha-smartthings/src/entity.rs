//! Behaviour shared by every SmartThings entity

use std::collections::HashSet;
use std::sync::Arc;

use ha_helpers::EntityHandle;
use ha_registries::{DeviceIdentifier, DeviceInfo};
use serde_json::Value;
use tracing::trace;

use crate::api::Device;
use crate::consts::{DEFAULT_MANUFACTURER, DOMAIN, SIGNAL_SMARTTHINGS_UPDATE};

/// Entity state backed by one cloud device
///
/// Entities are pushed to: they never poll and rewrite their state when
/// the broker signals that their device changed.
#[derive(Debug, Clone)]
pub struct SmartThingsEntity {
    device: Arc<Device>,
}

impl SmartThingsEntity {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn name(&self) -> Option<String> {
        Some(self.device.label.clone())
    }

    pub fn unique_id(&self) -> Option<String> {
        Some(self.device.device_id.clone())
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifiers: HashSet::from([DeviceIdentifier::new(DOMAIN, &self.device.device_id)]),
            name: Some(self.device.label.clone()),
            model: Some(self.device.device_type_name.clone()),
            manufacturer: Some(DEFAULT_MANUFACTURER.to_string()),
            ..Default::default()
        }
    }

    /// Rewrite the entity's state whenever its device is in an update signal
    pub fn connect_updates(&self, handle: &EntityHandle) {
        let device_id = self.device.device_id.clone();
        let entity = handle.clone();

        let remove = handle
            .dispatcher()
            .connect(SIGNAL_SMARTTHINGS_UPDATE, move |payload: Value| {
                let updated = payload
                    .as_array()
                    .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(device_id.as_str())));
                let entity = entity.clone();
                async move {
                    if updated {
                        trace!(entity_id = %entity.entity_id(), "Device update received");
                        entity.write_state();
                    }
                }
            });
        handle.on_remove(remove);
    }
}
