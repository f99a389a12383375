//! Devices of one config entry

use std::sync::Arc;

use ha_event_bus::Dispatcher;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use crate::api::Device;
use crate::consts::SIGNAL_SMARTTHINGS_UPDATE;
use crate::fan;

/// An attribute change pushed by the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub device_id: String,
    #[serde(default = "main_component")]
    pub component_id: String,
    pub capability: String,
    pub attribute: String,
    pub value: serde_json::Value,
}

fn main_component() -> String {
    crate::api::MAIN_COMPONENT.to_string()
}

/// Holds the devices loaded for a config entry and routes their events
pub struct DeviceBroker {
    devices: IndexMap<String, Arc<Device>>,
    installed_app_id: String,
}

impl DeviceBroker {
    pub fn new(devices: Vec<Arc<Device>>, installed_app_id: impl Into<String>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|device| (device.device_id.clone(), device))
                .collect(),
            installed_app_id: installed_app_id.into(),
        }
    }

    pub fn installed_app_id(&self) -> &str {
        &self.installed_app_id
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.values().cloned().collect()
    }

    pub fn device(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices.get(device_id).cloned()
    }

    /// Devices an entity platform should create entities for
    pub fn assigned_devices(&self, platform: &str) -> Vec<Arc<Device>> {
        self.devices
            .values()
            .filter(|device| match platform {
                fan::DOMAIN => fan::is_fan(device),
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Apply an event to its device and tell the entities about it
    ///
    /// Returns false for devices this broker does not hold.
    pub async fn handle_device_event(&self, dispatcher: &Dispatcher, event: &DeviceEvent) -> bool {
        let Some(device) = self.devices.get(&event.device_id) else {
            trace!(device_id = %event.device_id, "Ignoring event for unknown device");
            return false;
        };

        if event.component_id != crate::api::MAIN_COMPONENT {
            trace!(component = %event.component_id, "Ignoring event for secondary component");
            return false;
        }

        device.apply_attribute(&event.capability, &event.attribute, &event.value);
        debug!(device_id = %event.device_id, attribute = %event.attribute, "Device updated");
        dispatcher
            .send(SIGNAL_SMARTTHINGS_UPDATE, json!([event.device_id]))
            .await;
        true
    }
}
