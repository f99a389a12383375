//! Shared harness for SmartThings integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, ConfigEntrySource, ConnectionClass};
use ha_helpers::HomeAssistant;
use ha_smartthings::api::{
    ApiError, ApiResult, CapabilityReference, DeviceCommand, DeviceComponent, DeviceDescription,
    DeviceTypeHandler,
};
use ha_smartthings::consts::{CONF_ACCESS_TOKEN, CONF_INSTALLED_APP_ID, CONF_LOCATION_ID};
use ha_smartthings::{Device, DeviceApi, DeviceBroker, DeviceStatus, SmartThings, DOMAIN};
use serde_json::Value;
use tempfile::TempDir;

pub const LOCATION_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const ACCESS_TOKEN: &str = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";
pub const INSTALLED_APP_ID: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Cloud API double that accepts every command and records it
#[derive(Default)]
pub struct MockApi {
    pub devices: Mutex<Vec<DeviceDescription>>,
    pub statuses: Mutex<HashMap<String, DeviceStatus>>,
    pub commands: Mutex<Vec<(String, DeviceCommand)>>,
    /// HTTP status every request fails with, when set
    pub fail_with: Mutex<Option<u16>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<(String, DeviceCommand)> {
        self.commands.lock().unwrap().clone()
    }

    fn check(&self, url: &str) -> ApiResult<()> {
        match *self.fail_with.lock().unwrap() {
            Some(status) => Err(ApiError::Status {
                status,
                url: url.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceApi for MockApi {
    async fn devices(&self, _location_id: &str) -> ApiResult<Vec<DeviceDescription>> {
        self.check("devices")?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn device_status(&self, device_id: &str) -> ApiResult<DeviceStatus> {
        self.check("status")?;
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> ApiResult<bool> {
        self.check("commands")?;
        self.commands
            .lock()
            .unwrap()
            .push((device_id.to_string(), command.clone()));
        Ok(true)
    }
}

pub fn description(label: &str, capabilities: &[&str]) -> DeviceDescription {
    DeviceDescription {
        device_id: device_id_for(label),
        name: label.to_string(),
        label: label.to_string(),
        location_id: LOCATION_ID.to_string(),
        dth: Some(DeviceTypeHandler {
            device_type_name: format!("{} Type", label),
        }),
        components: vec![DeviceComponent {
            id: "main".to_string(),
            capabilities: capabilities
                .iter()
                .map(|c| CapabilityReference { id: c.to_string() })
                .collect(),
        }],
    }
}

fn device_id_for(label: &str) -> String {
    format!("device-{}", label.to_lowercase().replace(' ', "-"))
}

pub fn status(attributes: &[(&str, &str, Value)]) -> DeviceStatus {
    let mut status = DeviceStatus::default();
    for (capability, attribute, value) in attributes {
        status.apply_attribute(capability, attribute, value);
    }
    status
}

/// A device with the given capabilities and status
pub fn device_factory(
    api: &Arc<MockApi>,
    label: &str,
    capabilities: &[&str],
    status: DeviceStatus,
) -> Arc<Device> {
    let device = Device::new(description(label, capabilities), api.clone());
    device.set_status(status);
    Arc::new(device)
}

/// A hub with the SmartThings integration loaded and no entries
pub struct TestContext {
    pub dir: TempDir,
    pub hass: Arc<HomeAssistant>,
    pub smartthings: Arc<SmartThings>,
}

impl TestContext {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path());
        let smartthings = SmartThings::new(hass.clone());
        Self {
            dir,
            hass,
            smartthings,
        }
    }

    /// A cloud-push entry holding `devices`, with only the fan platform set up
    pub async fn setup_platform(&self, devices: Vec<Arc<Device>>) -> ConfigEntry {
        let entry = ConfigEntry::new(DOMAIN, "Test")
            .with_source(ConfigEntrySource::User)
            .with_connection_class(ConnectionClass::CloudPush);
        self.smartthings
            .insert_broker(&entry.entry_id, DeviceBroker::new(devices, ""));
        self.smartthings
            .forward_entry_setup(&entry, "fan")
            .await
            .unwrap();
        entry
    }

    pub async fn call_fan(&self, service: &str, data: Value) {
        self.hass
            .services
            .call("fan", service, data, ha_core::Context::new(), false)
            .await
            .unwrap();
    }
}

pub fn entry_data() -> HashMap<String, Value> {
    HashMap::from([
        (CONF_ACCESS_TOKEN.to_string(), Value::from(ACCESS_TOKEN)),
        (CONF_LOCATION_ID.to_string(), Value::from(LOCATION_ID)),
        (CONF_INSTALLED_APP_ID.to_string(), Value::from(INSTALLED_APP_ID)),
    ])
}
