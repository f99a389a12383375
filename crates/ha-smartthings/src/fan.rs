//! Fans: devices with both the switch and fanSpeed capabilities

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_components::fan::{
    fan_state, fan_state_attributes, FanEntity, FanError, SPEED_HIGH, SPEED_LOW, SPEED_MEDIUM,
    SPEED_OFF, SUPPORT_SET_SPEED,
};
use ha_config_entries::ConfigEntry;
use ha_core::EntityId;
use ha_helpers::{Entity, EntityHandle, HomeAssistant};
use ha_registries::DeviceInfo;
use tracing::{debug, info};

use crate::api::{capability, ApiError, Device};
use crate::entity::SmartThingsEntity;
use crate::{SmartThings, SmartThingsError, SmartThingsResult};

pub use ha_components::fan::DOMAIN;

/// Speeds in level order; a level is its index here
pub const SPEED_LIST: [&str; 4] = [SPEED_OFF, SPEED_LOW, SPEED_MEDIUM, SPEED_HIGH];

/// A device is a fan when it can be switched and its speed set
pub fn is_fan(device: &Device) -> bool {
    device.has_capability(capability::SWITCH) && device.has_capability(capability::FAN_SPEED)
}

/// Speed name of a device speed level; `None` outside 0 to 3
pub fn value_to_speed(value: i64) -> Option<&'static str> {
    usize::try_from(value)
        .ok()
        .and_then(|index| SPEED_LIST.get(index))
        .copied()
}

pub fn speed_to_value(speed: &str) -> Result<i64, FanError> {
    SPEED_LIST
        .iter()
        .position(|s| *s == speed)
        .map(|index| index as i64)
        .ok_or_else(|| FanError::InvalidSpeed(speed.to_string()))
}

fn command_result(result: Result<bool, ApiError>) -> Result<(), FanError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(FanError::Device("command was rejected".to_string())),
        Err(e) => Err(FanError::Device(e.to_string())),
    }
}

/// Fan entity of a SmartThings device
#[derive(Debug)]
pub struct SmartThingsFan {
    base: SmartThingsEntity,
}

impl SmartThingsFan {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            base: SmartThingsEntity::new(device),
        }
    }

    fn device(&self) -> &Device {
        self.base.device()
    }
}

impl Entity for SmartThingsFan {
    fn name(&self) -> Option<String> {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.base.device_info())
    }

    fn should_poll(&self) -> bool {
        false
    }

    fn state(&self) -> Option<String> {
        Some(fan_state(self))
    }

    fn state_attributes(&self) -> HashMap<String, serde_json::Value> {
        fan_state_attributes(self)
    }

    fn supported_features(&self) -> u32 {
        SUPPORT_SET_SPEED
    }

    fn added_to_hass(&self, handle: &EntityHandle) {
        self.base.connect_updates(handle);
    }
}

#[async_trait]
impl FanEntity for SmartThingsFan {
    fn is_on(&self) -> bool {
        self.device().status().switch
    }

    fn speed(&self) -> Option<String> {
        self.device()
            .status()
            .fan_speed
            .and_then(value_to_speed)
            .map(String::from)
    }

    fn speed_list(&self) -> Vec<String> {
        SPEED_LIST.iter().map(|s| s.to_string()).collect()
    }

    async fn turn_on(&self, speed: Option<&str>) -> Result<(), FanError> {
        match speed {
            Some(speed) => self.set_speed(speed).await,
            None => command_result(self.device().switch_on(true).await),
        }
    }

    async fn turn_off(&self) -> Result<(), FanError> {
        command_result(self.device().switch_off(true).await)
    }

    async fn set_speed(&self, speed: &str) -> Result<(), FanError> {
        let value = speed_to_value(speed)?;
        command_result(self.device().set_fan_speed(value, true).await)
    }
}

/// Fans are set up from config entries only; a `fan:` platform entry in
/// configuration.yaml is accepted and ignored
pub async fn async_setup_platform(_hass: &HomeAssistant, _config: &serde_json::Value) {
    debug!("Ignoring SmartThings fan platform configuration");
}

/// Add a fan entity for every fan device of the entry
pub async fn async_setup_entry(
    smartthings: &SmartThings,
    entry: &ConfigEntry,
) -> SmartThingsResult<Vec<EntityId>> {
    let broker = smartthings
        .broker(&entry.entry_id)
        .ok_or_else(|| SmartThingsError::NoBroker(entry.entry_id.clone()))?;

    let fans: Vec<Arc<dyn FanEntity>> = broker
        .assigned_devices(DOMAIN)
        .into_iter()
        .map(|device| Arc::new(SmartThingsFan::new(device)) as Arc<dyn FanEntity>)
        .collect();

    let entity_ids = smartthings
        .fan()
        .platform(crate::consts::DOMAIN, Some(&entry.entry_id))
        .add_entities(fans)?;
    info!(count = entity_ids.len(), "Set up SmartThings fans");
    Ok(entity_ids)
}
