//! Devices and their reported status

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::names::{attribute, capability, command};
use super::{ApiResult, DeviceApi};

/// Component every command is addressed to
pub const MAIN_COMPONENT: &str = "main";

/// A device as listed by the cloud API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub dth: Option<DeviceTypeHandler>,
    #[serde(default)]
    pub components: Vec<DeviceComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeHandler {
    #[serde(default)]
    pub device_type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceComponent {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReference {
    pub id: String,
}

impl DeviceDescription {
    /// Capabilities of the main component
    pub fn capabilities(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| c.id == MAIN_COMPONENT)
            .flat_map(|c| c.capabilities.iter().map(|cap| cap.id.clone()))
            .collect()
    }

    pub fn device_type_name(&self) -> String {
        self.dth
            .as_ref()
            .map(|dth| dth.device_type_name.clone())
            .unwrap_or_default()
    }
}

/// Last known attribute values of a device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    pub switch: bool,
    pub fan_speed: Option<i64>,
    pub level: Option<i64>,
    /// Every reported attribute, keyed by attribute name
    pub attributes: HashMap<String, Value>,
}

impl DeviceStatus {
    pub fn apply_attribute(&mut self, capability: &str, attribute: &str, value: &Value) {
        match attribute {
            attribute::SWITCH => self.switch = value.as_str() == Some("on"),
            attribute::FAN_SPEED => self.fan_speed = value.as_i64(),
            attribute::LEVEL => self.level = value.as_i64(),
            _ => {}
        }
        debug!(capability, attribute, %value, "Applied attribute");
        self.attributes.insert(attribute.to_string(), value.clone());
    }

    /// Status from a `devices/{id}/status` response
    ///
    /// Only the main component is read. Each capability maps attribute names
    /// to `{"value": ..}` objects.
    pub fn from_response(body: &Value) -> Self {
        let mut status = Self::default();
        let Some(main) = body
            .get("components")
            .and_then(|c| c.get(MAIN_COMPONENT))
            .and_then(Value::as_object)
        else {
            return status;
        };

        for (capability, attributes) in main {
            let Some(attributes) = attributes.as_object() else {
                continue;
            };
            for (attribute, state) in attributes {
                if let Some(value) = state.get("value").filter(|v| !v.is_null()) {
                    status.apply_attribute(capability, attribute, value);
                }
            }
        }
        status
    }
}

/// One command in a `devices/{id}/commands` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub component: String,
    pub capability: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl DeviceCommand {
    pub fn new(capability: &str, command: &str, arguments: Vec<Value>) -> Self {
        Self {
            component: MAIN_COMPONENT.to_string(),
            capability: capability.to_string(),
            command: command.to_string(),
            arguments,
        }
    }
}

/// A SmartThings device bound to the client that controls it
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub label: String,
    pub device_type_name: String,
    pub location_id: String,
    pub capabilities: Vec<String>,
    status: RwLock<DeviceStatus>,
    api: Arc<dyn DeviceApi>,
}

impl Device {
    pub fn new(description: DeviceDescription, api: Arc<dyn DeviceApi>) -> Self {
        Self {
            capabilities: description.capabilities(),
            device_type_name: description.device_type_name(),
            device_id: description.device_id,
            name: description.name,
            label: description.label,
            location_id: description.location_id,
            status: RwLock::new(DeviceStatus::default()),
            api,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Snapshot of the current status
    pub fn status(&self) -> DeviceStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    pub fn set_status(&self, status: DeviceStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        }
    }

    pub fn apply_attribute(&self, capability: &str, attribute: &str, value: &Value) {
        if let Ok(mut status) = self.status.write() {
            status.apply_attribute(capability, attribute, value);
        }
    }

    /// Turn the device on; returns whether the cloud accepted the command
    pub async fn switch_on(&self, set_status: bool) -> ApiResult<bool> {
        let accepted = self
            .command(DeviceCommand::new(capability::SWITCH, command::ON, vec![]))
            .await?;
        if accepted && set_status {
            self.apply_attribute(capability::SWITCH, attribute::SWITCH, &json!("on"));
        }
        Ok(accepted)
    }

    pub async fn switch_off(&self, set_status: bool) -> ApiResult<bool> {
        let accepted = self
            .command(DeviceCommand::new(capability::SWITCH, command::OFF, vec![]))
            .await?;
        if accepted && set_status {
            self.apply_attribute(capability::SWITCH, attribute::SWITCH, &json!("off"));
        }
        Ok(accepted)
    }

    /// Set the fan speed level; a level above zero also means switched on
    pub async fn set_fan_speed(&self, speed: i64, set_status: bool) -> ApiResult<bool> {
        let accepted = self
            .command(DeviceCommand::new(
                capability::FAN_SPEED,
                command::SET_FAN_SPEED,
                vec![json!(speed)],
            ))
            .await?;
        if accepted && set_status {
            let switch = if speed > 0 { "on" } else { "off" };
            self.apply_attribute(capability::FAN_SPEED, attribute::FAN_SPEED, &json!(speed));
            self.apply_attribute(capability::SWITCH, attribute::SWITCH, &json!(switch));
        }
        Ok(accepted)
    }

    /// Replace the local status with the one the cloud reports
    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn refresh_status(&self) -> ApiResult<()> {
        let status = self.api.device_status(&self.device_id).await?;
        self.set_status(status);
        Ok(())
    }

    async fn command(&self, command: DeviceCommand) -> ApiResult<bool> {
        let accepted = self.api.execute_command(&self.device_id, &command).await?;
        if !accepted {
            warn!(
                device_id = %self.device_id,
                capability = %command.capability,
                command = %command.command,
                "Command was not accepted"
            );
        }
        Ok(accepted)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.device_id)
            .field("label", &self.label)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_from_json() {
        let description: DeviceDescription = serde_json::from_value(json!({
            "deviceId": "d1",
            "name": "GE Fan",
            "label": "Ceiling Fan",
            "locationId": "loc",
            "dth": {"deviceTypeName": "Fan Speed Switch"},
            "components": [
                {"id": "main", "capabilities": [{"id": "switch"}, {"id": "fanSpeed"}]},
                {"id": "light", "capabilities": [{"id": "switchLevel"}]}
            ]
        }))
        .unwrap();

        assert_eq!(description.capabilities(), vec!["switch", "fanSpeed"]);
        assert_eq!(description.device_type_name(), "Fan Speed Switch");
    }

    #[test]
    fn test_status_from_response() {
        let status = DeviceStatus::from_response(&json!({
            "components": {
                "main": {
                    "switch": {"switch": {"value": "on"}},
                    "fanSpeed": {"fanSpeed": {"value": 2}},
                    "switchLevel": {"level": {"value": null}}
                }
            }
        }));

        assert!(status.switch);
        assert_eq!(status.fan_speed, Some(2));
        assert_eq!(status.level, None);
        assert!(!status.attributes.contains_key("level"));
    }

    #[test]
    fn test_status_without_main_component() {
        assert_eq!(
            DeviceStatus::from_response(&json!({"components": {}})),
            DeviceStatus::default()
        );
    }

    #[test]
    fn test_command_body() {
        let command = DeviceCommand::new(capability::FAN_SPEED, command::SET_FAN_SPEED, vec![json!(3)]);
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "component": "main",
                "capability": "fanSpeed",
                "command": "setFanSpeed",
                "arguments": [3]
            })
        );
    }
}
