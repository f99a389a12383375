//! Fan entity domain
//!
//! Defines what a fan entity looks like and registers the `fan.*`
//! services that drive every fan, whatever integration provides it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ha_core::{ServiceCall, STATE_OFF, STATE_ON};
use ha_helpers::{Entity, EntityComponent, EntityPlatform, HomeAssistant};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceResult};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DOMAIN: &str = "fan";

pub const SPEED_OFF: &str = "off";
pub const SPEED_LOW: &str = "low";
pub const SPEED_MEDIUM: &str = "medium";
pub const SPEED_HIGH: &str = "high";

pub const ATTR_SPEED: &str = "speed";
pub const ATTR_SPEED_LIST: &str = "speed_list";
pub const ATTR_OSCILLATING: &str = "oscillating";
pub const ATTR_DIRECTION: &str = "direction";

pub const SUPPORT_SET_SPEED: u32 = 1;
pub const SUPPORT_OSCILLATE: u32 = 2;
pub const SUPPORT_DIRECTION: u32 = 4;

pub const SERVICE_TURN_ON: &str = "turn_on";
pub const SERVICE_TURN_OFF: &str = "turn_off";
pub const SERVICE_TOGGLE: &str = "toggle";
pub const SERVICE_SET_SPEED: &str = "set_speed";

/// Errors raised by fan entities
#[derive(Debug, Error)]
pub enum FanError {
    #[error("invalid speed: {0}")]
    InvalidSpeed(String),

    #[error("{0} is not supported by this fan")]
    NotSupported(&'static str),

    #[error("device command failed: {0}")]
    Device(String),
}

/// A fan
#[async_trait]
pub trait FanEntity: Entity {
    fn is_on(&self) -> bool;

    /// Current speed bucket
    fn speed(&self) -> Option<String> {
        None
    }

    /// Speeds accepted by `set_speed`, in display order
    fn speed_list(&self) -> Vec<String> {
        Vec::new()
    }

    fn oscillating(&self) -> Option<bool> {
        None
    }

    fn current_direction(&self) -> Option<String> {
        None
    }

    async fn turn_on(&self, speed: Option<&str>) -> Result<(), FanError>;

    async fn turn_off(&self) -> Result<(), FanError>;

    async fn set_speed(&self, _speed: &str) -> Result<(), FanError> {
        Err(FanError::NotSupported(SERVICE_SET_SPEED))
    }

    async fn toggle(&self) -> Result<(), FanError> {
        if self.is_on() {
            self.turn_off().await
        } else {
            self.turn_on(None).await
        }
    }
}

/// State value of a fan
pub fn fan_state<F: FanEntity + ?Sized>(fan: &F) -> String {
    let state = if fan.is_on() { STATE_ON } else { STATE_OFF };
    state.to_string()
}

/// Attributes of a fan; values the fan does not report are left out
pub fn fan_state_attributes<F: FanEntity + ?Sized>(
    fan: &F,
) -> HashMap<String, serde_json::Value> {
    let mut data = HashMap::new();
    if let Some(speed) = fan.speed() {
        data.insert(ATTR_SPEED.to_string(), json!(speed));
    }
    let speed_list = fan.speed_list();
    if !speed_list.is_empty() {
        data.insert(ATTR_SPEED_LIST.to_string(), json!(speed_list));
    }
    if let Some(oscillating) = fan.oscillating() {
        data.insert(ATTR_OSCILLATING.to_string(), json!(oscillating));
    }
    if let Some(direction) = fan.current_direction() {
        data.insert(ATTR_DIRECTION.to_string(), json!(direction));
    }
    data
}

fn entity_id_schema() -> serde_json::Value {
    json!({"type": ["string", "array"], "items": {"type": "string"}})
}

fn service_schema(service: &str) -> serde_json::Value {
    match service {
        SERVICE_TURN_ON => json!({
            "type": "object",
            "properties": {
                "entity_id": entity_id_schema(),
                "speed": {"type": "string"}
            }
        }),
        SERVICE_SET_SPEED => json!({
            "type": "object",
            "properties": {
                "entity_id": entity_id_schema(),
                "speed": {"type": "string"}
            },
            "required": ["speed"]
        }),
        _ => json!({
            "type": "object",
            "properties": {"entity_id": entity_id_schema()}
        }),
    }
}

/// The fan domain: its entities and its services
pub struct FanComponent {
    component: EntityComponent<dyn FanEntity>,
}

impl FanComponent {
    /// Create the component and register the `fan.*` services
    pub fn setup(hass: Arc<HomeAssistant>) -> Arc<Self> {
        let fan = Arc::new(Self {
            component: EntityComponent::new(hass.clone(), DOMAIN),
        });

        let services = [
            (SERVICE_TURN_ON, "Turn on"),
            (SERVICE_TURN_OFF, "Turn off"),
            (SERVICE_TOGGLE, "Toggle"),
            (SERVICE_SET_SPEED, "Set speed"),
        ];
        for (service, name) in services {
            let weak: Weak<Self> = Arc::downgrade(&fan);
            hass.services.register_with_description(
                ServiceDescription::new(DOMAIN, service)
                    .with_name(name)
                    .with_schema(service_schema(service)),
                move |call: ServiceCall| {
                    let fan = weak.upgrade();
                    async move {
                        match fan {
                            Some(fan) => fan.handle_service(call).await,
                            None => Err(ServiceError::CallFailed(
                                "fan component is gone".to_string(),
                            )),
                        }
                    }
                },
            );
        }

        info!("Fan services registered");
        fan
    }

    /// Platform of an integration for one config entry
    pub fn platform(
        &self,
        platform_name: &str,
        config_entry_id: Option<&str>,
    ) -> Arc<EntityPlatform<dyn FanEntity>> {
        self.component.platform(platform_name, config_entry_id)
    }

    pub fn unload_entry(&self, config_entry_id: &str) -> bool {
        self.component.unload_entry(config_entry_id)
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<Arc<dyn FanEntity>> {
        self.component.get_entity(entity_id)
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.component.entity_ids()
    }

    #[instrument(skip(self, call), fields(service = %call.service))]
    async fn handle_service(&self, call: ServiceCall) -> ServiceResult {
        let speed: Option<String> = call.get(ATTR_SPEED);
        // Every target gets the call; failures are reported together
        let mut failures = Vec::new();

        for (entity_id, fan) in self.component.entities_for_call(&call) {
            let result = match call.service.as_str() {
                SERVICE_TURN_ON => fan.turn_on(speed.as_deref()).await,
                SERVICE_TURN_OFF => fan.turn_off().await,
                SERVICE_TOGGLE => fan.toggle().await,
                SERVICE_SET_SPEED => {
                    if fan.supported_features() & SUPPORT_SET_SPEED == 0 {
                        warn!(entity_id = %entity_id, "Fan does not support setting the speed");
                        continue;
                    }
                    match speed.as_deref() {
                        Some(speed) => fan.set_speed(speed).await,
                        None => continue,
                    }
                }
                other => {
                    return Err(ServiceError::NotFound {
                        domain: DOMAIN.to_string(),
                        service: other.to_string(),
                    })
                }
            };

            match result {
                Ok(()) => {
                    debug!(entity_id = %entity_id, "Fan updated");
                    self.component.write_state(&entity_id);
                }
                Err(e) => {
                    warn!(entity_id = %entity_id, error = %e, "Fan service call failed");
                    failures.push(format!("{}: {}", entity_id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(None)
        } else {
            Err(ServiceError::CallFailed(failures.join("; ")))
        }
    }
}
