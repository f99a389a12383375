//! The entity model

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use ha_core::EntityId;
use ha_event_bus::{Dispatcher, RemoveListener};
use ha_registries::DeviceInfo;

/// Something that has a state in the state store
///
/// Entities are read-only from the platform's point of view: the platform
/// asks for the current state and attributes whenever it writes them.
pub trait Entity: Send + Sync {
    fn name(&self) -> Option<String>;

    /// Stable id used for the entity registry; `None` keeps the entity out
    /// of it
    fn unique_id(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Push entities return `false`; they write their own state
    fn should_poll(&self) -> bool {
        true
    }

    /// The state value, `None` for unknown
    fn state(&self) -> Option<String>;

    fn state_attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    fn supported_features(&self) -> u32 {
        0
    }

    /// Called once the entity has an id and before its first state write
    fn added_to_hass(&self, _handle: &EntityHandle) {}
}

pub(crate) trait StateWriter: Send + Sync {
    fn write_state(&self, entity_id: &EntityId);
}

/// What an entity gets when it is added to a platform
#[derive(Clone)]
pub struct EntityHandle {
    entity_id: EntityId,
    dispatcher: Dispatcher,
    writer: Weak<dyn StateWriter>,
    removers: Arc<Mutex<Vec<RemoveListener>>>,
}

impl EntityHandle {
    pub(crate) fn new(
        entity_id: EntityId,
        dispatcher: Dispatcher,
        writer: Weak<dyn StateWriter>,
        removers: Arc<Mutex<Vec<RemoveListener>>>,
    ) -> Self {
        Self {
            entity_id,
            dispatcher,
            writer,
            removers,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Write the entity's current state; a no-op once the platform is gone
    pub fn write_state(&self) {
        if let Some(writer) = self.writer.upgrade() {
            writer.write_state(&self.entity_id);
        }
    }

    /// Run `listener` when the entity is removed from its platform
    pub fn on_remove(&self, listener: RemoveListener) {
        if let Ok(mut removers) = self.removers.lock() {
            removers.push(listener);
        }
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}
