//! Entities of one integration config entry within one domain

use std::sync::{Arc, Mutex, RwLock, Weak};

use ha_core::{
    Context, EntityId, EntityIdError, ATTR_FRIENDLY_NAME, ATTR_SUPPORTED_FEATURES, STATE_UNKNOWN,
};
use ha_event_bus::RemoveListener;
use ha_registries::RegistryEntryOptions;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace};

use crate::entity::{Entity, EntityHandle, StateWriter};
use crate::hass::HomeAssistant;
use crate::DEVICE_DEFAULT_NAME;

/// Errors raised while adding entities
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    InvalidEntityId(#[from] EntityIdError),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

struct PlatformEntity<E: ?Sized> {
    entity: Arc<E>,
    entity_id: EntityId,
    removers: Arc<Mutex<Vec<RemoveListener>>>,
}

/// The entities one integration provides for one domain
///
/// Created through [`EntityComponent::platform`](crate::EntityComponent::platform).
pub struct EntityPlatform<E: ?Sized> {
    hass: Arc<HomeAssistant>,
    domain: String,
    platform_name: String,
    config_entry_id: Option<String>,
    entities: RwLock<IndexMap<String, PlatformEntity<E>>>,
    self_ref: Weak<Self>,
}

impl<E: Entity + ?Sized + 'static> EntityPlatform<E> {
    pub(crate) fn new(
        hass: Arc<HomeAssistant>,
        domain: &str,
        platform_name: &str,
        config_entry_id: Option<&str>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            hass,
            domain: domain.to_string(),
            platform_name: platform_name.to_string(),
            config_entry_id: config_entry_id.map(str::to_string),
            entities: RwLock::new(IndexMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn config_entry_id(&self) -> Option<&str> {
        self.config_entry_id.as_deref()
    }

    /// Register entities and write their initial state
    ///
    /// Entities with a device are linked to the device registry, entities
    /// with a unique_id get a stable entity_id from the entity registry and
    /// the rest get one generated from their name. An entity whose id is
    /// already in use is logged and skipped. Returns the ids of the
    /// entities that were added.
    #[instrument(skip(self, entities), fields(platform = %self.platform_name, count = entities.len()))]
    pub fn add_entities(&self, entities: Vec<Arc<E>>) -> PlatformResult<Vec<EntityId>> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            let entity_id = self.assign_entity_id(entity.as_ref())?;
            let key = entity_id.to_string();

            if self.hass.states.get(&key).is_some() || self.contains(&key) {
                error!(entity_id = %key, "Entity id already exists, not adding it");
                continue;
            }

            let removers = Arc::new(Mutex::new(Vec::new()));
            if let Ok(mut entities) = self.entities.write() {
                entities.insert(
                    key,
                    PlatformEntity {
                        entity: entity.clone(),
                        entity_id: entity_id.clone(),
                        removers: removers.clone(),
                    },
                );
            }

            let writer: Weak<dyn StateWriter> = self.self_ref.clone();
            let handle = EntityHandle::new(
                entity_id.clone(),
                self.hass.dispatcher.clone(),
                writer,
                removers,
            );
            entity.added_to_hass(&handle);
            self.write_state(&entity_id);

            info!(entity_id = %entity_id, "Added entity");
            added.push(entity_id);
        }

        Ok(added)
    }

    fn assign_entity_id(&self, entity: &E) -> PlatformResult<EntityId> {
        let name = entity.name();
        let is_taken = |entity_id: &str| {
            self.hass.states.get(entity_id).is_some() || self.contains(entity_id)
        };

        // An entity that is already live keeps its registry and device
        // entries untouched; add_entities skips it as a duplicate
        if let Some(unique_id) = entity.unique_id() {
            let existing = self.hass.registries.entities.get_entity_id(
                &self.domain,
                &self.platform_name,
                &unique_id,
            );
            if let Some(entity_id) = existing.filter(|id| is_taken(id)) {
                return Ok(entity_id.parse()?);
            }
        }

        let device_id = match (&self.config_entry_id, entity.device_info()) {
            (Some(config_entry_id), Some(info)) => Some(
                self.hass
                    .registries
                    .devices
                    .get_or_create(config_entry_id, &info)
                    .id
                    .clone(),
            ),
            _ => None,
        };

        let Some(unique_id) = entity.unique_id() else {
            let suggested = name.as_deref().unwrap_or(DEVICE_DEFAULT_NAME);
            return Ok(self
                .hass
                .registries
                .entities
                .generate_entity_id(&self.domain, suggested, is_taken)?);
        };

        let entry = self.hass.registries.entities.get_or_create(
            &self.domain,
            &self.platform_name,
            &unique_id,
            RegistryEntryOptions {
                suggested_object_id: Some(
                    name.clone()
                        .unwrap_or_else(|| DEVICE_DEFAULT_NAME.to_string()),
                ),
                config_entry_id: self.config_entry_id.clone(),
                device_id,
                original_name: name,
                supported_features: entity.supported_features(),
            },
            is_taken,
        )?;
        Ok(entry.entity_id.parse()?)
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.entities
            .read()
            .map(|entities| entities.contains_key(entity_id))
            .unwrap_or(false)
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<Arc<E>> {
        self.entities
            .read()
            .ok()
            .and_then(|entities| entities.get(entity_id).map(|e| e.entity.clone()))
    }

    /// Entities in the order they were added
    pub fn entities(&self) -> Vec<(EntityId, Arc<E>)> {
        self.entities
            .read()
            .map(|entities| {
                entities
                    .values()
                    .map(|e| (e.entity_id.clone(), e.entity.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entities
            .read()
            .map(|entities| entities.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Write the current state of one of this platform's entities
    pub fn write_state(&self, entity_id: &EntityId) {
        let Some(entity) = self.get_entity(&entity_id.to_string()) else {
            trace!(entity_id = %entity_id, "Not writing state of unknown entity");
            return;
        };

        let mut attributes = entity.state_attributes();
        if let Some(name) = entity.name() {
            attributes.insert(ATTR_FRIENDLY_NAME.to_string(), name.into());
        }
        let supported_features = entity.supported_features();
        if supported_features != 0 {
            attributes.insert(
                ATTR_SUPPORTED_FEATURES.to_string(),
                supported_features.into(),
            );
        }

        let state = entity.state().unwrap_or_else(|| STATE_UNKNOWN.to_string());
        self.hass
            .states
            .set(entity_id.clone(), state, attributes, Context::new());
    }

    /// Remove every entity: run its remove listeners and drop its state
    ///
    /// Registry entries are kept so the entities get the same ids when the
    /// platform is set up again.
    #[instrument(skip(self), fields(platform = %self.platform_name))]
    pub fn reset(&self) {
        let removed: Vec<PlatformEntity<E>> = self
            .entities
            .write()
            .map(|mut entities| entities.drain(..).map(|(_, e)| e).collect())
            .unwrap_or_default();

        for platform_entity in &removed {
            let listeners: Vec<RemoveListener> = platform_entity
                .removers
                .lock()
                .map(|mut removers| removers.drain(..).collect())
                .unwrap_or_default();
            for listener in listeners {
                listener();
            }
            self.hass
                .states
                .remove(&platform_entity.entity_id, Context::new());
        }

        debug!(count = removed.len(), "Platform reset");
    }
}

impl<E: Entity + ?Sized + 'static> StateWriter for EntityPlatform<E> {
    fn write_state(&self, entity_id: &EntityId) {
        EntityPlatform::write_state(self, entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityComponent;
    use ha_registries::{DeviceIdentifier, DeviceInfo};
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestEntity {
        name: Option<String>,
        unique_id: Option<String>,
        on: AtomicBool,
        removed: Arc<AtomicUsize>,
        handle: Mutex<Option<EntityHandle>>,
    }

    impl TestEntity {
        fn new(name: &str, unique_id: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: Some(name.to_string()),
                unique_id: unique_id.map(str::to_string),
                on: AtomicBool::new(true),
                removed: Arc::new(AtomicUsize::new(0)),
                handle: Mutex::new(None),
            })
        }
    }

    impl Entity for TestEntity {
        fn name(&self) -> Option<String> {
            self.name.clone()
        }

        fn unique_id(&self) -> Option<String> {
            self.unique_id.clone()
        }

        fn device_info(&self) -> Option<DeviceInfo> {
            let unique_id = self.unique_id.clone()?;
            Some(DeviceInfo {
                identifiers: HashSet::from([DeviceIdentifier::new("test", unique_id)]),
                name: self.name.clone(),
                ..Default::default()
            })
        }

        fn state(&self) -> Option<String> {
            let state = if self.on.load(Ordering::SeqCst) { "on" } else { "off" };
            Some(state.to_string())
        }

        fn state_attributes(&self) -> HashMap<String, serde_json::Value> {
            HashMap::from([("level".to_string(), json!(2))])
        }

        fn supported_features(&self) -> u32 {
            1
        }

        fn added_to_hass(&self, handle: &EntityHandle) {
            let removed = self.removed.clone();
            handle.on_remove(Box::new(move || {
                removed.fetch_add(1, Ordering::SeqCst);
            }));
            *self.handle.lock().unwrap() = Some(handle.clone());
        }
    }

    fn setup() -> (TempDir, Arc<HomeAssistant>, EntityComponent<TestEntity>) {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        let component = EntityComponent::new(hass.clone(), "fan");
        (temp_dir, hass, component)
    }

    #[test]
    fn test_add_entities_writes_state() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", Some("entry-1"));

        let added = platform
            .add_entities(vec![TestEntity::new("Fan 1", Some("abc"))])
            .unwrap();
        assert_eq!(added[0].to_string(), "fan.fan_1");

        let state = hass.states.get("fan.fan_1").unwrap();
        assert_eq!(state.state, "on");
        assert_eq!(state.attributes["friendly_name"], "Fan 1");
        assert_eq!(state.attributes["supported_features"], 1);
        assert_eq!(state.attributes["level"], 2);
    }

    #[test]
    fn test_registry_entries() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", Some("entry-1"));
        platform
            .add_entities(vec![TestEntity::new("Fan 1", Some("abc"))])
            .unwrap();

        let entry = hass.registries.entities.get("fan.fan_1").unwrap();
        assert_eq!(entry.unique_id, "abc");
        assert_eq!(entry.platform, "test");

        let device = hass.registries.devices.get_device("test", "abc").unwrap();
        assert_eq!(entry.device_id.as_deref(), Some(device.id.as_str()));
        assert_eq!(device.config_entries, vec!["entry-1"]);
    }

    #[test]
    fn test_entity_without_unique_id() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", None);
        platform
            .add_entities(vec![TestEntity::new("Fan 1", None), TestEntity::new("Fan 1", None)])
            .unwrap();

        assert!(hass.states.get("fan.fan_1").is_some());
        assert!(hass.states.get("fan.fan_1_2").is_some());
        assert!(hass.registries.entities.is_empty());
    }

    #[test]
    fn test_duplicate_is_skipped() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", Some("entry-1"));
        let first = TestEntity::new("Fan 1", Some("abc"));
        platform.add_entities(vec![first.clone()]).unwrap();

        let duplicate = TestEntity::new("Fan 1", Some("abc"));
        duplicate.on.store(false, Ordering::SeqCst);
        let added = platform
            .add_entities(vec![duplicate, TestEntity::new("Fan 2", Some("def"))])
            .unwrap();

        let added: Vec<String> = added.iter().map(|id| id.to_string()).collect();
        assert_eq!(added, vec!["fan.fan_2"]);
        assert!(hass.states.is_state("fan.fan_1", "on"));
        assert!(Arc::ptr_eq(
            &platform.get_entity("fan.fan_1").unwrap(),
            &first
        ));
    }

    #[test]
    fn test_duplicate_from_second_entry_keeps_registry_entries() {
        let (_dir, hass, component) = setup();
        component
            .platform("test", Some("entry-1"))
            .add_entities(vec![TestEntity::new("Fan 1", Some("abc"))])
            .unwrap();

        let added = component
            .platform("test", Some("entry-2"))
            .add_entities(vec![TestEntity::new("Fan 1", Some("abc"))])
            .unwrap();
        assert!(added.is_empty());

        let entry = hass.registries.entities.get("fan.fan_1").unwrap();
        assert_eq!(entry.config_entry_id.as_deref(), Some("entry-1"));
        let device = hass.registries.devices.get_device("test", "abc").unwrap();
        assert_eq!(device.config_entries, vec!["entry-1"]);
    }

    #[test]
    fn test_handle_write_state() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", Some("entry-1"));
        let entity = TestEntity::new("Fan 1", Some("abc"));
        platform.add_entities(vec![entity.clone()]).unwrap();

        entity.on.store(false, Ordering::SeqCst);
        assert!(hass.states.is_state("fan.fan_1", "on"));

        let handle = entity.handle.lock().unwrap().clone().unwrap();
        assert_eq!(handle.entity_id().to_string(), "fan.fan_1");
        handle.write_state();
        assert!(hass.states.is_state("fan.fan_1", "off"));
    }

    #[test]
    fn test_reset_removes_states_keeps_registry() {
        let (_dir, hass, component) = setup();
        let platform = component.platform("test", Some("entry-1"));
        let entity = TestEntity::new("Fan 1", Some("abc"));
        platform.add_entities(vec![entity.clone()]).unwrap();

        platform.reset();

        assert!(hass.states.get("fan.fan_1").is_none());
        assert_eq!(entity.removed.load(Ordering::SeqCst), 1);
        assert!(platform.entity_ids().is_empty());
        assert!(hass.registries.entities.get("fan.fan_1").is_some());

        // Writing through a stale handle does nothing
        entity.handle.lock().unwrap().clone().unwrap().write_state();
        assert!(hass.states.get("fan.fan_1").is_none());

        // Same entity id again after re-adding
        let added = platform
            .add_entities(vec![TestEntity::new("Renamed", Some("abc"))])
            .unwrap();
        assert_eq!(added[0].to_string(), "fan.fan_1");
    }
}
