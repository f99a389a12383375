//! All platforms of one entity domain

use std::sync::Arc;

use dashmap::DashMap;
use ha_core::{EntityId, ServiceCall};
use tracing::{debug, info, instrument};

use crate::entity::Entity;
use crate::entity_platform::EntityPlatform;
use crate::hass::HomeAssistant;

/// Owner of every platform providing entities for one domain, e.g. `fan`
pub struct EntityComponent<E: ?Sized> {
    hass: Arc<HomeAssistant>,
    domain: String,
    /// Keyed by `platform_name` plus config entry id
    platforms: DashMap<String, Arc<EntityPlatform<E>>>,
}

impl<E: Entity + ?Sized + 'static> EntityComponent<E> {
    pub fn new(hass: Arc<HomeAssistant>, domain: impl Into<String>) -> Self {
        Self {
            hass,
            domain: domain.into(),
            platforms: DashMap::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn hass(&self) -> &Arc<HomeAssistant> {
        &self.hass
    }

    /// The platform of an integration for a config entry, created on first use
    pub fn platform(
        &self,
        platform_name: &str,
        config_entry_id: Option<&str>,
    ) -> Arc<EntityPlatform<E>> {
        let key = format!("{}.{}", platform_name, config_entry_id.unwrap_or_default());
        self.platforms
            .entry(key)
            .or_insert_with(|| {
                debug!(domain = %self.domain, platform = platform_name, "Creating entity platform");
                EntityPlatform::new(self.hass.clone(), &self.domain, platform_name, config_entry_id)
            })
            .clone()
    }

    fn platforms(&self) -> Vec<Arc<EntityPlatform<E>>> {
        self.platforms.iter().map(|p| p.value().clone()).collect()
    }

    fn platform_of(&self, entity_id: &str) -> Option<Arc<EntityPlatform<E>>> {
        self.platforms()
            .into_iter()
            .find(|platform| platform.get_entity(entity_id).is_some())
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<Arc<E>> {
        self.platform_of(entity_id)
            .and_then(|platform| platform.get_entity(entity_id))
    }

    /// Every entity of the domain, sorted by entity id
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .platforms()
            .iter()
            .flat_map(|platform| platform.entity_ids())
            .collect();
        ids.sort();
        ids
    }

    /// Rewrite an entity's state; false when no platform knows it
    pub fn write_state(&self, entity_id: &EntityId) -> bool {
        match self.platform_of(&entity_id.to_string()) {
            Some(platform) => {
                platform.write_state(entity_id);
                true
            }
            None => false,
        }
    }

    /// The entities a service call targets
    ///
    /// `entity_id: all` selects every entity of the domain. Ids that are
    /// not entities of this domain are skipped.
    pub fn entities_for_call(&self, call: &ServiceCall) -> Vec<(EntityId, Arc<E>)> {
        if call.targets_all() {
            let mut all: Vec<(EntityId, Arc<E>)> = self
                .platforms()
                .iter()
                .flat_map(|platform| platform.entities())
                .collect();
            all.sort_by_key(|(entity_id, _)| entity_id.to_string());
            return all;
        }

        call.entity_ids()
            .into_iter()
            .filter_map(|entity_id| {
                let entity = self.get_entity(&entity_id);
                if entity.is_none() {
                    debug!(entity_id = %entity_id, "Service call target not found");
                }
                Some((entity_id.parse::<EntityId>().ok()?, entity?))
            })
            .collect()
    }

    /// Reset and forget every platform of a config entry
    #[instrument(skip(self), fields(domain = %self.domain))]
    pub fn unload_entry(&self, config_entry_id: &str) -> bool {
        let keys: Vec<String> = self
            .platforms
            .iter()
            .filter(|p| p.config_entry_id() == Some(config_entry_id))
            .map(|p| p.key().clone())
            .collect();

        for key in &keys {
            if let Some((_, platform)) = self.platforms.remove(key) {
                platform.reset();
            }
        }

        if !keys.is_empty() {
            info!("Unloaded config entry platforms");
        }
        !keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::Context;
    use serde_json::json;
    use tempfile::TempDir;

    struct Named(&'static str);

    impl Entity for Named {
        fn name(&self) -> Option<String> {
            Some(self.0.to_string())
        }

        fn state(&self) -> Option<String> {
            None
        }
    }

    fn component() -> (TempDir, EntityComponent<dyn Entity>) {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        (temp_dir, EntityComponent::new(hass, "fan"))
    }

    fn call(data: serde_json::Value) -> ServiceCall {
        ServiceCall::new("fan", "turn_on", data, Context::new())
    }

    #[test]
    fn test_unknown_state() {
        let (_dir, component) = component();
        let platform = component.platform("test", Some("entry-1"));
        platform
            .add_entities(vec![Arc::new(Named("Ceiling")) as Arc<dyn Entity>])
            .unwrap();

        let state = component.hass().states.get("fan.ceiling").unwrap();
        assert_eq!(state.state, "unknown");
        assert!(state.attributes.get("supported_features").is_none());
    }

    #[test]
    fn test_entities_for_call() {
        let (_dir, component) = component();
        component
            .platform("test", Some("entry-1"))
            .add_entities(vec![
                Arc::new(Named("Ceiling")) as Arc<dyn Entity>,
                Arc::new(Named("Attic")) as Arc<dyn Entity>,
            ])
            .unwrap();
        component
            .platform("test", Some("entry-2"))
            .add_entities(vec![Arc::new(Named("Bedroom")) as Arc<dyn Entity>])
            .unwrap();

        let ids = |data| {
            component
                .entities_for_call(&call(data))
                .into_iter()
                .map(|(id, _)| id.to_string())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            ids(json!({"entity_id": "all"})),
            vec!["fan.attic", "fan.bedroom", "fan.ceiling"]
        );
        assert_eq!(
            ids(json!({"entity_id": ["fan.bedroom", "fan.missing"]})),
            vec!["fan.bedroom"]
        );
        assert_eq!(ids(json!({"entity_id": "fan.ceiling"})), vec!["fan.ceiling"]);
        assert!(ids(json!({})).is_empty());
    }

    #[test]
    fn test_unload_entry() {
        let (_dir, component) = component();
        component
            .platform("test", Some("entry-1"))
            .add_entities(vec![Arc::new(Named("Ceiling")) as Arc<dyn Entity>])
            .unwrap();
        component
            .platform("test", Some("entry-2"))
            .add_entities(vec![Arc::new(Named("Bedroom")) as Arc<dyn Entity>])
            .unwrap();

        assert!(component.unload_entry("entry-1"));
        assert!(!component.unload_entry("entry-1"));

        assert_eq!(component.entity_ids(), vec!["fan.bedroom"]);
        assert!(component.hass().states.get("fan.ceiling").is_none());
        assert!(component.get_entity("fan.bedroom").is_some());
        assert!(!component.write_state(&"fan.ceiling".parse().unwrap()));
    }
}
