//! Entity state storage with domain indexing
//!
//! The StateStore holds the current state of every entity that an
//! integration has written, indexed by domain, and fires `state_changed`
//! events on the event bus when a state is created, changed or removed.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Current state of all entities
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// entity_ids by domain, sorted
    domain_index: DashMap<String, BTreeSet<String>>,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    /// Create an empty store firing `state_changed` on `event_bus`
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            event_bus,
        }
    }

    /// Write the state of an entity
    ///
    /// Fires `state_changed` for new entities and whenever the value or the
    /// attributes differ from what is stored. Writing an identical state
    /// only refreshes `last_reported`.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        self.states.insert(key.clone(), new_state.clone());

        let changed = match &old_state {
            Some(old) => old != &new_state,
            None => {
                self.domain_index
                    .entry(entity_id.domain().to_string())
                    .or_default()
                    .insert(key);
                true
            }
        };

        if changed {
            debug!(state = %new_state.state, "State changed");
            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id,
                    old_state,
                    new_state: Some(new_state.clone()),
                },
                context,
            );
        } else {
            trace!("State reported unchanged");
        }

        new_state
    }

    /// Get the full state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The state value only
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity currently has the given state value
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Sorted entity ids of a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All states of a domain
    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// All current states
    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state
    ///
    /// Fires `state_changed` with no new state when something was removed.
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();
        let (_, old_state) = self.states.remove(&key)?;

        if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
            ids.remove(&key);
        }

        debug!("Removed entity state");
        self.event_bus.fire_typed(
            StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(old_state.clone()),
                new_state: None,
            },
            context,
        );

        Some(old_state)
    }

    /// Number of entities with a state
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (Arc<EventBus>, StateStore) {
        let bus = Arc::new(EventBus::new());
        let store = StateStore::new(bus.clone());
        (bus, store)
    }

    fn fan(object_id: &str) -> EntityId {
        EntityId::new("fan", object_id).unwrap()
    }

    #[tokio::test]
    async fn test_set_fires_state_changed() {
        let (bus, store) = store();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        store.set(fan("fan_1"), "on", HashMap::new(), Context::new());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.entity_id, fan("fan_1"));
        assert!(event.data.old_state.is_none());
        assert_eq!(event.data.new_state.unwrap().state, "on");
        assert!(store.is_state("fan.fan_1", "on"));
    }

    #[tokio::test]
    async fn test_identical_write_is_silent() {
        let (bus, store) = store();
        let attrs = HashMap::from([("speed".to_string(), json!("low"))]);
        store.set(fan("fan_1"), "on", attrs.clone(), Context::new());

        let mut rx = bus.subscribe_typed::<StateChangedData>();
        store.set(fan("fan_1"), "on", attrs, Context::new());
        assert!(rx.try_recv().is_err());

        store.set(
            fan("fan_1"),
            "on",
            HashMap::from([("speed".to_string(), json!("high"))]),
            Context::new(),
        );
        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.data.new_state.unwrap().attribute::<String>("speed").as_deref(),
            Some("high")
        );
    }

    #[test]
    fn test_domain_index() {
        let (_bus, store) = store();
        store.set(fan("b"), "off", HashMap::new(), Context::new());
        store.set(fan("a"), "on", HashMap::new(), Context::new());
        store.set(
            EntityId::new("switch", "x").unwrap(),
            "on",
            HashMap::new(),
            Context::new(),
        );

        assert_eq!(store.entity_ids("fan"), vec!["fan.a", "fan.b"]);
        assert_eq!(store.domain_states("switch").len(), 1);
        assert_eq!(store.entity_count(), 3);
    }

    #[tokio::test]
    async fn test_remove() {
        let (bus, store) = store();
        store.set(fan("fan_1"), "on", HashMap::new(), Context::new());
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        let removed = store.remove(&fan("fan_1"), Context::new());
        assert_eq!(removed.map(|s| s.state).as_deref(), Some("on"));
        assert!(store.get("fan.fan_1").is_none());
        assert!(store.entity_ids("fan").is_empty());

        let event = rx.recv().await.unwrap();
        assert!(event.data.new_state.is_none());

        assert!(store.remove(&fan("fan_1"), Context::new()).is_none());
    }
}
