//! The HomeAssistant hub

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ha_config_entries::ConfigEntries;
use ha_event_bus::{Dispatcher, EventBus};
use ha_registries::Registries;
use ha_service_registry::ServiceRegistry;
use ha_state_store::StateStore;

/// Shared handles on every core service
pub struct HomeAssistant {
    pub config_dir: PathBuf,
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub dispatcher: Dispatcher,
    pub registries: Arc<Registries>,
    pub config_entries: Arc<ConfigEntries>,
}

impl HomeAssistant {
    /// A hub whose registries and config entries persist under `config_dir`
    pub fn new(config_dir: impl AsRef<Path>) -> Arc<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let bus = Arc::new(EventBus::new());
        let registries = Arc::new(Registries::new(&config_dir));
        let config_entries = Arc::new(ConfigEntries::new(registries.storage.clone()));

        Arc::new(Self {
            states: Arc::new(StateStore::new(bus.clone())),
            services: Arc::new(ServiceRegistry::new()),
            dispatcher: Dispatcher::new(),
            bus,
            registries,
            config_entries,
            config_dir,
        })
    }
}
