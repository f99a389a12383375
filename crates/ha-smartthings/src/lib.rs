//! SmartThings integration
//!
//! Loads the devices of a SmartThings location from the cloud API and
//! exposes them as entities. Each config entry gets a [`DeviceBroker`]
//! holding its devices; entity platforms (currently `fan`) create entities
//! from the broker's devices.

pub mod api;
pub mod broker;
pub mod config;
pub mod consts;
pub mod entity;
pub mod fan;

use std::sync::Arc;

use dashmap::DashMap;
use ha_components::FanComponent;
use ha_config_entries::{calculate_retry_delay, ConfigEntriesError, ConfigEntry, ConfigEntryState};
use ha_helpers::{HomeAssistant, PlatformError};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use api::{ApiError, Device, DeviceApi, DeviceStatus, SmartThingsApi};
pub use broker::{DeviceBroker, DeviceEvent};
pub use config::{ConfigError, SmartThingsConfig};
pub use consts::{DOMAIN, SIGNAL_SMARTTHINGS_UPDATE, SUPPORTED_PLATFORMS};

#[derive(Debug, Error)]
pub enum SmartThingsError {
    #[error("config entry not found: {0}")]
    EntryNotFound(String),

    #[error("no devices loaded for config entry {0}")]
    NoBroker(String),

    #[error("platform {0} is not supported")]
    UnsupportedPlatform(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("setup failed, retrying in {retry_in:.1}s: {source}")]
    NotReady { retry_in: f64, source: ApiError },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

pub type SmartThingsResult<T> = Result<T, SmartThingsError>;

/// The integration: device brokers per config entry and the entity domains
/// they feed
pub struct SmartThings {
    hass: Arc<HomeAssistant>,
    fan: Arc<FanComponent>,
    brokers: DashMap<String, Arc<DeviceBroker>>,
}

impl SmartThings {
    /// Set up the integration and the entity domains it provides
    pub fn new(hass: Arc<HomeAssistant>) -> Arc<Self> {
        Arc::new(Self {
            fan: FanComponent::setup(hass.clone()),
            brokers: DashMap::new(),
            hass,
        })
    }

    pub fn hass(&self) -> &Arc<HomeAssistant> {
        &self.hass
    }

    pub fn fan(&self) -> &Arc<FanComponent> {
        &self.fan
    }

    pub fn insert_broker(&self, entry_id: impl Into<String>, broker: DeviceBroker) -> Arc<DeviceBroker> {
        let broker = Arc::new(broker);
        self.brokers.insert(entry_id.into(), broker.clone());
        broker
    }

    pub fn broker(&self, entry_id: &str) -> Option<Arc<DeviceBroker>> {
        self.brokers.get(entry_id).map(|b| b.clone())
    }

    /// Set up one entity platform for a config entry
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub async fn forward_entry_setup(&self, entry: &ConfigEntry, platform: &str) -> SmartThingsResult<()> {
        match platform {
            fan::DOMAIN => {
                fan::async_setup_entry(self, entry).await?;
                Ok(())
            }
            other => Err(SmartThingsError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Remove a platform's entities of a config entry, and their states
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub async fn forward_entry_unload(&self, entry: &ConfigEntry, platform: &str) -> SmartThingsResult<bool> {
        match platform {
            fan::DOMAIN => Ok(self.fan.unload_entry(&entry.entry_id)),
            other => Err(SmartThingsError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Load a config entry's devices and set up every supported platform
    ///
    /// The cloud client is built from the entry's token and API base URL.
    /// Cloud failures leave the entry in `SetupRetry`; invalid entry data
    /// leaves it in `SetupError`.
    pub async fn async_setup_entry(&self, entry_id: &str) -> SmartThingsResult<()> {
        self.setup_entry(entry_id, None).await
    }

    /// Same as [`Self::async_setup_entry`] with an already built client
    pub async fn async_setup_entry_with_api(
        &self,
        entry_id: &str,
        api: Arc<dyn DeviceApi>,
    ) -> SmartThingsResult<()> {
        self.setup_entry(entry_id, Some(api)).await
    }

    #[instrument(skip(self, api))]
    async fn setup_entry(&self, entry_id: &str, api: Option<Arc<dyn DeviceApi>>) -> SmartThingsResult<()> {
        let entries = &self.hass.config_entries;
        let entry = entries
            .get(entry_id)
            .ok_or_else(|| SmartThingsError::EntryNotFound(entry_id.to_string()))?;
        entries.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let config = match SmartThingsConfig::from_entry_data(&entry.data)
            .and_then(|config| config.validate().map(|_| config))
        {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Invalid SmartThings config entry");
                entries.transition(entry_id, ConfigEntryState::SetupError, Some(e.to_string()))?;
                return Err(e.into());
            }
        };

        let devices = match self.load_devices(&config, api).await {
            Ok(devices) => devices,
            Err(source) => {
                let entry = entries.transition(
                    entry_id,
                    ConfigEntryState::SetupRetry,
                    Some(source.to_string()),
                )?;
                let retry_in = calculate_retry_delay(entry.tries);
                warn!(error = %source, retry_in, "Unable to load SmartThings devices");
                return Err(SmartThingsError::NotReady { retry_in, source });
            }
        };

        let broker = self.insert_broker(entry_id, DeviceBroker::new(devices, config.installed_app_id));
        info!(
            count = broker.devices().len(),
            installed_app_id = broker.installed_app_id(),
            "Loaded SmartThings devices"
        );

        for platform in SUPPORTED_PLATFORMS {
            if let Err(e) = self.forward_entry_setup(&entry, platform).await {
                entries.transition(entry_id, ConfigEntryState::SetupError, Some(e.to_string()))?;
                return Err(e);
            }
        }

        entries.transition(entry_id, ConfigEntryState::Loaded, None)?;
        Ok(())
    }

    async fn load_devices(
        &self,
        config: &SmartThingsConfig,
        api: Option<Arc<dyn DeviceApi>>,
    ) -> Result<Vec<Arc<Device>>, ApiError> {
        let api: Arc<dyn DeviceApi> = match api {
            Some(api) => api,
            None => Arc::new(SmartThingsApi::from_config(config)?),
        };
        let mut devices = Vec::new();
        for description in api.devices(&config.location_id).await? {
            let device = Arc::new(Device::new(description, api.clone()));
            device.refresh_status().await?;
            devices.push(device);
        }
        Ok(devices)
    }

    /// Unload every platform of a config entry and drop its devices
    #[instrument(skip(self))]
    pub async fn async_unload_entry(&self, entry_id: &str) -> SmartThingsResult<bool> {
        let entries = &self.hass.config_entries;
        let entry = entries
            .get(entry_id)
            .ok_or_else(|| SmartThingsError::EntryNotFound(entry_id.to_string()))?;
        entries.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let mut unloaded = false;
        for platform in SUPPORTED_PLATFORMS {
            unloaded |= self.forward_entry_unload(&entry, platform).await?;
        }
        self.brokers.remove(entry_id);

        entries.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded SmartThings config entry");
        Ok(unloaded)
    }
}
