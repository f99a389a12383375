//! Entity helpers
//!
//! The [`HomeAssistant`] hub ties the core services together. Integrations
//! hand their entities to an [`EntityPlatform`], which registers them,
//! writes their state and cleans up when the config entry is unloaded.
//! An [`EntityComponent`] owns all platforms of one entity domain and
//! resolves service-call targets.

mod entity;
mod entity_component;
mod entity_platform;
mod hass;

pub use entity::{Entity, EntityHandle};
pub use entity_component::EntityComponent;
pub use entity_platform::{EntityPlatform, PlatformError, PlatformResult};
pub use hass::HomeAssistant;

/// Name used for entities that do not provide one
pub const DEVICE_DEFAULT_NAME: &str = "Unnamed Device";
