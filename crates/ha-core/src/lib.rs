//! Core types for the Home Assistant entity model
//!
//! This crate provides the fundamental types every other crate in the
//! workspace builds on: EntityId, State, Event, Context and ServiceCall,
//! plus the attribute and state constants integrations write.

mod context;
mod entity_id;
mod event;
mod service_call;
mod slug;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventOrigin, EventType};
pub use service_call::{ServiceCall, SupportsResponse};
pub use slug::slugify;
pub use state::State;

/// State value for an entity that is switched on
pub const STATE_ON: &str = "on";

/// State value for an entity that is switched off
pub const STATE_OFF: &str = "off";

/// State value used when an entity cannot report a state
pub const STATE_UNKNOWN: &str = "unknown";

/// State value used when an entity's device is unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// Service data key naming the targeted entities
pub const ATTR_ENTITY_ID: &str = "entity_id";

/// Display name attribute
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";

/// Bitmask of the optional features an entity supports
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";

/// Special `entity_id` value targeting every entity of a domain
pub const ENTITY_MATCH_ALL: &str = "all";

/// Standard event types
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for service calls
    pub const CALL_SERVICE: &str = "call_service";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for CALL_SERVICE events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }
}
