//! Config Entry types
//!
//! A ConfigEntry is one configured instance of an integration, e.g. one
//! SmartThings location linked with its own token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state_machine::InvalidTransition;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// Setup failed; needs user action
    SetupError,
    /// Setup failed on something transient; will be retried
    SetupRetry,
    MigrationError,
    UnloadInProgress,
    FailedUnload,
}

impl ConfigEntryState {
    /// Whether the entry can be unloaded from this state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConfigEntryState::Loaded
                | ConfigEntryState::SetupError
                | ConfigEntryState::SetupRetry
                | ConfigEntryState::NotLoaded
        )
    }
}

/// Where the config entry came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    #[default]
    User,
    /// Imported from YAML config
    Import,
    Discovery,
}

/// How the integration talks to its devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionClass {
    LocalPush,
    LocalPoll,
    CloudPush,
    CloudPoll,
    Assumed,
    #[default]
    Unknown,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g. "smartthings")
    pub domain: String,

    pub title: String,

    /// Configuration data written when the entry was created
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    #[serde(default = "default_version")]
    pub version: u32,

    /// Prevents two entries for the same account/location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(default)]
    pub connection_class: ConnectionClass,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Why the entry is in a failed state (not persisted)
    #[serde(skip, default)]
    pub reason: Option<String>,

    /// Setup attempts since the last success (not persisted)
    #[serde(skip, default)]
    pub tries: u32,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            connection_class: ConnectionClass::Unknown,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            tries: 0,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_connection_class(mut self, connection_class: ConnectionClass) -> Self {
        self.connection_class = connection_class;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Move to a new state, rejecting moves the lifecycle does not allow
    ///
    /// The retry counter survives only `SetupInProgress` and `SetupRetry`.
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state.try_transition(new_state)?;

        self.state = new_state;
        self.reason = reason;

        match new_state {
            ConfigEntryState::SetupRetry => self.tries += 1,
            ConfigEntryState::SetupInProgress => {}
            _ => self.tries = 0,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new("smartthings", "Home");
        assert_eq!(entry.domain, "smartthings");
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert_eq!(entry.connection_class, ConnectionClass::Unknown);
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_retry_counter() {
        let mut entry = ConfigEntry::new("smartthings", "Home");
        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupRetry, Some("timeout".into()))
            .unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupRetry, None)
            .unwrap();
        assert_eq!(entry.tries, 2);

        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();
        entry.try_set_state(ConfigEntryState::Loaded, None).unwrap();
        assert_eq!(entry.tries, 0);
        assert!(entry.is_loaded());
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        let mut entry = ConfigEntry::new("smartthings", "Home");
        assert!(entry.try_set_state(ConfigEntryState::Loaded, None).is_err());
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }

    #[test]
    fn test_serde_skips_runtime_fields() {
        let mut entry = ConfigEntry::new("smartthings", "Home")
            .with_unique_id("location-1")
            .with_connection_class(ConnectionClass::CloudPush)
            .with_source(ConfigEntrySource::Import);
        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["connection_class"], "cloud_push");
        assert!(json.get("state").is_none());

        let parsed: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.unique_id.as_deref(), Some("location-1"));
        assert_eq!(parsed.source, ConfigEntrySource::Import);
        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
    }
}
