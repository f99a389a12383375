//! Config Entries
//!
//! Config entries represent individual integration instances and track
//! their lifecycle (setup, retry, unload).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries`.

pub mod entry;
pub mod manager;
pub mod state_machine;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConnectionClass};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use state_machine::{calculate_retry_delay, InvalidTransition};
