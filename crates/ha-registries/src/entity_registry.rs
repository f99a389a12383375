//! Entity Registry
//!
//! Remembers which entity_id was handed out for each
//! `(domain, platform, unique_id)` so an entity keeps its id across
//! restarts and reloads.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::{EntityId, EntityIdError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    pub unique_id: String,
    /// Integration that provides this entity
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,

    /// Name the integration gave the entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    #[serde(default)]
    pub supported_features: u32,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    fn new(entity_id: &EntityId, platform: &str, unique_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.to_string(),
            unique_id: unique_id.to_string(),
            platform: platform.to_string(),
            device_id: None,
            config_entry_id: None,
            original_name: None,
            supported_features: 0,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    fn key(&self) -> String {
        registry_key(self.domain(), &self.platform, &self.unique_id)
    }

    fn apply(&mut self, options: &RegistryEntryOptions) {
        self.config_entry_id = options.config_entry_id.clone();
        self.device_id = options.device_id.clone();
        self.original_name = options.original_name.clone();
        self.supported_features = options.supported_features;
        self.modified_at = Utc::now();
    }
}

/// Optional fields recorded with a registry entry
#[derive(Debug, Clone, Default)]
pub struct RegistryEntryOptions {
    /// Basis for the object_id of a new entry, usually the entity name
    pub suggested_object_id: Option<String>,
    pub config_entry_id: Option<String>,
    pub device_id: Option<String>,
    pub original_name: Option<String>,
    pub supported_features: u32,
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

fn registry_key(domain: &str, platform: &str, unique_id: &str) -> String {
    format!("{domain}|{platform}|{unique_id}")
}

/// Entity registry
///
/// Entries are stored as `Arc<EntityEntry>` and kept in insertion order.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index: entity_id -> EntityEntry
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// Index: (domain, platform, unique_id) -> entity_id
    by_unique_id: DashMap<String, String>,

    /// Index: config_entry_id -> set of entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<EntityRegistryData>().await? {
            info!(
                "Loading {} entities from storage (v{}.{})",
                storage_file.data.entities.len(),
                storage_file.version,
                storage_file.minor_version
            );
            for entry in storage_file.data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let entities: Vec<EntityEntry> = self
            .by_entity_id
            .read()
            .map(|e| e.values().map(|v| (**v).clone()).collect())
            .unwrap_or_default();
        let count = entities.len();

        self.storage.save(&EntityRegistryData { entities }).await?;
        debug!("Saved {} entities to storage", count);
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        self.by_unique_id.insert(entry.key(), entity_id.clone());

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        let entity_id = &entry.entity_id;

        self.by_unique_id.remove(&entry.key());

        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(entity_id);
            }
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.shift_remove(entity_id);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// The entity_id registered for a unique_id, if any
    pub fn get_entity_id(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.by_unique_id
            .get(&registry_key(domain, platform, unique_id))
            .map(|id| id.clone())
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|idx| idx.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// All entries created for a config entry
    pub fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get the entry for a unique_id or register a new one
    ///
    /// A known unique_id keeps its entity_id and has its options refreshed.
    /// A new one gets an entity_id built from `suggested_object_id` (or the
    /// platform and unique_id), suffixed with `_2`, `_3`, ... until it is
    /// free in both this registry and `is_taken`.
    pub fn get_or_create(
        &self,
        domain: &str,
        platform: &str,
        unique_id: &str,
        options: RegistryEntryOptions,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<Arc<EntityEntry>, EntityIdError> {
        if let Some(existing) = self
            .get_entity_id(domain, platform, unique_id)
            .and_then(|entity_id| self.get(&entity_id))
        {
            let mut entry = (*existing).clone();
            entry.apply(&options);
            self.unindex_entry(&existing);
            let entry = Arc::new(entry);
            self.index_entry(entry.clone());
            return Ok(entry);
        }

        let suggested = options
            .suggested_object_id
            .clone()
            .unwrap_or_else(|| format!("{platform} {unique_id}"));
        let entity_id = self.generate_entity_id(domain, &suggested, is_taken)?;

        let mut entry = EntityEntry::new(&entity_id, platform, unique_id);
        entry.apply(&options);
        let entry = Arc::new(entry);

        info!(entity_id = %entity_id, unique_id, "Registered new entity");
        self.index_entry(entry.clone());
        Ok(entry)
    }

    /// A free entity_id for `domain` derived from a name
    pub fn generate_entity_id(
        &self,
        domain: &str,
        suggested_object_id: &str,
        is_taken: impl Fn(&str) -> bool,
    ) -> Result<EntityId, EntityIdError> {
        let base = EntityId::from_name(domain, suggested_object_id)?;

        let free = |candidate: &EntityId| {
            let candidate = candidate.to_string();
            !self.is_registered(&candidate) && !is_taken(&candidate)
        };

        if free(&base) {
            return Ok(base);
        }
        Ok((2..)
            .map(|n| base.with_suffix(n))
            .find(|candidate| free(candidate))
            .unwrap_or(base))
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = self.get(entity_id)?;
        self.unindex_entry(&entry);
        debug!(entity_id, "Removed entity from registry");
        Some(entry)
    }

    /// Remove every entry that belongs to a config entry
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .entries_for_config_entry(config_entry_id)
            .iter()
            .filter_map(|entry| self.remove(&entry.entity_id))
            .map(|entry| entry.entity_id.clone())
            .collect();
        self.by_config_entry_id.remove(config_entry_id);
        removed
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, EntityRegistry) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, EntityRegistry::new(storage))
    }

    fn named(name: &str) -> RegistryEntryOptions {
        RegistryEntryOptions {
            suggested_object_id: Some(name.to_string()),
            config_entry_id: Some("entry-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_entity_id_from_name() {
        let (_dir, registry) = registry();
        let entry = registry.get_or_create("fan", "smartthings", "abc", named("Fan 1"), |_| false).unwrap();
        assert_eq!(entry.entity_id, "fan.fan_1");
        assert_eq!(
            registry.get_entity_id("fan", "smartthings", "abc").as_deref(),
            Some("fan.fan_1")
        );
    }

    #[test]
    fn test_same_unique_id_keeps_entity_id() {
        let (_dir, registry) = registry();
        let first = registry.get_or_create("fan", "smartthings", "abc", named("Fan 1"), |_| false).unwrap();

        let mut options = named("Renamed");
        options.supported_features = 1;
        let second = registry.get_or_create("fan", "smartthings", "abc", options, |_| false).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.entity_id, "fan.fan_1");
        assert_eq!(second.supported_features, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_collisions_get_suffix() {
        let (_dir, registry) = registry();
        let a = registry.get_or_create("fan", "smartthings", "a", named("Fan"), |_| false).unwrap();
        let b = registry.get_or_create("fan", "smartthings", "b", named("Fan"), |_| false).unwrap();
        let c = registry.get_or_create("fan", "smartthings", "c", named("Fan"), |id| {
            id == "fan.fan_3"
        })
        .unwrap();

        assert_eq!(a.entity_id, "fan.fan");
        assert_eq!(b.entity_id, "fan.fan_2");
        assert_eq!(c.entity_id, "fan.fan_4");
    }

    #[test]
    fn test_clear_config_entry() {
        let (_dir, registry) = registry();
        registry.get_or_create("fan", "smartthings", "a", named("Fan A"), |_| false).unwrap();
        registry.get_or_create("fan", "smartthings", "b", named("Fan B"), |_| false).unwrap();

        let mut removed = registry.clear_config_entry("entry-1");
        removed.sort();
        assert_eq!(removed, vec!["fan.fan_a", "fan.fan_b"]);
        assert!(registry.is_empty());
        assert!(registry.get_entity_id("fan", "smartthings", "a").is_none());
    }

    #[tokio::test]
    async fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let registry = EntityRegistry::new(storage.clone());
        registry.get_or_create("fan", "smartthings", "abc", named("Fan 1"), |_| false).unwrap();
        registry.save().await.unwrap();

        let reloaded = EntityRegistry::new(storage);
        reloaded.load().await.unwrap();
        assert_eq!(
            reloaded.get_entity_id("fan", "smartthings", "abc").as_deref(),
            Some("fan.fan_1")
        );
        assert_eq!(reloaded.entries_for_config_entry("entry-1").len(), 1);
    }
}
