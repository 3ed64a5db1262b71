//! Persisted stale-while-revalidate cache.
//!
//! A single slot holds the most recent successful fetch together with the
//! parameters that produced it. It only removes loading flicker on repeat
//! sessions; a fresh fetch always follows a cache hit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::StorageError;
use crate::identity::Identity;
use crate::storage::Storage;
use crate::value::FlagSet;

/// Key of the single persisted slot. Bump the version when the entry layout
/// changes.
pub const CACHE_KEY: &str = "flagbag_flags_v1";

/// Persisted snapshot of a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub endpoint: String,
    pub project_key: String,
    #[serde(default)]
    pub identity: Option<Identity>,
    pub flags: FlagSet,
}

impl CacheEntry {
    /// Whether this entry was produced by the same endpoint, project and
    /// identity.
    pub fn matches(&self, config: &Configuration, identity: Option<&Identity>) -> bool {
        self.endpoint == config.endpoint()
            && self.project_key == config.project_key()
            && self.identity.as_ref() == identity
    }
}

/// Best-effort cache over a [`Storage`] slot.
#[derive(Clone)]
pub struct FlagCache {
    storage: Arc<dyn Storage>,
}

impl FlagCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Overwrites the slot. Failures are logged and swallowed.
    pub fn store(&self, config: &Configuration, flags: &FlagSet, identity: Option<&Identity>) {
        let entry = CacheEntry {
            endpoint: config.endpoint().to_string(),
            project_key: config.project_key().to_string(),
            identity: identity.cloned(),
            flags: flags.clone(),
        };
        if let Err(e) = self.write(&entry) {
            tracing::warn!(error = %e, "flagbag: failed to persist flags");
        }
    }

    /// Returns the cached flags when they are valid for the current
    /// configuration and `identity`. Any error reads as a miss.
    pub fn load(&self, config: &Configuration, identity: Option<&Identity>) -> Option<FlagSet> {
        match self.entry() {
            Ok(Some(entry)) if entry.matches(config, identity) => Some(entry.flags),
            Ok(_) => {
                tracing::debug!("flagbag: cache miss");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "flagbag: cache unavailable");
                None
            }
        }
    }

    /// Reads the raw entry, whatever configuration wrote it.
    pub fn entry(&self) -> Result<Option<CacheEntry>, StorageError> {
        let Some(raw) = self.storage.get_item(CACHE_KEY)? else {
            return Ok(None);
        };
        // a literal "null" slot is an empty cache, not corruption
        serde_json::from_str::<Option<CacheEntry>>(&raw)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_item(CACHE_KEY)
    }

    fn write(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entry).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.storage.set_item(CACHE_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::value::FlagValue;

    struct DeniedStorage;

    impl Storage for DeniedStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Denied("no permission".into()))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded)
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Denied("no permission".into()))
        }
    }

    fn config(project_key: &str) -> Configuration {
        Configuration::new(project_key, "https://e", FlagSet::new(), false).unwrap()
    }

    fn dog(value: bool) -> FlagSet {
        FlagSet::from([("dog".to_string(), FlagValue::Bool(value))])
    }

    #[test]
    fn test_round_trip_for_same_parameters() {
        let cache = FlagCache::new(Arc::new(MemoryStorage::new()));
        let user = Identity::new("jon");
        cache.store(&config("A"), &dog(true), user.as_ref());
        assert_eq!(cache.load(&config("A"), user.as_ref()), Some(dog(true)));
    }

    #[test]
    fn test_other_project_key_is_a_miss() {
        let cache = FlagCache::new(Arc::new(MemoryStorage::new()));
        cache.store(&config("A"), &dog(true), None);
        assert_eq!(cache.load(&config("B"), None), None);
    }

    #[test]
    fn test_other_endpoint_is_a_miss() {
        let cache = FlagCache::new(Arc::new(MemoryStorage::new()));
        cache.store(&config("A"), &dog(true), None);
        let elsewhere = Configuration::new("A", "https://other", FlagSet::new(), false).unwrap();
        assert_eq!(cache.load(&elsewhere, None), None);
    }

    #[test]
    fn test_identity_must_match() {
        let cache = FlagCache::new(Arc::new(MemoryStorage::new()));
        let jon = Identity::new("jon");
        cache.store(&config("A"), &dog(true), jon.as_ref());
        assert_eq!(cache.load(&config("A"), None), None);
        assert_eq!(cache.load(&config("A"), Identity::new("ann").as_ref()), None);
        let jon_with_email = Identity::new("jon").map(|u| u.email("jon@example.com"));
        assert_eq!(cache.load(&config("A"), jon_with_email.as_ref()), None);
    }

    #[test]
    fn test_null_fields_in_stored_identity_match_missing() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(
                CACHE_KEY,
                r#"{"endpoint":"https://e","project_key":"A","identity":{"key":"jon","email":null},"flags":{"dog":true}}"#,
            )
            .unwrap();
        let cache = FlagCache::new(storage);
        assert_eq!(cache.load(&config("A"), Identity::new("jon").as_ref()), Some(dog(true)));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(CACHE_KEY, "{not json").unwrap();
        let cache = FlagCache::new(storage.clone());
        assert_eq!(cache.load(&config("A"), None), None);
        assert!(matches!(cache.entry(), Err(StorageError::Corrupt(_))));

        storage.set_item(CACHE_KEY, "null").unwrap();
        assert_eq!(cache.entry(), Ok(None));
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let cache = FlagCache::new(Arc::new(DeniedStorage));
        cache.store(&config("A"), &dog(true), None);
        assert_eq!(cache.load(&config("A"), None), None);
    }

    #[test]
    fn test_clear_empties_the_slot() {
        let cache = FlagCache::new(Arc::new(MemoryStorage::new()));
        cache.store(&config("A"), &dog(true), None);
        cache.clear().unwrap();
        assert_eq!(cache.load(&config("A"), None), None);
    }
}
