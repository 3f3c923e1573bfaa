//! Time-bounded caches for the inventory and the counter metadata.
//!
//! Content is replaced as a whole: a refresh fills a [`Staging`] area which is
//! swapped in by [`Cache::commit`] together with the refresh timestamp. A
//! discarded refresh leaves both untouched, so the previous content stays
//! visible and the cache stays expired.

use crate::api::CounterId;
use crate::entity::{EntityClass, EntityId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Inventory entry for one monitored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub class: EntityClass,
    pub name: String,
    /// Never empty: the last tag is always `vsphere_type:<class>`.
    pub tags: Vec<String>,
    /// Only set for VMs and hosts.
    pub hostname: Option<String>,
}

/// Canonical name and unit of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub unit: String,
}

pub type ClassMetadata = HashMap<CounterId, MetricDescriptor>;
pub type InventoryCache = Cache<EntityId, InventoryEntry>;
pub type MetadataCache = Cache<EntityClass, ClassMetadata>;

struct CacheState<K, V> {
    content: Arc<HashMap<K, V>>,
    last_refresh: Option<Instant>,
}

pub struct Cache<K, V> {
    refresh_interval: Duration,
    state: Mutex<CacheState<K, V>>,
}

/// Content being built by an in-progress refresh. Invisible to readers until
/// committed.
#[derive(Debug)]
pub struct Staging<K, V> {
    content: HashMap<K, V>,
}

impl<K: Eq + Hash, V> Staging<K, V> {
    pub fn set(&mut self, key: K, value: V) {
        self.content.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Cache<K, V> {
    /// A new cache is empty and expired.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            state: Mutex::new(CacheState {
                content: Arc::new(HashMap::new()),
                last_refresh: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.state().last_refresh {
            Some(last) => now.saturating_duration_since(last) > self.refresh_interval,
            None => true,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.state().content.get(key).cloned()
    }

    /// Lookup that falls back to `default` for unknown keys; entities
    /// routinely disappear between refreshes.
    pub fn get_or(&self, key: &K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Write a single entry into the live content.
    pub fn set(&self, key: K, value: V) {
        let mut state = self.state();
        Arc::make_mut(&mut state.content).insert(key, value);
    }

    /// Point-in-time view of the content. Later commits do not affect it.
    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        Arc::clone(&self.state().content)
    }

    pub fn len(&self) -> usize {
        self.state().content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().content.is_empty()
    }

    /// Drop the content and mark the cache expired.
    pub fn reset(&self) {
        let mut state = self.state();
        state.content = Arc::new(HashMap::new());
        state.last_refresh = None;
    }

    pub fn begin_refresh(&self) -> Staging<K, V> {
        Staging {
            content: HashMap::new(),
        }
    }

    /// Swap in the staged content and restart the expiry clock.
    pub fn commit(&self, staging: Staging<K, V>) {
        let mut state = self.state();
        state.content = Arc::new(staging.content);
        state.last_refresh = Some(Instant::now());
    }

    pub fn discard(&self, staging: Staging<K, V>) {
        tracing::debug!(staged = staging.len(), "Cache refresh discarded");
    }

    /// Run a synchronous refresh: commit on `Ok`, discard on `Err`.
    pub fn refresh_with<E, F>(&self, fill: F) -> Result<(), E>
    where
        F: FnOnce(&mut Staging<K, V>) -> Result<(), E>,
    {
        let mut staging = self.begin_refresh();
        match fill(&mut staging) {
            Ok(()) => {
                self.commit(staging);
                Ok(())
            }
            Err(e) => {
                self.discard(staging);
                Err(e)
            }
        }
    }
}

impl InventoryCache {
    /// Entities of one class, sorted by id for a stable batch order.
    pub fn entities_of(&self, class: EntityClass) -> Vec<EntityId> {
        let content = self.snapshot();
        let mut ids: Vec<EntityId> = content
            .iter()
            .filter(|(_, entry)| entry.class == class)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cache_is_expired_and_empty() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(120));
        assert!(cache.is_expired());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or(&"missing".to_string(), 7), 7);
    }

    #[test]
    fn commit_publishes_content_and_restarts_clock() {
        let cache: Cache<String, u32> = Cache::new(Duration::from_secs(120));
        let mut staging = cache.begin_refresh();
        staging.set("foo".into(), 1);
        assert!(cache.get(&"foo".to_string()).is_none());

        cache.commit(staging);
        assert!(!cache.is_expired());
        assert_eq!(cache.get(&"foo".to_string()), Some(1));

        let later = Instant::now() + Duration::from_secs(121);
        assert!(cache.is_expired_at(later));
        assert!(!cache.is_expired_at(Instant::now() + Duration::from_secs(100)));
    }

    #[test]
    fn failed_refresh_keeps_previous_content_and_timestamp() {
        let cache: Cache<String, &str> = Cache::new(Duration::from_secs(120));
        let result: Result<(), &str> = cache.refresh_with(|staging| {
            staging.set("foo".into(), "bar");
            Ok(())
        });
        assert!(result.is_ok());

        let result: Result<(), &str> = cache.refresh_with(|staging| {
            assert!(staging.is_empty());
            staging.set("foo".into(), "baz");
            Err("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(cache.get(&"foo".to_string()), Some("bar"));
        assert!(!cache.is_expired());
    }

    #[test]
    fn failed_first_refresh_leaves_cache_expired() {
        let cache: Cache<u32, u32> = Cache::new(Duration::from_secs(600));
        let staging = {
            let mut staging = cache.begin_refresh();
            staging.set(1, 1);
            staging
        };
        cache.discard(staging);
        assert!(cache.is_expired());
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let cache: Cache<u32, u32> = Cache::new(Duration::from_secs(60));
        cache.set(1, 10);
        let before = cache.snapshot();

        let mut staging = cache.begin_refresh();
        staging.set(2, 20);
        cache.commit(staging);

        assert_eq!(before.get(&1), Some(&10));
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn reset_expires_and_clears() {
        let cache: Cache<u32, u32> = Cache::new(Duration::from_secs(60));
        let mut staging = cache.begin_refresh();
        staging.set(1, 1);
        cache.commit(staging);

        cache.reset();
        assert!(cache.is_expired());
        assert!(cache.is_empty());
    }

    #[test]
    fn entities_of_filters_by_class_in_id_order() {
        let cache = InventoryCache::new(Duration::from_secs(180));
        let entry = |class| InventoryEntry {
            class,
            name: "x".into(),
            tags: vec![format!("vsphere_type:{class}")],
            hostname: None,
        };
        cache.set(EntityId::from("vm-2"), entry(EntityClass::VirtualMachine));
        cache.set(EntityId::from("host-1"), entry(EntityClass::Host));
        cache.set(EntityId::from("vm-1"), entry(EntityClass::VirtualMachine));

        assert_eq!(
            cache.entities_of(EntityClass::VirtualMachine),
            vec![EntityId::from("vm-1"), EntityId::from("vm-2")]
        );
    }
}
