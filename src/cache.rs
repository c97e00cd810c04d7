//! In-process expiring caches.
//!
//! `TtlCache` is the generic store: absolute expiry fixed at insertion, lazy
//! eviction on `get`/`has`, no size bound. `TaskCache` layers the typed
//! board-item, preference and single-task caches on top of it.
//!
//! Time is read through `tokio::time::Instant` so tests can drive expiry with
//! a paused clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::monday::Task;
use crate::types::{CacheConfig, UserPreferences};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats<K> {
    pub size: usize,
    pub keys: Vec<K>,
}

/// Expiring key/value store guarded by a single mutex.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Store `value` until `now + ttl`.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.lock().insert(key, CacheEntry { value, expires_at });
    }

    /// Store `value` with the cache's default TTL.
    pub fn set_default(&self, key: K, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Return the value if present and unexpired. Expired entries are evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Same check as `get` without cloning the value out.
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Remove unconditionally. Returns whether an entry (expired or not) existed.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Occupancy including entries that expired but were not yet touched.
    pub fn stats(&self) -> CacheStats<K> {
        let entries = self.entries.lock();
        CacheStats {
            size: entries.len(),
            keys: entries.keys().cloned().collect(),
        }
    }
}

/// Typed caches used by the single-board command paths and the summary job.
///
/// Each store is built with its per-kind TTL as the default and the typed
/// setters insert with that default.
pub struct TaskCache {
    board_items: TtlCache<String, Vec<Task>>,
    preferences: TtlCache<String, UserPreferences>,
    tasks: TtlCache<String, Task>,
}

impl TaskCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            board_items: TtlCache::new(Duration::from_secs(config.board_items_ttl_secs)),
            preferences: TtlCache::new(Duration::from_secs(config.preferences_ttl_secs)),
            tasks: TtlCache::new(Duration::from_secs(config.task_ttl_secs)),
        }
    }

    pub fn get_board_items(&self, board_id: &str) -> Option<Vec<Task>> {
        self.board_items.get(&board_id.to_string())
    }

    pub fn set_board_items(&self, board_id: &str, items: Vec<Task>) {
        self.board_items.set_default(board_id.to_string(), items);
    }

    pub fn invalidate_board(&self, board_id: &str) {
        self.board_items.delete(&board_id.to_string());
    }

    /// Stored preferences, or the defaults when none are cached.
    pub fn get_user_preferences(&self, user_id: &str) -> UserPreferences {
        self.preferences
            .get(&user_id.to_string())
            .unwrap_or_default()
    }

    pub fn set_user_preferences(&self, user_id: &str, preferences: UserPreferences) {
        self.preferences.set_default(user_id.to_string(), preferences);
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(&task_id.to_string())
    }

    pub fn set_task(&self, task: Task) {
        self.tasks.set_default(task.id.clone(), task);
    }

    pub fn invalidate_task(&self, task_id: &str) {
        self.tasks.delete(&task_id.to_string());
    }

    /// Sweep all typed caches. Returns the total number of evicted entries.
    pub fn purge_expired(&self) -> usize {
        self.board_items.purge_expired() + self.preferences.purge_expired() + self.tasks.purge_expired()
    }

    /// Total entries held across the typed caches.
    pub fn size(&self) -> usize {
        self.board_items.stats().size + self.preferences.stats().size + self.tasks.stats().size
    }
}
