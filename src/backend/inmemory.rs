//! In-memory cache store (default).
//!
//! Uses DashMap keyed by `(space, user)` so each user's partition of each space is an
//! independent shard. Within a partition, a map holds the entries and a deque records
//! insertion order, which makes FIFO eviction an explicit property of the structure.

use super::{CacheBackend, CacheEntry, CacheSpace, Invalidation, UserScope};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

type PartitionKey = (CacheSpace, UserScope);

/// Maximum number of entries per user in each space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceLimits {
    pub list: usize,
    pub detail: usize,
    pub count: usize,
}

impl SpaceLimits {
    pub fn for_space(&self, space: CacheSpace) -> usize {
        match space {
            CacheSpace::List => self.list,
            CacheSpace::Detail => self.detail,
            CacheSpace::Count => self.count,
        }
    }

    pub fn set(&mut self, space: CacheSpace, max_entries: usize) {
        match space {
            CacheSpace::List => self.list = max_entries,
            CacheSpace::Detail => self.detail = max_entries,
            CacheSpace::Count => self.count = max_entries,
        }
    }
}

impl Default for SpaceLimits {
    fn default() -> Self {
        SpaceLimits {
            list: 10,
            detail: 50,
            count: 10,
        }
    }
}

struct Partition<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
}

impl<V> Partition<V> {
    fn new() -> Self {
        Partition {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Insert `entry`, evicting the earliest-inserted key if the partition is full.
    /// Overwriting a key moves it to the back of the queue.
    fn insert(&mut self, key: &str, entry: CacheEntry<V>, max_entries: usize) -> Option<String> {
        self.remove(key);

        let mut evicted = None;
        if self.entries.len() >= max_entries.max(1) {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        self.order.push_back(key.to_string());
        self.entries.insert(key.to_string(), entry);
        evicted
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_valid_at(now));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Thread-safe in-memory cache store.
///
/// Cloning is cheap and clones share the same partitions.
///
/// # Example
///
/// ```
/// use invoice_cache::backend::{CacheBackend, CacheSpace, InMemoryStore, SpaceLimits, UserScope};
/// use std::time::Duration;
///
/// let store: InMemoryStore<u64> = InMemoryStore::new(SpaceLimits::default());
/// let alice = UserScope::new("alice");
///
/// store.put(CacheSpace::Count, &alice, "count:nofilter", 42, Duration::from_secs(120));
/// assert_eq!(store.get(CacheSpace::Count, &alice, "count:nofilter"), Some(42));
/// assert_eq!(store.get(CacheSpace::Count, &UserScope::new("bob"), "count:nofilter"), None);
/// ```
pub struct InMemoryStore<V> {
    partitions: Arc<DashMap<PartitionKey, Partition<V>>>,
    limits: SpaceLimits,
}

impl<V> Clone for InMemoryStore<V> {
    fn clone(&self) -> Self {
        InMemoryStore {
            partitions: Arc::clone(&self.partitions),
            limits: self.limits,
        }
    }
}

impl<V> InMemoryStore<V> {
    /// Create an empty store with the given per-user limits.
    pub fn new(limits: SpaceLimits) -> Self {
        InMemoryStore {
            partitions: Arc::new(DashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> SpaceLimits {
        self.limits
    }

    /// Number of stored entries (live or expired) in one partition.
    pub fn len(&self, space: CacheSpace, user: &UserScope) -> usize {
        self.partitions
            .get(&(space, user.clone()))
            .map(|p| p.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| p.len() == 0)
    }

    /// Snapshot of store occupancy.
    pub fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let mut stats = StoreStats::default();
        for partition in self.partitions.iter() {
            stats.partitions += 1;
            stats.total_entries += partition.len();
            stats.expired_entries += partition
                .entries
                .values()
                .filter(|e| !e.is_valid_at(now))
                .count();
        }
        stats
    }

    /// Print store statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Cache store: {} partitions, {} entries ({} expired)",
            stats.partitions, stats.total_entries, stats.expired_entries
        );
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new(SpaceLimits::default())
    }
}

impl<V: Clone + Send + Sync> CacheBackend<V> for InMemoryStore<V> {
    fn get(&self, space: CacheSpace, user: &UserScope, key: &str) -> Option<V> {
        let mut partition = self.partitions.get_mut(&(space, user.clone()))?;

        match partition.entries.get(key) {
            Some(entry) if entry.is_valid_at(Instant::now()) => {
                debug!("✓ Store GET {}/{}/{} -> HIT", space, user, key);
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => {
                debug!("✓ Store GET {}/{}/{} -> MISS", space, user, key);
                return None;
            }
        }

        partition.remove(key);
        debug!("✓ Store GET {}/{}/{} -> EXPIRED (removed)", space, user, key);
        None
    }

    fn put_entry(
        &self,
        space: CacheSpace,
        user: &UserScope,
        key: &str,
        entry: CacheEntry<V>,
    ) -> Option<String> {
        let max_entries = self.limits.for_space(space);
        let mut partition = self
            .partitions
            .entry((space, user.clone()))
            .or_insert_with(Partition::new);

        let evicted = partition.insert(key, entry, max_entries);
        if let Some(oldest) = &evicted {
            debug!(
                "✓ Store EVICT {}/{}/{} (partition full at {})",
                space, user, oldest, max_entries
            );
        }
        debug!("✓ Store PUT {}/{}/{}", space, user, key);
        evicted
    }

    fn invalidate(&self, user: &UserScope, target: Invalidation) -> usize {
        match target {
            Invalidation::Key { space, key } => {
                let removed = self
                    .partitions
                    .get_mut(&(space, user.clone()))
                    .map(|mut p| p.remove(&key))
                    .unwrap_or(false);
                debug!("✓ Store INVALIDATE {}/{}/{}", space, user, key);
                usize::from(removed)
            }
            Invalidation::Space(space) => {
                let removed = self
                    .partitions
                    .remove(&(space, user.clone()))
                    .map(|(_, p)| p.len())
                    .unwrap_or(0);
                debug!("✓ Store INVALIDATE {}/{} ({} entries)", space, user, removed);
                removed
            }
        }
    }

    fn clear_user(&self, user: &UserScope) -> usize {
        let mut removed = 0;
        for space in CacheSpace::ALL {
            if let Some((_, p)) = self.partitions.remove(&(space, user.clone())) {
                removed += p.len();
            }
        }
        debug!("✓ Store CLEAR_USER {} ({} entries)", user, removed);
        removed
    }

    fn clear_all(&self) {
        self.partitions.clear();
        warn!("⚠ Store CLEAR_ALL executed - all users cleared!");
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed: usize = self
            .partitions
            .iter_mut()
            .map(|mut p| p.purge_expired(now))
            .sum();
        self.partitions.retain(|_, p| p.len() > 0);
        debug!("✓ Store PURGE_EXPIRED removed {} entries", removed);
        removed
    }
}

/// Store occupancy statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub partitions: usize,
    pub total_entries: usize,
    pub expired_entries: usize,
}
