//! Cache store abstractions.
//!
//! A store is partitioned twice: first by [`CacheSpace`] (what kind of value is cached),
//! then by [`UserScope`] (whose value it is). Every operation names both, so there is no
//! way to read across users. Stores know nothing about invoices.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub mod inmemory;

pub use inmemory::{InMemoryStore, SpaceLimits, StoreStats};

/// Logical cache space. Each space has its own size bound and TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheSpace {
    /// Pages of records, keyed by query.
    List,
    /// Single records, keyed by identifier.
    Detail,
    /// Total counts, keyed by filter fingerprint.
    Count,
}

impl CacheSpace {
    pub const ALL: [CacheSpace; 3] = [CacheSpace::List, CacheSpace::Detail, CacheSpace::Count];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSpace::List => "list",
            CacheSpace::Detail => "detail",
            CacheSpace::Count => "count",
        }
    }
}

impl fmt::Display for CacheSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the active user; the partition key for every cache space.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserScope(String);

impl UserScope {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserScope(user_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserScope {
    fn from(s: &str) -> Self {
        UserScope::new(s)
    }
}

impl From<String> for UserScope {
    fn from(s: String) -> Self {
        UserScope(s)
    }
}

/// A cached value and the instant it stops being valid.
///
/// Entries are never mutated after creation, only replaced or removed.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Entry valid for `ttl` from now.
    pub fn new(value: V, ttl: Duration) -> Self {
        CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Entry valid until `expires_at`, which may already be in the past.
    pub fn expiring_at(value: V, expires_at: Instant) -> Self {
        CacheEntry { value, expires_at }
    }

    /// Valid iff `now < expires_at`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Instant::now())
    }
}

/// What to drop for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invalidation {
    /// A single key in one space.
    Key { space: CacheSpace, key: String },
    /// Every entry in one space.
    Space(CacheSpace),
}

impl Invalidation {
    pub fn key(space: CacheSpace, key: impl Into<String>) -> Self {
        Invalidation::Key {
            space,
            key: key.into(),
        }
    }
}

/// Trait for cache store implementations.
///
/// Methods take `&self`; implementations use interior mutability. Individual calls are
/// atomic per partition, but sequences of calls are not: two tasks interleaving
/// invalidate-then-repopulate on the same user may race. Callers that need ordering
/// must serialize their mutations.
///
/// Expiry is lazy. An expired entry is treated as absent and removed when it is next
/// looked up, or when [`CacheBackend::purge_expired`] is called.
pub trait CacheBackend<V: Clone>: Send + Sync {
    /// Retrieve a live value, removing it first if it has expired.
    fn get(&self, space: CacheSpace, user: &UserScope, key: &str) -> Option<V>;

    /// Store an entry. If the partition is full, the earliest-inserted entry is evicted
    /// and its key returned.
    fn put_entry(
        &self,
        space: CacheSpace,
        user: &UserScope,
        key: &str,
        entry: CacheEntry<V>,
    ) -> Option<String>;

    /// Store a value that expires after `ttl`.
    fn put(
        &self,
        space: CacheSpace,
        user: &UserScope,
        key: &str,
        value: V,
        ttl: Duration,
    ) -> Option<String> {
        self.put_entry(space, user, key, CacheEntry::new(value, ttl))
    }

    /// Remove one key or a whole space for `user`. Returns the number of entries removed.
    fn invalidate(&self, user: &UserScope, target: Invalidation) -> usize;

    /// Remove everything cached for `user` (logout).
    fn clear_user(&self, user: &UserScope) -> usize;

    /// Remove everything for every user.
    fn clear_all(&self);

    /// Drop every expired entry now. Returns the number removed.
    fn purge_expired(&self) -> usize;
}
