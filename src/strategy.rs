//! Cache decisions for reads and writes.
//!
//! Two tables live here so they can be read (and tested) apart from the repository:
//!
//! # List reads
//!
//! | Query | Strategy | Reads list cache | Writes list + count cache |
//! |-------|----------|------------------|---------------------------|
//! | no filter | `Refresh` | yes | yes |
//! | no filter, forced refresh | `Bypass(ForcedRefresh)` | no | yes |
//! | any active filter | `Bypass(Filtered)` | no | no |
//!
//! Filtered queries always go to the remote service. They are numerous and rarely
//! repeated, and serving them from cache risks subtly stale narrow views. Their records
//! still warm the detail cache.
//!
//! # Mutations
//!
//! | Mutation | Detail | Lists | Count |
//! |----------|--------|-------|-------|
//! | `Create` | populate new id | clear all | clear |
//! | `Update` | overwrite | clear all | untouched |
//! | `UpdateStatus` | clear | clear all | untouched |
//! | `Delete` | clear | clear all | clear |
//! | `BulkDelete` | clear each id | clear all (once) | clear (once) |
//!
//! Lists are always cleared space-wide for the user: a list key cannot be mapped back to
//! the ids it contained. Cached values are never patched in place.

use crate::query::ListQuery;
use std::fmt;

/// Why a list read skipped the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BypassReason {
    /// At least one filter predicate is active.
    Filtered,
    /// The caller asked for fresh data.
    ForcedRefresh,
}

/// Strategy for a list read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// **Refresh**: Try cache first, fall back to the remote service on miss.
    #[default]
    Refresh,

    /// **Bypass**: Skip the cache lookup and always fetch remotely.
    Bypass(BypassReason),
}

impl CacheStrategy {
    /// Decide how to serve `query`. An active filter wins over a forced refresh.
    pub fn for_list(query: &ListQuery) -> Self {
        if query.filter.is_active() {
            CacheStrategy::Bypass(BypassReason::Filtered)
        } else if query.force_refresh {
            CacheStrategy::Bypass(BypassReason::ForcedRefresh)
        } else {
            CacheStrategy::Refresh
        }
    }

    /// Whether the list cache may answer this read.
    pub fn reads_cache(&self) -> bool {
        matches!(self, CacheStrategy::Refresh)
    }

    /// Whether the fetched page and total may be stored for later reads.
    pub fn writes_cache(&self) -> bool {
        !matches!(self, CacheStrategy::Bypass(BypassReason::Filtered))
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::Bypass(BypassReason::Filtered) => write!(f, "Bypass(filtered)"),
            CacheStrategy::Bypass(BypassReason::ForcedRefresh) => {
                write!(f, "Bypass(forced refresh)")
            }
        }
    }
}

/// Kinds of write that touch the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    UpdateStatus,
    Delete,
    BulkDelete,
}

/// What happens to the detail entry of each affected id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailAction {
    /// Store the record returned by the remote service under its new id.
    Populate,
    /// Replace the cached record with the one returned by the remote service.
    Overwrite,
    /// Drop the cached record.
    Clear,
}

/// Cache spaces a mutation affects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub detail: DetailAction,
    pub clear_lists: bool,
    pub clear_count: bool,
}

impl Mutation {
    pub fn invalidation_plan(&self) -> InvalidationPlan {
        match self {
            Mutation::Create => InvalidationPlan {
                detail: DetailAction::Populate,
                clear_lists: true,
                clear_count: true,
            },
            Mutation::Update => InvalidationPlan {
                detail: DetailAction::Overwrite,
                clear_lists: true,
                clear_count: false,
            },
            Mutation::UpdateStatus => InvalidationPlan {
                detail: DetailAction::Clear,
                clear_lists: true,
                clear_count: false,
            },
            Mutation::Delete | Mutation::BulkDelete => InvalidationPlan {
                detail: DetailAction::Clear,
                clear_lists: true,
                clear_count: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::Create => "create",
            Mutation::Update => "update",
            Mutation::UpdateStatus => "update_status",
            Mutation::Delete => "delete",
            Mutation::BulkDelete => "bulk_delete",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
