//! Cache key management utilities.

use crate::query::{InvoiceFilter, Pagination, Sort, SortField};
use sha2::{Digest, Sha256};

/// Fingerprint slot value for queries without an active filter.
pub const NO_FILTER: &str = "nofilter";

/// Length of the hex fingerprint embedded in keys.
const FINGERPRINT_LEN: usize = 16;

/// Builder for cache keys.
///
/// All functions are pure: identical logical inputs always produce identical keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key for one page of a list query.
    ///
    /// Format: `list:{page}:{page_size}:{sort_field}:{asc|desc}:{fingerprint|nofilter}`
    pub fn build_list_key(
        page: u32,
        page_size: u32,
        sort_field: SortField,
        sort_ascending: bool,
        fingerprint: Option<&str>,
    ) -> String {
        let page = page.to_string();
        let page_size = page_size.to_string();
        let direction = if sort_ascending { "asc" } else { "desc" };
        Self::build_composite(&[
            "list",
            &page,
            &page_size,
            sort_field.as_str(),
            direction,
            fingerprint.unwrap_or(NO_FILTER),
        ])
    }

    /// [`build_list_key`](Self::build_list_key) over query types.
    pub fn list_key(pagination: &Pagination, sort: &Sort, fingerprint: Option<&str>) -> String {
        Self::build_list_key(
            pagination.page,
            pagination.page_size,
            sort.field,
            sort.ascending,
            fingerprint,
        )
    }

    /// Key for a single record.
    pub fn detail_key(id: &str) -> String {
        Self::build_composite(&["invoice", id])
    }

    /// Key for a total count.
    pub fn count_key(fingerprint: Option<&str>) -> String {
        Self::build_composite(&["count", fingerprint.unwrap_or(NO_FILTER)])
    }

    /// Digest of the filter's canonical form, or `None` when no predicate is active.
    ///
    /// Filters that differ only in field order, list order or duplicated list values
    /// fingerprint identically.
    pub fn build_fingerprint(filter: &InvoiceFilter) -> Option<String> {
        let canonical = filter.canonical_form()?;
        let digest = Sha256::digest(canonical.as_bytes());
        let mut fingerprint = hex::encode(digest);
        fingerprint.truncate(FINGERPRINT_LEN);
        Some(fingerprint)
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }
}
