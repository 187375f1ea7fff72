//! Observability hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to feed hit/miss/eviction figures into a monitoring system:
//!
//! ```ignore
//! use invoice_cache::backend::CacheSpace;
//! use invoice_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, space: CacheSpace, _key: &str, _duration: Duration) {
//!         // counter!("invoice_cache_hits", "space" => space.as_str()).inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let repository = InvoiceRepository::new(remote, config)?
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! The repository defaults to [`NoOpMetrics`]. [`LogMetrics`] keeps the default method
//! bodies, which report through the `log` crate.

use crate::backend::CacheSpace;
use crate::strategy::BypassReason;
use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// A read was answered from the cache.
    fn record_hit(&self, space: CacheSpace, key: &str, duration: Duration) {
        debug!("Cache HIT: {}/{} took {:?}", space, key, duration);
    }

    /// A read had to go to the remote service.
    fn record_miss(&self, space: CacheSpace, key: &str, duration: Duration) {
        debug!("Cache MISS: {}/{} took {:?}", space, key, duration);
    }

    /// A read skipped the cache lookup on purpose. Not counted as a miss.
    fn record_bypass(
        &self,
        space: CacheSpace,
        key: &str,
        reason: BypassReason,
        duration: Duration,
    ) {
        debug!(
            "Cache BYPASS: {}/{} ({:?}) took {:?}",
            space, key, reason, duration
        );
    }

    /// A value was written to the cache.
    fn record_set(&self, space: CacheSpace, key: &str) {
        debug!("Cache SET: {}/{}", space, key);
    }

    /// Entries were removed after a mutation.
    fn record_invalidate(&self, space: CacheSpace, removed: usize) {
        debug!("Cache INVALIDATE: {} ({} entries)", space, removed);
    }

    /// A full partition pushed out its oldest entry.
    fn record_eviction(&self, space: CacheSpace, evicted_key: &str) {
        debug!("Cache EVICT: {}/{}", space, evicted_key);
    }

    /// A malformed record was left out of a list result.
    fn record_dropped_record(&self, record_id: &str, reason: &str) {
        warn!("Dropped record {}: {}", record_id, reason);
    }

    /// A remote call or validation failed.
    fn record_error(&self, operation: &str, error: &str) {
        warn!("Cache ERROR in {}: {}", operation, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _space: CacheSpace, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _space: CacheSpace, _key: &str, _duration: Duration) {}
    fn record_bypass(
        &self,
        _space: CacheSpace,
        _key: &str,
        _reason: BypassReason,
        _duration: Duration,
    ) {
    }
    fn record_set(&self, _space: CacheSpace, _key: &str) {}
    fn record_invalidate(&self, _space: CacheSpace, _removed: usize) {}
    fn record_eviction(&self, _space: CacheSpace, _evicted_key: &str) {}
    fn record_dropped_record(&self, _record_id: &str, _reason: &str) {}
    fn record_error(&self, _operation: &str, _error: &str) {}
}

/// Metrics that only write to the log.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
