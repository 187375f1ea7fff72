//! Invoice repository - the cache-aside coordinator.
//!
//! [`InvoiceRepository`] sits between application features and a [`RecordService`]. Reads
//! go through the cache where the [strategy](crate::strategy) allows it; writes always
//! reach the remote service first and only then invalidate cache spaces.
//!
//! # List read
//!
//! 1. Decide: an active filter or a forced refresh skips the list cache.
//! 2. Lookup (unfiltered only): on hit, confirm the total through the count cache or the
//!    remote count source and return without fetching the list.
//! 3. Fetch the page and the total concurrently. Either failure fails the read.
//! 4. Transform and validate each record. Invalid records are logged and dropped; the
//!    total stays as the remote reported it.
//! 5. Cache valid records individually, plus the page and total for unfiltered reads.
//! 6. `has_more = (page - 1) * page_size + items.len() < total`.
//!
//! # Concurrency
//!
//! Remote calls of one read run concurrently; nothing else does. Concurrent mutations
//! for the same user may interleave their invalidate and repopulate steps.

use crate::backend::{CacheBackend, CacheSpace, InMemoryStore, Invalidation, UserScope};
use crate::config::RepositoryConfig;
use crate::entity::{
    InvoicePayload, InvoiceRecord, InvoiceStats, InvoiceStatus, ListResult, RawInvoiceRecord,
};
use crate::error::{Error, Result};
use crate::key::CacheKeyBuilder;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::query::{InvoiceFilter, ListQuery, Pagination};
use crate::remote::{RecordService, RemoteError};
use crate::strategy::{CacheStrategy, DetailAction, Mutation};
use crate::validation::EntityValidator;
use std::time::Instant;

/// Debug log gated by the `verbose_logging` switch.
macro_rules! verbose {
    ($repo:expr, $($arg:tt)+) => {
        if $repo.config.verbose_logging {
            debug!($($arg)+);
        }
    };
}

/// Value stored in the repository's cache.
#[derive(Clone, Debug, PartialEq)]
pub enum CachedValue {
    /// A page of records (list space).
    Records(Vec<InvoiceRecord>),
    /// One record (detail space).
    Record(InvoiceRecord),
    /// A total (count space).
    Count(u64),
}

/// Read-through / write-through coordinator for invoice records.
///
/// # Example
///
/// ```ignore
/// use invoice_cache::{InvoiceRepository, RepositoryConfig};
/// use invoice_cache::backend::{InMemoryStore, UserScope};
/// use invoice_cache::query::ListQuery;
///
/// let config = RepositoryConfig::default();
/// let store = InMemoryStore::new(config.max_entries);
/// let repository = InvoiceRepository::with_backend(http_service, store, config)?;
///
/// let page = repository.get_list(&UserScope::new("alice"), &ListQuery::page(1, 20)).await?;
/// ```
pub struct InvoiceRepository<R, B = InMemoryStore<CachedValue>>
where
    R: RecordService,
    B: CacheBackend<CachedValue>,
{
    remote: R,
    cache: B,
    config: RepositoryConfig,
    metrics: Box<dyn CacheMetrics>,
}

impl<R: RecordService> InvoiceRepository<R> {
    /// Create a repository with its own in-memory store sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid.
    pub fn new(remote: R, config: RepositoryConfig) -> Result<Self> {
        let cache = InMemoryStore::new(config.max_entries);
        Self::with_backend(remote, cache, config)
    }
}

impl<R, B> InvoiceRepository<R, B>
where
    R: RecordService,
    B: CacheBackend<CachedValue>,
{
    /// Create a repository over an explicitly constructed store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid.
    pub fn with_backend(remote: R, cache: B, config: RepositoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(InvoiceRepository {
            remote,
            cache,
            config,
            metrics: Box::new(NoOpMetrics),
        })
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Get cache reference (for advanced use).
    pub fn cache(&self) -> &B {
        &self.cache
    }

    /// Get remote service reference (for advanced use).
    pub fn remote(&self) -> &R {
        &self.remote
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read one page of records.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: page or page size is zero
    /// - any remote classification (`Network`, `Server`, ...) if the list fetch or the
    ///   count fetch fails. Malformed records never cause an error here.
    pub async fn get_list(&self, user: &UserScope, query: &ListQuery) -> Result<ListResult> {
        query.pagination.validate()?;
        let timer = Instant::now();

        let strategy = CacheStrategy::for_list(query);
        let fingerprint = CacheKeyBuilder::build_fingerprint(&query.filter);
        let list_key =
            CacheKeyBuilder::list_key(&query.pagination, &query.sort, fingerprint.as_deref());

        verbose!(
            self,
            "» List read for {} key {} (strategy: {})",
            user,
            list_key,
            strategy
        );

        if strategy.reads_cache() {
            if let Some(items) = self.cached_records(user, &list_key) {
                let total = self.unfiltered_total(user).await?;
                self.metrics
                    .record_hit(CacheSpace::List, &list_key, timer.elapsed());
                verbose!(self, "✓ List served from cache in {:?}", timer.elapsed());
                return Ok(Self::page_of(items, total, &query.pagination));
            }
        }

        let (raw_records, total) = futures::try_join!(
            self.remote
                .fetch_list(user, query.pagination, &query.filter, query.sort),
            self.remote.fetch_count(user, &query.filter),
        )
        .map_err(|e| self.remote_failure("get_list", e))?;

        let items = self.accept_list(user, raw_records);

        if strategy.writes_cache() {
            self.store(
                CacheSpace::List,
                user,
                &list_key,
                CachedValue::Records(items.clone()),
            );
            self.store(
                CacheSpace::Count,
                user,
                &CacheKeyBuilder::count_key(None),
                CachedValue::Count(total),
            );
        }

        match strategy {
            CacheStrategy::Refresh => {
                self.metrics
                    .record_miss(CacheSpace::List, &list_key, timer.elapsed())
            }
            CacheStrategy::Bypass(reason) => {
                self.metrics
                    .record_bypass(CacheSpace::List, &list_key, reason, timer.elapsed())
            }
        }
        verbose!(
            self,
            "✓ List fetched remotely in {:?} ({} items, total {})",
            timer.elapsed(),
            items.len(),
            total
        );
        Ok(Self::page_of(items, total, &query.pagination))
    }

    /// Read one record, cache first.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: `id` is blank
    /// - `Error::DataFormat`: the fetched record fails validation
    /// - any remote classification if the fetch fails
    pub async fn get_by_id(&self, user: &UserScope, id: &str) -> Result<InvoiceRecord> {
        if id.trim().is_empty() {
            return Err(Error::InvalidArgument("record id is empty".to_string()));
        }
        let timer = Instant::now();
        let key = CacheKeyBuilder::detail_key(id);

        if let Some(CachedValue::Record(record)) = self.cache.get(CacheSpace::Detail, user, &key) {
            self.metrics
                .record_hit(CacheSpace::Detail, &key, timer.elapsed());
            verbose!(self, "✓ Record {} served from cache", id);
            return Ok(record);
        }

        let raw = self
            .remote
            .fetch_by_id(id)
            .await
            .map_err(|e| self.remote_failure("get_by_id", e))?;
        let record = self.accept(raw, "get_by_id")?;
        self.store_detail(user, &record);

        self.metrics
            .record_miss(CacheSpace::Detail, &key, timer.elapsed());
        Ok(record)
    }

    /// Aggregate figures. Never cached.
    ///
    /// # Errors
    ///
    /// Any remote classification if the fetch fails.
    pub async fn get_stats(&self, user: &UserScope) -> Result<InvoiceStats> {
        self.remote
            .fetch_stats(user)
            .await
            .map_err(|e| self.remote_failure("get_stats", e))
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Create a record. Lists and the total are invalidated; the new record is cached.
    ///
    /// # Errors
    ///
    /// - any remote classification if the create fails (cache untouched)
    /// - `Error::DataFormat` if the created record fails validation (lists and total
    ///   are still invalidated, since the remote state changed)
    pub async fn create(&self, user: &UserScope, payload: &InvoicePayload) -> Result<InvoiceRecord> {
        let raw = self
            .remote
            .create(user, payload)
            .await
            .map_err(|e| self.remote_failure(Mutation::Create.as_str(), e))?;

        self.invalidate_for(user, Mutation::Create, &[]);
        let record = self.accept(raw, Mutation::Create.as_str())?;
        self.store_detail(user, &record);

        verbose!(self, "✓ Created record {} for {}", record.id, user);
        Ok(record)
    }

    /// Replace a record's fields. Lists are invalidated and the cached record replaced.
    ///
    /// # Errors
    ///
    /// - any remote classification if the update fails (cache untouched)
    /// - `Error::DataFormat` if the returned record fails validation (its cached copy is
    ///   dropped)
    pub async fn update(
        &self,
        user: &UserScope,
        id: &str,
        payload: &InvoicePayload,
    ) -> Result<InvoiceRecord> {
        let raw = self
            .remote
            .update(id, payload)
            .await
            .map_err(|e| self.remote_failure(Mutation::Update.as_str(), e))?;

        self.invalidate_for(user, Mutation::Update, &[]);
        let record = match self.accept(raw, Mutation::Update.as_str()) {
            Ok(record) => record,
            Err(e) => {
                self.drop_detail(user, id);
                return Err(e);
            }
        };
        self.store_detail(user, &record);

        verbose!(self, "✓ Updated record {} for {}", id, user);
        Ok(record)
    }

    /// Change a record's status.
    ///
    /// # Errors
    ///
    /// Any remote classification if the call fails (cache untouched).
    pub async fn update_status(
        &self,
        user: &UserScope,
        id: &str,
        status: InvoiceStatus,
    ) -> Result<()> {
        self.remote
            .update_status(id, status)
            .await
            .map_err(|e| self.remote_failure(Mutation::UpdateStatus.as_str(), e))?;

        self.invalidate_for(user, Mutation::UpdateStatus, &[id]);
        verbose!(self, "✓ Set record {} to {} for {}", id, status, user);
        Ok(())
    }

    /// Delete one record.
    ///
    /// # Errors
    ///
    /// Any remote classification if the call fails (cache untouched).
    pub async fn delete(&self, user: &UserScope, id: &str) -> Result<()> {
        self.remote
            .delete(id)
            .await
            .map_err(|e| self.remote_failure(Mutation::Delete.as_str(), e))?;

        self.invalidate_for(user, Mutation::Delete, &[id]);
        verbose!(self, "✓ Deleted record {} for {}", id, user);
        Ok(())
    }

    /// Delete several records in one remote call. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Any remote classification if the call fails (cache untouched).
    pub async fn bulk_delete(&self, user: &UserScope, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.remote
            .bulk_delete(ids)
            .await
            .map_err(|e| self.remote_failure(Mutation::BulkDelete.as_str(), e))?;

        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.invalidate_for(user, Mutation::BulkDelete, &ids);
        verbose!(self, "✓ Deleted {} records for {}", ids.len(), user);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Explicit cache control
    // ------------------------------------------------------------------------

    /// Drop every cached list page for `user`.
    pub fn invalidate_all_lists(&self, user: &UserScope) {
        let removed = self
            .cache
            .invalidate(user, Invalidation::Space(CacheSpace::List));
        self.metrics.record_invalidate(CacheSpace::List, removed);
    }

    /// Drop everything cached for `user` (logout).
    pub fn clear_user(&self, user: &UserScope) -> usize {
        let removed = self.cache.clear_user(user);
        verbose!(self, "✓ Cleared {} cache entries for {}", removed, user);
        removed
    }

    /// Drop everything cached for every user.
    pub fn clear_all(&self) {
        self.cache.clear_all();
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn page_of(items: Vec<InvoiceRecord>, total: u64, pagination: &Pagination) -> ListResult {
        ListResult {
            has_more: pagination.has_more(items.len(), total),
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    fn cached_records(&self, user: &UserScope, key: &str) -> Option<Vec<InvoiceRecord>> {
        match self.cache.get(CacheSpace::List, user, key)? {
            CachedValue::Records(items) => Some(items),
            other => {
                warn!("Unexpected value in list cache at {}: {:?}", key, other);
                None
            }
        }
    }

    /// Unfiltered total, from the count cache or else the remote count source.
    async fn unfiltered_total(&self, user: &UserScope) -> Result<u64> {
        let key = CacheKeyBuilder::count_key(None);
        if let Some(CachedValue::Count(total)) = self.cache.get(CacheSpace::Count, user, &key) {
            return Ok(total);
        }

        let total = self
            .remote
            .fetch_count(user, &InvoiceFilter::default())
            .await
            .map_err(|e| self.remote_failure("fetch_count", e))?;
        self.store(CacheSpace::Count, user, &key, CachedValue::Count(total));
        Ok(total)
    }

    /// Transform and validate a record that the caller asked for explicitly.
    fn accept(&self, raw: RawInvoiceRecord, operation: &str) -> Result<InvoiceRecord> {
        let result = InvoiceRecord::try_from(raw).and_then(|record| {
            EntityValidator::validate(&record)?;
            Ok(record)
        });
        if let Err(e) = &result {
            self.metrics.record_error(operation, &e.to_string());
        }
        result
    }

    /// Transform and validate a page, dropping records that fail. Valid records are
    /// cached individually.
    fn accept_list(&self, user: &UserScope, raw_records: Vec<RawInvoiceRecord>) -> Vec<InvoiceRecord> {
        let mut items = Vec::with_capacity(raw_records.len());
        for raw in raw_records {
            let display_id = raw.display_id().to_string();
            let checked = InvoiceRecord::try_from(raw).and_then(|record| {
                EntityValidator::validate(&record)?;
                Ok(record)
            });
            match checked {
                Ok(record) => {
                    self.store_detail(user, &record);
                    items.push(record);
                }
                Err(e) => {
                    warn!("Dropping record {} from list for {}: {}", display_id, user, e);
                    self.metrics.record_dropped_record(&display_id, &e.to_string());
                }
            }
        }
        items
    }

    fn store(&self, space: CacheSpace, user: &UserScope, key: &str, value: CachedValue) {
        let ttl = self.config.ttl_for(space);
        if let Some(evicted) = self.cache.put(space, user, key, value, ttl) {
            verbose!(self, "Evicted {}/{} to make room for {}", space, evicted, key);
            self.metrics.record_eviction(space, &evicted);
        }
        self.metrics.record_set(space, key);
    }

    fn store_detail(&self, user: &UserScope, record: &InvoiceRecord) {
        self.store(
            CacheSpace::Detail,
            user,
            &CacheKeyBuilder::detail_key(&record.id),
            CachedValue::Record(record.clone()),
        );
    }

    fn drop_detail(&self, user: &UserScope, id: &str) -> usize {
        self.cache.invalidate(
            user,
            Invalidation::key(CacheSpace::Detail, CacheKeyBuilder::detail_key(id)),
        )
    }

    /// Apply the space-level part of `mutation`'s invalidation plan. Detail entries are
    /// cleared here only for `DetailAction::Clear`; populate and overwrite happen once
    /// the returned record has been validated.
    fn invalidate_for(&self, user: &UserScope, mutation: Mutation, ids: &[&str]) {
        let plan = mutation.invalidation_plan();

        if plan.detail == DetailAction::Clear {
            let removed: usize = ids.iter().map(|id| self.drop_detail(user, id)).sum();
            self.metrics.record_invalidate(CacheSpace::Detail, removed);
        }
        if plan.clear_lists {
            let removed = self
                .cache
                .invalidate(user, Invalidation::Space(CacheSpace::List));
            self.metrics.record_invalidate(CacheSpace::List, removed);
        }
        if plan.clear_count {
            let removed = self
                .cache
                .invalidate(user, Invalidation::Space(CacheSpace::Count));
            self.metrics.record_invalidate(CacheSpace::Count, removed);
        }

        verbose!(self, "✓ Invalidated {:?} for {} after {}", plan, user, mutation);
    }

    /// Classify a remote failure and report it.
    fn remote_failure(&self, operation: &str, err: RemoteError) -> Error {
        let error = Error::from(err);
        self.metrics.record_error(operation, &error.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheEntry;
    use crate::remote::{InMemoryRecordService, RemoteOp};
    use crate::strategy::BypassReason;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn alice() -> UserScope {
        UserScope::new("alice")
    }

    fn repository() -> InvoiceRepository<InMemoryRecordService> {
        InvoiceRepository::new(InMemoryRecordService::new(), RepositoryConfig::default())
            .expect("valid config")
    }

    fn payload(number: &str, amount: f64) -> InvoicePayload {
        InvoicePayload::new(number, amount, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
    }

    async fn seed(repo: &InvoiceRepository<InMemoryRecordService>, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let raw = repo
                .remote()
                .create(&alice(), &payload(&format!("INV-{:03}", i), 10.0 * i as f64))
                .await
                .expect("seed failed");
            ids.push(raw.id.expect("id assigned"));
        }
        repo.remote().reset_calls();
        ids
    }

    #[tokio::test]
    async fn test_unfiltered_list_is_cached() {
        let repo = repository();
        seed(&repo, 3).await;

        let first = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("first read");
        let second = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("second read");

        assert_eq!(first, second);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 1);
        // The total came from the count cache on the second read.
        assert_eq!(repo.remote().calls(RemoteOp::FetchCount), 1);
    }

    #[tokio::test]
    async fn test_cached_list_revalidates_total_when_count_expired() {
        let repo = repository();
        seed(&repo, 3).await;

        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("first read");
        repo.cache()
            .invalidate(&alice(), Invalidation::Space(CacheSpace::Count));

        let result = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("second read");

        assert_eq!(result.total, 3);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 1);
        assert_eq!(repo.remote().calls(RemoteOp::FetchCount), 2);
    }

    #[tokio::test]
    async fn test_total_never_taken_from_cached_list_length() {
        let repo = repository();
        seed(&repo, 3).await;

        // A cached page that disagrees with the count source.
        let key = CacheKeyBuilder::build_list_key(1, 20, Default::default(), false, None);
        repo.cache().put(
            CacheSpace::List,
            &alice(),
            &key,
            CachedValue::Records(vec![]),
            Duration::from_secs(60),
        );

        let result = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("read");
        assert!(result.items.is_empty());
        assert_eq!(result.total, 3);
        assert!(result.has_more);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 0);
        assert_eq!(repo.remote().calls(RemoteOp::FetchCount), 1);
    }

    #[tokio::test]
    async fn test_filtered_list_always_bypasses_cache() {
        let repo = repository();
        seed(&repo, 3).await;
        let query = ListQuery::page(1, 20)
            .with_filter(InvoiceFilter::default().with_amount_range(Some(5.0), None));

        let first = repo.get_list(&alice(), &query).await.expect("first read");
        repo.get_list(&alice(), &query).await.expect("second read");

        assert_eq!(first.total, 2);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 2);
        assert_eq!(repo.remote().calls(RemoteOp::FetchCount), 2);
        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Count, &alice()), 0);
        // Filtered reads still warm the detail cache.
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_skips_lookup_but_repopulates() {
        let repo = repository();
        seed(&repo, 2).await;

        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("first read");
        repo.remote()
            .create(&alice(), &payload("INV-NEW", 1.0))
            .await
            .expect("out-of-band create");

        let refreshed = repo
            .get_list(&alice(), &ListQuery::page(1, 20).with_force_refresh())
            .await
            .expect("forced read");
        assert_eq!(refreshed.total, 3);

        let cached = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("cached read");
        assert_eq!(cached.items.len(), 3);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 2);
    }

    #[tokio::test]
    async fn test_malformed_records_dropped_but_total_kept() {
        let repo = repository();
        seed(&repo, 9).await;
        repo.remote().insert_raw(
            &alice(),
            RawInvoiceRecord {
                id: Some("broken".to_string()),
                invoice_number: Some("INV-BAD".to_string()),
                amount: Some(5.0),
                invoice_date: Some("2024-05-01".to_string()),
                ..RawInvoiceRecord::default()
            },
        );

        let result = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("read succeeds despite bad record");

        assert_eq!(result.items.len(), 9);
        assert_eq!(result.total, 10);
        assert!(result.has_more);
        assert!(result.items.iter().all(|r| r.id != "broken"));
    }

    #[tokio::test]
    async fn test_count_failure_fails_list_read() {
        let repo = repository();
        seed(&repo, 2).await;
        repo.remote()
            .fail(RemoteOp::FetchCount, RemoteError::server("count unavailable"));

        let err = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Server(_)));
        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
    }

    #[tokio::test]
    async fn test_list_failure_is_classified() {
        let repo = repository();
        repo.remote()
            .fail(RemoteOp::FetchList, RemoteError::permission_denied("nope"));

        let err = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_invalid_pagination_rejected_without_remote_call() {
        let repo = repository();
        let err = repo
            .get_list(&alice(), &ListQuery::page(0, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_cache_first() {
        let repo = repository();
        let ids = seed(&repo, 1).await;

        let first = repo.get_by_id(&alice(), &ids[0]).await.expect("first");
        let second = repo.get_by_id(&alice(), &ids[0]).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(repo.remote().calls(RemoteOp::FetchById), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_served_from_list_warmup() {
        let repo = repository();
        let ids = seed(&repo, 2).await;

        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("list");
        repo.get_by_id(&alice(), &ids[1]).await.expect("detail");
        assert_eq!(repo.remote().calls(RemoteOp::FetchById), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_validation_failure_propagates() {
        let repo = repository();
        repo.remote().insert_raw(
            &alice(),
            RawInvoiceRecord {
                id: Some("broken".to_string()),
                invoice_number: Some("INV-BAD".to_string()),
                amount: Some(5.0),
                invoice_date: Some("2024-05-01".to_string()),
                ..RawInvoiceRecord::default()
            },
        );

        let err = repo.get_by_id(&alice(), "broken").await.unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let repo = repository();
        let err = repo
            .get_by_id(&alice(), "0190a6e2-7c3b-7d4e-9f10-2a3b4c5d6e7f")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_invalidates_lists_and_count() {
        let repo = repository();
        seed(&repo, 2).await;
        let before = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("before");

        let created = repo
            .create(&alice(), &payload("INV-NEW", 99.0))
            .await
            .expect("create");

        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Count, &alice()), 0);

        let after = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("after");
        assert_ne!(before, after);
        assert_eq!(after.total, before.total + 1);
        assert!(after.items.iter().any(|r| r.id == created.id));

        // The new record was cached on create.
        repo.get_by_id(&alice(), &created.id).await.expect("detail");
        assert_eq!(repo.remote().calls(RemoteOp::FetchById), 0);
    }

    #[tokio::test]
    async fn test_create_remote_failure_leaves_cache() {
        let repo = repository();
        seed(&repo, 1).await;
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");
        repo.remote()
            .fail(RemoteOp::Create, RemoteError::network("offline"));

        let err = repo
            .create(&alice(), &payload("INV-X", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 1);
    }

    #[tokio::test]
    async fn test_create_with_invalid_result_still_invalidates() {
        let repo = repository();
        seed(&repo, 1).await;
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");

        let err = repo
            .create(&alice(), &payload("INV-NEG", -5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Count, &alice()), 0);
    }

    #[tokio::test]
    async fn test_update_overwrites_detail_and_keeps_count() {
        let repo = repository();
        let ids = seed(&repo, 2).await;
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");

        let updated = repo
            .update(&alice(), &ids[0], &payload("INV-RENAMED", 5.0))
            .await
            .expect("update");
        assert_eq!(updated.invoice_number, "INV-RENAMED");

        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Count, &alice()), 1);
        let cached = repo.get_by_id(&alice(), &ids[0]).await.expect("detail");
        assert_eq!(cached.invoice_number, "INV-RENAMED");
        assert_eq!(repo.remote().calls(RemoteOp::FetchById), 0);
    }

    #[tokio::test]
    async fn test_update_with_invalid_result_drops_detail() {
        let repo = repository();
        let created = repo
            .create(&alice(), &payload("INV-1", 10.0))
            .await
            .expect("create");
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 1);

        let err = repo
            .update(&alice(), &created.id, &payload("INV-1", -3.0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DataFormat(_)));
        let detail_key = CacheKeyBuilder::detail_key(&created.id);
        assert!(repo
            .cache()
            .get(CacheSpace::Detail, &alice(), &detail_key)
            .is_none());
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
    }

    #[tokio::test]
    async fn test_update_status_clears_detail() {
        let repo = repository();
        let ids = seed(&repo, 1).await;
        repo.get_by_id(&alice(), &ids[0]).await.expect("warm");

        repo.update_status(&alice(), &ids[0], InvoiceStatus::Approved)
            .await
            .expect("status");

        let fresh = repo.get_by_id(&alice(), &ids[0]).await.expect("detail");
        assert_eq!(fresh.status, InvoiceStatus::Approved);
        assert_eq!(repo.remote().calls(RemoteOp::FetchById), 2);
    }

    #[tokio::test]
    async fn test_delete_clears_detail_lists_and_count() {
        let repo = repository();
        let ids = seed(&repo, 2).await;
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");

        repo.delete(&alice(), &ids[0]).await.expect("delete");

        assert_eq!(repo.cache().len(CacheSpace::List, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Count, &alice()), 0);
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 1);
        let err = repo.get_by_id(&alice(), &ids[0]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let repo = repository();
        let ids = seed(&repo, 3).await;
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("warm");

        repo.bulk_delete(&alice(), &ids[..2]).await.expect("bulk");

        assert_eq!(repo.remote().calls(RemoteOp::BulkDelete), 1);
        assert_eq!(repo.cache().len(CacheSpace::Detail, &alice()), 1);
        let after = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("after");
        assert_eq!(after.total, 1);
        assert_eq!(after.items[0].id, ids[2]);
    }

    #[tokio::test]
    async fn test_bulk_delete_empty_is_noop() {
        let repo = repository();
        repo.bulk_delete(&alice(), &[]).await.expect("noop");
        assert_eq!(repo.remote().calls(RemoteOp::BulkDelete), 0);
    }

    #[tokio::test]
    async fn test_mutation_only_touches_own_user() {
        let repo = repository();
        let bob = UserScope::new("bob");
        seed(&repo, 1).await;
        repo.remote()
            .create(&bob, &payload("BOB-1", 1.0))
            .await
            .expect("seed bob");

        repo.get_list(&bob, &ListQuery::page(1, 20))
            .await
            .expect("warm bob");
        repo.create(&alice(), &payload("INV-A", 1.0))
            .await
            .expect("create");

        assert_eq!(repo.cache().len(CacheSpace::List, &bob), 1);
        assert_eq!(repo.cache().len(CacheSpace::Count, &bob), 1);
    }

    #[tokio::test]
    async fn test_stats_are_never_cached() {
        let repo = repository();
        seed(&repo, 2).await;

        repo.get_stats(&alice()).await.expect("stats");
        let stats = repo.get_stats(&alice()).await.expect("stats");
        assert_eq!(stats.total_count, 2);
        assert_eq!(repo.remote().calls(RemoteOp::FetchStats), 2);
    }

    #[tokio::test]
    async fn test_expired_list_entry_is_refetched() {
        let repo = repository();
        seed(&repo, 1).await;
        let key = CacheKeyBuilder::build_list_key(1, 20, Default::default(), false, None);
        repo.cache().put_entry(
            CacheSpace::List,
            &alice(),
            &key,
            CacheEntry::expiring_at(
                CachedValue::Records(vec![]),
                tokio::time::Instant::now(),
            ),
        );

        let result = repo
            .get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("read");
        assert_eq!(result.items.len(), 1);
        assert_eq!(repo.remote().calls(RemoteOp::FetchList), 1);
    }

    #[tokio::test]
    async fn test_custom_metrics() {
        #[derive(Clone, Default)]
        struct TestMetrics {
            hits: Arc<Mutex<usize>>,
            misses: Arc<Mutex<usize>>,
            dropped: Arc<Mutex<Vec<String>>>,
        }

        impl CacheMetrics for TestMetrics {
            fn record_hit(&self, _space: CacheSpace, _key: &str, _duration: Duration) {
                *self.hits.lock().expect("Failed to lock hits") += 1;
            }

            fn record_miss(&self, _space: CacheSpace, _key: &str, _duration: Duration) {
                *self.misses.lock().expect("Failed to lock misses") += 1;
            }

            fn record_dropped_record(&self, record_id: &str, _reason: &str) {
                self.dropped
                    .lock()
                    .expect("Failed to lock dropped")
                    .push(record_id.to_string());
            }
        }

        let metrics = TestMetrics::default();
        let repo = repository().with_metrics(Box::new(metrics.clone()));
        seed(&repo, 1).await;
        repo.remote().insert_raw(&alice(), RawInvoiceRecord::default());

        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("miss");
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("hit");

        assert_eq!(*metrics.hits.lock().expect("Failed to lock hits"), 1);
        assert_eq!(*metrics.misses.lock().expect("Failed to lock misses"), 1);
        assert_eq!(
            *metrics.dropped.lock().expect("Failed to lock dropped"),
            vec!["<missing id>".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bypass_reads_are_not_misses() {
        #[derive(Clone, Default)]
        struct TestMetrics {
            misses: Arc<Mutex<usize>>,
            bypasses: Arc<Mutex<Vec<BypassReason>>>,
        }

        impl CacheMetrics for TestMetrics {
            fn record_miss(&self, _space: CacheSpace, _key: &str, _duration: Duration) {
                *self.misses.lock().expect("Failed to lock misses") += 1;
            }

            fn record_bypass(
                &self,
                _space: CacheSpace,
                _key: &str,
                reason: BypassReason,
                _duration: Duration,
            ) {
                self.bypasses
                    .lock()
                    .expect("Failed to lock bypasses")
                    .push(reason);
            }
        }

        let metrics = TestMetrics::default();
        let repo = repository().with_metrics(Box::new(metrics.clone()));
        seed(&repo, 2).await;

        let filtered = ListQuery::page(1, 20)
            .with_filter(InvoiceFilter::default().with_amount_range(Some(0.0), None));
        repo.get_list(&alice(), &filtered).await.expect("filtered");
        repo.get_list(&alice(), &ListQuery::page(1, 20).with_force_refresh())
            .await
            .expect("forced");

        assert_eq!(*metrics.misses.lock().expect("Failed to lock misses"), 0);
        assert_eq!(
            *metrics.bypasses.lock().expect("Failed to lock bypasses"),
            vec![BypassReason::Filtered, BypassReason::ForcedRefresh]
        );

        // The forced refresh stored the page, so this read is a plain hit
        repo.get_list(&alice(), &ListQuery::page(1, 20))
            .await
            .expect("hit");
        assert_eq!(*metrics.misses.lock().expect("Failed to lock misses"), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RepositoryConfig::default().with_max_entries(CacheSpace::Detail, 0);
        let result = InvoiceRepository::new(InMemoryRecordService::new(), config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
