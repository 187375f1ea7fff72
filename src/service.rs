//! Per-user handle for web applications.
//!
//! [`InvoiceService`] pairs a shared [`InvoiceRepository`] with the signed-in user, so
//! request handlers never pass a [`UserScope`] around by hand.

use crate::backend::{CacheBackend, InMemoryStore, UserScope};
use crate::entity::{InvoicePayload, InvoiceRecord, InvoiceStats, InvoiceStatus, ListResult};
use crate::error::Result;
use crate::query::ListQuery;
use crate::remote::RecordService;
use crate::repository::{CachedValue, InvoiceRepository};
use std::sync::Arc;

/// Session-scoped view over a shared repository.
///
/// # Design
///
/// The repository uses `&self` methods and its store uses interior mutability, so one
/// `Arc<InvoiceRepository>` serves every session without an extra `Mutex`. Cloning a
/// service is an `Arc` increment.
///
/// # Example
///
/// ```ignore
/// use invoice_cache::{InvoiceRepository, InvoiceService, RepositoryConfig};
/// use invoice_cache::query::ListQuery;
/// use std::sync::Arc;
///
/// let repository = Arc::new(InvoiceRepository::new(http_service, RepositoryConfig::default())?);
///
/// // On sign-in
/// let session = InvoiceService::new(repository.clone(), "alice");
/// let first_page = session.get_list(&ListQuery::page(1, 20)).await?;
///
/// // On sign-out
/// session.logout();
/// ```
pub struct InvoiceService<R, B = InMemoryStore<CachedValue>>
where
    R: RecordService,
    B: CacheBackend<CachedValue>,
{
    repository: Arc<InvoiceRepository<R, B>>,
    user: UserScope,
}

impl<R, B> Clone for InvoiceService<R, B>
where
    R: RecordService,
    B: CacheBackend<CachedValue>,
{
    fn clone(&self) -> Self {
        InvoiceService {
            repository: Arc::clone(&self.repository),
            user: self.user.clone(),
        }
    }
}

impl<R, B> InvoiceService<R, B>
where
    R: RecordService,
    B: CacheBackend<CachedValue>,
{
    pub fn new(repository: Arc<InvoiceRepository<R, B>>, user: impl Into<UserScope>) -> Self {
        InvoiceService {
            repository,
            user: user.into(),
        }
    }

    /// Another session over the same repository.
    pub fn for_user(&self, user: impl Into<UserScope>) -> Self {
        Self::new(Arc::clone(&self.repository), user)
    }

    pub fn user(&self) -> &UserScope {
        &self.user
    }

    /// Get a reference to the underlying repository.
    pub fn repository(&self) -> &InvoiceRepository<R, B> {
        &self.repository
    }

    /// See [`InvoiceRepository::get_list`].
    pub async fn get_list(&self, query: &ListQuery) -> Result<ListResult> {
        self.repository.get_list(&self.user, query).await
    }

    /// See [`InvoiceRepository::get_by_id`].
    pub async fn get_by_id(&self, id: &str) -> Result<InvoiceRecord> {
        self.repository.get_by_id(&self.user, id).await
    }

    pub async fn get_stats(&self) -> Result<InvoiceStats> {
        self.repository.get_stats(&self.user).await
    }

    pub async fn create(&self, payload: &InvoicePayload) -> Result<InvoiceRecord> {
        self.repository.create(&self.user, payload).await
    }

    pub async fn update(&self, id: &str, payload: &InvoicePayload) -> Result<InvoiceRecord> {
        self.repository.update(&self.user, id, payload).await
    }

    pub async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        self.repository.update_status(&self.user, id, status).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(&self.user, id).await
    }

    pub async fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        self.repository.bulk_delete(&self.user, ids).await
    }

    /// Drop this user's cached list pages (pull-to-refresh).
    pub fn refresh_lists(&self) {
        self.repository.invalidate_all_lists(&self.user);
    }

    /// Drop everything cached for this user. Returns the number of entries removed.
    pub fn logout(&self) -> usize {
        self.repository.clear_user(&self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheSpace;
    use crate::config::RepositoryConfig;
    use crate::remote::{InMemoryRecordService, RemoteOp};
    use chrono::NaiveDate;

    fn shared_repository() -> Arc<InvoiceRepository<InMemoryRecordService>> {
        Arc::new(
            InvoiceRepository::new(InMemoryRecordService::new(), RepositoryConfig::default())
                .expect("valid config"),
        )
    }

    fn payload(number: &str) -> InvoicePayload {
        InvoicePayload::new(number, 12.5, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
    }

    #[test]
    fn test_service_clone_shares_repository() {
        let service1 = InvoiceService::new(shared_repository(), "alice");
        let service2 = service1.clone();

        assert!(Arc::ptr_eq(&service1.repository, &service2.repository));
        assert_eq!(service2.user().as_str(), "alice");
    }

    #[test]
    fn test_for_user_switches_scope() {
        let alice = InvoiceService::new(shared_repository(), "alice");
        let bob = alice.for_user("bob");

        assert!(Arc::ptr_eq(&alice.repository, &bob.repository));
        assert_eq!(bob.user().as_str(), "bob");
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = InvoiceService::new(shared_repository(), "alice");

        let created = service.create(&payload("INV-1")).await.expect("create");
        let page = service
            .get_list(&ListQuery::page(1, 20))
            .await
            .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, created.id);

        service
            .update_status(&created.id, InvoiceStatus::Paid)
            .await
            .expect("status");
        let fetched = service.get_by_id(&created.id).await.expect("detail");
        assert_eq!(fetched.status, InvoiceStatus::Paid);

        service.delete(&created.id).await.expect("delete");
        let page = service
            .get_list(&ListQuery::page(1, 20))
            .await
            .expect("list");
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_refresh_lists_forces_refetch() {
        let service = InvoiceService::new(shared_repository(), "alice");
        service.create(&payload("INV-1")).await.expect("create");

        service
            .get_list(&ListQuery::page(1, 20))
            .await
            .expect("warm");
        service.refresh_lists();
        service
            .get_list(&ListQuery::page(1, 20))
            .await
            .expect("refetch");

        assert_eq!(
            service.repository().remote().calls(RemoteOp::FetchList),
            2
        );
    }

    #[tokio::test]
    async fn test_logout_clears_only_own_entries() {
        let alice = InvoiceService::new(shared_repository(), "alice");
        let bob = alice.for_user("bob");
        alice.create(&payload("A-1")).await.expect("create");
        bob.create(&payload("B-1")).await.expect("create");
        alice
            .get_list(&ListQuery::page(1, 20))
            .await
            .expect("warm alice");
        bob.get_list(&ListQuery::page(1, 20))
            .await
            .expect("warm bob");

        assert!(alice.logout() > 0);

        let cache = alice.repository().cache();
        for space in CacheSpace::ALL {
            assert_eq!(cache.len(space, alice.user()), 0);
        }
        assert_eq!(cache.len(CacheSpace::List, bob.user()), 1);
    }

    #[tokio::test]
    async fn test_service_thread_safety() {
        let service = InvoiceService::new(shared_repository(), "seed");

        let mut handles = vec![];
        for i in 0..5 {
            let session = service.for_user(format!("user-{}", i));
            let handle = tokio::spawn(async move {
                session
                    .create(&payload(&format!("INV-{}", i)))
                    .await
                    .expect("Failed to create");
                let page = session
                    .get_list(&ListQuery::page(1, 20))
                    .await
                    .expect("Failed to list");
                assert_eq!(page.total, 1);
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }
    }
}
