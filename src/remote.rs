//! Remote record service boundary.
//!
//! The [`RecordService`] trait is the only way the repository reaches the source of
//! truth. Implement it over whatever transport the application uses; failures are
//! reported as a structured [`RemoteError`] whose `kind` the repository maps onto
//! [`Error`](crate::Error) without inspecting message text.
//!
//! # Mocking for Tests
//!
//! [`InMemoryRecordService`] keeps records in memory, counts calls per operation and can
//! be told to fail specific operations:
//!
//! ```
//! use invoice_cache::backend::UserScope;
//! use invoice_cache::remote::{InMemoryRecordService, RemoteError, RemoteOp, RecordService};
//! use invoice_cache::query::InvoiceFilter;
//!
//! # tokio_test_block_on(async {
//! let remote = InMemoryRecordService::new();
//! remote.fail(RemoteOp::FetchCount, RemoteError::network("connection reset"));
//!
//! let result = remote.fetch_count(&UserScope::new("alice"), &InvoiceFilter::default()).await;
//! assert!(result.is_err());
//! assert_eq!(remote.calls(RemoteOp::FetchCount), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::backend::UserScope;
use crate::entity::{InvoicePayload, InvoiceRecord, InvoiceStats, InvoiceStatus, RawInvoiceRecord};
use crate::error::Error;
use crate::query::{InvoiceFilter, Pagination, Sort, SortField};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Classification of a remote failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    Network,
    PermissionDenied,
    NotFound,
    DataFormat,
    Server,
    Unknown,
}

/// Structured error returned by [`RecordService`] implementations.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server, message)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        match e.kind {
            RemoteErrorKind::Network => Error::Network(e.message),
            RemoteErrorKind::PermissionDenied => Error::PermissionDenied(e.message),
            RemoteErrorKind::NotFound => Error::NotFound(e.message),
            RemoteErrorKind::DataFormat => Error::DataFormat(e.message),
            RemoteErrorKind::Server => Error::Server(e.message),
            RemoteErrorKind::Unknown => Error::Unknown(e.message),
        }
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Trait for the remote record service (source of truth).
///
/// Implementations do no caching, no retries and no timeouts of their own concern to
/// this crate; callers wrap transports as they see fit.
///
/// # Errors
///
/// Every method returns `Err(RemoteError)` when the call fails. Set `kind` as precisely
/// as the transport allows; `RemoteErrorKind::Unknown` is the fallback.
#[allow(async_fn_in_trait)]
pub trait RecordService: Send + Sync {
    /// One page of records for `user`, filtered and sorted remotely.
    async fn fetch_list(
        &self,
        user: &UserScope,
        pagination: Pagination,
        filter: &InvoiceFilter,
        sort: Sort,
    ) -> RemoteResult<Vec<RawInvoiceRecord>>;

    /// Number of records for `user` matching `filter`.
    async fn fetch_count(&self, user: &UserScope, filter: &InvoiceFilter) -> RemoteResult<u64>;

    async fn fetch_by_id(&self, id: &str) -> RemoteResult<RawInvoiceRecord>;

    /// Create a record owned by `user`, returning it with its assigned id.
    async fn create(
        &self,
        user: &UserScope,
        payload: &InvoicePayload,
    ) -> RemoteResult<RawInvoiceRecord>;

    async fn update(&self, id: &str, payload: &InvoicePayload) -> RemoteResult<RawInvoiceRecord>;

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> RemoteResult<()>;

    async fn delete(&self, id: &str) -> RemoteResult<()>;

    async fn bulk_delete(&self, ids: &[String]) -> RemoteResult<()>;

    /// Aggregate figures for `user`.
    async fn fetch_stats(&self, user: &UserScope) -> RemoteResult<InvoiceStats>;
}

// ============================================================================
// In-Memory Test Service
// ============================================================================

/// Operations of [`RecordService`], for call counting and fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchList,
    FetchCount,
    FetchById,
    Create,
    Update,
    UpdateStatus,
    Delete,
    BulkDelete,
    FetchStats,
}

struct StoredRecord {
    owner: UserScope,
    raw: RawInvoiceRecord,
}

#[derive(Default)]
struct ServiceState {
    records: Vec<StoredRecord>,
    calls: HashMap<RemoteOp, usize>,
    failures: HashMap<RemoteOp, RemoteError>,
}

/// In-memory [`RecordService`] for tests and local development.
///
/// Records are kept in insertion order. Raw records may be seeded in any shape,
/// including malformed ones, to exercise partial-failure handling. Malformed records
/// that cannot be decoded only match unfiltered queries.
#[derive(Default)]
pub struct InMemoryRecordService {
    state: Mutex<ServiceState>,
}

impl InMemoryRecordService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and return the injected failure for `op`, if any.
    fn begin(&self, op: RemoteOp) -> RemoteResult<MutexGuard<'_, ServiceState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = state.failures.get(&op).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    /// Seed a raw record for `owner`, exactly as given.
    pub fn insert_raw(&self, owner: &UserScope, raw: RawInvoiceRecord) {
        self.state().records.push(StoredRecord {
            owner: owner.clone(),
            raw,
        });
    }

    /// Seed a well-formed record for `owner`.
    pub fn insert(&self, owner: &UserScope, record: &InvoiceRecord) {
        self.insert_raw(owner, RawInvoiceRecord::from(record));
    }

    /// Make every call to `op` fail with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, op: RemoteOp, error: RemoteError) {
        self.state().failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of stored records across all owners.
    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    fn matching<'a>(
        state: &'a ServiceState,
        user: &UserScope,
        filter: &InvoiceFilter,
    ) -> Vec<(Option<InvoiceRecord>, &'a RawInvoiceRecord)> {
        state
            .records
            .iter()
            .filter(|stored| &stored.owner == user)
            .map(|stored| (InvoiceRecord::try_from(stored.raw.clone()).ok(), &stored.raw))
            .filter(|(decoded, _)| match decoded {
                Some(record) => filter.matches(record),
                None => !filter.is_active(),
            })
            .collect()
    }

    fn find_mut<'a>(state: &'a mut ServiceState, id: &str) -> RemoteResult<&'a mut RawInvoiceRecord> {
        state
            .records
            .iter_mut()
            .map(|stored| &mut stored.raw)
            .find(|raw| raw.id.as_deref() == Some(id))
            .ok_or_else(|| RemoteError::not_found(format!("invoice {} does not exist", id)))
    }
}

fn compare(a: Option<&InvoiceRecord>, b: Option<&InvoiceRecord>, sort: Sort) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        // Undecodable records sort last regardless of direction.
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => return Ordering::Equal,
    };
    let ordering = match sort.field {
        SortField::InvoiceDate => a.invoice_date.cmp(&b.invoice_date),
        SortField::Amount => a.amount.total_cmp(&b.amount),
        SortField::InvoiceNumber => a.invoice_number.cmp(&b.invoice_number),
        SortField::Status => a.status.cmp(&b.status),
    };
    if sort.ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

fn apply_payload(raw: &mut RawInvoiceRecord, payload: &InvoicePayload) {
    raw.invoice_number = Some(payload.invoice_number.clone());
    raw.seller_name = Some(payload.seller_name.clone());
    raw.buyer_name = Some(payload.buyer_name.clone());
    raw.amount = Some(payload.amount);
    raw.tax_amount = Some(payload.tax_amount);
    raw.total_amount = payload.total_amount;
    raw.invoice_date = Some(payload.invoice_date.format("%Y-%m-%d").to_string());
    raw.category = payload.category.clone();
}

impl RecordService for InMemoryRecordService {
    async fn fetch_list(
        &self,
        user: &UserScope,
        pagination: Pagination,
        filter: &InvoiceFilter,
        sort: Sort,
    ) -> RemoteResult<Vec<RawInvoiceRecord>> {
        let state = self.begin(RemoteOp::FetchList)?;
        let mut rows = Self::matching(&state, user, filter);
        rows.sort_by(|(a, _), (b, _)| compare(a.as_ref(), b.as_ref(), sort));

        Ok(rows
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .map(|(_, raw)| raw.clone())
            .collect())
    }

    async fn fetch_count(&self, user: &UserScope, filter: &InvoiceFilter) -> RemoteResult<u64> {
        let state = self.begin(RemoteOp::FetchCount)?;
        Ok(Self::matching(&state, user, filter).len() as u64)
    }

    async fn fetch_by_id(&self, id: &str) -> RemoteResult<RawInvoiceRecord> {
        let state = self.begin(RemoteOp::FetchById)?;
        state
            .records
            .iter()
            .find(|stored| stored.raw.id.as_deref() == Some(id))
            .map(|stored| stored.raw.clone())
            .ok_or_else(|| RemoteError::not_found(format!("invoice {} does not exist", id)))
    }

    async fn create(
        &self,
        user: &UserScope,
        payload: &InvoicePayload,
    ) -> RemoteResult<RawInvoiceRecord> {
        let mut state = self.begin(RemoteOp::Create)?;
        let mut raw = RawInvoiceRecord {
            id: Some(uuid::Uuid::now_v7().to_string()),
            status: Some(InvoiceStatus::Pending.as_str().to_string()),
            ..RawInvoiceRecord::default()
        };
        apply_payload(&mut raw, payload);

        state.records.push(StoredRecord {
            owner: user.clone(),
            raw: raw.clone(),
        });
        Ok(raw)
    }

    async fn update(&self, id: &str, payload: &InvoicePayload) -> RemoteResult<RawInvoiceRecord> {
        let mut state = self.begin(RemoteOp::Update)?;
        let raw = Self::find_mut(&mut state, id)?;
        apply_payload(raw, payload);
        Ok(raw.clone())
    }

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> RemoteResult<()> {
        let mut state = self.begin(RemoteOp::UpdateStatus)?;
        let raw = Self::find_mut(&mut state, id)?;
        raw.status = Some(status.as_str().to_string());
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.begin(RemoteOp::Delete)?;
        let before = state.records.len();
        state
            .records
            .retain(|stored| stored.raw.id.as_deref() != Some(id));
        if state.records.len() == before {
            return Err(RemoteError::not_found(format!(
                "invoice {} does not exist",
                id
            )));
        }
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[String]) -> RemoteResult<()> {
        let mut state = self.begin(RemoteOp::BulkDelete)?;
        state.records.retain(|stored| match stored.raw.id.as_deref() {
            Some(id) => !ids.iter().any(|target| target == id),
            None => true,
        });
        Ok(())
    }

    async fn fetch_stats(&self, user: &UserScope) -> RemoteResult<InvoiceStats> {
        let state = self.begin(RemoteOp::FetchStats)?;
        let mut stats = InvoiceStats::default();
        for (decoded, _) in Self::matching(&state, user, &InvoiceFilter::default()) {
            stats.total_count += 1;
            if let Some(record) = decoded {
                stats.total_amount += record.amount;
                *stats.by_status.entry(record.status).or_insert(0) += 1;
            }
        }
        Ok(stats)
    }
}
