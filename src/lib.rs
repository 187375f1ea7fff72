//! # invoice-cache
//!
//! A cache-aside data layer for invoice records, sitting between application features
//! and a remote record service.
//!
//! ## Features
//!
//! - **User Scoped:** Every cached value belongs to exactly one user; logout clears it all
//! - **Bounded:** Per-space TTLs and FIFO size limits, all injected through configuration
//! - **Filter Aware:** Filtered queries always read fresh; unfiltered pages are cached
//! - **Tolerant Lists:** Malformed records are dropped from a page instead of failing it
//! - **Write Through:** Mutations hit the remote service first, then invalidate
//! - **Transport Agnostic:** Bring any [`RecordService`] implementation
//!
//! ## Quick Start
//!
//! ```ignore
//! use invoice_cache::{InvoiceRepository, InvoiceService, RepositoryConfig};
//! use invoice_cache::entity::InvoicePayload;
//! use invoice_cache::query::{InvoiceFilter, ListQuery};
//! use std::sync::Arc;
//!
//! // 1. Implement RecordService over your HTTP client
//! struct HttpInvoices { /* ... */ }
//! impl RecordService for HttpInvoices { /* ... */ }
//!
//! // 2. Build one repository for the whole application
//! let config = RepositoryConfig::from_json(&std::fs::read_to_string("cache.json")?)?;
//! let repository = Arc::new(InvoiceRepository::new(HttpInvoices::new(), config)?);
//!
//! // 3. Hand each signed-in user a session
//! let session = InvoiceService::new(repository.clone(), "alice");
//!
//! // Cached after the first call
//! let page = session.get_list(&ListQuery::page(1, 20)).await?;
//!
//! // Always fetched remotely
//! let travel = session
//!     .get_list(&ListQuery::page(1, 20).with_filter(InvoiceFilter::default().with_category("travel")))
//!     .await?;
//!
//! // Invalidates this user's lists and total
//! session.create(&payload).await?;
//!
//! // Drops everything cached for this user
//! session.logout();
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`backend`] | user-partitioned TTL + FIFO store |
//! | [`key`] | deterministic list, detail and count keys |
//! | [`validation`] | integrity rules for decoded records |
//! | [`strategy`] | cache decisions for reads and writes |
//! | [`repository`] | the orchestrator |
//! | [`service`] | per-user session handle |

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod observability;
pub mod query;
pub mod remote;
pub mod repository;
pub mod service;
pub mod strategy;
pub mod validation;

// Re-exports for convenience
pub use backend::{CacheBackend, InMemoryStore, UserScope};
pub use config::RepositoryConfig;
pub use entity::{InvoicePayload, InvoiceRecord, InvoiceStats, InvoiceStatus, ListResult};
pub use error::{Error, ErrorKind, Result};
pub use key::CacheKeyBuilder;
pub use observability::CacheMetrics;
pub use query::{InvoiceFilter, ListQuery, Pagination, Sort, SortField};
pub use remote::{RecordService, RemoteError};
pub use repository::{CachedValue, InvoiceRepository};
pub use service::InvoiceService;
pub use strategy::CacheStrategy;
pub use validation::EntityValidator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
