//! Repository configuration.
//!
//! Every tunable is injected through [`RepositoryConfig`]; nothing in the read or write
//! paths hardcodes a TTL or size bound.
//!
//! ```
//! use invoice_cache::backend::CacheSpace;
//! use invoice_cache::RepositoryConfig;
//! use std::time::Duration;
//!
//! let config = RepositoryConfig::default()
//!     .with_list_ttl(Duration::from_secs(60))
//!     .with_max_entries(CacheSpace::Detail, 200)
//!     .with_verbose_logging(true);
//! assert!(config.validate().is_ok());
//!
//! let from_file = RepositoryConfig::from_json(r#"{ "count_ttl_secs": 30 }"#).unwrap();
//! assert_eq!(from_file.count_ttl, Duration::from_secs(30));
//! assert_eq!(from_file.list_ttl, Duration::from_secs(300));
//! ```

use crate::backend::{CacheSpace, SpaceLimits};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for [`InvoiceRepository`](crate::InvoiceRepository).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Lifetime of cached list pages.
    #[serde(rename = "list_ttl_secs", with = "duration_secs")]
    pub list_ttl: Duration,

    /// Lifetime of cached totals. Shorter than lists so that a cached page is paired
    /// with a recently confirmed total.
    #[serde(rename = "count_ttl_secs", with = "duration_secs")]
    pub count_ttl: Duration,

    /// Lifetime of cached single records.
    #[serde(rename = "detail_ttl_secs", with = "duration_secs")]
    pub detail_ttl: Duration,

    /// Per-user size bound of each space.
    pub max_entries: SpaceLimits,

    /// Log every cache decision at debug level.
    pub verbose_logging: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            list_ttl: Duration::from_secs(300),
            count_ttl: Duration::from_secs(120),
            detail_ttl: Duration::from_secs(300),
            max_entries: SpaceLimits::default(),
            verbose_logging: false,
        }
    }
}

impl RepositoryConfig {
    /// Load from JSON. TTLs are whole seconds; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the JSON is malformed or the result fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RepositoryConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the store cannot honour.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any space allows zero entries.
    pub fn validate(&self) -> Result<()> {
        for space in CacheSpace::ALL {
            if self.max_entries.for_space(space) == 0 {
                return Err(Error::Config(format!(
                    "max entries for the {} space must be at least 1",
                    space
                )));
            }
        }
        Ok(())
    }

    /// TTL applied to values written into `space`.
    pub fn ttl_for(&self, space: CacheSpace) -> Duration {
        match space {
            CacheSpace::List => self.list_ttl,
            CacheSpace::Detail => self.detail_ttl,
            CacheSpace::Count => self.count_ttl,
        }
    }

    pub fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    pub fn with_count_ttl(mut self, ttl: Duration) -> Self {
        self.count_ttl = ttl;
        self
    }

    pub fn with_detail_ttl(mut self, ttl: Duration) -> Self {
        self.detail_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, space: CacheSpace, max_entries: usize) -> Self {
        self.max_entries.set(space, max_entries);
        self
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
