//! Integrity checks applied to every record before it is cached or returned.

use crate::entity::InvoiceRecord;
use crate::error::{Error, Result};
use chrono::{Days, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// How far in the future an invoice date may lie.
pub const MAX_FUTURE_DAYS: u64 = 365;

/// Canonical identifier shape: hyphenated UUID.
static ID_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("identifier pattern is valid")
});

/// Pure record validator.
///
/// Rules run in a fixed order and stop at the first failure:
///
/// 1. identifier is not empty
/// 2. invoice number is not empty
/// 3. amount is not negative
/// 4. total amount, when present, is not negative
/// 5. invoice date is at most [`MAX_FUTURE_DAYS`] after today
/// 6. identifier has the canonical format
pub struct EntityValidator;

impl EntityValidator {
    /// Validate against today's date (UTC).
    pub fn validate(record: &InvoiceRecord) -> Result<()> {
        Self::validate_at(record, Utc::now().date_naive())
    }

    /// Validate with an explicit notion of "today".
    pub fn validate_at(record: &InvoiceRecord, today: NaiveDate) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::DataFormat("identifier is empty".to_string()));
        }
        if record.invoice_number.trim().is_empty() {
            return Err(Error::DataFormat(format!(
                "record {} has an empty invoice number",
                record.id
            )));
        }
        // Written as a negated comparison so NaN is rejected too.
        if !(record.amount >= 0.0) {
            return Err(Error::DataFormat(format!(
                "record {} has negative amount {}",
                record.id, record.amount
            )));
        }
        if let Some(total) = record.total_amount {
            if !(total >= 0.0) {
                return Err(Error::DataFormat(format!(
                    "record {} has negative total amount {}",
                    record.id, total
                )));
            }
        }
        let latest = today
            .checked_add_days(Days::new(MAX_FUTURE_DAYS))
            .unwrap_or(NaiveDate::MAX);
        if record.invoice_date > latest {
            return Err(Error::DataFormat(format!(
                "record {} is dated {}, more than {} days ahead",
                record.id, record.invoice_date, MAX_FUTURE_DAYS
            )));
        }
        if !ID_FORMAT.is_match(&record.id) {
            return Err(Error::DataFormat(format!(
                "identifier {} is not in canonical format",
                record.id
            )));
        }
        Ok(())
    }
}
