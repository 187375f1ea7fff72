//! List query parameters: pagination, sort order and filter criteria.

use crate::entity::{InvoiceRecord, InvoiceStatus};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One-based page selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Build a pagination, rejecting page 0 and empty pages.
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        let pagination = Pagination { page, page_size };
        pagination.validate()?;
        Ok(pagination)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::InvalidArgument("page is one-based".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidArgument(
                "page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of records on all pages before this one.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Whether records exist beyond this page, given how many this page holds.
    ///
    /// `(page - 1) * page_size + returned < total`
    pub fn has_more(&self, returned: usize, total: u64) -> bool {
        self.offset() + (returned as u64) < total
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 1,
            page_size: 20,
        }
    }
}

/// Field a list is ordered by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    InvoiceDate,
    Amount,
    InvoiceNumber,
    Status,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::InvoiceDate => "invoice_date",
            SortField::Amount => "amount",
            SortField::InvoiceNumber => "invoice_number",
            SortField::Status => "status",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order; newest invoices first by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(field: SortField) -> Self {
        Sort {
            field,
            ascending: true,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Sort {
            field,
            ascending: false,
        }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Sort::descending(SortField::InvoiceDate)
    }
}

/// Filter criteria for list queries.
///
/// An empty filter (the default) selects everything. Blank search text counts as empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceFilter {
    /// Free text matched against invoice number, seller and buyer.
    pub search: Option<String>,
    pub categories: Vec<String>,
    pub statuses: Vec<InvoiceStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

impl InvoiceFilter {
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_amount_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// True when at least one predicate narrows the result set.
    pub fn is_active(&self) -> bool {
        self.search_text().is_some()
            || !self.categories.is_empty()
            || !self.statuses.is_empty()
            || self.date_from.is_some()
            || self.date_to.is_some()
            || self.min_amount.is_some()
            || self.max_amount.is_some()
    }

    /// Canonical text form: `field=value` pairs in field-name order joined by `&`, list
    /// values sorted, de-duplicated and joined by `,`, search text lower-cased. Separator characters inside values
    /// are percent-escaped, so two filters share a canonical form iff they select the
    /// same records. Returns `None` for an inactive filter.
    pub fn canonical_form(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }

        let mut fields: BTreeMap<&'static str, String> = BTreeMap::new();

        if let Some(text) = self.search_text() {
            fields.insert("search", escape(&text.to_lowercase()));
        }
        if !self.categories.is_empty() {
            let mut categories: Vec<String> =
                self.categories.iter().map(|c| escape(c.trim())).collect();
            categories.sort();
            categories.dedup();
            fields.insert("category", categories.join(","));
        }
        if !self.statuses.is_empty() {
            let mut statuses: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
            statuses.sort_unstable();
            statuses.dedup();
            fields.insert("status", statuses.join(","));
        }
        if let Some(from) = self.date_from {
            fields.insert("date_from", from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = self.date_to {
            fields.insert("date_to", to.format("%Y-%m-%d").to_string());
        }
        if let Some(min) = self.min_amount {
            fields.insert("amount_min", canonical_amount(min));
        }
        if let Some(max) = self.max_amount {
            fields.insert("amount_max", canonical_amount(max));
        }

        let pairs: Vec<String> = fields
            .into_iter()
            .map(|(field, value)| format!("{}={}", field, value))
            .collect();
        Some(pairs.join("&"))
    }

    /// Whether `record` satisfies every active predicate.
    pub fn matches(&self, record: &InvoiceRecord) -> bool {
        if let Some(text) = self.search_text() {
            let needle = text.to_lowercase();
            let hit = [
                record.invoice_number.as_str(),
                record.seller_name.as_str(),
                record.buyer_name.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if !self.categories.is_empty() {
            let category = record.category.as_deref().unwrap_or("");
            if !self.categories.iter().any(|c| c.trim() == category) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if self.date_from.is_some_and(|from| record.invoice_date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| record.invoice_date > to) {
            return false;
        }
        if self.min_amount.is_some_and(|min| record.amount < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| record.amount > max) {
            return false;
        }
        true
    }
}

/// Separators of the canonical filter form, escaped inside values.
const FILTER_VALUE: &AsciiSet = &CONTROLS.add(b'%').add(b'&').add(b',').add(b'=');

fn escape(value: &str) -> String {
    utf8_percent_encode(value, FILTER_VALUE).to_string()
}

fn canonical_amount(value: f64) -> String {
    // -0.0 and 0.0 select the same records
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Everything needed to read one page of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub pagination: Pagination,
    pub filter: InvoiceFilter,
    pub sort: Sort,
    /// Skip the list cache even for an unfiltered query.
    pub force_refresh: bool,
}

impl ListQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        ListQuery {
            pagination: Pagination { page, page_size },
            ..ListQuery::default()
        }
    }

    pub fn with_filter(mut self, filter: InvoiceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}
