//! Invoice domain types.
//!
//! The remote service speaks [`RawInvoiceRecord`], a loosely typed shape where every field
//! may be absent. The repository converts each raw record into an [`InvoiceRecord`] and
//! runs it through the validator before anything is cached or returned.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an invoice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(InvoiceStatus::Pending),
            "approved" => Ok(InvoiceStatus::Approved),
            "rejected" => Ok(InvoiceStatus::Rejected),
            "paid" => Ok(InvoiceStatus::Paid),
            other => Err(Error::DataFormat(format!("unknown invoice status: {}", other))),
        }
    }
}

/// Immutable snapshot of one invoice as last fetched from the remote service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: String,
    pub invoice_number: String,
    pub seller_name: String,
    pub buyer_name: String,
    /// Amount before tax.
    pub amount: f64,
    pub tax_amount: f64,
    pub total_amount: Option<f64>,
    pub invoice_date: NaiveDate,
    pub status: InvoiceStatus,
    pub category: Option<String>,
}

/// Record as delivered by the remote service, before transformation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInvoiceRecord {
    pub id: Option<String>,
    pub invoice_number: Option<String>,
    pub seller_name: Option<String>,
    pub buyer_name: Option<String>,
    pub amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub invoice_date: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
}

impl RawInvoiceRecord {
    /// Identifier for log lines, even when the record is malformed.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<missing id>")
    }
}

fn parse_invoice_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| Error::DataFormat(format!("unparseable invoice date: {}", raw)))
}

impl TryFrom<RawInvoiceRecord> for InvoiceRecord {
    type Error = Error;

    /// Structural conversion only. Missing text fields become empty strings so that
    /// integrity rules stay in one place, the validator.
    fn try_from(raw: RawInvoiceRecord) -> Result<Self> {
        let amount = raw.amount.ok_or_else(|| {
            Error::DataFormat(format!("record {} has no amount", raw.display_id()))
        })?;
        let invoice_date = match raw.invoice_date.as_deref() {
            Some(date) => parse_invoice_date(date)?,
            None => {
                return Err(Error::DataFormat(format!(
                    "record {} has no invoice date",
                    raw.display_id()
                )))
            }
        };
        let status = match raw.status.as_deref() {
            Some(status) => status.parse()?,
            None => InvoiceStatus::default(),
        };

        Ok(InvoiceRecord {
            id: raw.id.unwrap_or_default(),
            invoice_number: raw.invoice_number.unwrap_or_default(),
            seller_name: raw.seller_name.unwrap_or_default(),
            buyer_name: raw.buyer_name.unwrap_or_default(),
            amount,
            tax_amount: raw.tax_amount.unwrap_or(0.0),
            total_amount: raw.total_amount,
            invoice_date,
            status,
            category: raw.category.filter(|c| !c.trim().is_empty()),
        })
    }
}

impl From<&InvoiceRecord> for RawInvoiceRecord {
    fn from(record: &InvoiceRecord) -> Self {
        RawInvoiceRecord {
            id: Some(record.id.clone()),
            invoice_number: Some(record.invoice_number.clone()),
            seller_name: Some(record.seller_name.clone()),
            buyer_name: Some(record.buyer_name.clone()),
            amount: Some(record.amount),
            tax_amount: Some(record.tax_amount),
            total_amount: record.total_amount,
            invoice_date: Some(record.invoice_date.format("%Y-%m-%d").to_string()),
            status: Some(record.status.as_str().to_string()),
            category: record.category.clone(),
        }
    }
}

/// Fields supplied by the application when creating or updating an invoice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub invoice_number: String,
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub buyer_name: String,
    pub amount: f64,
    #[serde(default)]
    pub tax_amount: f64,
    #[serde(default)]
    pub total_amount: Option<f64>,
    pub invoice_date: NaiveDate,
    #[serde(default)]
    pub category: Option<String>,
}

impl InvoicePayload {
    pub fn new(invoice_number: impl Into<String>, amount: f64, invoice_date: NaiveDate) -> Self {
        InvoicePayload {
            invoice_number: invoice_number.into(),
            seller_name: String::new(),
            buyer_name: String::new(),
            amount,
            tax_amount: 0.0,
            total_amount: None,
            invoice_date,
            category: None,
        }
    }

    pub fn with_parties(mut self, seller: impl Into<String>, buyer: impl Into<String>) -> Self {
        self.seller_name = seller.into();
        self.buyer_name = buyer.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Aggregate figures for one user. Always fetched fresh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total_count: u64,
    pub total_amount: f64,
    pub by_status: BTreeMap<InvoiceStatus, u64>,
}

/// One page of records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub items: Vec<InvoiceRecord>,
    /// Total reported by the remote count source, not the number of valid items.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

#[cfg(test)]
impl InvoiceRecord {
    pub(crate) fn sample(invoice_number: &str, amount: f64) -> Self {
        InvoiceRecord {
            id: "0190a6e2-7c3b-7d4e-9f10-2a3b4c5d6e7f".to_string(),
            invoice_number: invoice_number.to_string(),
            seller_name: "Acme Supplies".to_string(),
            buyer_name: "Globex".to_string(),
            amount,
            tax_amount: amount * 0.1,
            total_amount: Some(amount * 1.1),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            status: InvoiceStatus::Pending,
            category: Some("office".to_string()),
        }
    }
}
