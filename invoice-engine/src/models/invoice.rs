//! Invoice model.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invoice_item::{InvoiceItem, InvoiceItemType};

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Committed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Committed => "committed",
        }
    }
}

/// Invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub account_id: Uuid,
    pub invoice_date: NaiveDate,
    pub target_date: NaiveDate,
    pub currency: String,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    pub fn new(
        account_id: Uuid,
        invoice_date: NaiveDate,
        target_date: NaiveDate,
        currency: &str,
        status: InvoiceStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            invoice_date,
            target_date,
            currency: currency.to_string(),
            status,
            items: Vec::new(),
        }
    }

    pub fn add_items(&mut self, items: impl IntoIterator<Item = InvoiceItem>) {
        self.items.extend(items);
    }

    pub fn has_item_of_type(&self, item_type: InvoiceItemType) -> bool {
        self.items.iter().any(|i| i.item_type == item_type)
    }

    /// Sum of all item amounts.
    pub fn balance(&self) -> Decimal {
        self.items.iter().map(InvoiceItem::amount_or_zero).sum()
    }
}

/// Existing invoices for an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInvoices {
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    /// Earliest date whose history was actually loaded. Items before it are
    /// absent, so generation must not propose anything there.
    #[serde(default)]
    pub cutoff_date: Option<NaiveDate>,
}

impl AccountInvoices {
    pub fn new(invoices: Vec<Invoice>) -> Self {
        Self {
            invoices,
            cutoff_date: None,
        }
    }

    pub fn with_cutoff_date(mut self, cutoff_date: NaiveDate) -> Self {
        self.cutoff_date = Some(cutoff_date);
        self
    }

    pub fn items(&self) -> impl Iterator<Item = &InvoiceItem> {
        self.invoices.iter().flat_map(|i| i.items.iter())
    }

    pub fn find(&self, invoice_id: &Uuid) -> Option<&Invoice> {
        self.invoices.iter().find(|i| i.id == *invoice_id)
    }
}

/// Kind of dry run requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DryRunType {
    TargetDate,
    UpcomingInvoice,
    SubscriptionAction,
}

/// Dry-run context forwarded to the usage record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunInfo {
    pub dry_run_type: DryRunType,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}
