//! Invoice item model.
//!
//! Every kind of line shares one struct; `item_type` drives behaviour in the
//! pruner and the reconciliation tree.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::billing_event::BillingEvent;

/// Invoice item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceItemType {
    Fixed,
    Recurring,
    Usage,
    RepairAdjustment,
    ItemAdjustment,
    Credit,
    CreditBalanceAdjustment,
    ExternalCharge,
}

impl InvoiceItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceItemType::Fixed => "fixed",
            InvoiceItemType::Recurring => "recurring",
            InvoiceItemType::Usage => "usage",
            InvoiceItemType::RepairAdjustment => "repair_adjustment",
            InvoiceItemType::ItemAdjustment => "item_adjustment",
            InvoiceItemType::Credit => "credit",
            InvoiceItemType::CreditBalanceAdjustment => "credit_balance_adjustment",
            InvoiceItemType::ExternalCharge => "external_charge",
        }
    }

    /// Items whose end date bounds what the subscription has been charged for.
    pub fn is_charged_through_source(&self) -> bool {
        matches!(
            self,
            InvoiceItemType::Fixed | InvoiceItemType::Recurring | InvoiceItemType::Usage
        )
    }
}

/// Line item on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    pub item_type: InvoiceItemType,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    #[serde(default)]
    pub bundle_id: Option<Uuid>,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub phase_name: Option<String>,
    #[serde(default)]
    pub usage_name: Option<String>,
    pub start_date: NaiveDate,
    /// Exclusive.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// `None` for $0 placeholder items.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    pub currency: String,
    /// Item this one repairs or adjusts.
    #[serde(default)]
    pub linked_item_id: Option<Uuid>,
}

impl InvoiceItem {
    pub fn new(
        item_type: InvoiceItemType,
        invoice_id: Uuid,
        account_id: Uuid,
        start_date: NaiveDate,
        currency: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            account_id,
            item_type,
            subscription_id: None,
            bundle_id: None,
            plan_name: None,
            phase_name: None,
            usage_name: None,
            start_date,
            end_date: None,
            amount: None,
            rate: None,
            quantity: None,
            currency: currency.to_string(),
            linked_item_id: None,
        }
    }

    /// Attach subscription, bundle, plan and phase from a billing event.
    pub fn for_event(mut self, event: &BillingEvent) -> Self {
        self.subscription_id = Some(event.subscription_id);
        self.bundle_id = Some(event.bundle_id);
        self.plan_name = Some(event.plan_name.clone());
        self.phase_name = Some(event.phase_name.clone());
        self
    }

    /// Point at `item` and inherit its subscription identity.
    pub fn linked_to(mut self, item: &InvoiceItem) -> Self {
        self.linked_item_id = Some(item.id);
        self.subscription_id = item.subscription_id;
        self.bundle_id = item.bundle_id;
        self.plan_name = item.plan_name.clone();
        self.phase_name = item.phase_name.clone();
        self
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_usage(mut self, usage_name: &str, quantity: Option<Decimal>) -> Self {
        self.usage_name = Some(usage_name.to_string());
        self.quantity = quantity;
        self
    }

    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }

    /// Number of days covered, zero for open-ended items.
    pub fn days(&self) -> i64 {
        self.end_date
            .map(|end| (end - self.start_date).num_days())
            .unwrap_or(0)
    }

    /// Value equality, ignoring identifiers and invoice membership.
    pub fn matches(&self, other: &InvoiceItem) -> bool {
        self.item_type == other.item_type
            && self.subscription_id == other.subscription_id
            && self.plan_name == other.plan_name
            && self.phase_name == other.phase_name
            && self.usage_name == other.usage_name
            && self.start_date == other.start_date
            && self.end_date == other.end_date
            && self.amount_or_zero() == other.amount_or_zero()
            && self.rate == other.rate
            && self.currency == other.currency
    }

    /// Ordering used for generated output.
    pub fn sort_key(&self) -> (Option<Uuid>, NaiveDate, InvoiceItemType, Option<NaiveDate>) {
        (
            self.subscription_id,
            self.start_date,
            self.item_type,
            self.end_date,
        )
    }
}
