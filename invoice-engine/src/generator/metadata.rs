//! Generation result: the invoice plus what the caller needs to schedule
//! the next run and to mark billed usage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    BillingMode, Invoice, InvoiceItem, InvoiceItemType, InvoiceStatus, NotificationDates,
    TrackingRecordId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceWithMetadata {
    /// `None` when nothing is left to invoice.
    pub invoice: Option<Invoice>,
    pub tracking_ids: BTreeSet<TrackingRecordId>,
    pub notification_dates: NotificationDates,
    pub usage_zero_amount_disabled: bool,
    /// Subscriptions grouped by the date they are now charged through.
    pub charged_through_dates: BTreeMap<NaiveDate, Vec<Uuid>>,
}

impl InvoiceWithMetadata {
    /// Result of a run that produced no invoice at all.
    pub fn empty(usage_zero_amount_disabled: bool) -> Self {
        Self {
            usage_zero_amount_disabled,
            ..Self::default()
        }
    }

    pub fn build(
        mut invoice: Invoice,
        tracking_ids: BTreeSet<TrackingRecordId>,
        mut notification_dates: NotificationDates,
        usage_zero_amount_disabled: bool,
    ) -> Self {
        // Notification dates come from proposed items, not from the delta:
        // an IN_ADVANCE date with nothing left to bill would re-trigger the
        // same empty run forever.
        for (subscription_id, dates) in notification_dates.iter_mut() {
            let Some(next_date) = dates.next_recurring_date else {
                continue;
            };
            if dates.recurring_billing_mode == BillingMode::InAdvance
                && !has_recurring_item(&invoice, *subscription_id)
                && !has_item_on(&invoice, next_date)
            {
                dates.reset_next_recurring_date();
            }
        }

        let charged_through_dates = charged_through_dates(&invoice);

        if usage_zero_amount_disabled {
            invoice.items.retain(|item| !is_zero_usage(item));
        }

        Self {
            invoice: (!invoice.items.is_empty()).then_some(invoice),
            tracking_ids,
            notification_dates,
            usage_zero_amount_disabled,
            charged_through_dates,
        }
    }

    pub fn has_invoice(&self) -> bool {
        self.invoice.is_some()
    }
}

fn has_recurring_item(invoice: &Invoice, subscription_id: Uuid) -> bool {
    invoice.items.iter().any(|item| {
        item.item_type == InvoiceItemType::Recurring && item.subscription_id == Some(subscription_id)
    })
}

/// Any item starting or ending on `date`, e.g. a repair.
fn has_item_on(invoice: &Invoice, date: NaiveDate) -> bool {
    invoice
        .items
        .iter()
        .any(|item| item.start_date == date || item.end_date == Some(date))
}

fn is_zero_usage(item: &InvoiceItem) -> bool {
    item.item_type == InvoiceItemType::Usage
        && item.amount_or_zero().is_zero()
        && item.quantity.is_none_or(|quantity| quantity <= Decimal::ZERO)
}

/// Latest date each subscription is charged through. Only committed
/// invoices move charged-through dates.
fn charged_through_dates(invoice: &Invoice) -> BTreeMap<NaiveDate, Vec<Uuid>> {
    if invoice.status != InvoiceStatus::Committed {
        return BTreeMap::new();
    }

    let mut per_subscription: BTreeMap<Uuid, NaiveDate> = BTreeMap::new();
    for item in invoice
        .items
        .iter()
        .filter(|item| item.item_type.is_charged_through_source())
    {
        let Some(subscription_id) = item.subscription_id else {
            continue;
        };
        let date = item.end_date.unwrap_or(item.start_date);
        per_subscription
            .entry(subscription_id)
            .and_modify(|current| *current = (*current).max(date))
            .or_insert(date);
    }

    let mut per_date: BTreeMap<NaiveDate, Vec<Uuid>> = BTreeMap::new();
    for (subscription_id, date) in per_subscription {
        per_date.entry(date).or_default().push(subscription_id);
    }
    per_date
}
