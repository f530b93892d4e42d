//! Exclusion of fully repaired history.
//!
//! A RECURRING item whose repairs add up to its whole amount no longer
//! contributes anything; dropping it together with its repairs keeps the
//! reconciliation tree small and avoids re-repairing it.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::InvoiceError;
use crate::models::{AccountInvoices, InvoiceItem, InvoiceItemType};
use crate::services::metrics;

#[derive(Debug, Default)]
struct LinkedItems<'a> {
    repairs: Vec<&'a InvoiceItem>,
    adjustments: Vec<&'a InvoiceItem>,
}

impl LinkedItems<'_> {
    fn repaired_amount(&self) -> Decimal {
        -self.repairs.iter().map(|i| i.amount_or_zero()).sum::<Decimal>()
    }

    fn adjusted_amount(&self) -> Decimal {
        -self.adjustments.iter().map(|i| i.amount_or_zero()).sum::<Decimal>()
    }
}

/// Ids of existing items to leave out of generation: fully repaired
/// RECURRING items and the repairs pointing at them.
///
/// When the history was loaded from a cutoff date, repairs whose original
/// item was not loaded are excluded too; without a cutoff that situation is
/// a corrupt history.
pub fn fully_repaired_item_ids(invoices: &AccountInvoices) -> Result<HashSet<Uuid>, InvoiceError> {
    let items_by_id: BTreeMap<Uuid, &InvoiceItem> = invoices.items().map(|i| (i.id, i)).collect();

    let mut linked: BTreeMap<Uuid, LinkedItems<'_>> = BTreeMap::new();
    for item in invoices.items() {
        let Some(linked_item_id) = item.linked_item_id else {
            continue;
        };
        match item.item_type {
            InvoiceItemType::RepairAdjustment => {
                linked.entry(linked_item_id).or_default().repairs.push(item)
            }
            InvoiceItemType::ItemAdjustment => {
                linked.entry(linked_item_id).or_default().adjustments.push(item)
            }
            _ => {}
        }
    }

    let optimized = invoices.cutoff_date.is_some();
    let mut excluded = HashSet::new();

    for (linked_item_id, children) in &linked {
        let original = items_by_id
            .get(linked_item_id)
            .filter(|original| original.amount.is_some());
        let Some(original) = original else {
            if children.repairs.is_empty() {
                continue;
            }
            if optimized {
                excluded.extend(children.repairs.iter().map(|r| r.id));
                continue;
            }
            return Err(InvoiceError::IllegalInvoicingState(format!(
                "repair items point to missing or unpriced item {linked_item_id}"
            )));
        };

        if original.item_type != InvoiceItemType::Recurring {
            continue;
        }
        let amount = original.amount_or_zero();
        if amount.is_zero() {
            continue;
        }

        let repaired = children.repaired_amount();
        let adjusted = children.adjusted_amount();

        if adjusted > amount {
            tracing::warn!(
                item_id = %linked_item_id,
                %amount,
                %adjusted,
                "Item adjusted beyond its amount, leaving it in place"
            );
            continue;
        }
        if repaired == amount {
            if !adjusted.is_zero() {
                return Err(InvoiceError::IllegalInvoicingState(format!(
                    "item {linked_item_id} is fully repaired but also adjusted by {adjusted}"
                )));
            }
            excluded.insert(*linked_item_id);
            excluded.extend(children.repairs.iter().map(|r| r.id));
        } else if repaired + adjusted > amount {
            return Err(InvoiceError::IllegalInvoicingState(format!(
                "item {linked_item_id} of {amount} is repaired by {repaired} and adjusted by {adjusted}"
            )));
        }
    }

    if !excluded.is_empty() {
        tracing::debug!(count = excluded.len(), "Pruned fully repaired items");
        metrics::record_pruned_items(excluded.len());
    }
    Ok(excluded)
}
