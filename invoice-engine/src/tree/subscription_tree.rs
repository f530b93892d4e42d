//! Per-subscription reconciliation of existing and proposed items.
//!
//! Existing RECURRING items minus the intervals already repaired give the
//! coverage currently billed. Proposed RECURRING items are compared against
//! that coverage, restricted to items of the same kind (plan, phase, rate):
//! proposed portions nobody covers become new items, existing portions no
//! proposed item covers are negated with REPAIR_ADJUSTMENT items.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::interval::{DateInterval, IntervalSet};
use crate::error::InvoiceError;
use crate::generator::money::round_amount;
use crate::generator::proration::calculate_proration_between_dates;
use crate::models::{InvoiceItem, InvoiceItemType};

/// Existing RECURRING item with its repair and adjustment bookkeeping.
#[derive(Debug)]
struct ExistingNode {
    item: InvoiceItem,
    interval: DateInterval,
    remaining: IntervalSet,
    repaired_amount: Decimal,
    adjusted_amount: Decimal,
}

impl ExistingNode {
    fn new(item: InvoiceItem, interval: DateInterval) -> Self {
        Self {
            remaining: IntervalSet::from_interval(interval),
            interval,
            item,
            repaired_amount: Decimal::ZERO,
            adjusted_amount: Decimal::ZERO,
        }
    }

    fn is_unrepaired(&self) -> bool {
        self.remaining.covers(&self.interval)
    }

    fn is_same_kind(&self, proposed: &InvoiceItem) -> bool {
        if self.item.plan_name != proposed.plan_name
            || self.item.phase_name != proposed.phase_name
            || self.item.rate.unwrap_or(Decimal::ZERO) != proposed.rate.unwrap_or(Decimal::ZERO)
        {
            return false;
        }
        // Same interval at a different price is a different charge.
        let same_interval = proposed.start_date == self.interval.start
            && proposed.end_date == Some(self.interval.end);
        !(same_interval
            && self.is_unrepaired()
            && self.item.amount_or_zero() != proposed.amount_or_zero())
    }

    fn net_amount(&self) -> Decimal {
        self.item.amount_or_zero() - self.adjusted_amount - self.repaired_amount
    }

    /// Negate the portion `piece`, capped by what has not already been
    /// repaired or adjusted.
    fn repair(&mut self, piece: DateInterval, target_invoice_id: Uuid) -> Option<InvoiceItem> {
        let amount = self.item.amount_or_zero();
        if amount <= Decimal::ZERO {
            return None;
        }
        let prorated = if piece == self.interval {
            amount
        } else {
            let fraction =
                calculate_proration_between_dates(piece.start, piece.end, self.interval.days());
            round_amount(amount * fraction, &self.item.currency)
        };
        let repaired = prorated.min(self.net_amount());
        if repaired <= Decimal::ZERO {
            return None;
        }
        self.repaired_amount += repaired;

        Some(
            InvoiceItem::new(
                InvoiceItemType::RepairAdjustment,
                target_invoice_id,
                self.item.account_id,
                piece.start,
                &self.item.currency,
            )
            .linked_to(&self.item)
            .with_end_date(piece.end)
            .with_amount(-repaired),
        )
    }
}

#[derive(Debug)]
pub struct SubscriptionItemTree {
    subscription_id: Uuid,
    target_invoice_id: Uuid,
    existing_recurring: Vec<InvoiceItem>,
    existing_repairs: Vec<InvoiceItem>,
    existing_adjustments: Vec<InvoiceItem>,
    /// FIXED and $0 RECURRING items: never repaired, only matched.
    existing_ignored: Vec<InvoiceItem>,
}

impl SubscriptionItemTree {
    pub fn new(subscription_id: Uuid, target_invoice_id: Uuid) -> Self {
        Self {
            subscription_id,
            target_invoice_id,
            existing_recurring: Vec::new(),
            existing_repairs: Vec::new(),
            existing_adjustments: Vec::new(),
            existing_ignored: Vec::new(),
        }
    }

    pub fn add_existing_item(&mut self, item: InvoiceItem) {
        match item.item_type {
            InvoiceItemType::Recurring => {
                if item.amount_or_zero().is_zero() || item.end_date.is_none() {
                    self.existing_ignored.push(item);
                } else {
                    self.existing_recurring.push(item);
                }
            }
            InvoiceItemType::Fixed => self.existing_ignored.push(item),
            InvoiceItemType::RepairAdjustment => self.existing_repairs.push(item),
            InvoiceItemType::ItemAdjustment => self.existing_adjustments.push(item),
            InvoiceItemType::Usage
            | InvoiceItemType::Credit
            | InvoiceItemType::CreditBalanceAdjustment
            | InvoiceItemType::ExternalCharge => {}
        }
    }

    fn build_nodes(&self) -> Vec<ExistingNode> {
        self.existing_recurring
            .iter()
            .filter_map(|item| {
                let end = item.end_date?;
                let mut node = ExistingNode::new(item.clone(), DateInterval::new(item.start_date, end));

                let mut repaired = IntervalSet::new();
                for repair in self
                    .existing_repairs
                    .iter()
                    .filter(|r| r.linked_item_id == Some(item.id))
                {
                    if let Some(repair_end) = repair.end_date {
                        repaired.insert(DateInterval::new(repair.start_date, repair_end));
                    }
                    node.repaired_amount -= repair.amount_or_zero();
                }
                node.remaining = node.remaining.difference(&repaired);

                node.adjusted_amount = -self
                    .existing_adjustments
                    .iter()
                    .filter(|a| a.linked_item_id == Some(item.id))
                    .map(InvoiceItem::amount_or_zero)
                    .sum::<Decimal>();
                Some(node)
            })
            .collect()
    }

    /// Merge the full proposed history for this subscription and return the
    /// items to add: new FIXED and RECURRING items plus repairs.
    pub fn merge_with_proposed(
        self,
        proposed: Vec<InvoiceItem>,
    ) -> Result<Vec<InvoiceItem>, InvoiceError> {
        let mut result = Vec::new();
        let mut proposed_recurring = Vec::new();

        for item in proposed {
            if self.existing_ignored.iter().any(|e| e.matches(&item)) {
                continue;
            }
            match item.item_type {
                InvoiceItemType::Fixed => result.push(item),
                InvoiceItemType::Recurring => proposed_recurring.push(item),
                other => {
                    return Err(InvoiceError::IllegalInvoicingState(format!(
                        "unexpected proposed {} item {} for subscription {}",
                        other.as_str(),
                        item.id,
                        self.subscription_id
                    )))
                }
            }
        }

        let mut nodes = self.build_nodes();

        for item in &proposed_recurring {
            let Some(end) = item.end_date else {
                result.push(item.clone());
                continue;
            };
            let window = DateInterval::new(item.start_date, end);
            let mut covered = IntervalSet::new();
            for node in nodes.iter().filter(|n| n.is_same_kind(item)) {
                covered.union(&node.remaining.clipped_to(&window));
            }
            let uncovered = IntervalSet::from_interval(window).difference(&covered);
            for piece in uncovered.intervals() {
                result.push(prorated_proposal(item, window, *piece));
            }
        }

        for node in nodes.iter_mut() {
            let mut proposed_coverage = IntervalSet::new();
            for item in proposed_recurring.iter().filter(|p| node.is_same_kind(p)) {
                if let Some(end) = item.end_date {
                    proposed_coverage.insert(DateInterval::new(item.start_date, end));
                }
            }
            let stale = node.remaining.difference(&proposed_coverage);
            for piece in stale.intervals() {
                if let Some(repair) = node.repair(*piece, self.target_invoice_id) {
                    tracing::debug!(
                        subscription_id = %self.subscription_id,
                        linked_item_id = %node.item.id,
                        start_date = %piece.start,
                        end_date = %piece.end,
                        amount = %repair.amount_or_zero(),
                        "Repairing stale recurring item"
                    );
                    result.push(repair);
                }
            }
        }

        result.sort_by_key(InvoiceItem::sort_key);
        self.check_items_list_state(&result)?;
        Ok(result)
    }

    /// No double billing and no double repair in the output.
    fn check_items_list_state(&self, items: &[InvoiceItem]) -> Result<(), InvoiceError> {
        for item_type in [InvoiceItemType::Recurring, InvoiceItemType::RepairAdjustment] {
            let mut previous_end = None;
            for item in items.iter().filter(|i| i.item_type == item_type) {
                if let Some(end) = previous_end {
                    if end > item.start_date {
                        return Err(InvoiceError::IllegalInvoicingState(format!(
                            "overlapping {} items for subscription {}: item {} starts {} before previous end {}",
                            item_type.as_str(),
                            self.subscription_id,
                            item.id,
                            item.start_date,
                            end
                        )));
                    }
                }
                previous_end = item.end_date;
            }
        }
        Ok(())
    }
}

fn prorated_proposal(item: &InvoiceItem, window: DateInterval, piece: DateInterval) -> InvoiceItem {
    if piece == window {
        return item.clone();
    }
    let fraction = calculate_proration_between_dates(piece.start, piece.end, window.days());
    let mut prorated = item.clone();
    prorated.id = Uuid::new_v4();
    prorated.start_date = piece.start;
    prorated.end_date = Some(piece.end);
    prorated.amount = item
        .amount
        .map(|amount| round_amount(amount * fraction, &item.currency));
    prorated
}
