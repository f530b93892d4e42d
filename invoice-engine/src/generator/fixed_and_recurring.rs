//! FIXED and RECURRING item generation.
//!
//! Items are proposed for the subscription's whole billable history up to
//! the target date, then reconciled against existing invoices by the
//! [`AccountItemTree`](crate::tree::AccountItemTree). Only the delta
//! survives.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::billing_interval::BillingIntervalDetail;
use super::money::round_amount;
use super::proration::{
    calculate_number_of_whole_billing_periods, calculate_proration_after_last_billing_cycle_date,
    calculate_proration_before_first_billing_period, calculate_proration_between_dates,
    days_between,
};
use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::models::{
    AccountInvoices, BillingEvent, BillingEventSet, BillingMode, InvoiceItem, InvoiceItemType,
    NotificationDates, PeriodDuration, PhaseType, SubscriptionFutureNotificationDates,
};
use crate::tree::AccountItemTree;

/// One recurring service period and how many billing cycles it is worth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringItemData {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub number_of_cycles: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringItemSchedule {
    pub items: Vec<RecurringItemData>,
    pub next_billing_cycle_date: NaiveDate,
}

/// Split `[start, end)` as billable at `target_date` into a leading
/// pro-ration, whole periods and a trailing pro-ration.
pub fn generate_recurring_item_data(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    target_date: NaiveDate,
    billing_cycle_day: u32,
    period: PeriodDuration,
    billing_mode: BillingMode,
    in_arrear_greedy: bool,
) -> Result<RecurringItemSchedule, InvoiceError> {
    if end_date.is_some_and(|end| end < start_date) || target_date < start_date {
        return Err(InvoiceError::InvalidDateSequence {
            start_date,
            end_date,
            target_date,
        });
    }

    let detail = BillingIntervalDetail::new(
        start_date,
        end_date,
        target_date,
        billing_cycle_day,
        period,
        billing_mode,
        in_arrear_greedy,
    );
    let mut items = Vec::new();
    let schedule = |items| RecurringItemSchedule {
        items,
        next_billing_cycle_date: detail.next_billing_cycle_date(),
    };

    let (Some(effective_end), Some(last_cycle)) = (
        detail.effective_end_date(),
        detail.last_billing_cycle_date(),
    ) else {
        return Ok(schedule(items));
    };
    if !detail.has_something_to_bill() {
        return Ok(schedule(items));
    }

    let first_cycle = detail.first_billing_cycle_date();
    let previous_cycle = detail.previous_billing_cycle_date();

    // The whole interval sits before the first cycle date.
    if let Some(end) = end_date.filter(|end| *end <= first_cycle) {
        let cycles = calculate_proration_between_dates(
            start_date,
            end,
            days_between(previous_cycle, first_cycle),
        );
        items.push(RecurringItemData {
            start_date,
            end_date: end,
            number_of_cycles: cycles,
        });
        return Ok(schedule(items));
    }

    if first_cycle > start_date {
        let cycles = calculate_proration_before_first_billing_period(start_date, first_cycle, previous_cycle);
        if cycles > Decimal::ZERO {
            tracing::debug!(%start_date, end_date = %first_cycle, %cycles, "Adding leading pro-ration");
            items.push(RecurringItemData {
                start_date,
                end_date: first_cycle,
                number_of_cycles: cycles,
            });
        }
    }

    let whole_periods = calculate_number_of_whole_billing_periods(first_cycle, last_cycle, period);
    for i in 0..whole_periods {
        let service_start = items
            .last()
            .map(|previous: &RecurringItemData| previous.end_date)
            .unwrap_or(start_date);
        items.push(RecurringItemData {
            start_date: service_start,
            end_date: detail.future_billing_date_for(i + 1),
            number_of_cycles: Decimal::ONE,
        });
    }

    if effective_end > last_cycle {
        let cycles = calculate_proration_after_last_billing_cycle_date(
            effective_end,
            last_cycle,
            detail.next_billing_cycle_date(),
        );
        if cycles > Decimal::ZERO {
            tracing::debug!(start_date = %last_cycle, end_date = %effective_end, %cycles, "Adding trailing pro-ration");
            items.push(RecurringItemData {
                start_date: last_cycle,
                end_date: effective_end,
                number_of_cycles: cycles,
            });
        }
    }

    Ok(schedule(items))
}

/// Items proposed and reconciled for one run.
#[derive(Debug, Clone, Default)]
pub struct GeneratedItems {
    pub items: Vec<InvoiceItem>,
    pub notification_dates: NotificationDates,
}

#[derive(Debug, Clone, Copy)]
pub struct FixedAndRecurringInvoiceItemGenerator<'a> {
    config: &'a InvoiceConfig,
}

impl<'a> FixedAndRecurringInvoiceItemGenerator<'a> {
    pub fn new(config: &'a InvoiceConfig) -> Self {
        Self { config }
    }

    /// New FIXED, RECURRING and REPAIR_ADJUSTMENT items for `invoice_id`.
    ///
    /// `excluded_item_ids` are existing items left out of reconciliation,
    /// typically the fully repaired ones.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, fields(%account_id, %invoice_id, %target_date))]
    pub fn generate_items(
        &self,
        account_id: Uuid,
        invoice_id: Uuid,
        events: &BillingEventSet,
        existing: &AccountInvoices,
        excluded_item_ids: &HashSet<Uuid>,
        target_date: NaiveDate,
        currency: &str,
    ) -> Result<GeneratedItems, InvoiceError> {
        let mut tree = AccountItemTree::new(account_id, invoice_id);
        for item in existing.items() {
            if excluded_item_ids.contains(&item.id)
                || item
                    .subscription_id
                    .is_some_and(|id| events.is_invoicing_off(&id))
            {
                continue;
            }
            tree.add_existing_item(item);
        }

        let mut notification_dates = NotificationDates::new();
        let mut proposed = self.process_recurring_events(
            account_id,
            invoice_id,
            events,
            target_date,
            currency,
            &mut notification_dates,
        )?;
        proposed.extend(process_fixed_events(
            account_id,
            invoice_id,
            events,
            target_date,
            currency,
        ));

        if let Some(cutoff) = existing.cutoff_date {
            proposed.retain(|item| item.start_date >= cutoff);
        }

        let items = tree.merge_with_proposed(proposed)?;
        Ok(GeneratedItems {
            items,
            notification_dates,
        })
    }

    fn process_recurring_events(
        &self,
        account_id: Uuid,
        invoice_id: Uuid,
        events: &BillingEventSet,
        target_date: NaiveDate,
        currency: &str,
        notification_dates: &mut NotificationDates,
    ) -> Result<Vec<InvoiceItem>, InvoiceError> {
        let mut proposed = Vec::new();
        for run in events.by_subscription() {
            let Some(first) = run.first() else {
                continue;
            };
            if events.is_invoicing_off(&first.subscription_id) {
                tracing::debug!(subscription_id = %first.subscription_id, "Skipping subscription with invoicing off");
                continue;
            }
            for (index, event) in run.iter().enumerate() {
                let next_date = run.get(index + 1).map(BillingEvent::effective_local_date);
                let items = self.process_recurring_event(
                    account_id,
                    invoice_id,
                    event,
                    next_date,
                    fixed_term_end(run, index),
                    target_date,
                    currency,
                    events.recurring_billing_mode,
                    notification_dates,
                )?;
                proposed.extend(items);
            }
        }
        Ok(proposed)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_recurring_event(
        &self,
        account_id: Uuid,
        invoice_id: Uuid,
        event: &BillingEvent,
        next_date: Option<NaiveDate>,
        phase_end: Option<NaiveDate>,
        target_date: NaiveDate,
        currency: &str,
        billing_mode: BillingMode,
        notification_dates: &mut NotificationDates,
    ) -> Result<Vec<InvoiceItem>, InvoiceError> {
        let Some(period) = event.billing_period.duration() else {
            return Ok(Vec::new());
        };
        let start_date = event.effective_local_date();
        if start_date > target_date {
            return Ok(Vec::new());
        }

        let end_date = match phase_end {
            Some(phase_end) if start_date >= phase_end => return Ok(Vec::new()),
            Some(phase_end) => Some(next_date.map_or(phase_end, |next| next.min(phase_end))),
            None => next_date,
        };

        let schedule = generate_recurring_item_data(
            start_date,
            end_date,
            target_date,
            event.bcd,
            period,
            billing_mode,
            self.config.in_arrear_greedy,
        )?;

        let items: Vec<InvoiceItem> = match event.recurring_price {
            Some(rate) => schedule
                .items
                .iter()
                .map(|data| {
                    InvoiceItem::new(
                        InvoiceItemType::Recurring,
                        invoice_id,
                        account_id,
                        data.start_date,
                        currency,
                    )
                    .for_event(event)
                    .with_end_date(data.end_date)
                    .with_amount(round_amount(data.number_of_cycles * rate, currency))
                    .with_rate(rate)
                })
                .collect(),
            None => Vec::new(),
        };

        let next_notification_date = match billing_mode {
            BillingMode::InAdvance => items
                .iter()
                .filter(|item| item.amount.is_none_or(|amount| amount >= Decimal::ZERO))
                .filter_map(|item| item.end_date)
                .max(),
            BillingMode::InArrear => Some(schedule.next_billing_cycle_date),
        };
        if let Some(date) = next_notification_date {
            notification_dates
                .entry(event.subscription_id)
                .or_insert_with(|| SubscriptionFutureNotificationDates::new(billing_mode))
                .update_next_recurring_date(date);
        }

        Ok(items)
    }
}

/// End of the fixed-term phase `run[index]` belongs to. The phase starts at
/// the first consecutive event carrying the same phase name.
fn fixed_term_end(run: &[BillingEvent], index: usize) -> Option<NaiveDate> {
    let event = &run[index];
    if event.phase_type != PhaseType::FixedTerm {
        return None;
    }
    let duration = event.phase_duration?;
    let phase_start = run[..=index]
        .iter()
        .rev()
        .take_while(|e| e.phase_name == event.phase_name)
        .last()
        .map(BillingEvent::effective_local_date)
        .unwrap_or_else(|| event.effective_local_date());
    Some(duration.add_to(phase_start, 1))
}

/// One FIXED item per priced event up to the target date. Of several
/// consecutive events of one subscription on the same day only the last
/// one counts.
fn process_fixed_events(
    account_id: Uuid,
    invoice_id: Uuid,
    events: &BillingEventSet,
    target_date: NaiveDate,
    currency: &str,
) -> Vec<InvoiceItem> {
    let mut items = Vec::new();
    let mut previous: Option<InvoiceItem> = None;

    for event in events
        .events()
        .iter()
        .filter(|e| !events.is_invoicing_off(&e.subscription_id))
    {
        let current = fixed_price_item(account_id, invoice_id, event, target_date, currency);
        if let Some(item) = previous.take() {
            let superseded = item.subscription_id == Some(event.subscription_id)
                && item.start_date == event.effective_local_date();
            if !superseded {
                items.push(item);
            }
        }
        previous = current;
    }
    items.extend(previous);
    items
}

fn fixed_price_item(
    account_id: Uuid,
    invoice_id: Uuid,
    event: &BillingEvent,
    target_date: NaiveDate,
    currency: &str,
) -> Option<InvoiceItem> {
    let start_date = event.effective_local_date();
    if start_date > target_date {
        return None;
    }
    let price = event.fixed_price?;
    Some(
        InvoiceItem::new(InvoiceItemType::Fixed, invoice_id, account_id, start_date, currency)
            .for_event(event)
            .with_amount(round_amount(price, currency)),
    )
}
