//! Usage aggregation: raw usage plus already invoiced usage in, missing
//! USAGE items out.
//!
//! [`ContiguousUsageAggregator`] splits each in-arrear usage definition into
//! contiguous intervals of the subscription's events, cuts every interval
//! into billing periods and prices the usage rolled up in each period.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::UsageDetailMode;
use crate::error::InvoiceError;
use crate::generator::billing_interval::BillingIntervalDetail;
use crate::generator::money::round_amount;
use crate::models::{
    BillingEvent, BillingMode, InvoiceItem, InvoiceItemType, PeriodDuration, RawUsageRecord,
    SubscriptionTransition, TierBlockPolicy, TrackingRecordId, UsageDefinition, UsageType,
};

/// Everything the aggregator needs for one subscription.
#[derive(Debug, Clone)]
pub struct UsageAggregationRequest<'a> {
    pub account_id: Uuid,
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
    pub currency: &'a str,
    /// The subscription's events, in order.
    pub subscription_events: &'a [BillingEvent],
    pub raw_usage: &'a [RawUsageRecord],
    pub raw_usage_start_date: NaiveDate,
    pub existing_tracking_ids: &'a HashSet<TrackingRecordId>,
    /// Already invoiced USAGE items of the subscription.
    pub existing_usage_items: &'a [InvoiceItem],
    pub target_date: NaiveDate,
    pub detail_mode: UsageDetailMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageAggregation {
    pub items: Vec<InvoiceItem>,
    pub tracking_ids: BTreeSet<TrackingRecordId>,
    /// Next usage billing date per usage definition name.
    pub next_notification_dates: BTreeMap<String, NaiveDate>,
}

pub trait UsageAggregator: Send + Sync {
    fn compute_missing_items(
        &self,
        request: &UsageAggregationRequest<'_>,
    ) -> Result<UsageAggregation, InvoiceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContiguousUsageAggregator;

impl UsageAggregator for ContiguousUsageAggregator {
    fn compute_missing_items(
        &self,
        request: &UsageAggregationRequest<'_>,
    ) -> Result<UsageAggregation, InvoiceError> {
        let mut raw_usage: Vec<&RawUsageRecord> = request
            .raw_usage
            .iter()
            .filter(|r| r.subscription_id == request.subscription_id)
            .collect();
        raw_usage.sort_by_key(|r| r.record_date);

        let mut aggregation = UsageAggregation::default();
        for interval in usage_intervals(request.subscription_events) {
            let computed = interval.compute(request, &raw_usage)?;
            aggregation.items.extend(computed.items);
            aggregation.tracking_ids.extend(computed.tracking_ids);
            if let Some(date) = computed.next_notification_date {
                aggregation
                    .next_notification_dates
                    .entry(interval.usage.name.clone())
                    .and_modify(|current| *current = (*current).max(date))
                    .or_insert(date);
            }
        }
        Ok(aggregation)
    }
}

/// Consecutive events referencing one usage definition. Closed when a later
/// event stopped referencing it; that event is the last one in `events`.
#[derive(Debug)]
struct UsageInterval<'a> {
    usage: &'a UsageDefinition,
    events: Vec<&'a BillingEvent>,
    closed: bool,
}

#[derive(Debug, Default)]
struct IntervalResult {
    items: Vec<InvoiceItem>,
    tracking_ids: Vec<TrackingRecordId>,
    next_notification_date: Option<NaiveDate>,
}

/// One billing period of an interval with its rolled-up usage per unit.
#[derive(Debug)]
struct RolledUpPeriod<'a> {
    start: NaiveDate,
    end: NaiveDate,
    units: BTreeMap<String, Decimal>,
    records: Vec<&'a RawUsageRecord>,
}

fn usages_in_arrear(event: &BillingEvent) -> Vec<&UsageDefinition> {
    if event.transition == SubscriptionTransition::Cancel {
        return Vec::new();
    }
    event.usages_with_mode(BillingMode::InArrear).collect()
}

fn usage_intervals(events: &[BillingEvent]) -> Vec<UsageInterval<'_>> {
    let mut finished = Vec::new();
    let mut in_flight: BTreeMap<&str, UsageInterval<'_>> = BTreeMap::new();

    for event in events {
        let usages = usages_in_arrear(event);
        let referenced: HashSet<&str> = usages.iter().map(|u| u.name.as_str()).collect();

        let to_close: Vec<&str> = in_flight
            .keys()
            .copied()
            .filter(|name| !referenced.contains(name))
            .collect();
        for name in to_close {
            if let Some(mut interval) = in_flight.remove(name) {
                interval.events.push(event);
                interval.closed = true;
                finished.push(interval);
            }
        }

        for usage in usages {
            in_flight
                .entry(usage.name.as_str())
                .or_insert_with(|| UsageInterval {
                    usage,
                    events: Vec::new(),
                    closed: false,
                })
                .events
                .push(event);
        }
    }
    finished.extend(in_flight.into_values());
    finished
}

impl<'a> UsageInterval<'a> {
    fn first_event(&self) -> Option<&'a BillingEvent> {
        self.events.first().copied()
    }

    fn period(&self) -> Result<PeriodDuration, InvoiceError> {
        self.usage.billing_period.duration().ok_or_else(|| {
            InvoiceError::InvalidUsageCatalog(format!(
                "usage '{}' has no billing period",
                self.usage.name
            ))
        })
    }

    /// Billing-period boundaries inside the interval, starting no earlier
    /// than the raw usage read.
    fn transition_dates(
        &self,
        target_date: NaiveDate,
        raw_usage_start_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, InvoiceError> {
        let Some(first) = self.first_event() else {
            return Ok(Vec::new());
        };
        let start = first.effective_local_date();
        if target_date < start {
            return Ok(Vec::new());
        }
        let end = match (self.closed, self.events.last()) {
            (true, Some(last)) => last.effective_local_date(),
            _ => target_date,
        };

        let detail = BillingIntervalDetail::new(
            start,
            Some(end),
            target_date,
            first.bcd,
            self.period()?,
            BillingMode::InArrear,
            false,
        );

        let mut transitions = Vec::new();
        if start >= raw_usage_start_date {
            transitions.push(start);
        }
        let mut n = 0;
        let mut previous: Option<NaiveDate> = None;
        loop {
            let candidate = detail.future_billing_date_for(n);
            if candidate > end || previous.is_some_and(|p| candidate <= p) {
                break;
            }
            if candidate > start && candidate >= raw_usage_start_date {
                transitions.push(candidate);
            }
            previous = Some(candidate);
            n += 1;
        }
        if self.closed && transitions.last().is_none_or(|last| end > *last) {
            transitions.push(end);
        }
        Ok(transitions)
    }

    /// Latest in-arrear next billing date across the interval's events.
    fn next_notification_date(
        &self,
        target_date: NaiveDate,
    ) -> Result<Option<NaiveDate>, InvoiceError> {
        let period = self.period()?;
        let next_for = |event: &BillingEvent, end: Option<NaiveDate>| {
            BillingIntervalDetail::new(
                event.effective_local_date(),
                end,
                target_date,
                event.bcd,
                period,
                BillingMode::InArrear,
                false,
            )
            .next_billing_cycle_date()
        };

        let mut result: Option<NaiveDate> = None;
        for pair in self.events.windows(2) {
            let candidate = next_for(pair[0], Some(pair[1].effective_local_date()));
            result = Some(result.map_or(candidate, |current| current.max(candidate)));
        }
        if !self.closed {
            if let Some(last) = self.events.last() {
                let candidate = next_for(last, None);
                result = Some(result.map_or(candidate, |current| current.max(candidate)));
            }
        }
        Ok(result)
    }

    /// Event in effect on `date`.
    fn event_on(&self, date: NaiveDate) -> Option<&'a BillingEvent> {
        let effective = if self.closed {
            &self.events[..self.events.len().saturating_sub(1)]
        } else {
            &self.events[..]
        };
        effective
            .iter()
            .copied()
            .take_while(|e| e.effective_local_date() <= date)
            .last()
            .or_else(|| self.first_event())
    }

    fn roll_up<'r>(
        &self,
        transitions: &[NaiveDate],
        raw_usage: &[&'r RawUsageRecord],
    ) -> Vec<RolledUpPeriod<'r>> {
        let unit_types = self.usage.unit_types();
        transitions
            .windows(2)
            .map(|bounds| {
                let (start, end) = (bounds[0], bounds[1]);
                let mut period = RolledUpPeriod {
                    start,
                    end,
                    units: BTreeMap::new(),
                    records: Vec::new(),
                };
                for record in raw_usage
                    .iter()
                    .copied()
                    .filter(|r| r.record_date >= start && r.record_date < end)
                {
                    if !unit_types.contains(&record.unit_type) {
                        tracing::warn!(
                            usage_name = %self.usage.name,
                            unit_type = %record.unit_type,
                            "Skipping raw usage for a unit type the usage does not price"
                        );
                        continue;
                    }
                    let amount = period.units.entry(record.unit_type.clone()).or_default();
                    *amount = match self.usage.usage_type {
                        UsageType::Consumable => *amount + record.amount,
                        UsageType::Capacity => (*amount).max(record.amount),
                    };
                    period.records.push(record);
                }
                period
            })
            .collect()
    }

    fn compute(
        &self,
        request: &UsageAggregationRequest<'_>,
        raw_usage: &[&RawUsageRecord],
    ) -> Result<IntervalResult, InvoiceError> {
        let mut result = IntervalResult {
            next_notification_date: self.next_notification_date(request.target_date)?,
            ..IntervalResult::default()
        };

        let transitions = self.transition_dates(request.target_date, request.raw_usage_start_date)?;
        if transitions.len() < 2 {
            return Ok(result);
        }

        for period in self.roll_up(&transitions, raw_usage) {
            let Some(event) = self.event_on(period.start) else {
                continue;
            };

            let billed_items: Vec<&InvoiceItem> = request
                .existing_usage_items
                .iter()
                .filter(|i| {
                    i.item_type == InvoiceItemType::Usage
                        && i.usage_name.as_deref() == Some(self.usage.name.as_str())
                        && i.start_date >= period.start
                        && i.end_date.is_some_and(|end| end <= period.end)
                })
                .collect();
            let billed: Decimal = billed_items.iter().map(|i| i.amount_or_zero()).sum();

            let per_unit = self.price_per_unit(&period.units, request.currency)?;
            let to_be_billed: Decimal = match self.usage.usage_type {
                UsageType::Consumable => per_unit.values().copied().sum(),
                UsageType::Capacity => self.capacity_price(&period.units, request.currency)?,
            };

            let new_item = |amount: Decimal, quantity: Option<Decimal>| {
                InvoiceItem::new(
                    InvoiceItemType::Usage,
                    request.invoice_id,
                    request.account_id,
                    period.start,
                    request.currency,
                )
                .for_event(event)
                .with_end_date(period.end)
                .with_amount(amount)
                .with_usage(&self.usage.name, quantity)
            };

            let mut emitted = Vec::new();
            if billed_items.is_empty() {
                let detailed = request.detail_mode == UsageDetailMode::Detail
                    && self.usage.usage_type == UsageType::Consumable
                    && !period.units.is_empty();
                if detailed {
                    for (unit, quantity) in &period.units {
                        let amount = per_unit.get(unit).copied().unwrap_or_default();
                        emitted.push(new_item(amount, Some(*quantity)));
                    }
                } else {
                    emitted.push(new_item(to_be_billed, None));
                }
            } else if billed < to_be_billed {
                emitted.push(new_item(to_be_billed - billed, None));
            }

            if emitted.is_empty() {
                continue;
            }
            for record in &period.records {
                let tracking = TrackingRecordId {
                    tracking_id: record.tracking_id.clone(),
                    invoice_id: request.invoice_id,
                    subscription_id: record.subscription_id,
                    unit_type: record.unit_type.clone(),
                    record_date: record.record_date,
                };
                if !request
                    .existing_tracking_ids
                    .iter()
                    .any(|existing| existing.is_similar(&tracking))
                {
                    result.tracking_ids.push(tracking);
                }
            }
            result.items.extend(emitted);
        }
        Ok(result)
    }

    /// Consumable price per unit type, rounded to the currency.
    fn price_per_unit(
        &self,
        units: &BTreeMap<String, Decimal>,
        currency: &str,
    ) -> Result<BTreeMap<String, Decimal>, InvoiceError> {
        if self.usage.usage_type != UsageType::Consumable {
            return Ok(BTreeMap::new());
        }
        units
            .iter()
            .map(|(unit, quantity)| {
                let price = self.consumable_price(unit, *quantity)?;
                Ok((unit.clone(), round_amount(price, currency)))
            })
            .collect()
    }

    fn consumable_price(&self, unit: &str, quantity: Decimal) -> Result<Decimal, InvoiceError> {
        let blocks = self.usage.tiered_blocks(unit);
        if let Some(block) = blocks.iter().find(|b| b.size <= Decimal::ZERO) {
            return Err(InvoiceError::InvalidUsageCatalog(format!(
                "usage '{}' has a block of size {} for unit '{}'",
                self.usage.name, block.size, unit
            )));
        }

        match self.usage.tier_block_policy {
            TierBlockPolicy::AllTiers => {
                let mut remaining = quantity;
                let mut total = Decimal::ZERO;
                for block in blocks {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    let needed = (remaining / block.size).ceil();
                    let used = match block.max {
                        Some(max) if needed > max => {
                            remaining -= max * block.size;
                            max
                        }
                        _ => {
                            remaining = Decimal::ZERO;
                            needed
                        }
                    };
                    total += used * block.price;
                }
                if remaining > Decimal::ZERO {
                    return Err(InvoiceError::InvalidUsageCatalog(format!(
                        "usage '{}' has no tier for the last {} of {} '{}' units",
                        self.usage.name, remaining, quantity, unit
                    )));
                }
                Ok(total)
            }
            TierBlockPolicy::TopTier => {
                let mut capacity = Decimal::ZERO;
                let mut reached = None;
                for block in &blocks {
                    reached = Some(*block);
                    match block.max {
                        Some(max) => {
                            capacity += max * block.size;
                            if quantity <= capacity {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Ok(reached
                    .map(|block| (quantity / block.size).ceil() * block.price)
                    .unwrap_or_default())
            }
        }
    }

    /// Flat price of the first tier whose limits hold for every unit.
    fn capacity_price(
        &self,
        units: &BTreeMap<String, Decimal>,
        currency: &str,
    ) -> Result<Decimal, InvoiceError> {
        if units.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let tier = self.usage.tiers.iter().find(|tier| {
            units.iter().all(|(unit, quantity)| {
                tier.limits
                    .iter()
                    .find(|limit| &limit.unit == unit)
                    .is_some_and(|limit| limit.max.is_none_or(|max| *quantity <= max))
            })
        });
        match tier {
            Some(tier) => Ok(round_amount(tier.price.unwrap_or_default(), currency)),
            None => Err(InvoiceError::InvalidUsageCatalog(format!(
                "no capacity tier of usage '{}' fits {:?}",
                self.usage.name, units
            ))),
        }
    }
}
