//! Common test utilities for invoice-engine integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use invoice_engine::config::InvoiceConfig;
use invoice_engine::generator::DefaultInvoiceGenerator;
use invoice_engine::models::{
    BillingEvent, BillingEventSet, BillingMode, BillingPeriod, InvoiceItem, InvoiceItemType,
    PeriodDuration, PhaseType, SubscriptionTransition, UsageDefinition,
};
use invoice_engine::services::FixedClock;
use invoice_engine::usage::InMemoryUsageStore;
use rust_decimal::Decimal;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,invoice_engine=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub const PLAN: &str = "pistol-monthly";
pub const PHASE: &str = "pistol-monthly-evergreen";

/// Billing event builder with evergreen monthly defaults.
pub struct EventBuilder {
    event: BillingEvent,
}

impl EventBuilder {
    pub fn new(subscription_id: Uuid, effective: NaiveDate) -> Self {
        Self {
            event: BillingEvent {
                subscription_id,
                bundle_id: Uuid::nil(),
                effective_date: effective.and_time(NaiveTime::MIN).and_utc(),
                total_ordering: 0,
                transition: SubscriptionTransition::Create,
                plan_name: PLAN.to_string(),
                phase_name: PHASE.to_string(),
                phase_type: PhaseType::Evergreen,
                phase_duration: None,
                billing_period: BillingPeriod::Monthly,
                fixed_price: None,
                recurring_price: None,
                bcd: chrono::Datelike::day(&effective),
                usages: Vec::new(),
            },
        }
    }

    pub fn transition(mut self, transition: SubscriptionTransition) -> Self {
        self.event.transition = transition;
        self
    }

    pub fn ordering(mut self, total_ordering: i64) -> Self {
        self.event.total_ordering = total_ordering;
        self
    }

    pub fn plan(mut self, plan_name: &str) -> Self {
        self.event.plan_name = plan_name.to_string();
        self
    }

    pub fn phase(mut self, phase_name: &str, phase_type: PhaseType) -> Self {
        self.event.phase_name = phase_name.to_string();
        self.event.phase_type = phase_type;
        self
    }

    pub fn duration(mut self, duration: PeriodDuration) -> Self {
        self.event.phase_duration = Some(duration);
        self
    }

    pub fn period(mut self, billing_period: BillingPeriod) -> Self {
        self.event.billing_period = billing_period;
        self
    }

    pub fn recurring(mut self, price: Decimal) -> Self {
        self.event.recurring_price = Some(price);
        self
    }

    pub fn fixed(mut self, price: Decimal) -> Self {
        self.event.fixed_price = Some(price);
        self
    }

    pub fn bcd(mut self, bcd: u32) -> Self {
        self.event.bcd = bcd;
        self
    }

    pub fn usage(mut self, usage: UsageDefinition) -> Self {
        self.event.usages.push(usage);
        self
    }

    pub fn build(self) -> BillingEvent {
        self.event
    }
}

/// Cancellation event: no period, no prices.
pub fn cancel(subscription_id: Uuid, effective: NaiveDate) -> BillingEvent {
    EventBuilder::new(subscription_id, effective)
        .transition(SubscriptionTransition::Cancel)
        .period(BillingPeriod::NoBillingPeriod)
        .ordering(1)
        .build()
}

pub fn in_advance(events: Vec<BillingEvent>) -> BillingEventSet {
    BillingEventSet::new(events, BillingMode::InAdvance)
}

pub fn generator(today: NaiveDate) -> DefaultInvoiceGenerator {
    generator_with(today, InvoiceConfig::default(), InMemoryUsageStore::default())
}

pub fn generator_with(
    today: NaiveDate,
    config: InvoiceConfig,
    store: InMemoryUsageStore,
) -> DefaultInvoiceGenerator {
    init_tracing();
    DefaultInvoiceGenerator::new(config, Arc::new(FixedClock::on(today)), Arc::new(store))
}

pub fn total(items: &[InvoiceItem]) -> Decimal {
    items.iter().map(InvoiceItem::amount_or_zero).sum()
}

pub fn of_type(items: &[InvoiceItem], item_type: InvoiceItemType) -> Vec<&InvoiceItem> {
    items.iter().filter(|i| i.item_type == item_type).collect()
}

/// Existing RECURRING item as a previous run would have produced it.
pub fn recurring_item(
    invoice_id: Uuid,
    account_id: Uuid,
    subscription_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    amount: Decimal,
    rate: Decimal,
) -> InvoiceItem {
    let mut item = InvoiceItem::new(InvoiceItemType::Recurring, invoice_id, account_id, start, "USD")
        .with_end_date(end)
        .with_amount(amount)
        .with_rate(rate);
    item.subscription_id = Some(subscription_id);
    item.bundle_id = Some(Uuid::nil());
    item.plan_name = Some(PLAN.to_string());
    item.phase_name = Some(PHASE.to_string());
    item
}

/// Repair of `item` over `[start, end)`.
pub fn repair_of(item: &InvoiceItem, start: NaiveDate, end: NaiveDate, amount: Decimal) -> InvoiceItem {
    InvoiceItem::new(
        InvoiceItemType::RepairAdjustment,
        item.invoice_id,
        item.account_id,
        start,
        "USD",
    )
    .linked_to(item)
    .with_end_date(end)
    .with_amount(amount)
}

/// Item adjustment of `item`.
pub fn adjustment_of(item: &InvoiceItem, amount: Decimal) -> InvoiceItem {
    InvoiceItem::new(
        InvoiceItemType::ItemAdjustment,
        item.invoice_id,
        item.account_id,
        item.start_date,
        "USD",
    )
    .linked_to(item)
    .with_amount(amount)
}
