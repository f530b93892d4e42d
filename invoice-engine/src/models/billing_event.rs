//! Billing event model.
//!
//! A billing event is an immutable fact about a subscription at a point in
//! time, derived from subscription and catalog state by the caller. The
//! generators only ever read them.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::usage::UsageDefinition;

/// Unit a billing period or phase duration is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// A length of time expressed in a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodDuration {
    pub unit: TimeUnit,
    pub number: u32,
}

impl PeriodDuration {
    pub fn new(unit: TimeUnit, number: u32) -> Self {
        Self { unit, number }
    }

    /// Length in days when the unit is day-based.
    pub fn days(&self) -> Option<u64> {
        match self.unit {
            TimeUnit::Days => Some(u64::from(self.number)),
            TimeUnit::Weeks => Some(7 * u64::from(self.number)),
            TimeUnit::Months | TimeUnit::Years => None,
        }
    }

    /// Length in months when the unit is month-based.
    pub fn months(&self) -> Option<u32> {
        match self.unit {
            TimeUnit::Months => Some(self.number),
            TimeUnit::Years => Some(12 * self.number),
            TimeUnit::Days | TimeUnit::Weeks => None,
        }
    }

    /// `date` moved forward by `count` durations, clamping to the end of
    /// short months. Saturates at the calendar bounds.
    pub fn add_to(&self, date: NaiveDate, count: u32) -> NaiveDate {
        match (self.days(), self.months()) {
            (Some(days), _) => date
                .checked_add_days(Days::new(days * u64::from(count)))
                .unwrap_or(NaiveDate::MAX),
            (None, Some(months)) => date
                .checked_add_months(Months::new(months.saturating_mul(count)))
                .unwrap_or(NaiveDate::MAX),
            (None, None) => date,
        }
    }

    /// `date` moved backward by `count` durations.
    pub fn subtract_from(&self, date: NaiveDate, count: u32) -> NaiveDate {
        match (self.days(), self.months()) {
            (Some(days), _) => date
                .checked_sub_days(Days::new(days * u64::from(count)))
                .unwrap_or(NaiveDate::MIN),
            (None, Some(months)) => date
                .checked_sub_months(Months::new(months.saturating_mul(count)))
                .unwrap_or(NaiveDate::MIN),
            (None, None) => date,
        }
    }
}

/// Catalog billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Daily,
    Weekly,
    Biweekly,
    ThirtyDays,
    SixtyDays,
    NinetyDays,
    Monthly,
    Bimestrial,
    Quarterly,
    Triannual,
    Biannual,
    Annual,
    Sesquiannual,
    Biennial,
    Triennial,
    NoBillingPeriod,
}

impl BillingPeriod {
    /// Duration of one period, `None` for [`BillingPeriod::NoBillingPeriod`].
    pub fn duration(&self) -> Option<PeriodDuration> {
        let (unit, number) = match self {
            BillingPeriod::Daily => (TimeUnit::Days, 1),
            BillingPeriod::Weekly => (TimeUnit::Weeks, 1),
            BillingPeriod::Biweekly => (TimeUnit::Weeks, 2),
            BillingPeriod::ThirtyDays => (TimeUnit::Days, 30),
            BillingPeriod::SixtyDays => (TimeUnit::Days, 60),
            BillingPeriod::NinetyDays => (TimeUnit::Days, 90),
            BillingPeriod::Monthly => (TimeUnit::Months, 1),
            BillingPeriod::Bimestrial => (TimeUnit::Months, 2),
            BillingPeriod::Quarterly => (TimeUnit::Months, 3),
            BillingPeriod::Triannual => (TimeUnit::Months, 4),
            BillingPeriod::Biannual => (TimeUnit::Months, 6),
            BillingPeriod::Annual => (TimeUnit::Years, 1),
            BillingPeriod::Sesquiannual => (TimeUnit::Months, 18),
            BillingPeriod::Biennial => (TimeUnit::Years, 2),
            BillingPeriod::Triennial => (TimeUnit::Years, 3),
            BillingPeriod::NoBillingPeriod => return None,
        };
        Some(PeriodDuration::new(unit, number))
    }

    /// Whether cycle dates are anchored on a day of month.
    pub fn is_month_based(&self) -> bool {
        self.duration().and_then(|d| d.months()).is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Daily => "daily",
            BillingPeriod::Weekly => "weekly",
            BillingPeriod::Biweekly => "biweekly",
            BillingPeriod::ThirtyDays => "thirty_days",
            BillingPeriod::SixtyDays => "sixty_days",
            BillingPeriod::NinetyDays => "ninety_days",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Bimestrial => "bimestrial",
            BillingPeriod::Quarterly => "quarterly",
            BillingPeriod::Triannual => "triannual",
            BillingPeriod::Biannual => "biannual",
            BillingPeriod::Annual => "annual",
            BillingPeriod::Sesquiannual => "sesquiannual",
            BillingPeriod::Biennial => "biennial",
            BillingPeriod::Triennial => "triennial",
            BillingPeriod::NoBillingPeriod => "no_billing_period",
        }
    }
}

/// Whether a period is charged when it starts or after it completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    #[default]
    InAdvance,
    InArrear,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::InAdvance => "in_advance",
            BillingMode::InArrear => "in_arrear",
        }
    }
}

/// Catalog phase type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Trial,
    Discount,
    FixedTerm,
    Evergreen,
}

/// Subscription transition that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTransition {
    Create,
    Change,
    Phase,
    Cancel,
    StartBillingDisabled,
    EndBillingDisabled,
}

/// Billing event for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    pub subscription_id: Uuid,
    pub bundle_id: Uuid,
    pub effective_date: DateTime<Utc>,
    /// Tie-break between events sharing an effective date.
    pub total_ordering: i64,
    pub transition: SubscriptionTransition,
    pub plan_name: String,
    pub phase_name: String,
    pub phase_type: PhaseType,
    /// Total phase length, only meaningful for fixed-term phases.
    #[serde(default)]
    pub phase_duration: Option<PeriodDuration>,
    pub billing_period: BillingPeriod,
    #[serde(default)]
    pub fixed_price: Option<Decimal>,
    #[serde(default)]
    pub recurring_price: Option<Decimal>,
    pub bcd: u32,
    #[serde(default)]
    pub usages: Vec<UsageDefinition>,
}

impl BillingEvent {
    /// Effective date in the account's calendar.
    pub fn effective_local_date(&self) -> NaiveDate {
        self.effective_date.date_naive()
    }

    fn sort_key(&self) -> (Uuid, DateTime<Utc>, i64) {
        (self.subscription_id, self.effective_date, self.total_ordering)
    }

    /// Usage definitions on this event billed with `mode`.
    pub fn usages_with_mode(&self, mode: BillingMode) -> impl Iterator<Item = &UsageDefinition> {
        self.usages.iter().filter(move |u| u.billing_mode == mode)
    }
}

/// Sorted billing events for one account plus account-level invoicing flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingEventSet {
    #[serde(default)]
    events: Vec<BillingEvent>,
    #[serde(default)]
    pub account_auto_invoice_off: bool,
    #[serde(default)]
    pub subscription_ids_with_auto_invoice_off: HashSet<Uuid>,
    #[serde(default)]
    pub recurring_billing_mode: BillingMode,
    /// Usage definitions known to the catalog, by name.
    #[serde(default)]
    pub usages: BTreeMap<String, UsageDefinition>,
}

impl BillingEventSet {
    pub fn new(mut events: Vec<BillingEvent>, recurring_billing_mode: BillingMode) -> Self {
        events.sort_by_key(BillingEvent::sort_key);
        let usages = events
            .iter()
            .flat_map(|e| e.usages.iter())
            .map(|u| (u.name.clone(), u.clone()))
            .collect();
        Self {
            events,
            account_auto_invoice_off: false,
            subscription_ids_with_auto_invoice_off: HashSet::new(),
            recurring_billing_mode,
            usages,
        }
    }

    /// Re-establish ordering after deserialisation.
    pub fn sorted(mut self) -> Self {
        self.events.sort_by_key(BillingEvent::sort_key);
        self
    }

    pub fn events(&self) -> &[BillingEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_invoicing_off(&self, subscription_id: &Uuid) -> bool {
        self.subscription_ids_with_auto_invoice_off
            .contains(subscription_id)
    }

    /// Maximal runs of consecutive events belonging to the same subscription.
    pub fn by_subscription(&self) -> impl Iterator<Item = &[BillingEvent]> {
        self.events
            .chunk_by(|a, b| a.subscription_id == b.subscription_id)
    }

    /// Earliest effective date across all events.
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.events.iter().map(|e| e.effective_local_date()).min()
    }
}
