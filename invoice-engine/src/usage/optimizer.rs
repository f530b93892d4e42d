//! Lower bound of the raw usage read.
//!
//! Reading every raw row since the first billing event gets expensive on
//! long-lived accounts. Usage already invoiced tells how far billing has
//! progressed per usage billing period; the read only has to go back a
//! configurable number of periods from there.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::InvoiceConfig;
use crate::models::{BillingPeriod, InvoiceItem, InvoiceItemType, UsageDefinition};

#[derive(Debug, Clone, Copy)]
pub struct RawUsageOptimizer<'a> {
    config: &'a InvoiceConfig,
    today: NaiveDate,
}

impl<'a> RawUsageOptimizer<'a> {
    pub fn new(config: &'a InvoiceConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    /// Earliest date raw usage must be read from. Never before
    /// `earliest_event_date`.
    pub fn optimized_start_date<'i>(
        &self,
        earliest_event_date: NaiveDate,
        target_date: NaiveDate,
        existing_usage_items: impl IntoIterator<Item = &'i InvoiceItem>,
        known_usages: &BTreeMap<String, UsageDefinition>,
    ) -> NaiveDate {
        let max_periods = match u32::try_from(self.config.max_raw_usage_previous_period) {
            Ok(periods) => periods,
            Err(_) => return earliest_event_date,
        };

        let reference_dates = if self.config.usage_zero_amount_disabled {
            self.reference_dates_from_today(target_date, known_usages)
        } else {
            reference_dates_from_items(existing_usage_items, known_usages)
        };

        let mut optimized: Option<NaiveDate> = None;
        for (billing_period, reference) in reference_dates {
            // A usage period with nothing billed yet needs the full history.
            let (Some(reference), Some(duration)) = (reference, billing_period.duration()) else {
                return earliest_event_date;
            };
            let candidate = duration.subtract_from(reference, max_periods);
            optimized = Some(optimized.map_or(candidate, |current| current.min(candidate)));
        }

        let result = optimized
            .filter(|date| *date > earliest_event_date)
            .unwrap_or(earliest_event_date);
        tracing::debug!(
            max_raw_usage_previous_period = self.config.max_raw_usage_previous_period,
            %earliest_event_date,
            optimized_start_date = %result,
            %target_date,
            "Computed raw usage start date"
        );
        result
    }

    /// Assumes invoicing is up to date: one period before
    /// `min(today, target)` for every usage billing period.
    fn reference_dates_from_today(
        &self,
        target_date: NaiveDate,
        known_usages: &BTreeMap<String, UsageDefinition>,
    ) -> HashMap<BillingPeriod, Option<NaiveDate>> {
        let reference = self.today.min(target_date);
        known_usages
            .values()
            .map(|usage| {
                let date = usage
                    .billing_period
                    .duration()
                    .map(|duration| duration.subtract_from(reference, 1));
                (usage.billing_period, date)
            })
            .collect()
    }
}

/// Most recent end date of an invoiced USAGE item per usage billing period.
fn reference_dates_from_items<'i>(
    existing_usage_items: impl IntoIterator<Item = &'i InvoiceItem>,
    known_usages: &BTreeMap<String, UsageDefinition>,
) -> HashMap<BillingPeriod, Option<NaiveDate>> {
    let mut dates: HashMap<BillingPeriod, Option<NaiveDate>> = known_usages
        .values()
        .map(|usage| (usage.billing_period, None))
        .collect();

    for item in existing_usage_items {
        if item.item_type != InvoiceItemType::Usage {
            continue;
        }
        let usage = item
            .usage_name
            .as_deref()
            .and_then(|name| known_usages.get(name));
        let (Some(usage), Some(end)) = (usage, item.end_date) else {
            tracing::warn!(item_id = %item.id, "Usage item with unknown usage or no end date");
            continue;
        };
        let entry = dates.entry(usage.billing_period).or_insert(None);
        if entry.is_none_or(|current| current < end) {
            *entry = Some(end);
        }
    }
    dates
}
