//! USAGE item generation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::models::{
    AccountInvoices, BillingMode, BillingEventSet, DryRunInfo, InvoiceItem, InvoiceItemType,
    NotificationDates, RawUsageRecord, SubscriptionFutureNotificationDates, TrackingRecordId,
};
use crate::services::{metrics, Clock};
use crate::usage::{RawUsageOptimizer, UsageAggregationRequest, UsageAggregator, UsageRecordStore};

/// USAGE items for one run with the tracking ids of the raw rows they bill.
#[derive(Debug, Clone, Default)]
pub struct GeneratedUsageItems {
    pub items: Vec<InvoiceItem>,
    pub tracking_ids: BTreeSet<TrackingRecordId>,
    pub notification_dates: NotificationDates,
}

/// Raw usage read once per run and shared by every subscription.
#[derive(Debug)]
struct RawUsageData {
    start_date: NaiveDate,
    records: Vec<RawUsageRecord>,
    existing_tracking_ids: HashSet<TrackingRecordId>,
}

pub struct UsageInvoiceItemGenerator<'a> {
    config: &'a InvoiceConfig,
    clock: &'a dyn Clock,
    store: &'a dyn UsageRecordStore,
    aggregator: &'a dyn UsageAggregator,
}

impl<'a> UsageInvoiceItemGenerator<'a> {
    pub fn new(
        config: &'a InvoiceConfig,
        clock: &'a dyn Clock,
        store: &'a dyn UsageRecordStore,
        aggregator: &'a dyn UsageAggregator,
    ) -> Self {
        Self {
            config,
            clock,
            store,
            aggregator,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, fields(%account_id, %invoice_id, %target_date))]
    pub fn generate_items(
        &self,
        account_id: Uuid,
        invoice_id: Uuid,
        events: &BillingEventSet,
        existing: &AccountInvoices,
        target_date: NaiveDate,
        currency: &str,
        dry_run_info: Option<&DryRunInfo>,
    ) -> Result<GeneratedUsageItems, InvoiceError> {
        let mut existing_usage: BTreeMap<Uuid, Vec<InvoiceItem>> = BTreeMap::new();
        for item in existing.items() {
            if let (InvoiceItemType::Usage, Some(subscription_id)) =
                (item.item_type, item.subscription_id)
            {
                existing_usage
                    .entry(subscription_id)
                    .or_default()
                    .push(item.clone());
            }
        }

        let mut result = GeneratedUsageItems::default();
        let mut raw_usage: Option<RawUsageData> = None;

        for run in events.by_subscription() {
            let Some(first) = run.first() else {
                continue;
            };
            let subscription_id = first.subscription_id;
            if events.is_invoicing_off(&subscription_id) {
                continue;
            }

            if let Some(usage) = run
                .iter()
                .flat_map(|e| e.usages_with_mode(BillingMode::InAdvance))
                .next()
            {
                return Err(InvoiceError::UnsupportedBillingMode {
                    usage_name: usage.name.clone(),
                    billing_mode: usage.billing_mode,
                });
            }
            let has_usage = run
                .iter()
                .any(|e| e.usages_with_mode(BillingMode::InArrear).next().is_some());
            if !has_usage {
                continue;
            }

            if raw_usage.is_none() {
                raw_usage = Some(self.read_raw_usage(
                    account_id,
                    events,
                    existing,
                    target_date,
                    dry_run_info,
                )?);
            }
            let Some(raw) = raw_usage.as_ref() else {
                continue;
            };

            let existing_items = existing_usage
                .get(&subscription_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let request = UsageAggregationRequest {
                account_id,
                invoice_id,
                subscription_id,
                currency,
                subscription_events: run,
                raw_usage: &raw.records,
                raw_usage_start_date: raw.start_date,
                existing_tracking_ids: &raw.existing_tracking_ids,
                existing_usage_items: existing_items,
                target_date,
                detail_mode: self.config.usage_detail_mode,
            };
            let aggregation = self.aggregator.compute_missing_items(&request)?;

            tracing::debug!(
                %subscription_id,
                items = aggregation.items.len(),
                tracking_ids = aggregation.tracking_ids.len(),
                "Computed missing usage items"
            );
            result.items.extend(aggregation.items);
            result.tracking_ids.extend(aggregation.tracking_ids);
            if !aggregation.next_notification_dates.is_empty() {
                let dates = result
                    .notification_dates
                    .entry(subscription_id)
                    .or_insert_with(|| {
                        SubscriptionFutureNotificationDates::new(events.recurring_billing_mode)
                    });
                for (usage_name, date) in aggregation.next_notification_dates {
                    dates.update_next_usage_date(&usage_name, date);
                }
            }
        }

        Ok(result)
    }

    fn read_raw_usage(
        &self,
        account_id: Uuid,
        events: &BillingEventSet,
        existing: &AccountInvoices,
        target_date: NaiveDate,
        dry_run_info: Option<&DryRunInfo>,
    ) -> Result<RawUsageData, InvoiceError> {
        let earliest = events.earliest_date().unwrap_or(target_date);
        let start_date = RawUsageOptimizer::new(self.config, self.clock.today())
            .optimized_start_date(
                earliest,
                target_date,
                existing
                    .items()
                    .filter(|i| i.item_type == InvoiceItemType::Usage),
                &events.usages,
            );

        let started = Instant::now();
        let records = self
            .store
            .raw_usage_for_account(account_id, start_date, target_date, dry_run_info)
            .map_err(InvoiceError::UsageStore)?;
        let existing_tracking_ids = self
            .store
            .tracking_ids_for_account(account_id, start_date, target_date)
            .map_err(InvoiceError::UsageStore)?
            .into_iter()
            .collect();
        metrics::record_usage_read_duration(self.store.name(), started.elapsed().as_secs_f64());

        tracing::info!(
            %account_id,
            %start_date,
            %target_date,
            records = records.len(),
            "Read raw usage"
        );
        Ok(RawUsageData {
            start_date,
            records,
            existing_tracking_ids,
        })
    }
}
