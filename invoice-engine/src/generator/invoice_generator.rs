//! Orchestration of one generation run for an account.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use uuid::Uuid;

use super::fixed_and_recurring::FixedAndRecurringInvoiceItemGenerator;
use super::metadata::InvoiceWithMetadata;
use super::proration::months_between;
use super::usage::UsageInvoiceItemGenerator;
use crate::config::InvoiceConfig;
use crate::error::InvoiceError;
use crate::models::{
    merge_notification_dates, AccountInvoices, BillingEventSet, DryRunInfo, Invoice,
    InvoiceItemType, InvoiceStatus,
};
use crate::pruner;
use crate::services::{metrics, Clock};
use crate::usage::{ContiguousUsageAggregator, UsageAggregator, UsageRecordStore};

/// Generates the next invoice of an account from its billing events and
/// invoice history. Stateless between runs; callers serialize runs of the
/// same account.
#[derive(Clone)]
pub struct DefaultInvoiceGenerator {
    config: InvoiceConfig,
    clock: Arc<dyn Clock>,
    usage_store: Arc<dyn UsageRecordStore>,
    usage_aggregator: Arc<dyn UsageAggregator>,
}

impl DefaultInvoiceGenerator {
    pub fn new(
        config: InvoiceConfig,
        clock: Arc<dyn Clock>,
        usage_store: Arc<dyn UsageRecordStore>,
    ) -> Self {
        Self {
            config,
            clock,
            usage_store,
            usage_aggregator: Arc::new(ContiguousUsageAggregator),
        }
    }

    pub fn with_usage_aggregator(mut self, usage_aggregator: Arc<dyn UsageAggregator>) -> Self {
        self.usage_aggregator = usage_aggregator;
        self
    }

    /// Generate the invoice due at `target_date`.
    ///
    /// With `target_invoice_id` the new items land on that existing invoice,
    /// reopened as a draft, and its current items are kept. Nothing is
    /// persisted: the result is identical in dry-run mode.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(
        skip(self, events, existing, dry_run_info),
        fields(dry_run = dry_run_info.is_some())
    )]
    pub fn generate_invoice(
        &self,
        account_id: Uuid,
        events: &BillingEventSet,
        existing: &AccountInvoices,
        target_invoice_id: Option<Uuid>,
        target_date: NaiveDate,
        currency: &str,
        dry_run_info: Option<&DryRunInfo>,
    ) -> Result<InvoiceWithMetadata, InvoiceError> {
        let started = Instant::now();
        let result = self.generate(
            account_id,
            events,
            existing,
            target_invoice_id,
            target_date,
            currency,
            dry_run_info,
        );

        let outcome = match &result {
            Ok(metadata) if metadata.has_invoice() => "invoice",
            Ok(_) => "empty",
            Err(err) => {
                tracing::error!(%account_id, error = %err, "Invoice generation failed");
                metrics::record_error(err.kind());
                "error"
            }
        };
        metrics::record_generation_run(
            outcome,
            dry_run_info.is_some(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn generate(
        &self,
        account_id: Uuid,
        events: &BillingEventSet,
        existing: &AccountInvoices,
        target_invoice_id: Option<Uuid>,
        target_date: NaiveDate,
        currency: &str,
        dry_run_info: Option<&DryRunInfo>,
    ) -> Result<InvoiceWithMetadata, InvoiceError> {
        let zero_usage_disabled = self.config.usage_zero_amount_disabled;
        if events.is_empty() || events.account_auto_invoice_off {
            tracing::info!(
                %account_id,
                auto_invoice_off = events.account_auto_invoice_off,
                "Nothing to invoice"
            );
            return Ok(InvoiceWithMetadata::empty(zero_usage_disabled));
        }

        self.validate_target_date(target_date)?;
        let adjusted_target_date = adjust_target_date(existing, target_date);
        if adjusted_target_date != target_date {
            tracing::info!(%target_date, %adjusted_target_date, "Raised target date to existing invoice");
        }

        let (mut invoice, reattached_items) = match target_invoice_id {
            Some(invoice_id) => {
                let target = existing
                    .find(&invoice_id)
                    .ok_or(InvoiceError::TargetInvoiceNotFound(invoice_id))?;
                let mut invoice = Invoice::new(
                    account_id,
                    target.invoice_date,
                    adjusted_target_date,
                    currency,
                    InvoiceStatus::Draft,
                );
                invoice.id = invoice_id;
                (invoice, target.items.clone())
            }
            None => {
                let status = if self.config.draft_invoices {
                    InvoiceStatus::Draft
                } else {
                    InvoiceStatus::Committed
                };
                let invoice = Invoice::new(
                    account_id,
                    self.clock.today(),
                    adjusted_target_date,
                    currency,
                    status,
                );
                (invoice, Vec::new())
            }
        };

        let excluded_item_ids = pruner::fully_repaired_item_ids(existing)?;

        let recurring = FixedAndRecurringInvoiceItemGenerator::new(&self.config).generate_items(
            account_id,
            invoice.id,
            events,
            existing,
            &excluded_item_ids,
            adjusted_target_date,
            currency,
        )?;
        let usage = UsageInvoiceItemGenerator::new(
            &self.config,
            self.clock.as_ref(),
            self.usage_store.as_ref(),
            self.usage_aggregator.as_ref(),
        )
        .generate_items(
            account_id,
            invoice.id,
            events,
            existing,
            adjusted_target_date,
            currency,
            dry_run_info,
        )?;

        for item in recurring.items.iter().chain(usage.items.iter()) {
            metrics::record_item_generated(item.item_type.as_str());
        }
        tracing::info!(
            %account_id,
            invoice_id = %invoice.id,
            recurring_items = recurring.items.len(),
            usage_items = usage.items.len(),
            "Generated invoice items"
        );

        invoice.add_items(recurring.items);
        invoice.add_items(usage.items);
        invoice.add_items(reattached_items);

        let mut notification_dates = recurring.notification_dates;
        merge_notification_dates(&mut notification_dates, usage.notification_dates);

        Ok(InvoiceWithMetadata::build(
            invoice,
            usage.tracking_ids,
            notification_dates,
            zero_usage_disabled,
        ))
    }

    fn validate_target_date(&self, target_date: NaiveDate) -> Result<(), InvoiceError> {
        let max_months = self.config.max_months_in_future;
        if months_between(self.clock.today(), target_date) > i64::from(max_months) {
            return Err(InvoiceError::TargetDateTooFarInFuture {
                target_date,
                max_months,
            });
        }
        Ok(())
    }
}

/// Never move backward from what existing RECURRING or USAGE billing has
/// already covered.
fn adjust_target_date(existing: &AccountInvoices, target_date: NaiveDate) -> NaiveDate {
    existing
        .invoices
        .iter()
        .filter(|invoice| {
            invoice.has_item_of_type(InvoiceItemType::Recurring)
                || invoice.has_item_of_type(InvoiceItemType::Usage)
        })
        .map(|invoice| invoice.target_date)
        .fold(target_date, NaiveDate::max)
}
