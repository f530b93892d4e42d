//! JSON request accepted by the `generate` command.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InvoiceError;
use crate::generator::{DefaultInvoiceGenerator, InvoiceWithMetadata};
use crate::models::{AccountInvoices, BillingEventSet, DryRunInfo, RawUsageRecord, TrackingRecordId};
use crate::usage::InMemoryUsageStore;

/// One account's inputs for a dry-run generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub account_id: Uuid,
    pub currency: String,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub target_invoice_id: Option<Uuid>,
    #[serde(default)]
    pub dry_run_info: Option<DryRunInfo>,
    pub events: BillingEventSet,
    #[serde(default)]
    pub existing: AccountInvoices,
    #[serde(default)]
    pub raw_usage: Vec<RawUsageRecord>,
    #[serde(default)]
    pub tracking_ids: Vec<TrackingRecordId>,
}

impl GenerationRequest {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut request: GenerationRequest = serde_json::from_str(json)?;
        request.events = request.events.sorted();
        Ok(request)
    }

    /// Usage store serving this request's raw usage.
    pub fn usage_store(&self) -> InMemoryUsageStore {
        InMemoryUsageStore::new(self.raw_usage.clone(), self.tracking_ids.clone())
            .for_account(self.account_id)
    }

    pub fn generate(
        &self,
        generator: &DefaultInvoiceGenerator,
    ) -> Result<InvoiceWithMetadata, InvoiceError> {
        generator.generate_invoice(
            self.account_id,
            &self.events,
            &self.existing,
            self.target_invoice_id,
            self.target_date,
            &self.currency,
            self.dry_run_info.as_ref(),
        )
    }
}
