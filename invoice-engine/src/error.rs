//! Error types for invoice generation.

use chrono::NaiveDate;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::BillingMode;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error(
        "Invalid date sequence: start={start_date}, end={end_date:?}, target={target_date}"
    )]
    InvalidDateSequence {
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        target_date: NaiveDate,
    },

    #[error("Target date {target_date} is more than {max_months} months in the future")]
    TargetDateTooFarInFuture {
        target_date: NaiveDate,
        max_months: u32,
    },

    #[error("Illegal invoicing state: {0}")]
    IllegalInvoicingState(String),

    #[error("Unsupported billing mode {billing_mode:?} for usage '{usage_name}'")]
    UnsupportedBillingMode {
        usage_name: String,
        billing_mode: BillingMode,
    },

    #[error("Invalid usage catalog: {0}")]
    InvalidUsageCatalog(String),

    #[error("Target invoice {0} not found")]
    TargetInvoiceNotFound(Uuid),

    #[error("Usage store error: {0}")]
    UsageStore(#[source] anyhow::Error),
}

impl InvoiceError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InvoiceError::InvalidDateSequence { .. } => "invalid_date_sequence",
            InvoiceError::TargetDateTooFarInFuture { .. } => "target_date_too_far_in_future",
            InvoiceError::IllegalInvoicingState(_) => "illegal_invoicing_state",
            InvoiceError::UnsupportedBillingMode { .. } => "unsupported_billing_mode",
            InvoiceError::InvalidUsageCatalog(_) => "invalid_usage_catalog",
            InvoiceError::TargetInvoiceNotFound(_) => "target_invoice_not_found",
            InvoiceError::UsageStore(_) => "usage_store",
        }
    }
}

impl From<InvoiceError> for AppError {
    fn from(err: InvoiceError) -> Self {
        match err {
            InvoiceError::InvalidDateSequence { .. }
            | InvoiceError::TargetDateTooFarInFuture { .. } => {
                AppError::BadRequest(anyhow::Error::new(err))
            }
            InvoiceError::TargetInvoiceNotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            other => AppError::InternalError(anyhow::Error::new(other)),
        }
    }
}
