//! Configuration module for invoice-engine.

use serde::{Deserialize, Serialize};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Verbosity of generated usage items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageDetailMode {
    /// One item per usage definition and period.
    #[default]
    Aggregate,
    /// One item per unit type and period.
    Detail,
}

/// Generation knobs, loaded from the `INVOICE` environment prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceConfig {
    #[serde(default = "default_max_months_in_future")]
    pub max_months_in_future: u32,
    #[serde(default)]
    pub usage_detail_mode: UsageDetailMode,
    #[serde(default)]
    pub usage_zero_amount_disabled: bool,
    #[serde(default)]
    pub in_arrear_greedy: bool,
    /// Periods of raw usage to re-read before the last billed one. Negative
    /// disables the optimisation.
    #[serde(default = "default_max_raw_usage_previous_period")]
    pub max_raw_usage_previous_period: i32,
    #[serde(default)]
    pub draft_invoices: bool,
}

fn default_max_months_in_future() -> u32 {
    36
}

fn default_max_raw_usage_previous_period() -> i32 {
    2
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            max_months_in_future: default_max_months_in_future(),
            usage_detail_mode: UsageDetailMode::default(),
            usage_zero_amount_disabled: false,
            in_arrear_greedy: false,
            max_raw_usage_previous_period: default_max_raw_usage_previous_period(),
            draft_invoices: false,
        }
    }
}

impl InvoiceConfig {
    pub fn load() -> Result<Self, AppError> {
        core_config::load_section("configuration", "INVOICE")
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceEngineConfig {
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub invoice: InvoiceConfig,
}

impl InvoiceEngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let invoice = InvoiceConfig::load()?;

        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| common.service_name.clone()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| common.log_level.clone()),
            otlp_endpoint: env::var("OTLP_ENDPOINT")
                .ok()
                .or(common.otlp_endpoint),
            invoice,
        })
    }
}
