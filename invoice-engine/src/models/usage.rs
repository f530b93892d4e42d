//! Usage catalog definitions and raw usage records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::billing_event::{BillingMode, BillingPeriod};

/// How usage for a period is rolled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Units are summed over the period and priced per block.
    Consumable,
    /// Peak units in the period select a flat-priced tier.
    Capacity,
}

/// Pricing policy across consumable tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierBlockPolicy {
    /// Each tier bills the blocks that fall into it.
    #[default]
    AllTiers,
    /// All blocks are billed at the price of the highest tier reached.
    TopTier,
}

/// Block pricing for one unit inside a consumable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredBlock {
    pub unit: String,
    pub size: Decimal,
    pub price: Decimal,
    /// Maximum number of blocks in this tier, `None` for unlimited.
    #[serde(default)]
    pub max: Option<Decimal>,
}

/// Upper bound for one unit inside a capacity tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub unit: String,
    /// `None` means unlimited.
    #[serde(default)]
    pub max: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageTier {
    #[serde(default)]
    pub blocks: Vec<TieredBlock>,
    #[serde(default)]
    pub limits: Vec<UsageLimit>,
    /// Flat price of a capacity tier.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Metered charge declared by a plan phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageDefinition {
    pub name: String,
    pub billing_mode: BillingMode,
    pub usage_type: UsageType,
    pub billing_period: BillingPeriod,
    #[serde(default)]
    pub tier_block_policy: TierBlockPolicy,
    #[serde(default)]
    pub tiers: Vec<UsageTier>,
}

impl UsageDefinition {
    /// Unit types this definition prices, in first-seen order.
    pub fn unit_types(&self) -> Vec<String> {
        let mut units: Vec<String> = Vec::new();
        for tier in &self.tiers {
            let names = tier
                .blocks
                .iter()
                .map(|b| &b.unit)
                .chain(tier.limits.iter().map(|l| &l.unit));
            for name in names {
                if !units.contains(name) {
                    units.push(name.clone());
                }
            }
        }
        units
    }

    /// Consumable blocks for `unit`, one per tier that prices it.
    pub fn tiered_blocks(&self, unit: &str) -> Vec<&TieredBlock> {
        self.tiers
            .iter()
            .flat_map(|t| t.blocks.iter())
            .filter(|b| b.unit == unit)
            .collect()
    }
}

/// One raw usage row as recorded by the metering system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawUsageRecord {
    pub subscription_id: Uuid,
    pub unit_type: String,
    pub record_date: NaiveDate,
    pub amount: Decimal,
    pub tracking_id: String,
}

/// Idempotency marker tying a raw usage row to the invoice that billed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackingRecordId {
    pub tracking_id: String,
    pub invoice_id: Uuid,
    pub subscription_id: Uuid,
    pub unit_type: String,
    pub record_date: NaiveDate,
}

impl TrackingRecordId {
    /// Same raw row, regardless of which invoice recorded it.
    pub fn is_similar(&self, other: &TrackingRecordId) -> bool {
        self.tracking_id == other.tracking_id
            && self.subscription_id == other.subscription_id
            && self.unit_type == other.unit_type
            && self.record_date == other.record_date
    }
}
