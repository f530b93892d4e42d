//! Raw usage record store contract and an in-memory implementation.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{DryRunInfo, RawUsageRecord, TrackingRecordId};

/// Source of raw usage rows and of tracking ids already recorded for them.
///
/// Windows are inclusive of both bounds: the end is the target date and
/// usage recorded on that day is billable.
pub trait UsageRecordStore: Send + Sync {
    /// Label used for metrics.
    fn name(&self) -> &str {
        "usage_store"
    }

    fn raw_usage_for_account(
        &self,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        dry_run_info: Option<&DryRunInfo>,
    ) -> anyhow::Result<Vec<RawUsageRecord>>;

    fn tracking_ids_for_account(
        &self,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> anyhow::Result<Vec<TrackingRecordId>>;
}

/// Store holding one account's records in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageStore {
    account_id: Option<Uuid>,
    records: Vec<RawUsageRecord>,
    tracking_ids: Vec<TrackingRecordId>,
}

impl InMemoryUsageStore {
    pub fn new(records: Vec<RawUsageRecord>, tracking_ids: Vec<TrackingRecordId>) -> Self {
        Self {
            account_id: None,
            records,
            tracking_ids,
        }
    }

    /// Only answer for `account_id`; other accounts see an empty store.
    pub fn for_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    fn serves(&self, account_id: Uuid) -> bool {
        self.account_id.is_none_or(|id| id == account_id)
    }
}

impl UsageRecordStore for InMemoryUsageStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn raw_usage_for_account(
        &self,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        _dry_run_info: Option<&DryRunInfo>,
    ) -> anyhow::Result<Vec<RawUsageRecord>> {
        if !self.serves(account_id) {
            return Ok(Vec::new());
        }
        let mut records: Vec<RawUsageRecord> = self
            .records
            .iter()
            .filter(|r| r.record_date >= start_date && r.record_date <= end_date)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.subscription_id, a.record_date).cmp(&(b.subscription_id, b.record_date))
        });
        Ok(records)
    }

    fn tracking_ids_for_account(
        &self,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> anyhow::Result<Vec<TrackingRecordId>> {
        if !self.serves(account_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .tracking_ids
            .iter()
            .filter(|t| t.record_date >= start_date && t.record_date <= end_date)
            .cloned()
            .collect())
    }
}
