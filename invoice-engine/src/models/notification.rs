//! Next-run bookkeeping per subscription.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::billing_event::BillingMode;

/// When recurring and usage billing should next run for one subscription.
/// Dates only ever move forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFutureNotificationDates {
    pub recurring_billing_mode: BillingMode,
    pub next_recurring_date: Option<NaiveDate>,
    pub next_usage_dates: BTreeMap<String, NaiveDate>,
}

impl SubscriptionFutureNotificationDates {
    pub fn new(recurring_billing_mode: BillingMode) -> Self {
        Self {
            recurring_billing_mode,
            next_recurring_date: None,
            next_usage_dates: BTreeMap::new(),
        }
    }

    pub fn update_next_recurring_date(&mut self, candidate: NaiveDate) {
        self.next_recurring_date = Some(match self.next_recurring_date {
            Some(current) if current >= candidate => current,
            _ => candidate,
        });
    }

    pub fn update_next_usage_date(&mut self, usage_name: &str, candidate: NaiveDate) {
        self.next_usage_dates
            .entry(usage_name.to_string())
            .and_modify(|current| {
                if *current < candidate {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    pub fn reset_next_recurring_date(&mut self) {
        self.next_recurring_date = None;
    }

    /// Fold `other` into `self`, keeping the later date everywhere.
    pub fn merge(&mut self, other: SubscriptionFutureNotificationDates) {
        if let Some(date) = other.next_recurring_date {
            self.update_next_recurring_date(date);
        }
        for (name, date) in other.next_usage_dates {
            self.update_next_usage_date(&name, date);
        }
    }
}

pub type NotificationDates = BTreeMap<Uuid, SubscriptionFutureNotificationDates>;

/// Merge two per-subscription maps.
pub fn merge_notification_dates(into: &mut NotificationDates, from: NotificationDates) {
    for (subscription_id, dates) in from {
        match into.get_mut(&subscription_id) {
            Some(existing) => existing.merge(dates),
            None => {
                into.insert(subscription_id, dates);
            }
        }
    }
}
