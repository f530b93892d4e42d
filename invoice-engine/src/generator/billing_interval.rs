//! Billing-cycle arithmetic for one `[start, end)` service interval.
//!
//! Cycle dates are always derived from the first billing-cycle date by
//! advancing `n` whole periods and re-aligning on the billing-cycle day, never
//! by stepping from the previous candidate, so short months do not drift.

use chrono::{Datelike, NaiveDate};

use crate::models::{BillingMode, PeriodDuration, TimeUnit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingIntervalDetail {
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    target_date: NaiveDate,
    billing_cycle_day: u32,
    period: PeriodDuration,
    billing_mode: BillingMode,
    in_arrear_greedy: bool,
    first_billing_cycle_date: NaiveDate,
    effective_end_date: Option<NaiveDate>,
    last_billing_cycle_date: Option<NaiveDate>,
}

impl BillingIntervalDetail {
    pub fn new(
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        target_date: NaiveDate,
        billing_cycle_day: u32,
        period: PeriodDuration,
        billing_mode: BillingMode,
        in_arrear_greedy: bool,
    ) -> Self {
        let is_month_based = period.months().is_some();
        let billing_cycle_day = if is_month_based {
            billing_cycle_day.clamp(1, 31)
        } else {
            start_date.day()
        };

        let mut detail = Self {
            start_date,
            end_date,
            target_date,
            billing_cycle_day,
            period,
            billing_mode,
            in_arrear_greedy,
            first_billing_cycle_date: start_date,
            effective_end_date: None,
            last_billing_cycle_date: None,
        };
        detail.first_billing_cycle_date = detail.calculate_first_billing_cycle_date();
        detail.effective_end_date = match billing_mode {
            BillingMode::InAdvance => detail.calculate_in_advance_effective_end_date(),
            BillingMode::InArrear => detail.calculate_in_arrear_effective_end_date(),
        };
        detail.last_billing_cycle_date = detail.calculate_last_billing_cycle_date();
        detail
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn billing_cycle_day(&self) -> u32 {
        self.billing_cycle_day
    }

    pub fn period(&self) -> PeriodDuration {
        self.period
    }

    pub fn billing_mode(&self) -> BillingMode {
        self.billing_mode
    }

    pub fn first_billing_cycle_date(&self) -> NaiveDate {
        self.first_billing_cycle_date
    }

    pub fn effective_end_date(&self) -> Option<NaiveDate> {
        self.effective_end_date
    }

    pub fn last_billing_cycle_date(&self) -> Option<NaiveDate> {
        self.last_billing_cycle_date
    }

    /// False when there is not at least one full day to bill.
    pub fn has_something_to_bill(&self) -> bool {
        self.effective_end_date.is_some() && self.end_date.is_none_or(|end| end > self.start_date)
    }

    /// Cycle date `n` periods after the first one.
    pub fn future_billing_date_for(&self, n: u32) -> NaiveDate {
        self.align(self.period.add_to(self.first_billing_cycle_date, n))
    }

    /// Cycle date one period before the first one.
    pub fn previous_billing_cycle_date(&self) -> NaiveDate {
        self.align(self.period.subtract_from(self.first_billing_cycle_date, 1))
    }

    /// Cycle date following the last one reached, or the first cycle date when
    /// nothing was reached.
    pub fn next_billing_cycle_date(&self) -> NaiveDate {
        match self.last_billing_cycle_date {
            Some(last) => self.align(self.period.add_to(last, 1)),
            None => self.first_billing_cycle_date,
        }
    }

    fn is_month_based(&self) -> bool {
        matches!(self.period.unit, TimeUnit::Months | TimeUnit::Years)
    }

    /// Move a month-based date onto the billing-cycle day, clamped to the
    /// length of its month.
    fn align(&self, date: NaiveDate) -> NaiveDate {
        if !self.is_month_based() {
            return date;
        }
        let day = self.billing_cycle_day.min(last_day_of_month(date));
        date.with_day(day).unwrap_or(date)
    }

    fn calculate_first_billing_cycle_date(&self) -> NaiveDate {
        if !self.is_month_based() {
            return self.start_date;
        }
        let day = self
            .billing_cycle_day
            .min(last_day_of_month(self.start_date));
        let anchor = self.start_date.with_day(day).unwrap_or(self.start_date);

        let mut n = 0;
        let mut proposed = anchor;
        while proposed < self.start_date {
            n += 1;
            let next = self.period.add_to(anchor, n);
            if next <= proposed {
                break;
            }
            proposed = next;
        }
        self.align(proposed)
    }

    /// Smallest cycle date strictly after `date`.
    fn first_cycle_date_after(&self, date: NaiveDate) -> NaiveDate {
        let mut n = 0;
        let mut proposed = self.first_billing_cycle_date;
        while proposed <= date {
            n += 1;
            let next = self.future_billing_date_for(n);
            if next <= proposed {
                break;
            }
            proposed = next;
        }
        proposed
    }

    /// Largest cycle date not after `date`, with its index. Never earlier
    /// than the first cycle date.
    fn last_cycle_date_not_after(&self, date: NaiveDate) -> (u32, NaiveDate) {
        let mut n = 0;
        let mut proposed = self.first_billing_cycle_date;
        loop {
            let next = self.future_billing_date_for(n + 1);
            if next > date || next <= proposed {
                return (n, proposed);
            }
            n += 1;
            proposed = next;
        }
    }

    fn calculate_in_advance_effective_end_date(&self) -> Option<NaiveDate> {
        if let Some(end) = self.end_date {
            if self.target_date >= end {
                return Some(end);
            }
        }
        if self.target_date < self.first_billing_cycle_date {
            return Some(self.first_billing_cycle_date);
        }
        let proposed = self.first_cycle_date_after(self.target_date);
        match self.end_date {
            Some(end) if end < proposed => Some(end),
            _ => Some(proposed),
        }
    }

    fn calculate_in_arrear_effective_end_date(&self) -> Option<NaiveDate> {
        // An event landing exactly on the target bills now.
        if self.end_date == Some(self.target_date) {
            return Some(self.target_date);
        }

        let cutoff = if self.in_arrear_greedy {
            self.start_date
        } else {
            self.first_billing_cycle_date
        };
        if self.target_date < cutoff {
            return None;
        }

        if let Some(end) = self.end_date {
            if end < self.first_billing_cycle_date {
                return Some(end);
            }
        }

        let (n, mut proposed) = self.last_cycle_date_not_after(self.target_date);
        if self.in_arrear_greedy && proposed < self.target_date {
            proposed = self.future_billing_date_for(n + 1);
        }

        match self.end_date {
            Some(end) if end <= proposed => Some(end),
            _ => Some(proposed),
        }
    }

    fn calculate_last_billing_cycle_date(&self) -> Option<NaiveDate> {
        let effective_end = self.effective_end_date?;
        Some(self.last_cycle_date_not_after(effective_end).1)
    }
}

pub fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
