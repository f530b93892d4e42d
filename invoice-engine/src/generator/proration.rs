//! Whole and fractional period counting.
//!
//! Fractions are day-count ratios against the enclosing billing period,
//! rounded to [`PRORATION_SCALE`](super::money::PRORATION_SCALE).

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

use super::money::round_fraction;
use crate::models::{PeriodDuration, TimeUnit};

pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Complete calendar months from `start` to `end`. A month ending on a
/// clamped month-end counts as complete.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return -months_between(end, start);
    }
    let raw = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    let reached = u32::try_from(raw)
        .ok()
        .and_then(|m| start.checked_add_months(Months::new(m)));
    match reached {
        Some(date) if date > end => raw - 1,
        Some(_) => raw,
        None => raw - 1,
    }
}

/// `days(start, end) / days_in_period`. Non-positive spans give zero.
pub fn calculate_proration_between_dates(
    start: NaiveDate,
    end: NaiveDate,
    days_in_period: i64,
) -> Decimal {
    let days = days_between(start, end);
    if days <= 0 || days_in_period <= 0 {
        return Decimal::ZERO;
    }
    round_fraction(Decimal::from(days) / Decimal::from(days_in_period))
}

/// Fraction of `[previous_billing_cycle_date, next_billing_cycle_date)`
/// covered by `[start, next_billing_cycle_date)`.
pub fn calculate_proration_before_first_billing_period(
    start: NaiveDate,
    next_billing_cycle_date: NaiveDate,
    previous_billing_cycle_date: NaiveDate,
) -> Decimal {
    calculate_proration_between_dates(
        start,
        next_billing_cycle_date,
        days_between(previous_billing_cycle_date, next_billing_cycle_date),
    )
}

/// Fraction of `[last_billing_cycle_date, next_billing_cycle_date)` covered
/// by `[last_billing_cycle_date, end)`. Both bounds are aligned cycle dates,
/// so the result never exceeds one period.
pub fn calculate_proration_after_last_billing_cycle_date(
    end: NaiveDate,
    last_billing_cycle_date: NaiveDate,
    next_billing_cycle_date: NaiveDate,
) -> Decimal {
    calculate_proration_between_dates(
        last_billing_cycle_date,
        end,
        days_between(last_billing_cycle_date, next_billing_cycle_date),
    )
}

/// Whole periods between two aligned dates, counted in the period's own unit.
pub fn calculate_number_of_whole_billing_periods(
    start: NaiveDate,
    end: NaiveDate,
    period: PeriodDuration,
) -> u32 {
    if period.number == 0 || end <= start {
        return 0;
    }
    let elapsed = match period.unit {
        TimeUnit::Days => days_between(start, end),
        TimeUnit::Weeks => days_between(start, end) / 7,
        TimeUnit::Months => months_between(start, end),
        TimeUnit::Years => months_between(start, end) / 12,
    };
    u32::try_from(elapsed / i64::from(period.number)).unwrap_or(0)
}
