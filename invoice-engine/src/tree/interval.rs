//! Half-open date intervals and disjoint interval sets.

use chrono::NaiveDate;

/// `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn intersection(&self, other: &DateInterval) -> Option<DateInterval> {
        let candidate = DateInterval::new(self.start.max(other.start), self.end.min(other.end));
        (!candidate.is_empty()).then_some(candidate)
    }
}

/// Sorted, disjoint, non-adjacent intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<DateInterval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_interval(interval: DateInterval) -> Self {
        let mut set = Self::new();
        set.insert(interval);
        set
    }

    pub fn intervals(&self) -> &[DateInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Add `interval`, coalescing with anything it touches.
    pub fn insert(&mut self, interval: DateInterval) {
        if interval.is_empty() {
            return;
        }
        let mut merged = interval;
        let mut result = Vec::with_capacity(self.intervals.len() + 1);
        for current in self.intervals.drain(..) {
            if current.end < merged.start || current.start > merged.end {
                result.push(current);
            } else {
                merged.start = merged.start.min(current.start);
                merged.end = merged.end.max(current.end);
            }
        }
        result.push(merged);
        result.sort();
        self.intervals = result;
    }

    pub fn union(&mut self, other: &IntervalSet) {
        for interval in &other.intervals {
            self.insert(*interval);
        }
    }

    /// Everything in `self` not covered by `other`.
    pub fn difference(&self, other: &IntervalSet) -> IntervalSet {
        let mut remaining = Vec::new();
        for interval in &self.intervals {
            let mut pieces = vec![*interval];
            for cut in &other.intervals {
                pieces = pieces
                    .into_iter()
                    .flat_map(|piece| subtract(piece, cut))
                    .collect();
            }
            remaining.extend(pieces);
        }
        IntervalSet {
            intervals: remaining,
        }
    }

    /// Portions of `self` inside `window`.
    pub fn clipped_to(&self, window: &DateInterval) -> IntervalSet {
        IntervalSet {
            intervals: self
                .intervals
                .iter()
                .filter_map(|i| i.intersection(window))
                .collect(),
        }
    }

    pub fn covers(&self, interval: &DateInterval) -> bool {
        self.intervals
            .iter()
            .any(|i| i.start <= interval.start && i.end >= interval.end)
    }
}

fn subtract(piece: DateInterval, cut: &DateInterval) -> Vec<DateInterval> {
    if piece.intersection(cut).is_none() {
        return vec![piece];
    }
    [
        DateInterval::new(piece.start, cut.start.min(piece.end)),
        DateInterval::new(cut.end.max(piece.start), piece.end),
    ]
    .into_iter()
    .filter(|i| !i.is_empty())
    .collect()
}
