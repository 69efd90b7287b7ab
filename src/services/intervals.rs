use chrono::{DateTime, Utc};

use crate::models::Appointment;

/// Counts booked intervals that intersect a half-open range.
pub trait OverlapIndex {
    fn count_overlapping(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize;
}

/// Booked intervals kept as two sorted endpoint lists.
///
/// An interval `[s, e)` with `s <= e` overlaps `[a, b)` iff `s < b && e > a`.
/// Every interval with `e <= a` also has `s < b`, so the overlap count is
/// `#{s < b} - #{e <= a}`, two binary searches per query.
#[derive(Debug, Default, Clone)]
pub struct SortedIntervals {
    starts: Vec<DateTime<Utc>>,
    ends: Vec<DateTime<Utc>>,
}

impl SortedIntervals {
    pub fn new(intervals: impl IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>) -> Self {
        let (mut starts, mut ends): (Vec<_>, Vec<_>) = intervals
            .into_iter()
            .filter(|(start, end)| {
                if start > end {
                    tracing::warn!(%start, %end, "ignoring interval that ends before it starts");
                    return false;
                }
                true
            })
            .unzip();
        starts.sort();
        ends.sort();
        Self { starts, ends }
    }

    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        Self::new(appointments.iter().map(|a| (a.start, a.end)))
    }
}

impl OverlapIndex for SortedIntervals {
    fn count_overlapping(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let started_before_end = self.starts.partition_point(|s| *s < end);
        let ended_before_start = self.ends.partition_point(|e| *e <= start);
        started_before_end.saturating_sub(ended_before_start)
    }
}
