//! Seasonality detection over calendar buckets

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Minimum number of points before seasonality is attempted
pub const MIN_SEASONAL_POINTS: usize = 14;

/// Calendar unit the series is bucketed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeasonalUnit {
    /// Seven buckets, Monday first
    DayOfWeek,
    /// Twelve buckets, January first
    MonthOfYear,
}

impl SeasonalUnit {
    /// Number of buckets in one cycle
    pub fn buckets(&self) -> usize {
        match self {
            SeasonalUnit::DayOfWeek => 7,
            SeasonalUnit::MonthOfYear => 12,
        }
    }

    /// Bucket index of `date`
    pub fn bucket(&self, date: NaiveDate) -> usize {
        match self {
            SeasonalUnit::DayOfWeek => date.weekday().num_days_from_monday() as usize,
            SeasonalUnit::MonthOfYear => date.month0() as usize,
        }
    }

    /// Whether `dates` land in every bucket at least once
    pub fn covers_full_cycle(&self, dates: &[NaiveDate]) -> bool {
        let mut seen = vec![false; self.buckets()];
        for date in dates {
            seen[self.bucket(*date)] = true;
        }
        seen.iter().all(|s| *s)
    }
}

/// Per-bucket deviation ratio from the overall mean.
///
/// Each bucket's mean over the points that fall in it is compared with the
/// overall mean: `0.2` means the bucket runs 20% above average. Buckets with no
/// points get `0.0`. Returns `None` with fewer than [`MIN_SEASONAL_POINTS`]
/// points or when the dates and values disagree in length.
pub fn detect_seasonality(
    dates: &[NaiveDate],
    values: &[f64],
    unit: SeasonalUnit,
) -> Option<Vec<f64>> {
    let n = values.len();
    if n < MIN_SEASONAL_POINTS || dates.len() != n {
        return None;
    }

    let buckets = unit.buckets();
    let mut sums = vec![0.0; buckets];
    let mut counts = vec![0usize; buckets];
    for (date, value) in dates.iter().zip(values) {
        let b = unit.bucket(*date);
        sums[b] += value;
        counts[b] += 1;
    }

    let overall = values.iter().sum::<f64>() / n as f64;
    if overall.abs() < 1e-9 {
        return Some(vec![0.0; buckets]);
    }

    Some(
        sums.iter()
            .zip(&counts)
            .map(|(sum, count)| match count {
                0 => 0.0,
                c => (sum / *c as f64 - overall) / overall,
            })
            .collect(),
    )
}
