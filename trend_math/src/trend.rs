//! Trend statistics and confidence scoring for a count series

use crate::regression::{linear_regression, regression_line};
use crate::volatility::{mean, stddev};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of the direction of a series, recomputed on every render
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendStats {
    /// Least-squares slope per step
    pub slope: f64,
    /// Percent change from the first to the last value
    pub pct: f64,
    /// Last value minus the one before it
    pub last_delta: i64,
    /// Centred regression line, one value per input
    pub regression_line: Vec<f64>,
}

/// Coarse bucket for a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    /// Bucket a score in `[0, 1]`
    pub fn from_score(score: f64) -> Self {
        if score >= 0.66 {
            ConfidenceLabel::High
        } else if score < 0.33 {
            ConfidenceLabel::Low
        } else {
            ConfidenceLabel::Medium
        }
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfidenceLabel::Low => "Low",
            ConfidenceLabel::Medium => "Medium",
            ConfidenceLabel::High => "High",
        };
        write!(f, "{}", label)
    }
}

/// Confidence in the detected trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: f64,
    pub label: ConfidenceLabel,
}

impl Default for ConfidenceScore {
    fn default() -> Self {
        Self {
            score: 0.5,
            label: ConfidenceLabel::Medium,
        }
    }
}

/// Slope, percent change and last delta of `values`.
///
/// A series starting at zero reports a 0% change rather than NaN.
pub fn trend_stats(values: &[f64]) -> TrendStats {
    let slope = linear_regression(values).slope;

    let n = values.len();
    let (pct, last_delta) = if n >= 2 {
        let first = values[0];
        let last = values[n - 1];
        let pct = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };
        (pct, (last - values[n - 2]).round() as i64)
    } else {
        (0.0, 0)
    };

    TrendStats {
        slope,
        pct,
        last_delta,
        regression_line: regression_line(values),
    }
}

/// Blend slope significance, day-over-day consistency and amplitude into a score.
///
/// Weights: sigmoid of `slope / stddev` 0.5, share of increasing steps 0.3,
/// `(max - min) / mean` clamped to `[0, 1]` 0.2. Fewer than three points
/// fall back to a neutral Medium.
pub fn confidence_from_series(values: &[f64], trend: &TrendStats) -> ConfidenceScore {
    let n = values.len();
    if n < 3 {
        return ConfidenceScore::default();
    }

    let sd = stddev(values);
    let significance = if sd > 1e-9 {
        sigmoid(trend.slope / sd)
    } else {
        0.5
    };

    let increases = values.windows(2).filter(|w| w[1] > w[0]).count();
    let consistency = increases as f64 / (n - 1) as f64;

    let avg = mean(values);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let amplitude = if avg > 0.0 {
        ((max - min) / avg).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let score = (0.5 * significance + 0.3 * consistency + 0.2 * amplitude).clamp(0.0, 1.0);

    ConfidenceScore {
        score,
        label: ConfidenceLabel::from_score(score),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
