//! Ordinary least squares against the sample position
//!
//! The x axis is the 1-based position `1..=n`, so callers only pass the observed
//! values and `y = [2, 4, 6, 8]` fits `y = 2x` exactly.

use crate::round_to;
use serde::{Deserialize, Serialize};

/// Slope and intercept of a fitted line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
}

impl Regression {
    /// Value of the fitted line at 1-based position `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a line through `values` at positions `1..=n`.
///
/// Fewer than two points give a flat line at zero.
pub fn linear_regression(values: &[f64]) -> Regression {
    let n = values.len();
    if n < 2 {
        return Regression::default();
    }

    let n_f = n as f64;
    let x_mean = (n_f + 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for (i, &y) in values.iter().enumerate() {
        let dx = (i + 1) as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    // denominator is zero only for n < 2, handled above
    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;

    Regression { slope, intercept }
}

/// Regression line in centred form, `y_mean + slope * (i - x_mean)`, rounded to 3 decimals
pub fn regression_line(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let slope = linear_regression(values).slope;

    (0..values.len())
        .map(|i| round_to(y_mean + slope * (i as f64 - x_mean), 3))
        .collect()
}

/// Coefficient of determination of the least-squares fit, clamped to `[0, 1]`.
///
/// A flat series has no variance to explain and scores 0.
pub fn r_squared(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let fit = linear_regression(values);
    let y_mean = values.iter().sum::<f64>() / values.len() as f64;

    let mut ss_total = 0.0;
    let mut ss_residual = 0.0;

    for (i, &y) in values.iter().enumerate() {
        let y_pred = fit.predict((i + 1) as f64);
        ss_total += (y - y_mean).powi(2);
        ss_residual += (y - y_pred).powi(2);
    }

    if ss_total.abs() < 1e-10 {
        return 0.0;
    }

    (1.0 - ss_residual / ss_total).clamp(0.0, 1.0)
}
