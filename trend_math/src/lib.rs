//! # Trend Math
//!
//! Numeric primitives behind the trend panel.
//! This crate provides the pure functions used to summarise a count series:
//! - Least-squares regression and the centred regression line
//! - Trailing moving averages
//! - Sample standard deviation and variance
//! - Trend statistics and confidence scoring
//! - Seasonality detection over calendar buckets
//!
//! Nothing here performs I/O; every function is deterministic for a given input.

use thiserror::Error;

pub mod moving_averages;
pub mod regression;
pub mod seasonality;
pub mod trend;
pub mod volatility;

pub use moving_averages::moving_average;
pub use regression::{linear_regression, r_squared, regression_line, Regression};
pub use seasonality::{detect_seasonality, SeasonalUnit};
pub use trend::{
    confidence_from_series, trend_stats, ConfidenceLabel, ConfidenceScore, TrendStats,
};
pub use volatility::{mean, population_stddev, stddev, variance};

/// Errors that can occur in trend calculations
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for trend math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Round `value` to `decimals` decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
