//! # Orion Forecast
//!
//! Facade over the trend panel crates:
//! - [`math`] (`trend_math`): regression, moving averages, confidence scoring, seasonality
//! - [`forecast`] (`trend_forecast`): series model, synthesis, cache, requests,
//!   chart specs and the submit-topic orchestrator
//!
//! ## Example
//!
//! ```
//! use orion_forecast_workspace::math::trend_stats;
//!
//! let stats = trend_stats(&[3.0, 5.0, 4.0, 7.0]);
//! assert!(stats.slope > 0.0);
//! assert!((stats.pct - 133.33).abs() < 0.01);
//! ```

pub use trend_forecast as forecast;
pub use trend_math as math;

pub use trend_forecast::{
    ForecastConfig, ForecastError, ForecastOrchestrator, ForecastView, PeriodSelector,
    SubmissionOutcome, TopicQuery,
};

/// Version of the workspace facade
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
