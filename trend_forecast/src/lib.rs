//! # Trend Forecast
//!
//! Forecasting core behind the topic trend panel.
//!
//! ## Features
//!
//! - Count series with explicit historical/forecast flags and CSV export
//! - Regression and seasonality based extrapolation, plus a synthetic curve
//!   built from a sentiment score when no series is available
//! - Time-boxed response cache keyed by topic and period
//! - Single-flight requests with retry and exponential backoff on HTTP 429
//! - Toolkit-neutral chart specifications and chart instance lifecycle
//! - Topic history, display preferences and textual insights
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trend_forecast::chart::HeadlessSurface;
//! use trend_forecast::config::ForecastConfig;
//! use trend_forecast::logging::init_logging;
//! use trend_forecast::orchestrator::{ForecastOrchestrator, SubmissionOutcome};
//!
//! # async fn run() -> trend_forecast::Result<()> {
//! let config = ForecastConfig::load(None)?;
//! init_logging(&config.log_level)?;
//!
//! let orchestrator = ForecastOrchestrator::from_config(config, Box::new(HeadlessSurface::new()))?;
//!
//! match orchestrator.submit_topic("energia renovável").await {
//!     SubmissionOutcome::Success(view) => println!("{}: {}", view.insights.badge.text, view.summary),
//!     other => println!("{}", other.message()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod history;
pub mod insights;
pub mod logging;
pub mod orchestrator;
pub mod payload;
pub mod request;
pub mod synthesizer;
pub mod transport;

// Re-export commonly used types
pub use crate::cache::{Clock, ForecastCache, ManualClock, SystemClock};
pub use crate::chart::{ChartKind, ChartRenderer, ChartSpec, ChartSurface, RenderOptions};
pub use crate::config::ForecastConfig;
pub use crate::data::{ForecastSeries, PeriodSelector, Series, SeriesPoint};
pub use crate::error::{ForecastError, Result};
pub use crate::orchestrator::{ForecastOrchestrator, ForecastView, SubmissionOutcome, TopicQuery};
pub use crate::payload::{ForecastRequest, ForecastResponse};
pub use crate::request::{RequestController, RetryPolicy};
pub use crate::synthesizer::ForecastSynthesizer;
pub use crate::transport::{ForecastTransport, HttpTransport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
