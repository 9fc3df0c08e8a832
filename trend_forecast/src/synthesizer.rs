//! Forward-looking series synthesis
//!
//! Two paths produce a forecast:
//! - a regression extrapolation of a true historical series, optionally
//!   reshaped by detected seasonality
//! - a synthetic curve built from a single sentiment score when the server
//!   supplies no usable series

use crate::data::{DateStep, ForecastSeries, PeriodSelector, Series, SeriesPoint};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;
use trend_math::{detect_seasonality, linear_regression, mean, r_squared, variance};

/// Neutral level of the synthetic sentiment curve
pub const SENTIMENT_BASELINE: f64 = 50.0;
/// Scale from sentiment units (roughly -40..+40) to curve units (0..100)
pub const SENTIMENT_SCALE: f64 = 1.25;
/// Upper bound of the forecast confidence
pub const MAX_FORECAST_CONFIDENCE: f64 = 0.95;

/// Builds forecast series; owns the random source used for synthetic noise
pub struct ForecastSynthesizer {
    rng: Box<dyn RngCore + Send>,
    jitter: f64,
}

impl std::fmt::Debug for ForecastSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastSynthesizer")
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl ForecastSynthesizer {
    /// Create a synthesizer seeded from the OS
    pub fn new(jitter: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), jitter)
    }

    /// Create a synthesizer with an explicit random source
    pub fn with_rng<R: RngCore + Send + 'static>(rng: R, jitter: f64) -> Self {
        Self {
            rng: Box::new(rng),
            jitter: jitter.max(0.0),
        }
    }

    /// Extrapolate the regression line `horizon` steps past the last historical point.
    ///
    /// Values are floored at zero and rounded; dates advance by `step`.
    pub fn forecast_linear(
        &self,
        historical: &Series,
        horizon: usize,
        step: DateStep,
    ) -> Result<Series> {
        let last = historical.last().ok_or(ForecastError::InsufficientData {
            points: 0,
            required: 1,
        })?;

        let fit = linear_regression(&historical.values());
        let last_position = historical.len() as f64;

        let mut points = Vec::with_capacity(horizon);
        for i in 1..=horizon {
            let projected = fit.predict(last_position + i as f64).max(0.0).round() as u64;
            let date = step.advance(last.date, i as u32).ok_or_else(|| {
                ForecastError::ValidationError("Forecast date out of range".to_string())
            })?;
            points.push(SeriesPoint::forecast(date, projected));
        }

        Series::new(points)
    }

    /// Linear forecast scaled by `1 + deviation` of each point's seasonal bucket.
    ///
    /// The linear forecast is returned unchanged unless the history has enough
    /// points and touches every bucket of the period's seasonal unit.
    pub fn forecast_with_seasonality(
        &self,
        historical: &Series,
        horizon: usize,
        period: PeriodSelector,
    ) -> Result<Series> {
        let linear = self.forecast_linear(historical, horizon, period.step())?;

        let unit = period.seasonal_unit();
        let dates = historical.dates();
        if !unit.covers_full_cycle(&dates) {
            return Ok(linear);
        }
        let deviations = match detect_seasonality(&dates, &historical.values(), unit) {
            Some(deviations) => deviations,
            None => return Ok(linear),
        };

        debug!(?deviations, "Applying seasonal adjustment");

        let points = linear
            .points()
            .iter()
            .map(|p| {
                let factor = 1.0 + deviations[unit.bucket(p.date)];
                let adjusted = (p.count as f64 * factor).max(0.0).round() as u64;
                SeriesPoint::forecast(p.date, adjusted)
            })
            .collect();

        Series::new(points)
    }

    /// Synthetic series from a sentiment score.
    ///
    /// A single historical anchor sits at the baseline on `today`; the forecast
    /// follows an ease-in-out curve from the baseline to the clamped target,
    /// with bounded noise.
    pub fn build_synthetic_series_from_sentiment(
        &mut self,
        sentiment: f64,
        horizon_days: usize,
        today: NaiveDate,
    ) -> Result<ForecastSeries> {
        let target = (SENTIMENT_BASELINE + sentiment * SENTIMENT_SCALE).clamp(0.0, 100.0);

        let historical = Series::new(vec![SeriesPoint::historical(
            today,
            SENTIMENT_BASELINE as u64,
        )])?;

        let mut points = Vec::with_capacity(horizon_days);
        for i in 1..=horizon_days {
            let t = i as f64 / horizon_days as f64;
            let level = SENTIMENT_BASELINE + (target - SENTIMENT_BASELINE) * ease_in_out(t);
            let noise = if self.jitter > 0.0 {
                self.rng.gen_range(-self.jitter..=self.jitter)
            } else {
                0.0
            };
            let value = (level + noise).clamp(0.0, 100.0).round() as u64;
            let date = DateStep::Days(1).advance(today, i as u32).ok_or_else(|| {
                ForecastError::ValidationError("Forecast date out of range".to_string())
            })?;
            points.push(SeriesPoint::forecast(date, value));
        }

        ForecastSeries::new(historical, Series::new(points)?)
    }
}

/// Confidence in a forecast, in `[0, 0.95]`.
///
/// Blends R² of the historical fit (0.4), a stability factor
/// `max(0, 1 - variance / (mean + 1))` (0.4) and slope strength
/// `min(1, |slope| * 10)` (0.2).
pub fn calculate_forecast_confidence(historical: &Series, forecast: &Series) -> f64 {
    if historical.len() < 2 || forecast.is_empty() {
        return 0.0;
    }

    let values = historical.values();
    let fit = linear_regression(&values);

    let r2 = r_squared(&values);
    let stability = (1.0 - variance(&values) / (mean(&values) + 1.0)).max(0.0);
    let slope_strength = (fit.slope.abs() * 10.0).min(1.0);

    let confidence = 0.4 * r2 + 0.4 * stability + 0.2 * slope_strength;
    if confidence.is_finite() {
        confidence.clamp(0.0, MAX_FORECAST_CONFIDENCE)
    } else {
        0.0
    }
}

/// Quadratic ease-in-out over `t` in `[0, 1]`
fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}
