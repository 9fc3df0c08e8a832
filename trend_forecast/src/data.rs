//! Count series handling for forecasting

use crate::error::{ForecastError, Result};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use trend_math::SeasonalUnit;

/// One observation (or projection) of a topic's volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub count: u64,
    pub is_forecast: bool,
}

impl SeriesPoint {
    /// Observed point
    pub fn historical(date: NaiveDate, count: u64) -> Self {
        Self {
            date,
            count,
            is_forecast: false,
        }
    }

    /// Projected point
    pub fn forecast(date: NaiveDate, count: u64) -> Self {
        Self {
            date,
            count,
            is_forecast: true,
        }
    }
}

/// Date-ordered sequence of points
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Series {
    points: Vec<SeriesPoint>,
}

impl Series {
    /// Create a series, rejecting points that go back in time
    pub fn new(points: Vec<SeriesPoint>) -> Result<Self> {
        if points.windows(2).any(|w| w[1].date < w[0].date) {
            return Err(ForecastError::ValidationError(
                "Series points must be in ascending date order".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// Create a historical series from `(date, count)` pairs, sorting by date
    pub fn from_counts(mut counts: Vec<(NaiveDate, u64)>) -> Self {
        counts.sort_by_key(|(date, _)| *date);
        Self {
            points: counts
                .into_iter()
                .map(|(date, count)| SeriesPoint::historical(date, count))
                .collect(),
        }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    /// Counts as floats, in order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count as f64).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Whether every point carries the given forecast flag
    pub fn all_flagged(&self, is_forecast: bool) -> bool {
        self.points.iter().all(|p| p.is_forecast == is_forecast)
    }

    /// Split into the historical prefix and the forecast suffix.
    ///
    /// Fails if a historical point follows a forecast point.
    pub fn split(&self) -> Result<ForecastSeries> {
        let boundary = self
            .points
            .iter()
            .position(|p| p.is_forecast)
            .unwrap_or(self.points.len());

        let (historical, forecast) = self.points.split_at(boundary);
        if forecast.iter().any(|p| !p.is_forecast) {
            return Err(ForecastError::ValidationError(
                "Historical and forecast points are interleaved".to_string(),
            ));
        }

        Ok(ForecastSeries {
            historical: Series {
                points: historical.to_vec(),
            },
            forecast: Series {
                points: forecast.to_vec(),
            },
        })
    }
}

/// Historical observations followed by their projection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub historical: Series,
    pub forecast: Series,
}

impl ForecastSeries {
    /// Pair two sub-series, checking their flags and that the forecast starts after the history
    pub fn new(historical: Series, forecast: Series) -> Result<Self> {
        if !historical.all_flagged(false) {
            return Err(ForecastError::ValidationError(
                "Historical series contains forecast points".to_string(),
            ));
        }
        if !forecast.all_flagged(true) {
            return Err(ForecastError::ValidationError(
                "Forecast series contains historical points".to_string(),
            ));
        }
        if let (Some(last), Some(next)) = (historical.last(), forecast.first()) {
            if next.date < last.date {
                return Err(ForecastError::ValidationError(
                    "Forecast starts before the end of the historical series".to_string(),
                ));
            }
        }
        Ok(Self {
            historical,
            forecast,
        })
    }

    /// Historical points then forecast points
    pub fn combined(&self) -> Vec<SeriesPoint> {
        self.historical
            .points()
            .iter()
            .chain(self.forecast.points())
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.historical.len() + self.forecast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calendar step between consecutive points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStep {
    Days(u32),
    Months(u32),
}

impl DateStep {
    /// `date` moved forward by `steps` units, `None` past the calendar range
    pub fn advance(&self, date: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            DateStep::Days(n) => date.checked_add_days(Days::new(u64::from(n * steps))),
            DateStep::Months(n) => date.checked_add_months(Months::new(n * steps)),
        }
    }
}

/// Window the user asked about: a number of days or a named period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodSelector {
    Days(u32),
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodSelector {
    /// Bounds the backend accepts for `dias`
    pub const MIN_DAYS: u32 = 1;
    pub const MAX_DAYS: u32 = 180;

    /// Day window clamped to what the backend accepts
    pub fn days(days: u32) -> Self {
        PeriodSelector::Days(days.clamp(Self::MIN_DAYS, Self::MAX_DAYS))
    }

    /// Step between forecast dates
    pub fn step(&self) -> DateStep {
        match self {
            PeriodSelector::Days(_) => DateStep::Days(1),
            PeriodSelector::Monthly => DateStep::Months(1),
            PeriodSelector::Quarterly => DateStep::Months(3),
            PeriodSelector::Yearly => DateStep::Months(12),
        }
    }

    /// Bucket unit for seasonality detection
    pub fn seasonal_unit(&self) -> SeasonalUnit {
        match self {
            PeriodSelector::Days(_) => SeasonalUnit::DayOfWeek,
            _ => SeasonalUnit::MonthOfYear,
        }
    }

    /// Value for the request's `dias` field
    pub fn request_days(&self) -> Option<u32> {
        match self {
            PeriodSelector::Days(n) => Some(*n),
            _ => None,
        }
    }

    /// Value for the request's `periodo` field
    pub fn request_period(&self) -> Option<&'static str> {
        match self {
            PeriodSelector::Days(_) => None,
            PeriodSelector::Monthly => Some("mensal"),
            PeriodSelector::Quarterly => Some("trimestral"),
            PeriodSelector::Yearly => Some("anual"),
        }
    }
}

impl Default for PeriodSelector {
    fn default() -> Self {
        PeriodSelector::Days(7)
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodSelector::Days(n) => write!(f, "{}d", n),
            PeriodSelector::Monthly => write!(f, "mensal"),
            PeriodSelector::Quarterly => write!(f, "trimestral"),
            PeriodSelector::Yearly => write!(f, "anual"),
        }
    }
}

impl FromStr for PeriodSelector {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "mensal" | "monthly" => Ok(PeriodSelector::Monthly),
            "trimestral" | "quarterly" => Ok(PeriodSelector::Quarterly),
            "anual" | "yearly" => Ok(PeriodSelector::Yearly),
            other => {
                let digits = other.strip_suffix('d').unwrap_or(other);
                digits
                    .parse::<u32>()
                    .map(PeriodSelector::days)
                    .map_err(|_| {
                        ForecastError::ValidationError(format!("Unsupported period: {}", s))
                    })
            }
        }
    }
}

/// Parse the calendar date at the start of an ISO 8601 string
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Serialize)]
struct CsvRow {
    date: NaiveDate,
    count: u64,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Render the combined series as `date,count,type` CSV
pub fn export_csv(series: &ForecastSeries) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for point in series.combined() {
        writer.serialize(CsvRow {
            date: point.date,
            count: point.count,
            kind: if point.is_forecast {
                "forecast"
            } else {
                "historical"
            },
        })?;
    }

    // An empty series still gets its header
    if series.is_empty() {
        writer.write_record(["date", "count", "type"])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ForecastError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| ForecastError::ValidationError(e.to_string()))
}

/// Write the CSV export to `path`
pub fn export_csv_to_path<P: AsRef<Path>>(series: &ForecastSeries, path: P) -> Result<()> {
    let csv = export_csv(series)?;
    std::fs::write(path, csv)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_series_rejects_unordered_points() {
        let points = vec![
            SeriesPoint::historical(date("2024-01-02"), 1),
            SeriesPoint::historical(date("2024-01-01"), 2),
        ];
        assert!(Series::new(points).is_err());
    }

    #[test]
    fn test_from_counts_sorts() {
        let series = Series::from_counts(vec![(date("2024-01-03"), 3), (date("2024-01-01"), 1)]);
        assert_eq!(series.values(), vec![1.0, 3.0]);
        assert!(series.all_flagged(false));
    }

    #[test]
    fn test_split_and_combine() {
        let series = Series::new(vec![
            SeriesPoint::historical(date("2024-01-01"), 1),
            SeriesPoint::historical(date("2024-01-02"), 2),
            SeriesPoint::forecast(date("2024-01-03"), 3),
        ])
        .unwrap();

        let split = series.split().unwrap();
        assert_eq!(split.historical.len(), 2);
        assert_eq!(split.forecast.len(), 1);
        assert_eq!(split.combined(), series.points().to_vec());
    }

    #[test]
    fn test_split_rejects_interleaving() {
        let series = Series::new(vec![
            SeriesPoint::historical(date("2024-01-01"), 1),
            SeriesPoint::forecast(date("2024-01-02"), 2),
            SeriesPoint::historical(date("2024-01-03"), 3),
        ])
        .unwrap();
        assert!(series.split().is_err());
    }

    #[test]
    fn test_forecast_series_checks_flags() {
        let historical = Series::new(vec![SeriesPoint::forecast(date("2024-01-01"), 1)]).unwrap();
        assert!(ForecastSeries::new(historical, Series::default()).is_err());
    }

    #[test]
    fn test_period_selector_parsing() {
        assert_eq!("7d".parse::<PeriodSelector>().unwrap(), PeriodSelector::Days(7));
        assert_eq!("30".parse::<PeriodSelector>().unwrap(), PeriodSelector::Days(30));
        assert_eq!("999d".parse::<PeriodSelector>().unwrap(), PeriodSelector::Days(180));
        assert_eq!("0d".parse::<PeriodSelector>().unwrap(), PeriodSelector::Days(1));
        assert_eq!("Mensal".parse::<PeriodSelector>().unwrap(), PeriodSelector::Monthly);
        assert_eq!("trimestral".parse::<PeriodSelector>().unwrap(), PeriodSelector::Quarterly);
        assert_eq!("anual".parse::<PeriodSelector>().unwrap(), PeriodSelector::Yearly);
        assert!("weekly".parse::<PeriodSelector>().is_err());
        assert_eq!(PeriodSelector::Days(7).to_string(), "7d");
    }

    #[test]
    fn test_date_steps() {
        let start = date("2024-01-31");
        assert_eq!(DateStep::Days(1).advance(start, 2), Some(date("2024-02-02")));
        assert_eq!(DateStep::Months(1).advance(start, 1), Some(date("2024-02-29")));
        assert_eq!(DateStep::Months(3).advance(start, 1), Some(date("2024-04-30")));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_iso_date("2024-03-05T10:00:00+00:00"), Some(date("2024-03-05")));
        assert_eq!(parse_iso_date("garbage"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[test]
    fn test_export_csv() {
        let series = ForecastSeries::new(
            Series::new(vec![SeriesPoint::historical(date("2024-01-01"), 3)]).unwrap(),
            Series::new(vec![SeriesPoint::forecast(date("2024-01-02"), 4)]).unwrap(),
        )
        .unwrap();

        let csv = export_csv(&series).unwrap();
        assert_eq!(
            csv,
            "date,count,type\n2024-01-01,3,historical\n2024-01-02,4,forecast\n"
        );
    }

    #[test]
    fn test_export_csv_empty() {
        let csv = export_csv(&ForecastSeries::default()).unwrap();
        assert_eq!(csv, "date,count,type\n");
    }
}
