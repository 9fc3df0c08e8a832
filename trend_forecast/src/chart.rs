//! Chart specification and instance lifecycle
//!
//! The renderer turns a [`ForecastSeries`] into a toolkit-neutral [`ChartSpec`]
//! and drives a [`ChartSurface`]. It holds at most one chart instance,
//! destroying the old one before drawing a new one, and keeps the instance
//! subscribed to container resizes until it is torn down.

use crate::data::{ForecastSeries, SeriesPoint};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use trend_math::moving_average;

/// Chart style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChartKind {
    #[default]
    Line,
    Area,
    Bar,
}

/// What to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub show_moving_average: bool,
    pub chart_kind: ChartKind,
    pub moving_average_window: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_moving_average: false,
            chart_kind: ChartKind::Line,
            moving_average_window: 3,
        }
    }
}

/// Role of a dataset within the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetRole {
    Historical,
    Forecast,
    MovingAverage,
}

/// One drawn series; `values` is aligned with [`ChartSpec::labels`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub role: DatasetRole,
    pub label: String,
    pub values: Vec<Option<f64>>,
    pub color: String,
    pub dashed: bool,
    pub fill: bool,
}

/// Everything a toolkit needs to draw the chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    /// Per label: whether the point is projected
    pub forecast_flags: Vec<bool>,
    /// Per label tooltip text
    pub tooltips: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartSpec {
    /// Build the spec for `series`.
    ///
    /// The forecast dataset repeats the last historical value so the two lines
    /// join; the moving average only covers historical points.
    pub fn build(series: &ForecastSeries, options: &RenderOptions) -> Result<Self> {
        let points = series.combined();
        if points.is_empty() {
            return Err(ForecastError::ValidationError(
                "Nothing to render: series is empty".to_string(),
            ));
        }

        let historical_len = series.historical.len();
        let fill = options.chart_kind == ChartKind::Area;

        let labels = points.iter().map(|p| p.date.to_string()).collect();
        let forecast_flags = points.iter().map(|p| p.is_forecast).collect();
        let tooltips = points.iter().map(tooltip).collect();

        let historical_values = points
            .iter()
            .map(|p| (!p.is_forecast).then_some(p.count as f64))
            .collect();

        let forecast_values = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let bridge = historical_len > 0 && i + 1 == historical_len;
                (p.is_forecast || bridge).then_some(p.count as f64)
            })
            .collect();

        let mut datasets = vec![
            Dataset {
                role: DatasetRole::Historical,
                label: "Historical".to_string(),
                values: historical_values,
                color: "#3b82f6".to_string(),
                dashed: false,
                fill,
            },
            Dataset {
                role: DatasetRole::Forecast,
                label: "Forecast".to_string(),
                values: forecast_values,
                color: "#f59e0b".to_string(),
                dashed: true,
                fill,
            },
        ];

        if options.show_moving_average && historical_len > 0 {
            let averages = moving_average(&series.historical.values(), options.moving_average_window)?;
            let mut values: Vec<Option<f64>> = averages.into_iter().map(Some).collect();
            values.resize(points.len(), None);

            datasets.push(Dataset {
                role: DatasetRole::MovingAverage,
                label: format!("Moving average ({})", options.moving_average_window),
                values,
                color: "#10b981".to_string(),
                dashed: false,
                fill: false,
            });
        }

        Ok(Self {
            kind: options.chart_kind,
            labels,
            forecast_flags,
            tooltips,
            datasets,
        })
    }

    pub fn dataset(&self, role: DatasetRole) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.role == role)
    }
}

fn tooltip(point: &SeriesPoint) -> String {
    let kind = if point.is_forecast {
        "forecast"
    } else {
        "historical"
    };
    format!("{}: {} ({})", point.date, point.count, kind)
}

/// Size of the host container in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

/// Identifier of a drawn chart instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartHandle(pub u64);

/// Capability the renderer needs from a UI toolkit
pub trait ChartSurface: Send {
    /// Create a chart instance for `spec`
    fn draw(&mut self, spec: &ChartSpec) -> ChartHandle;

    /// Release a chart instance
    fn destroy(&mut self, handle: ChartHandle);

    /// Resize a chart instance to the container
    fn resize(&mut self, handle: ChartHandle, size: ContainerSize);

    /// Start delivering container resizes for `handle`
    fn observe_resize(&mut self, handle: ChartHandle);

    /// Stop delivering container resizes for `handle`
    fn unobserve_resize(&mut self, handle: ChartHandle);
}

/// Result of a render call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(ChartSpec),
    /// Another render was in progress; this call was dropped
    Skipped,
}

#[derive(Debug, Clone)]
struct ChartInstance {
    handle: ChartHandle,
    spec: ChartSpec,
}

struct RendererState {
    surface: Box<dyn ChartSurface>,
    instance: Option<ChartInstance>,
}

impl RendererState {
    fn tear_down(&mut self) -> bool {
        match self.instance.take() {
            Some(instance) => {
                self.surface.unobserve_resize(instance.handle);
                self.surface.destroy(instance.handle);
                debug!(handle = instance.handle.0, "Destroyed chart instance");
                true
            }
            None => false,
        }
    }
}

/// Owns the single chart instance.
///
/// Calls are serialized by a busy flag: a render arriving while another is in
/// progress is dropped, not queued.
pub struct ChartRenderer {
    busy: AtomicBool,
    state: Mutex<RendererState>,
}

impl std::fmt::Debug for ChartRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartRenderer")
            .field("busy", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChartRenderer {
    pub fn new(surface: Box<dyn ChartSurface>) -> Self {
        Self {
            busy: AtomicBool::new(false),
            state: Mutex::new(RendererState {
                surface,
                instance: None,
            }),
        }
    }

    /// Replace the current chart with one for `series`
    pub fn render(&self, series: &ForecastSeries, options: &RenderOptions) -> Result<RenderOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Render already in progress, dropping call");
            return Ok(RenderOutcome::Skipped);
        }
        let _guard = BusyGuard(&self.busy);

        let spec = ChartSpec::build(series, options)?;

        let mut state = self.lock_state();
        state.tear_down();

        let handle = state.surface.draw(&spec);
        state.surface.observe_resize(handle);
        state.instance = Some(ChartInstance {
            handle,
            spec: spec.clone(),
        });

        debug!(handle = handle.0, points = spec.labels.len(), "Rendered chart");
        Ok(RenderOutcome::Rendered(spec))
    }

    /// Destroy the current chart and stop observing resizes
    pub fn destroy(&self) -> bool {
        self.lock_state().tear_down()
    }

    /// Forward a container resize to the live chart
    pub fn handle_container_resize(&self, size: ContainerSize) -> bool {
        let mut state = self.lock_state();
        match state.instance.as_ref().map(|i| i.handle) {
            Some(handle) => {
                state.surface.resize(handle, size);
                true
            }
            None => false,
        }
    }

    /// Spec of the live chart
    pub fn current_spec(&self) -> Option<ChartSpec> {
        self.lock_state().instance.as_ref().map(|i| i.spec.clone())
    }

    pub fn has_chart(&self) -> bool {
        self.lock_state().instance.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, RendererState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Calls made on a [`HeadlessSurface`]
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    pub drawn: Vec<(ChartHandle, ChartSpec)>,
    pub destroyed: Vec<ChartHandle>,
    pub resized: Vec<(ChartHandle, ContainerSize)>,
    pub observing: Vec<ChartHandle>,
}

impl SurfaceLog {
    /// Handles drawn and not yet destroyed
    pub fn live(&self) -> Vec<ChartHandle> {
        self.drawn
            .iter()
            .map(|(h, _)| *h)
            .filter(|h| !self.destroyed.contains(h))
            .collect()
    }
}

/// Surface that keeps specs in memory, for snapshotting and tests
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    log: Arc<Mutex<SurfaceLog>>,
    next_handle: u64,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the calls made so far
    pub fn log(&self) -> Arc<Mutex<SurfaceLog>> {
        Arc::clone(&self.log)
    }

    fn with_log<F: FnOnce(&mut SurfaceLog)>(&self, f: F) {
        let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut log);
    }
}

impl ChartSurface for HeadlessSurface {
    fn draw(&mut self, spec: &ChartSpec) -> ChartHandle {
        self.next_handle += 1;
        let handle = ChartHandle(self.next_handle);
        self.with_log(|log| log.drawn.push((handle, spec.clone())));
        handle
    }

    fn destroy(&mut self, handle: ChartHandle) {
        self.with_log(|log| log.destroyed.push(handle));
    }

    fn resize(&mut self, handle: ChartHandle, size: ContainerSize) {
        self.with_log(|log| log.resized.push((handle, size)));
    }

    fn observe_resize(&mut self, handle: ChartHandle) {
        self.with_log(|log| log.observing.push(handle));
    }

    fn unobserve_resize(&mut self, handle: ChartHandle) {
        self.with_log(|log| log.observing.retain(|h| *h != handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_iso_date, Series};
    use pretty_assertions::assert_eq;
    use std::sync::{OnceLock, Weak};

    fn sample() -> ForecastSeries {
        let d = |s: &str| parse_iso_date(s).unwrap();
        ForecastSeries::new(
            Series::new(vec![
                SeriesPoint::historical(d("2024-01-01"), 3),
                SeriesPoint::historical(d("2024-01-02"), 5),
                SeriesPoint::historical(d("2024-01-03"), 4),
            ])
            .unwrap(),
            Series::new(vec![
                SeriesPoint::forecast(d("2024-01-04"), 6),
                SeriesPoint::forecast(d("2024-01-05"), 7),
            ])
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_spec_datasets() {
        let options = RenderOptions {
            show_moving_average: true,
            ..Default::default()
        };
        let spec = ChartSpec::build(&sample(), &options).unwrap();

        assert_eq!(spec.labels.len(), 5);
        assert_eq!(spec.forecast_flags, vec![false, false, false, true, true]);
        assert_eq!(spec.datasets.len(), 3);

        let historical = spec.dataset(DatasetRole::Historical).unwrap();
        assert_eq!(
            historical.values,
            vec![Some(3.0), Some(5.0), Some(4.0), None, None]
        );

        let forecast = spec.dataset(DatasetRole::Forecast).unwrap();
        assert!(forecast.dashed);
        assert_eq!(forecast.values, vec![None, None, Some(4.0), Some(6.0), Some(7.0)]);

        let ma = spec.dataset(DatasetRole::MovingAverage).unwrap();
        assert_eq!(ma.values, vec![Some(3.0), Some(4.0), Some(4.0), None, None]);

        assert_eq!(spec.tooltips[0], "2024-01-01: 3 (historical)");
        assert_eq!(spec.tooltips[4], "2024-01-05: 7 (forecast)");
    }

    #[test]
    fn test_spec_without_moving_average() {
        let options = RenderOptions {
            chart_kind: ChartKind::Area,
            ..Default::default()
        };
        let spec = ChartSpec::build(&sample(), &options).unwrap();

        assert_eq!(spec.datasets.len(), 2);
        assert!(spec.datasets.iter().all(|d| d.fill));
        assert_eq!(spec.kind, ChartKind::Area);
    }

    #[test]
    fn test_empty_series_is_rejected() {
        let result = ChartSpec::build(&ForecastSeries::default(), &RenderOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_render_destroys_previous_instance() {
        let surface = HeadlessSurface::new();
        let log = surface.log();
        let renderer = ChartRenderer::new(Box::new(surface));

        renderer.render(&sample(), &RenderOptions::default()).unwrap();
        renderer.render(&sample(), &RenderOptions::default()).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.drawn.len(), 2);
        assert_eq!(log.destroyed, vec![ChartHandle(1)]);
        assert_eq!(log.live(), vec![ChartHandle(2)]);
        assert_eq!(log.observing, vec![ChartHandle(2)]);
    }

    #[test]
    fn test_resize_and_destroy() {
        let surface = HeadlessSurface::new();
        let log = surface.log();
        let renderer = ChartRenderer::new(Box::new(surface));
        let size = ContainerSize {
            width: 640,
            height: 320,
        };

        assert!(!renderer.handle_container_resize(size));

        renderer.render(&sample(), &RenderOptions::default()).unwrap();
        assert!(renderer.handle_container_resize(size));
        assert!(renderer.destroy());
        assert!(!renderer.destroy());
        assert!(!renderer.has_chart());

        let log = log.lock().unwrap();
        assert_eq!(log.resized, vec![(ChartHandle(1), size)]);
        assert!(log.observing.is_empty());
        assert!(log.live().is_empty());
    }

    /// Surface that calls back into the renderer while drawing
    struct ReentrantSurface {
        inner: HeadlessSurface,
        renderer: Arc<OnceLock<Weak<ChartRenderer>>>,
        nested: Arc<Mutex<Vec<RenderOutcome>>>,
    }

    impl ChartSurface for ReentrantSurface {
        fn draw(&mut self, spec: &ChartSpec) -> ChartHandle {
            if let Some(renderer) = self.renderer.get().and_then(Weak::upgrade) {
                let outcome = renderer
                    .render(&sample(), &RenderOptions::default())
                    .unwrap();
                self.nested.lock().unwrap().push(outcome);
            }
            self.inner.draw(spec)
        }

        fn destroy(&mut self, handle: ChartHandle) {
            self.inner.destroy(handle)
        }

        fn resize(&mut self, handle: ChartHandle, size: ContainerSize) {
            self.inner.resize(handle, size)
        }

        fn observe_resize(&mut self, handle: ChartHandle) {
            self.inner.observe_resize(handle)
        }

        fn unobserve_resize(&mut self, handle: ChartHandle) {
            self.inner.unobserve_resize(handle)
        }
    }

    #[test]
    fn test_reentrant_render_is_dropped() {
        let cell = Arc::new(OnceLock::new());
        let nested = Arc::new(Mutex::new(Vec::new()));
        let surface = ReentrantSurface {
            inner: HeadlessSurface::new(),
            renderer: Arc::clone(&cell),
            nested: Arc::clone(&nested),
        };
        let log = surface.inner.log();

        let renderer = Arc::new(ChartRenderer::new(Box::new(surface)));
        cell.set(Arc::downgrade(&renderer)).unwrap();

        let outcome = renderer.render(&sample(), &RenderOptions::default()).unwrap();

        assert!(matches!(outcome, RenderOutcome::Rendered(_)));
        assert_eq!(*nested.lock().unwrap(), vec![RenderOutcome::Skipped]);
        assert_eq!(log.lock().unwrap().drawn.len(), 1);

        // The flag is released once the outer call returns
        let again = renderer.render(&sample(), &RenderOptions::default()).unwrap();
        assert!(matches!(again, RenderOutcome::Rendered(_)));
    }
}
