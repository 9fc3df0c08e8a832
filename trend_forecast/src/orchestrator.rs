//! Submit-topic entry point
//!
//! [`ForecastOrchestrator`] owns the cache, the request controller, the
//! synthesizer, the chart renderer and the topic history. A UI binds to it,
//! calls [`ForecastOrchestrator::submit`], and reads the resulting
//! [`ForecastView`] back.
//!
//! Each submission runs `Idle -> Submitting -> {Success, Cancelled, Failed} -> Idle`.
//! Shared state is only written while the submission still owns the
//! single-flight slot, so a superseded request never touches the cache, the
//! history or the chart.

use crate::cache::{Clock, ForecastCache, SystemClock};
use crate::chart::{ChartRenderer, ChartSpec, ChartSurface, ContainerSize, RenderOutcome};
use crate::config::ForecastConfig;
use crate::data::{export_csv, ForecastSeries, PeriodSelector, Series};
use crate::error::{ForecastError, Result};
use crate::history::{Preferences, TopicHistory, TopicHistoryItem};
use crate::insights::{ArticlePage, Insights};
use crate::payload::{Article, ForecastRequest, ForecastResponse};
use crate::request::{RequestController, RequestTicket, RetryPolicy};
use crate::synthesizer::{calculate_forecast_confidence, ForecastSynthesizer, MAX_FORECAST_CONFIDENCE};
use crate::transport::{ForecastTransport, HttpTransport};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use trend_math::{confidence_from_series, trend_stats, ConfidenceScore, TrendStats};

/// Fewest true-series points the synthesizer is given
pub const MIN_SERIES_POINTS: usize = 3;

/// Shown when the server sent neither `previsao` nor `previsao_texto`
pub const NO_SUMMARY_TEXT: &str = "No summary available for this topic.";

/// A topic submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicQuery {
    pub topic: String,
    /// `None` uses the period from the stored preferences
    pub period: Option<PeriodSelector>,
    /// Inclusive year range for the articles
    pub years: Option<(i32, i32)>,
}

impl TopicQuery {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            period: None,
            years: None,
        }
    }

    pub fn period(mut self, period: PeriodSelector) -> Self {
        self.period = Some(period);
        self
    }

    pub fn years(mut self, from: i32, to: i32) -> Self {
        self.years = Some((from, to));
        self
    }
}

/// Where the displayed series came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    /// True series from the server, extrapolated locally
    Server,
    /// Synthetic curve built from the sentiment score
    Sentiment,
}

/// Everything the UI shows for the last successful submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastView {
    pub topic: String,
    pub period: PeriodSelector,
    pub source: SeriesSource,
    pub series: ForecastSeries,
    pub stats: TrendStats,
    pub confidence: ConfidenceScore,
    pub insights: Insights,
    pub summary: String,
    pub articles: Vec<Article>,
    /// Spec of the drawn chart; `None` if the render was dropped
    pub chart: Option<ChartSpec>,
    pub from_cache: bool,
}

/// Phase of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting { topic: String, request_id: u64 },
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Success(Box<ForecastView>),
    /// Superseded by a newer submission
    Cancelled,
    /// Network, server or payload failure; the previous view is kept
    Failed(String),
    /// Fewer than [`MIN_SERIES_POINTS`] points came back
    InsufficientData(String),
    /// Blank topic; nothing was sent
    Rejected(String),
}

impl SubmissionOutcome {
    fn from_error(error: &ForecastError) -> Self {
        match error {
            ForecastError::Cancelled => SubmissionOutcome::Cancelled,
            ForecastError::InsufficientData { .. } => {
                SubmissionOutcome::InsufficientData(error.user_message())
            }
            ForecastError::ValidationError(_) => SubmissionOutcome::Rejected(error.user_message()),
            other => SubmissionOutcome::Failed(other.user_message()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubmissionOutcome::Cancelled)
    }

    /// Text for the status line
    pub fn message(&self) -> String {
        match self {
            SubmissionOutcome::Success(view) => view.summary.clone(),
            SubmissionOutcome::Cancelled => ForecastError::Cancelled.user_message(),
            SubmissionOutcome::Failed(msg)
            | SubmissionOutcome::InsufficientData(msg)
            | SubmissionOutcome::Rejected(msg) => msg.clone(),
        }
    }
}

/// Tunables taken from [`ForecastConfig`]
#[derive(Debug, Clone)]
struct Settings {
    horizon: usize,
    moving_average_window: usize,
    articles_per_page: usize,
    history_path: Option<PathBuf>,
    preferences_path: Option<PathBuf>,
}

impl From<&ForecastConfig> for Settings {
    fn from(config: &ForecastConfig) -> Self {
        Self {
            horizon: config.horizon,
            moving_average_window: config.moving_average_window,
            articles_per_page: config.articles_per_page,
            history_path: config.history_path.clone(),
            preferences_path: config.preferences_path.clone(),
        }
    }
}

/// Builder for [`ForecastOrchestrator`]
pub struct OrchestratorBuilder {
    transport: Arc<dyn ForecastTransport>,
    surface: Box<dyn ChartSurface>,
    config: ForecastConfig,
    clock: Arc<dyn Clock>,
    rng: Option<Box<dyn RngCore + Send>>,
    history: Option<TopicHistory>,
    preferences: Option<Preferences>,
}

impl OrchestratorBuilder {
    pub fn new(transport: Arc<dyn ForecastTransport>, surface: Box<dyn ChartSurface>) -> Self {
        Self {
            transport,
            surface,
            config: ForecastConfig::default(),
            clock: Arc::new(SystemClock),
            rng: None,
            history: None,
            preferences: None,
        }
    }

    pub fn config(mut self, config: ForecastConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock for cache expiry, history timestamps and "today"
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Random source for the synthetic sentiment curve
    pub fn rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn history(mut self, history: TopicHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Build, loading history and preferences from the configured paths
    /// unless they were supplied
    pub fn build(self) -> Result<ForecastOrchestrator> {
        self.config.validate()?;
        let settings = Settings::from(&self.config);

        let history = match (self.history, &settings.history_path) {
            (Some(history), _) => history,
            (None, Some(path)) => TopicHistory::load(path, self.config.history_capacity)?,
            (None, None) => TopicHistory::new(self.config.history_capacity),
        };

        let preferences = match (self.preferences, &settings.preferences_path) {
            (Some(preferences), _) => preferences,
            (None, Some(path)) => Preferences::load(path)?,
            (None, None) => Preferences::default(),
        };

        let synthesizer = match self.rng {
            Some(rng) => ForecastSynthesizer::with_rng(rng, self.config.sentiment_jitter),
            None => ForecastSynthesizer::new(self.config.sentiment_jitter),
        };

        let cache = ForecastCache::with_clock(self.config.cache_ttl(), Arc::clone(&self.clock))
            .with_case_folding(self.config.fold_cache_key_case);

        Ok(ForecastOrchestrator {
            controller: RequestController::new(self.transport, self.config.retry_policy()),
            renderer: ChartRenderer::new(self.surface),
            cache: Mutex::new(cache),
            synthesizer: Mutex::new(synthesizer),
            history: Mutex::new(history),
            history_revision: AtomicU64::new(0),
            saved_revision: Mutex::new(0),
            preferences: Mutex::new(preferences),
            view: Mutex::new(None),
            state: Mutex::new(SubmissionState::Idle),
            clock: self.clock,
            settings,
        })
    }
}

/// History as of one mutation, written to disk after the single-flight slot is released
struct HistorySnapshot {
    revision: u64,
    history: TopicHistory,
}

/// Series and derived figures, computed before anything is committed
struct Prepared {
    source: SeriesSource,
    series: ForecastSeries,
    stats: TrendStats,
    confidence: ConfidenceScore,
    insights: Insights,
}

/// Coordinates cache, requests, synthesis, rendering and history
pub struct ForecastOrchestrator {
    controller: RequestController,
    renderer: ChartRenderer,
    cache: Mutex<ForecastCache>,
    synthesizer: Mutex<ForecastSynthesizer>,
    history: Mutex<TopicHistory>,
    /// Bumped on every history mutation, under the history lock
    history_revision: AtomicU64,
    /// Revision last written to disk
    saved_revision: Mutex<u64>,
    preferences: Mutex<Preferences>,
    view: Mutex<Option<ForecastView>>,
    state: Mutex<SubmissionState>,
    clock: Arc<dyn Clock>,
    settings: Settings,
}

impl std::fmt::Debug for ForecastOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastOrchestrator")
            .field("controller", &self.controller)
            .field("state", &self.state())
            .finish()
    }
}

impl ForecastOrchestrator {
    pub fn builder(
        transport: Arc<dyn ForecastTransport>,
        surface: Box<dyn ChartSurface>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(transport, surface)
    }

    /// Orchestrator talking HTTP to the configured endpoint
    pub fn from_config(config: ForecastConfig, surface: Box<dyn ChartSurface>) -> Result<Self> {
        let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout())
            .map_err(|e| ForecastError::ConfigError(e.to_string()))?;
        Self::builder(Arc::new(transport), surface)
            .config(config)
            .build()
    }

    /// Submit `topic` with the preferred period
    pub async fn submit_topic(&self, topic: &str) -> SubmissionOutcome {
        self.submit(TopicQuery::new(topic)).await
    }

    /// Run one submission to completion; never returns an error to the caller
    pub async fn submit(&self, query: TopicQuery) -> SubmissionOutcome {
        let topic = query.topic.trim().to_string();
        if topic.is_empty() {
            debug!("Ignoring blank topic");
            return SubmissionOutcome::from_error(&ForecastError::ValidationError(
                "Enter a topic to forecast.".to_string(),
            ));
        }

        let period = query.period.unwrap_or_else(|| lock(&self.preferences).period);
        let ticket = self.controller.begin();
        if ticket.superseded_previous() {
            info!(topic = %topic, "Previous query cancelled by new submission");
        }
        *lock(&self.state) = SubmissionState::Submitting {
            topic: topic.clone(),
            request_id: ticket.id(),
        };

        let outcome = match self.run(&ticket, &topic, period, query.years).await {
            Ok(view) => SubmissionOutcome::Success(Box::new(view)),
            Err(e) => {
                match &e {
                    ForecastError::Cancelled => info!(topic = %topic, "Forecast request cancelled"),
                    ForecastError::InsufficientData { points, .. } => {
                        info!(topic = %topic, points, "Not enough data to forecast")
                    }
                    other => warn!(topic = %topic, error = %other, "Forecast submission failed"),
                }
                SubmissionOutcome::from_error(&e)
            }
        };

        self.controller.finish(&ticket);
        let mut state = lock(&self.state);
        if matches!(&*state, SubmissionState::Submitting { request_id, .. } if *request_id == ticket.id())
        {
            *state = SubmissionState::Idle;
        }
        outcome
    }

    async fn run(
        &self,
        ticket: &RequestTicket,
        topic: &str,
        period: PeriodSelector,
        years: Option<(i32, i32)>,
    ) -> Result<ForecastView> {
        let key = {
            let cache = lock(&self.cache);
            let period_key = match years {
                Some((from, to)) => format!("{}:{}-{}", period, from, to),
                None => period.to_string(),
            };
            cache.key(topic, &period_key)
        };

        let cached = lock(&self.cache).get(&key);
        let from_cache = cached.is_some();
        let response = match cached {
            Some(response) => response,
            None => {
                let mut request = ForecastRequest::new(topic, period);
                if let Some((from, to)) = years {
                    request = request.with_years(from, to);
                }
                let reply = self
                    .controller
                    .fetch_with_retry(&request, ticket.token())
                    .await?;
                ForecastResponse::from_body(&reply.body)
            }
        };

        if ticket.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        if let Some(message) = response.erro.as_deref().filter(|m| !m.trim().is_empty()) {
            return Err(ForecastError::ServerError(message.to_string()));
        }

        let prepared = self.prepare(&response, period);
        let view_inputs = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                // Keep the payload so a retry of the same topic skips the network
                if !from_cache {
                    self.controller.complete_if_current(ticket, || {
                        lock(&self.cache).set(&key, response.clone())
                    });
                }
                return Err(e);
            }
        };

        let summary = response
            .summary_text()
            .unwrap_or(NO_SUMMARY_TEXT)
            .to_string();

        let (view, snapshot) = self
            .controller
            .complete_if_current(ticket, || {
                self.commit(topic, period, &key, from_cache, &response, view_inputs, summary)
            })
            .ok_or(ForecastError::Cancelled)?;

        if let Some(snapshot) = snapshot {
            if let Err(e) = self.persist_history(&snapshot) {
                warn!(error = %e, "Failed to save topic history");
            }
        }
        Ok(view)
    }

    /// Resolve the series to display and derive its figures
    fn prepare(&self, response: &ForecastResponse, period: PeriodSelector) -> Result<Prepared> {
        let horizon = self.settings.horizon;
        let historical = response.true_series();
        if let Some(meta) = &response.meta {
            debug!(
                series_total = ?meta.series_total,
                articles_total = ?meta.artigos_total,
                year_filtered = ?meta.filtrado_por_ano,
                "Server query echo"
            );
        }

        let (source, series, signal) = if !historical.is_empty() {
            if historical.len() < MIN_SERIES_POINTS {
                return Err(ForecastError::InsufficientData {
                    points: historical.len(),
                    required: MIN_SERIES_POINTS,
                });
            }
            let forecast = lock(&self.synthesizer).forecast_with_seasonality(&historical, horizon, period)?;
            let signal = historical.clone();
            (SeriesSource::Server, ForecastSeries::new(historical, forecast)?, signal)
        } else if let Some(sentiment) = response.sentiment() {
            let today = self.today();
            let series = lock(&self.synthesizer)
                .build_synthetic_series_from_sentiment(sentiment, horizon, today)?;
            let signal = Series::new(series.combined())?;
            (SeriesSource::Sentiment, series, signal)
        } else {
            return Err(ForecastError::InsufficientData {
                points: 0,
                required: MIN_SERIES_POINTS,
            });
        };

        let values = signal.values();
        let stats = trend_stats(&values);
        let confidence = confidence_from_series(&values, &stats);

        let forecast_confidence = match source {
            SeriesSource::Server => calculate_forecast_confidence(&series.historical, &series.forecast),
            SeriesSource::Sentiment => response
                .content_analysis
                .as_ref()
                .and_then(|c| c.confianca)
                .filter(|c| c.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, MAX_FORECAST_CONFIDENCE),
        };

        let insights = Insights::derive(&signal, &stats, confidence, forecast_confidence, response);

        Ok(Prepared {
            source,
            series,
            stats,
            confidence,
            insights,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        topic: &str,
        period: PeriodSelector,
        key: &str,
        from_cache: bool,
        response: &ForecastResponse,
        prepared: Prepared,
        summary: String,
    ) -> (ForecastView, Option<HistorySnapshot>) {
        if !from_cache {
            lock(&self.cache).set(key, response.clone());
        }

        let snapshot = {
            let mut history = lock(&self.history);
            history.record(topic, Some(period), self.now());
            self.snapshot_history(&history)
        };

        let options = lock(&self.preferences).render_options(self.settings.moving_average_window);
        let chart = match self.renderer.render(&prepared.series, &options) {
            Ok(RenderOutcome::Rendered(spec)) => Some(spec),
            Ok(RenderOutcome::Skipped) => None,
            Err(e) => {
                warn!(error = %e, "Chart render failed");
                None
            }
        };

        let view = ForecastView {
            topic: topic.to_string(),
            period,
            source: prepared.source,
            series: prepared.series,
            stats: prepared.stats,
            confidence: prepared.confidence,
            insights: prepared.insights,
            summary,
            articles: response.articles().to_vec(),
            chart,
            from_cache,
        };

        info!(
            topic,
            source = ?view.source,
            points = view.series.len(),
            from_cache,
            "Forecast ready"
        );
        *lock(&self.view) = Some(view.clone());
        (view, snapshot)
    }

    /// Bump the revision; the snapshot is only taken when history is persisted.
    /// Call with the history lock held.
    fn snapshot_history(&self, history: &TopicHistory) -> Option<HistorySnapshot> {
        let revision = self.history_revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.settings.history_path.as_ref().map(|_| HistorySnapshot {
            revision,
            history: history.clone(),
        })
    }

    /// Write `snapshot` unless a newer revision already reached the disk
    fn persist_history(&self, snapshot: &HistorySnapshot) -> Result<()> {
        let path = match &self.settings.history_path {
            Some(path) => path,
            None => return Ok(()),
        };

        let mut saved = lock(&self.saved_revision);
        if snapshot.revision <= *saved {
            debug!(revision = snapshot.revision, saved = *saved, "Skipping stale history snapshot");
            return Ok(());
        }
        snapshot.history.save(path)?;
        *saved = snapshot.revision;
        Ok(())
    }

    /// Cancel the live submission, if any
    pub fn cancel(&self) -> bool {
        self.controller.cancel_in_flight()
    }

    pub fn state(&self) -> SubmissionState {
        lock(&self.state).clone()
    }

    /// Last successful result
    pub fn view(&self) -> Option<ForecastView> {
        lock(&self.view).clone()
    }

    /// History, most recent first
    pub fn history(&self) -> Vec<TopicHistoryItem> {
        lock(&self.history).items().cloned().collect()
    }

    pub fn clear_history(&self) -> Result<()> {
        let snapshot = {
            let mut history = lock(&self.history);
            history.clear();
            self.snapshot_history(&history)
        };
        match snapshot {
            Some(snapshot) => self.persist_history(&snapshot),
            None => Ok(()),
        }
    }

    pub fn preferences(&self) -> Preferences {
        *lock(&self.preferences)
    }

    /// Store new preferences and redraw the current series with them
    pub fn set_preferences(&self, preferences: Preferences) -> Result<()> {
        *lock(&self.preferences) = preferences;
        if let Some(path) = &self.settings.preferences_path {
            preferences.save(path)?;
        }

        let mut view = lock(&self.view);
        if let Some(view) = view.as_mut() {
            let options = preferences.render_options(self.settings.moving_average_window);
            if let RenderOutcome::Rendered(spec) = self.renderer.render(&view.series, &options)? {
                view.chart = Some(spec);
            }
        }
        Ok(())
    }

    /// Page of the current article list
    pub fn articles_page(&self, page: usize) -> ArticlePage {
        let view = lock(&self.view);
        let articles = view.as_ref().map(|v| v.articles.as_slice()).unwrap_or_default();
        ArticlePage::paginate(articles, page, self.settings.articles_per_page)
    }

    /// CSV of the current series
    pub fn export_csv(&self) -> Result<String> {
        match lock(&self.view).as_ref() {
            Some(view) => export_csv(&view.series),
            None => Err(ForecastError::ValidationError(
                "Nothing to export yet".to_string(),
            )),
        }
    }

    /// Forward a container resize to the chart
    pub fn handle_container_resize(&self, size: ContainerSize) -> bool {
        self.renderer.handle_container_resize(size)
    }

    /// Destroy the chart; the view data is kept
    pub fn clear_chart(&self) -> bool {
        let destroyed = self.renderer.destroy();
        if let Some(view) = lock(&self.view).as_mut() {
            view.chart = None;
        }
        destroyed
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.controller.policy()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_millis() as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::chart::HeadlessSurface;
    use crate::transport::{HttpReply, TransportError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays replies in order, repeating the last one
    struct FixedTransport {
        replies: Mutex<Vec<HttpReply>>,
        calls: AtomicUsize,
    }

    impl FixedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Self::sequence(vec![HttpReply::new(status, body)])
        }

        fn sequence(replies: Vec<HttpReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ForecastTransport for FixedTransport {
        async fn send(
            &self,
            _request: &ForecastRequest,
        ) -> std::result::Result<HttpReply, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            Ok(reply)
        }
    }

    const SERIES_BODY: &str = r#"{
        "previsao": "Coverage is growing.",
        "series": [
            {"date": "2024-01-01", "count": 3},
            {"date": "2024-01-02", "count": 5},
            {"date": "2024-01-03", "count": 4},
            {"date": "2024-01-04", "count": 7}
        ],
        "artigos": [{"titulo": "Solar", "url": "https://example.org/a", "data_iso": "2024-01-04", "fonte": "Folha"}]
    }"#;

    fn orchestrator(transport: Arc<FixedTransport>) -> (ForecastOrchestrator, ManualClock) {
        let clock = ManualClock::new(1_704_067_200_000);
        let orchestrator = ForecastOrchestrator::builder(transport, Box::new(HeadlessSurface::new()))
            .clock(Arc::new(clock.clone()))
            .rng(StdRng::seed_from_u64(3))
            .build()
            .unwrap();
        (orchestrator, clock)
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected_without_request() {
        let transport = FixedTransport::new(200, SERIES_BODY);
        let (orchestrator, _) = orchestrator(transport.clone());

        let outcome = orchestrator.submit_topic("   ").await;

        assert!(matches!(outcome, SubmissionOutcome::Rejected(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn test_success_populates_view() {
        let transport = FixedTransport::new(200, SERIES_BODY);
        let (orchestrator, _) = orchestrator(transport);

        let outcome = orchestrator.submit_topic("energia").await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "Coverage is growing.");
        let view = orchestrator.view().unwrap();
        assert_eq!(view.source, SeriesSource::Server);
        assert_eq!(view.series.historical.len(), 4);
        assert_eq!(view.series.forecast.len(), 7);
        assert!(view.chart.is_some());
        assert_eq!(orchestrator.history().len(), 1);
        assert_eq!(orchestrator.articles_page(1).items.len(), 1);
        assert_eq!(orchestrator.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let transport = FixedTransport::new(200, SERIES_BODY);
        let (orchestrator, clock) = orchestrator(transport.clone());

        orchestrator.submit_topic("energia").await;
        let second = orchestrator.submit_topic("Energia").await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        match second {
            SubmissionOutcome::Success(view) => assert!(view.from_cache),
            other => panic!("Expected success, got {:?}", other),
        }

        clock.advance(std::time::Duration::from_millis(120_001));
        orchestrator.submit_topic("energia").await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_keep_previous_view() {
        let transport = FixedTransport::sequence(vec![
            HttpReply::new(200, SERIES_BODY),
            HttpReply::new(200, r#"{"erro": "Tema não encontrado"}"#),
            HttpReply::new(404, "no such route"),
        ]);
        let (orchestrator, _) = orchestrator(transport);

        orchestrator.submit_topic("energia").await;
        let before = orchestrator.view();
        assert!(before.is_some());

        let outcome = orchestrator.submit_topic("clima").await;
        assert_eq!(outcome, SubmissionOutcome::Failed("Tema não encontrado".to_string()));

        let outcome = orchestrator.submit_topic("oceanos").await;
        assert!(outcome.message().contains("HTTP 404"));
        assert!(outcome.message().contains("no such route"));

        assert_eq!(orchestrator.view(), before);
        assert_eq!(orchestrator.history().len(), 1);
    }

    #[tokio::test]
    async fn test_sentiment_only_payload_uses_synthetic_series() {
        let body = r#"{"content_analysis": {"sentimento_medio": 20.0, "confianca": 0.7, "previsao_texto": "Optimistic coverage."}}"#;
        let (orchestrator, _) = orchestrator(FixedTransport::new(200, body));

        let outcome = orchestrator.submit_topic("clima").await;

        assert!(outcome.is_success());
        let view = orchestrator.view().unwrap();
        assert_eq!(view.source, SeriesSource::Sentiment);
        assert_eq!(view.series.historical.len(), 1);
        assert_eq!(view.series.forecast.len(), 7);
        assert_eq!(view.summary, "Optimistic coverage.");
        assert_eq!(view.insights.forecast_confidence, 0.7);
        assert_eq!(
            view.series.historical.first().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn test_malformed_confidence_keeps_sentiment_path() {
        let body = r#"{"content_analysis": {"sentimento_medio": 20.0, "confianca": "alta"}}"#;
        let (orchestrator, _) = orchestrator(FixedTransport::new(200, body));

        let outcome = orchestrator.submit_topic("clima").await;

        assert!(outcome.is_success());
        let view = orchestrator.view().unwrap();
        assert_eq!(view.source, SeriesSource::Sentiment);
        assert_eq!(view.insights.forecast_confidence, 0.0);
        assert_eq!(view.summary, NO_SUMMARY_TEXT);
    }

    #[tokio::test]
    async fn test_empty_payload_is_insufficient_data() {
        let (orchestrator, _) = orchestrator(FixedTransport::new(200, "not json"));

        let outcome = orchestrator.submit_topic("clima").await;

        assert!(matches!(outcome, SubmissionOutcome::InsufficientData(_)));
        assert!(orchestrator.view().is_none());
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn test_preferences_redraw_current_chart() {
        let (orchestrator, _) = orchestrator(FixedTransport::new(200, SERIES_BODY));
        orchestrator.submit_topic("energia").await;

        let mut prefs = orchestrator.preferences();
        prefs.show_moving_average = false;
        orchestrator.set_preferences(prefs).unwrap();

        let chart = orchestrator.view().unwrap().chart.unwrap();
        assert_eq!(chart.datasets.len(), 2);

        assert!(orchestrator.clear_chart());
        assert!(orchestrator.view().unwrap().chart.is_none());
    }

    #[tokio::test]
    async fn test_history_saved_after_commit_and_stale_snapshots_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let config = ForecastConfig {
            history_path: Some(path.clone()),
            ..Default::default()
        };
        let orchestrator =
            ForecastOrchestrator::builder(FixedTransport::new(200, SERIES_BODY), Box::new(HeadlessSurface::new()))
                .config(config)
                .clock(Arc::new(ManualClock::new(1_704_067_200_000)))
                .rng(StdRng::seed_from_u64(3))
                .build()
                .unwrap();

        let stale = {
            let history = lock(&orchestrator.history);
            orchestrator.snapshot_history(&history).unwrap()
        };

        assert!(orchestrator.submit_topic("energia").await.is_success());
        let on_disk = TopicHistory::load(&path, 10).unwrap();
        assert_eq!(on_disk.head().map(|item| item.topic.as_str()), Some("energia"));

        // An older snapshot landing late must not roll the file back
        orchestrator.persist_history(&stale).unwrap();
        assert_eq!(TopicHistory::load(&path, 10).unwrap(), on_disk);

        orchestrator.clear_history().unwrap();
        assert!(TopicHistory::load(&path, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_requires_a_view() {
        let (orchestrator, _) = orchestrator(FixedTransport::new(200, SERIES_BODY));
        assert!(orchestrator.export_csv().is_err());

        orchestrator.submit_topic("energia").await;
        let csv = orchestrator.export_csv().unwrap();
        assert!(csv.starts_with("date,count,type\n2024-01-01,3,historical\n"));
        assert_eq!(csv.lines().filter(|l| l.ends_with(",forecast")).count(), 7);
    }
}
