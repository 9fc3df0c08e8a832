//! Display-side derivations: trend badge, volume momentum, spikes, themes,
//! article pages and the textual insights shown next to the chart.

use crate::data::Series;
use crate::payload::{Article, ContentAnalysis, ForecastResponse, ServerTrend};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use trend_math::{mean, population_stddev, ConfidenceLabel, ConfidenceScore, TrendStats};

/// z-score at which a point counts as a spike
pub const SPIKE_Z_SCORE: f64 = 2.0;
/// Number of detected themes surfaced
pub const MAX_THEMES: usize = 5;

/// Direction shown on the trend badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Direction plus percent text, e.g. `+133.3%`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendBadge {
    pub direction: TrendDirection,
    pub text: String,
}

impl TrendBadge {
    pub fn from_stats(stats: &TrendStats) -> Self {
        let direction = if stats.pct > 0.0 {
            TrendDirection::Up
        } else if stats.pct < 0.0 {
            TrendDirection::Down
        } else if stats.slope > 1e-9 {
            TrendDirection::Up
        } else if stats.slope < -1e-9 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        };

        let text = if stats.pct == 0.0 {
            "0.0%".to_string()
        } else {
            format!("{:+.1}%", stats.pct)
        };

        Self { direction, text }
    }
}

/// Volume of the latest point against the earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeLabel {
    Rising,
    Falling,
    Stable,
    /// Everything is zero
    NoCoverage,
}

impl fmt::Display for VolumeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VolumeLabel::Rising => "rising",
            VolumeLabel::Falling => "falling",
            VolumeLabel::Stable => "stable",
            VolumeLabel::NoCoverage => "flat (low coverage)",
        };
        write!(f, "{}", label)
    }
}

/// Last-point momentum figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    pub label: VolumeLabel,
    pub last: f64,
    pub previous_mean: f64,
    /// Last value minus the one before it
    pub delta: i64,
    /// `delta` minus the delta one step earlier
    pub momentum: i64,
}

impl Momentum {
    pub fn from_values(values: &[f64]) -> Self {
        let (last, previous) = match values.split_last() {
            Some((last, previous)) => (*last, previous),
            None => (0.0, &[][..]),
        };

        let previous_mean = mean(previous);
        let before = previous.last().copied().unwrap_or(0.0);
        let delta = last - before;
        let previous_delta = match previous {
            [.., a, b] => b - a,
            _ => 0.0,
        };

        let label = if previous_mean == 0.0 && last == 0.0 {
            VolumeLabel::NoCoverage
        } else if last > previous_mean * 1.25 {
            VolumeLabel::Rising
        } else if last < previous_mean * 0.75 {
            VolumeLabel::Falling
        } else {
            VolumeLabel::Stable
        };

        Self {
            label,
            last,
            previous_mean,
            delta: delta.round() as i64,
            momentum: (delta - previous_delta).round() as i64,
        }
    }
}

/// Dates whose population z-score reaches [`SPIKE_Z_SCORE`]
pub fn detect_spikes(series: &Series) -> Vec<NaiveDate> {
    let values = series.values();
    let mu = mean(&values);
    let sd = population_stddev(&values);
    if sd <= 1e-6 {
        return Vec::new();
    }

    series
        .points()
        .iter()
        .filter(|p| (p.count as f64 - mu) / sd >= SPIKE_Z_SCORE)
        .map(|p| p.date)
        .collect()
}

/// Highest-weighted themes, at most [`MAX_THEMES`]
pub fn top_themes(analysis: &ContentAnalysis) -> Vec<(String, f64)> {
    let mut themes: Vec<(String, f64)> = analysis
        .temas_detectados
        .iter()
        .filter(|(name, weight)| !name.trim().is_empty() && weight.is_finite())
        .cloned()
        .collect();
    themes.sort_by(|a, b| b.1.total_cmp(&a.1));
    themes.truncate(MAX_THEMES);
    themes
}

/// Map a confidence label from the server ("Alta", "Média", "Low", ...)
pub fn parse_confidence_label(text: &str) -> Option<ConfidenceLabel> {
    match text.trim().to_lowercase().as_str() {
        "alta" | "high" => Some(ConfidenceLabel::High),
        "média" | "media" | "medium" => Some(ConfidenceLabel::Medium),
        "baixa" | "low" => Some(ConfidenceLabel::Low),
        _ => None,
    }
}

/// Locally computed confidence next to the server's, when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub local: ConfidenceScore,
    pub server_label: Option<String>,
    /// Server score clamped to `[0, 1]`
    pub server_score: Option<f64>,
    /// `None` when the server sent neither a recognised label nor a score
    pub agrees: Option<bool>,
}

impl ConfidenceSummary {
    pub fn reconcile(local: ConfidenceScore, server: Option<&ServerTrend>) -> Self {
        let server_label = server
            .map(|t| t.confidence.trim().to_string())
            .filter(|label| !label.is_empty());
        let server_score = server
            .and_then(|t| t.score)
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0));
        let agrees = server_label
            .as_deref()
            .and_then(parse_confidence_label)
            .or_else(|| server_score.map(ConfidenceLabel::from_score))
            .map(|label| label == local.label);

        Self {
            local,
            server_label,
            server_score,
            agrees,
        }
    }

    /// Score to display: the server's when it sent one, else the local one
    pub fn score(&self) -> f64 {
        self.server_score.unwrap_or(self.local.score)
    }
}

/// One page of the article list; `page` is 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    pub page: usize,
    pub total_pages: usize,
}

impl ArticlePage {
    /// Page `page` of `articles`, clamped into range
    pub fn paginate(articles: &[Article], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = articles.len().div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);

        let items = articles
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        Self {
            items,
            page,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Everything shown beside the chart for one successful submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub badge: TrendBadge,
    pub momentum: Momentum,
    /// Server spike dates when sent, else detected locally
    pub spikes: Vec<NaiveDate>,
    pub confidence: ConfidenceSummary,
    /// Confidence in the projected points, `[0, 0.95]`
    pub forecast_confidence: f64,
    pub themes: Vec<(String, f64)>,
    pub articles_analysed: Option<u64>,
    pub hypotheses: Vec<String>,
    pub lines: Vec<String>,
}

impl Insights {
    pub fn derive(
        historical: &Series,
        stats: &TrendStats,
        confidence: ConfidenceScore,
        forecast_confidence: f64,
        response: &ForecastResponse,
    ) -> Self {
        let badge = TrendBadge::from_stats(stats);
        let momentum = Momentum::from_values(&historical.values());
        let spikes = match response.server_spikes() {
            Some(spikes) => spikes.to_vec(),
            None => detect_spikes(historical),
        };
        let confidence = ConfidenceSummary::reconcile(confidence, response.trend.as_ref());
        let themes = response
            .content_analysis
            .as_ref()
            .map(top_themes)
            .unwrap_or_default();
        let articles_analysed = response
            .content_analysis
            .as_ref()
            .and_then(|c| c.total_noticias_analisadas);

        let mut lines = vec![
            format!(
                "Volume {}. Last point: {}. Previous mean: {:.1}. Daily delta: {:+}. Momentum: {:+}.",
                momentum.label, momentum.last, momentum.previous_mean, momentum.delta, momentum.momentum
            ),
            format!(
                "Trend {} over the period (slope {:.3}).",
                badge.text, stats.slope
            ),
        ];

        if !spikes.is_empty() {
            let dates: Vec<String> = spikes.iter().map(|d| d.to_string()).collect();
            lines.push(format!("Spikes on {}.", dates.join(", ")));
        }

        match &confidence.server_label {
            Some(server) => lines.push(format!(
                "Trend confidence: {} (server: {}, score {:.2}).",
                confidence.local.label,
                server,
                confidence.score()
            )),
            None => lines.push(format!(
                "Trend confidence: {} (score {:.2}).",
                confidence.local.label,
                confidence.score()
            )),
        }

        lines.push(format!(
            "Forecast confidence: {:.0}%.",
            forecast_confidence * 100.0
        ));

        if !themes.is_empty() {
            let names: Vec<&str> = themes.iter().map(|(name, _)| name.as_str()).collect();
            lines.push(format!("Detected themes: {}.", names.join(", ")));
        }

        if let Some(count) = articles_analysed {
            lines.push(format!("Articles analysed: {}.", count));
        }

        let hypotheses = response.hypotheses().to_vec();
        lines.extend(hypotheses.iter().map(|h| format!("Hypothesis: {}", h)));

        Self {
            badge,
            momentum,
            spikes,
            confidence,
            forecast_confidence,
            themes,
            articles_analysed,
            hypotheses,
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_iso_date;
    use crate::payload::ServerAnalytics;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use trend_math::trend_stats;

    fn series(counts: &[u64]) -> Series {
        let start = parse_iso_date("2024-01-01").unwrap();
        Series::from_counts(
            counts
                .iter()
                .enumerate()
                .map(|(i, c)| (start + chrono::Days::new(i as u64), *c))
                .collect(),
        )
    }

    fn article(n: usize) -> Article {
        Article {
            titulo: format!("Article {}", n),
            ..Default::default()
        }
    }

    #[test]
    fn test_badge_text() {
        let badge = TrendBadge::from_stats(&trend_stats(&[3.0, 5.0, 4.0, 7.0]));
        assert_eq!(badge.direction, TrendDirection::Up);
        assert_eq!(badge.text, "+133.3%");

        let badge = TrendBadge::from_stats(&trend_stats(&[10.0, 5.0]));
        assert_eq!(badge.direction, TrendDirection::Down);
        assert_eq!(badge.text, "-50.0%");

        // Zero start: no percent, direction from the slope
        let badge = TrendBadge::from_stats(&trend_stats(&[0.0, 5.0]));
        assert_eq!(badge.direction, TrendDirection::Up);
        assert_eq!(badge.text, "0.0%");

        let badge = TrendBadge::from_stats(&trend_stats(&[4.0, 4.0, 4.0]));
        assert_eq!(badge.direction, TrendDirection::Flat);
    }

    #[test]
    fn test_momentum() {
        let m = Momentum::from_values(&[3.0, 5.0, 4.0, 7.0]);
        assert_eq!(m.label, VolumeLabel::Rising);
        assert_eq!(m.previous_mean, 4.0);
        assert_eq!(m.delta, 3);
        assert_eq!(m.momentum, 4);
    }

    #[rstest]
    #[case(&[0.0, 0.0, 0.0], VolumeLabel::NoCoverage)]
    #[case(&[10.0, 10.0, 2.0], VolumeLabel::Falling)]
    #[case(&[10.0, 10.0, 11.0], VolumeLabel::Stable)]
    #[case(&[], VolumeLabel::NoCoverage)]
    fn test_volume_labels(#[case] values: &[f64], #[case] expected: VolumeLabel) {
        assert_eq!(Momentum::from_values(values).label, expected);
    }

    #[test]
    fn test_spikes() {
        let spiky = series(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 10]);
        assert_eq!(detect_spikes(&spiky), vec![parse_iso_date("2024-01-10").unwrap()]);

        assert!(detect_spikes(&series(&[3, 5, 4, 7])).is_empty());
        assert!(detect_spikes(&series(&[2, 2, 2])).is_empty());
    }

    #[test]
    fn test_top_themes() {
        let analysis = ContentAnalysis {
            temas_detectados: vec![
                ("solar".to_string(), 0.2),
                ("eólica".to_string(), 0.9),
                ("".to_string(), 5.0),
                ("hidrogênio".to_string(), 0.5),
                ("a".to_string(), 0.1),
                ("b".to_string(), 0.05),
                ("c".to_string(), 0.01),
            ],
            ..Default::default()
        };

        let themes = top_themes(&analysis);
        assert_eq!(themes.len(), MAX_THEMES);
        assert_eq!(themes[0].0, "eólica");
        assert_eq!(themes[1].0, "hidrogênio");
    }

    #[test]
    fn test_reconcile_with_server() {
        let local = ConfidenceScore {
            score: 0.8,
            label: ConfidenceLabel::High,
        };
        let server = ServerTrend {
            confidence: "Alta".to_string(),
            ..Default::default()
        };

        let summary = ConfidenceSummary::reconcile(local, Some(&server));
        assert_eq!(summary.server_label.as_deref(), Some("Alta"));
        assert_eq!(summary.agrees, Some(true));

        let summary = ConfidenceSummary::reconcile(local, None);
        assert_eq!(summary.agrees, None);
        assert_eq!(summary.score(), 0.8);
    }

    #[test]
    fn test_reconcile_prefers_server_score() {
        let local = ConfidenceScore {
            score: 0.8,
            label: ConfidenceLabel::High,
        };
        let server = ServerTrend {
            score: Some(0.2),
            ..Default::default()
        };

        let summary = ConfidenceSummary::reconcile(local, Some(&server));
        assert_eq!(summary.server_label, None);
        assert_eq!(summary.score(), 0.2);
        assert_eq!(summary.agrees, Some(false));
    }

    #[test]
    fn test_pagination() {
        let articles: Vec<Article> = (1..=13).map(article).collect();

        let first = ArticlePage::paginate(&articles, 1, 6);
        assert_eq!(first.items.len(), 6);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let last = ArticlePage::paginate(&articles, 99, 6);
        assert_eq!(last.page, 3);
        assert_eq!(last.items, vec![article(13)]);

        let empty = ArticlePage::paginate(&[], 0, 6);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_insight_lines() {
        let historical = series(&[3, 5, 4, 7]);
        let values = historical.values();
        let stats = trend_stats(&values);
        let response = ForecastResponse {
            content_analysis: Some(ContentAnalysis {
                temas_detectados: vec![("solar".to_string(), 0.7)],
                total_noticias_analisadas: Some(12),
                ..Default::default()
            }),
            ..Default::default()
        };

        let insights = Insights::derive(
            &historical,
            &stats,
            ConfidenceScore::default(),
            0.5,
            &response,
        );

        assert_eq!(
            insights.lines[0],
            "Volume rising. Last point: 7. Previous mean: 4.0. Daily delta: +3. Momentum: +4."
        );
        assert!(insights.lines.iter().any(|l| l == "Forecast confidence: 50%."));
        assert!(insights.lines.iter().any(|l| l == "Detected themes: solar."));
        assert!(insights.lines.iter().any(|l| l == "Articles analysed: 12."));
        assert_eq!(insights.articles_analysed, Some(12));
        assert!(insights.lines.iter().any(|l| l.starts_with("Trend confidence: ") && l.contains("score")));
    }

    #[test]
    fn test_server_spikes_and_hypotheses() {
        let historical = series(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 10]);
        let stats = trend_stats(&historical.values());
        let server_spike = parse_iso_date("2024-01-03").unwrap();
        let response = ForecastResponse {
            hipoteses: Some(vec!["Evento regulatório recente.".to_string()]),
            analytics: Some(ServerAnalytics {
                spikes: Some(vec![server_spike]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let insights = Insights::derive(&historical, &stats, ConfidenceScore::default(), 0.5, &response);

        assert_eq!(insights.spikes, vec![server_spike]);
        assert_eq!(insights.hypotheses, vec!["Evento regulatório recente.".to_string()]);
        assert_eq!(
            insights.lines.last().map(String::as_str),
            Some("Hypothesis: Evento regulatório recente.")
        );

        // Without a server list the local detector runs
        let local = Insights::derive(
            &historical,
            &stats,
            ConfidenceScore::default(),
            0.5,
            &ForecastResponse::default(),
        );
        assert_eq!(local.spikes, vec![parse_iso_date("2024-01-10").unwrap()]);
        assert!(local.hypotheses.is_empty());
    }
}
