//! Wire types for the `/prever` endpoint
//!
//! Responses are decoded field by field: a malformed field is dropped on its
//! own instead of failing the whole payload, and invalid JSON decodes to an
//! empty response.

use crate::data::{parse_iso_date, PeriodSelector, Series};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Request body for a forecast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub tema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dias: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periodo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anos_de: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anos_ate: Option<i32>,
}

impl ForecastRequest {
    /// Build a request for `topic` over `period`
    pub fn new(topic: &str, period: PeriodSelector) -> Self {
        Self {
            tema: topic.to_string(),
            dias: period.request_days(),
            periodo: period.request_period().map(str::to_string),
            anos_de: None,
            anos_ate: None,
        }
    }

    /// Restrict articles to a year range; ignored unless `from <= to`
    pub fn with_years(mut self, from: i32, to: i32) -> Self {
        if from > 0 && to > 0 && from <= to {
            self.anos_de = Some(from);
            self.anos_ate = Some(to);
        }
        self
    }
}

/// News article backing the series
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    pub titulo: String,
    pub url: String,
    pub data_iso: String,
    pub fonte: String,
}

/// Trend figures computed by the server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTrend {
    pub slope: f64,
    pub pct: f64,
    pub last_delta: i64,
    pub confidence: String,
    /// Confidence score in `[0, 1]`
    pub score: Option<f64>,
}

impl ServerTrend {
    fn from_value(value: &Value) -> Self {
        Self {
            slope: number(value, "slope").unwrap_or_default(),
            pct: number(value, "pct").unwrap_or_default(),
            last_delta: number(value, "last_delta")
                .map(|d| d.round() as i64)
                .unwrap_or_default(),
            confidence: string(value, "confidence").unwrap_or_default(),
            score: number(value, "score"),
        }
    }
}

/// Content analysis block: sentiment and detected themes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentAnalysis {
    pub sentimento_medio: Option<f64>,
    pub confianca: Option<f64>,
    pub temas_detectados: Vec<(String, f64)>,
    pub previsao_texto: Option<String>,
    pub total_noticias_analisadas: Option<u64>,
}

impl ContentAnalysis {
    fn from_value(value: &Value) -> Self {
        let temas_detectados = value
            .get("temas_detectados")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item.as_array()?.as_slice() {
                        [name, weight] => Some((name.as_str()?.to_string(), weight.as_f64()?)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            sentimento_medio: number(value, "sentimento_medio"),
            confianca: number(value, "confianca"),
            temas_detectados,
            previsao_texto: string(value, "previsao_texto"),
            total_noticias_analisadas: value
                .get("total_noticias_analisadas")
                .and_then(count_from_value),
        }
    }
}

/// Server-side analytics over the article set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerAnalytics {
    pub sentiment_mean: Option<f64>,
    /// `None` when the server sent no spike list
    pub spikes: Option<Vec<NaiveDate>>,
}

impl ServerAnalytics {
    fn from_value(value: &Value) -> Self {
        let spikes = value.get("spikes").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|d| d.as_str().and_then(parse_iso_date))
                .collect()
        });

        Self {
            sentiment_mean: number(value, "sentiment_mean"),
            spikes,
        }
    }
}

/// Echo of the query as the server understood it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMeta {
    pub tema: Option<String>,
    pub dias: Option<u32>,
    pub filtrado_por_ano: Option<bool>,
    pub anos_de: Option<i32>,
    pub anos_ate: Option<i32>,
    pub series_total: Option<u64>,
    pub artigos_total: Option<u64>,
}

impl ResponseMeta {
    fn from_value(value: &Value) -> Self {
        let int = |key: &str| value.get(key).and_then(Value::as_i64);

        Self {
            tema: string(value, "tema"),
            dias: int("dias").and_then(|d| u32::try_from(d).ok()),
            filtrado_por_ano: value.get("filtrado_por_ano").and_then(Value::as_bool),
            anos_de: int("anos_de").and_then(|y| i32::try_from(y).ok()),
            anos_ate: int("anos_ate").and_then(|y| i32::try_from(y).ok()),
            series_total: value.get("series_total").and_then(count_from_value),
            artigos_total: value.get("artigos_total").and_then(count_from_value),
        }
    }
}

/// Raw point as sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub date: String,
    pub count: u64,
}

/// Decoded `/prever` response; every field may be absent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub previsao: Option<String>,
    pub series: Option<Vec<RawPoint>>,
    pub artigos: Option<Vec<Article>>,
    pub trend: Option<ServerTrend>,
    pub content_analysis: Option<ContentAnalysis>,
    pub hipoteses: Option<Vec<String>>,
    pub analytics: Option<ServerAnalytics>,
    pub meta: Option<ResponseMeta>,
    pub erro: Option<String>,
}

impl ForecastResponse {
    /// Decode a response body, degrading to defaults on malformed input
    pub fn from_body(body: &str) -> Self {
        let value: Value = match serde_json::from_str(body) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                warn!("Forecast payload is not a JSON object, treating as empty");
                return Self::default();
            }
            Err(e) => {
                warn!("Forecast payload is not valid JSON ({}), treating as empty", e);
                return Self::default();
            }
        };

        Self::from_value(&value)
    }

    /// Decode from an already parsed JSON value
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        let series = value.get("series").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let date = item.get("date")?.as_str()?.to_string();
                    let count = item.get("count").and_then(count_from_value)?;
                    Some(RawPoint { date, count })
                })
                .collect::<Vec<_>>()
        });

        let artigos = value.get("artigos").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Article>(item.clone()).ok())
                .collect::<Vec<_>>()
        });

        let object = |key: &str| value.get(key).filter(|v| v.is_object());

        let hipoteses = value.get("hipoteses").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        Self {
            previsao: text("previsao"),
            series,
            artigos,
            trend: object("trend").map(ServerTrend::from_value),
            content_analysis: object("content_analysis").map(ContentAnalysis::from_value),
            hipoteses,
            analytics: object("analytics").map(ServerAnalytics::from_value),
            meta: object("meta").map(ResponseMeta::from_value),
            erro: text("erro"),
        }
    }

    /// Historical series from the raw points; points with unparseable dates are skipped
    pub fn true_series(&self) -> Series {
        let counts = self
            .series
            .iter()
            .flatten()
            .filter_map(|p| parse_iso_date(&p.date).map(|date| (date, p.count)))
            .collect();
        Series::from_counts(counts)
    }

    /// Mean sentiment, preferring the content analysis over the analytics block
    pub fn sentiment(&self) -> Option<f64> {
        self.content_analysis
            .as_ref()
            .and_then(|c| c.sentimento_medio)
            .or_else(|| self.analytics.as_ref().and_then(|a| a.sentiment_mean))
    }

    /// Spike dates computed by the server, if it sent a list
    pub fn server_spikes(&self) -> Option<&[NaiveDate]> {
        self.analytics.as_ref().and_then(|a| a.spikes.as_deref())
    }

    pub fn hypotheses(&self) -> &[String] {
        self.hipoteses.as_deref().unwrap_or_default()
    }

    /// Summary text, falling back to the content analysis text
    pub fn summary_text(&self) -> Option<&str> {
        self.previsao
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.content_analysis
                    .as_ref()
                    .and_then(|c| c.previsao_texto.as_deref())
                    .filter(|s| !s.trim().is_empty())
            })
    }

    pub fn articles(&self) -> &[Article] {
        self.artigos.as_deref().unwrap_or_default()
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key)?.as_f64().filter(|n| n.is_finite())
}

fn string(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

/// Counts may arrive as floats; negative values clamp to zero
fn count_from_value(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.max(0.0).round() as u64)
}
