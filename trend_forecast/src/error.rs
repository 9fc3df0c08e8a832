//! Error types for the trend_forecast crate

use thiserror::Error;
use trend_math::MathError;

/// Custom error types for the trend_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Rejected locally before any request, e.g. an empty topic
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// HTTP failure or retries exhausted
    #[error("Network error: {message}")]
    NetworkError {
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    /// The request was superseded by a newer submission
    #[error("Request cancelled")]
    Cancelled,

    /// Too few points to forecast from
    #[error("Insufficient data: {points} point(s), need at least {required}")]
    InsufficientData { points: usize, required: usize },

    /// The server answered with an explicit error field
    #[error("Server error: {0}")]
    ServerError(String),

    /// Error from numeric routines
    #[error("Math error: {0}")]
    MathError(#[from] MathError),

    /// Error from invalid configuration
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON encoding or decoding
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from CSV writing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl ForecastError {
    /// Whether this is a cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ForecastError::Cancelled)
    }

    /// Text shown to the user for this outcome
    pub fn user_message(&self) -> String {
        match self {
            ForecastError::ValidationError(msg) => msg.clone(),
            ForecastError::NetworkError {
                status,
                body,
                message,
            } => {
                let mut text = match status {
                    Some(code) => format!("Request failed (HTTP {}): {}", code, message),
                    None => format!("Request failed: {}", message),
                };
                if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
                    text.push_str(" - ");
                    text.push_str(body);
                }
                text
            }
            ForecastError::Cancelled => "Previous query cancelled.".to_string(),
            ForecastError::InsufficientData { points, required } => format!(
                "Insufficient data to forecast: {} point(s) available, at least {} needed. Try a longer period.",
                points, required
            ),
            ForecastError::ServerError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;
