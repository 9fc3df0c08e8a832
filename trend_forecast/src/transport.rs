//! HTTP transport for forecast requests

use crate::payload::ForecastRequest;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Status and body of an HTTP exchange, whatever the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP status
#[derive(Debug, Error)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// Sends a forecast request and returns the raw reply
#[async_trait]
pub trait ForecastTransport: Send + Sync {
    async fn send(&self, request: &ForecastRequest) -> Result<HttpReply, TransportError>;
}

/// `reqwest`-backed transport posting JSON to the forecast endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ForecastTransport for HttpTransport {
    async fn send(&self, request: &ForecastRequest) -> Result<HttpReply, TransportError> {
        debug!(endpoint = %self.endpoint, tema = %request.tema, "POST forecast request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = body_or_empty(status, response.text().await);

        Ok(HttpReply { status, body })
    }
}

/// A body that cannot be read is treated as empty
fn body_or_empty<E: fmt::Display>(status: u16, body: Result<String, E>) -> String {
    match body {
        Ok(body) => body,
        Err(e) => {
            warn!(status, error = %e, "Failed to read response body, treating as empty");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_body_is_empty() {
        assert_eq!(body_or_empty(503, Err::<String, _>("connection reset")), "");
        assert_eq!(body_or_empty::<String>(200, Ok("{}".to_string())), "{}");
    }
}
