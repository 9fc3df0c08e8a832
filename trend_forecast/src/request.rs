//! Retrying, single-flight forecast requests
//!
//! At most one request is live at a time. Starting a new one cancels the
//! previous through its [`CancellationToken`]; a cancelled request resolves to
//! [`ForecastError::Cancelled`], never to a network error.

use crate::error::{ForecastError, Result};
use crate::payload::ForecastRequest;
use crate::transport::{ForecastTransport, HttpReply};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// HTTP status that triggers a retry
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Retry schedule: `retries` extra attempts, doubling the delay each time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            initial_delay: Duration::from_millis(800),
        }
    }
}

/// Handle on the request currently allowed to run
#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    token: CancellationToken,
    superseded_previous: bool,
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether issuing this ticket cancelled an earlier live request
    pub fn superseded_previous(&self) -> bool {
        self.superseded_previous
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Wraps the transport with retry-on-429 and single-flight cancellation
pub struct RequestController {
    transport: Arc<dyn ForecastTransport>,
    policy: RetryPolicy,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RequestController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestController")
            .field("policy", &self.policy)
            .finish()
    }
}

impl RequestController {
    pub fn new(transport: Arc<dyn ForecastTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Cancel any live request and register a new one
    pub fn begin(&self) -> RequestTicket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        let mut slot = self.lock_in_flight();
        let superseded_previous = match slot.take() {
            Some(previous) => {
                info!(previous = previous.id, next = id, "Cancelling previous forecast request");
                previous.token.cancel();
                true
            }
            None => false,
        };
        *slot = Some(InFlight {
            id,
            token: token.clone(),
        });

        RequestTicket {
            id,
            token,
            superseded_previous,
        }
    }

    /// Release the slot if `ticket` still owns it
    pub fn finish(&self, ticket: &RequestTicket) {
        let mut slot = self.lock_in_flight();
        if slot.as_ref().map(|f| f.id) == Some(ticket.id) {
            *slot = None;
        }
    }

    /// Run `apply` while `ticket` still owns the slot, then release the slot.
    ///
    /// Returns `None` without running `apply` once the ticket is superseded or
    /// cancelled. `begin` blocks until `apply` returns, so a newer request
    /// cannot interleave with it.
    pub fn complete_if_current<T>(
        &self,
        ticket: &RequestTicket,
        apply: impl FnOnce() -> T,
    ) -> Option<T> {
        let mut slot = self.lock_in_flight();
        let owns = slot.as_ref().map(|f| f.id) == Some(ticket.id) && !ticket.is_cancelled();
        if !owns {
            debug!(id = ticket.id, "Discarding result of superseded request");
            return None;
        }

        let value = apply();
        *slot = None;
        Some(value)
    }

    /// Cancel the live request, if any
    pub fn cancel_in_flight(&self) -> bool {
        match self.lock_in_flight().take() {
            Some(previous) => {
                previous.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a request currently holds the slot
    pub fn has_in_flight(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// Single-flight fetch: cancels the previous request, then fetches with retry
    pub async fn submit(&self, request: &ForecastRequest) -> Result<HttpReply> {
        let ticket = self.begin();
        let result = self.fetch_with_retry(request, ticket.token()).await;
        self.finish(&ticket);

        match result {
            Ok(_) if ticket.is_cancelled() => Err(ForecastError::Cancelled),
            other => other,
        }
    }

    /// Send `request`, retrying on HTTP 429 or transport failure with exponential backoff.
    ///
    /// Other non-2xx statuses fail immediately with their body text.
    pub async fn fetch_with_retry(
        &self,
        request: &ForecastRequest,
        token: &CancellationToken,
    ) -> Result<HttpReply> {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                _ = token.cancelled() => return Err(ForecastError::Cancelled),
                outcome = self.transport.send(request) => outcome,
            };

            let failure = match outcome {
                Ok(reply) if reply.is_success() => {
                    debug!(attempt, status = reply.status, "Forecast request succeeded");
                    return Ok(reply);
                }
                Ok(reply) if reply.status == TOO_MANY_REQUESTS => ForecastError::NetworkError {
                    status: Some(reply.status),
                    body: non_empty(reply.body),
                    message: "Too many requests".to_string(),
                },
                Ok(reply) => {
                    warn!(status = reply.status, "Forecast request failed");
                    return Err(ForecastError::NetworkError {
                        status: Some(reply.status),
                        body: non_empty(reply.body),
                        message: "Server returned an error".to_string(),
                    });
                }
                Err(e) => ForecastError::NetworkError {
                    status: None,
                    body: None,
                    message: e.0,
                },
            };

            if attempt >= self.policy.retries {
                warn!(attempts = attempt + 1, "Forecast request retries exhausted");
                return Err(failure);
            }

            attempt += 1;
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %failure, "Retrying forecast request");

            tokio::select! {
                _ = token.cancelled() => return Err(ForecastError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay *= 2;
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        // The slot holds no invariants a panic could break
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn non_empty(body: String) -> Option<String> {
    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}
