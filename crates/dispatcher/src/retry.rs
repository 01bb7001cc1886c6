//! Retry / backoff policy shared by every networked sink
//!
//! A policy classifies each attempt's outcome:
//! - success status: delivered, stop
//! - 429 on sinks with a rate-limit header: sleep for the hinted time, retry
//!   without touching the attempt budget (unbounded)
//! - statuses covered by the bounded scope: sleep a fixed interval, retry
//!   until the attempt budget is used up (delivery-exhausted)
//! - timeouts / connection resets: retry immediately, unbounded
//! - anything else: rejected, not retried
//!
//! Requests are rebuilt for every attempt so time-dependent signatures and
//! tokens are never reused.

use std::future::Future;
use std::time::Duration;

use contracts::DeliveryError;
use tracing::{debug, warn};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Wait when the rate-limit hint is missing or unparseable
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(2);

/// Wait substituted when the rate-limit hint is exactly zero
pub const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3);

/// Fixed wait after a 503 from a collector endpoint
pub const UNAVAILABLE_WAIT: Duration = Duration::from_secs(3);

/// Attempts allowed for collector endpoints answering 503
pub const MAX_UNAVAILABLE_ATTEMPTS: u32 = 10;

/// Attempts allowed for the logs ingestion endpoint, any failure
pub const MAX_INGESTION_ATTEMPTS: u32 = 3;

/// Rate-limit hint header used by webhook-style APIs
pub const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset-After";

const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Compute the wait from a rate-limit hint (seconds, fractional allowed)
pub fn rate_limit_wait(hint: Option<&str>) -> Duration {
    match hint.map(str::trim).and_then(|v| v.parse::<f64>().ok()) {
        Some(secs) if secs == 0.0 => MIN_RATE_LIMIT_WAIT,
        Some(secs) if secs > 0.0 => {
            Duration::try_from_secs_f64(secs).unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
        }
        _ => DEFAULT_RATE_LIMIT_WAIT,
    }
}

/// Which responses count as delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessStatus {
    Exactly(u16),
    Any2xx,
}

impl SuccessStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            Self::Exactly(code) => *code == status,
            Self::Any2xx => (200..300).contains(&status),
        }
    }
}

/// Failures that consume the bounded attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Only 503 responses
    Unavailable,
    /// Every non-success status and every network error
    AnyFailure,
}

/// Bounded retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    pub scope: RetryScope,
    pub max_attempts: u32,
    pub wait: Duration,
}

/// Why an attempt is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Unavailable,
    Network,
    Failure,
}

impl RetryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Network => "network",
            Self::Failure => "failure",
        }
    }
}

/// Transient per-envelope bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// HTTP calls made, including unbounded retries
    pub calls: u32,
    /// Attempts counted against the bounded budget
    pub budget_used: u32,
    /// Total time spent sleeping between attempts
    pub waited: Duration,
    pub last_error: Option<String>,
}

/// Identifies the delivery for logs and errors
#[derive(Debug, Clone, Copy)]
pub struct DeliveryTarget<'a> {
    pub sink: &'a str,
    pub url: &'a str,
    /// Wire payload, echoed in terminal errors
    pub payload: &'a str,
}

/// Next move after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Delivered,
    RetryAfter(Duration, RetryReason),
}

/// Retry policy of one sink kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub success: SuccessStatus,
    /// Header carrying the wait hint on 429; `None` leaves 429 unhandled
    pub rate_limit_header: Option<&'static str>,
    pub bounded: Option<BoundedRetry>,
}

impl RetryPolicy {
    /// Webhook APIs: header-driven backoff on 429, no attempt bound
    pub fn rate_limited(success: u16) -> Self {
        Self {
            success: SuccessStatus::Exactly(success),
            rate_limit_header: Some(RATE_LIMIT_RESET_HEADER),
            bounded: None,
        }
    }

    /// Collector APIs: fixed wait on 503, bounded attempts
    pub fn unavailable_bounded(success: u16) -> Self {
        Self {
            success: SuccessStatus::Exactly(success),
            rate_limit_header: None,
            bounded: Some(BoundedRetry {
                scope: RetryScope::Unavailable,
                max_attempts: MAX_UNAVAILABLE_ATTEMPTS,
                wait: UNAVAILABLE_WAIT,
            }),
        }
    }

    /// Ingestion APIs: every failure retried immediately, bounded attempts
    pub fn any_failure_bounded(max_attempts: u32) -> Self {
        Self {
            success: SuccessStatus::Any2xx,
            rate_limit_header: None,
            bounded: Some(BoundedRetry {
                scope: RetryScope::AnyFailure,
                max_attempts,
                wait: Duration::ZERO,
            }),
        }
    }

    /// Classify one attempt's outcome, updating the attempt state
    ///
    /// # Errors
    /// Returns the terminal error when the outcome is not retryable or the
    /// bounded budget is used up.
    pub fn next_step(
        &self,
        state: &mut AttemptState,
        outcome: Result<HttpResponse, TransportError>,
        target: &DeliveryTarget<'_>,
    ) -> Result<Step, DeliveryError> {
        match outcome {
            Ok(response) if self.success.matches(response.status) => Ok(Step::Delivered),
            Ok(response) => self.on_status(state, response, target),
            Err(error) => self.on_transport_error(state, error, target),
        }
    }

    fn on_status(
        &self,
        state: &mut AttemptState,
        response: HttpResponse,
        target: &DeliveryTarget<'_>,
    ) -> Result<Step, DeliveryError> {
        let status = response.status;

        if status == STATUS_TOO_MANY_REQUESTS {
            if let Some(header) = self.rate_limit_header {
                state.last_error = Some(format!("HTTP {status}"));
                let wait = rate_limit_wait(response.header(header));
                return Ok(Step::RetryAfter(wait, RetryReason::RateLimited));
            }
        }

        match self.bounded {
            Some(bounded) if bounded.scope == RetryScope::AnyFailure => {
                let error = format!("HTTP {status}: {}", response.body);
                consume_budget(&bounded, state, error, RetryReason::Failure, target)
            }
            Some(bounded) if status == STATUS_SERVICE_UNAVAILABLE => {
                let error = format!("HTTP {status}: {}", response.body);
                consume_budget(&bounded, state, error, RetryReason::Unavailable, target)
            }
            _ => Err(DeliveryError::Rejected {
                sink: target.sink.to_string(),
                url: target.url.to_string(),
                status,
                body: response.body,
                payload: target.payload.to_string(),
            }),
        }
    }

    fn on_transport_error(
        &self,
        state: &mut AttemptState,
        error: TransportError,
        target: &DeliveryTarget<'_>,
    ) -> Result<Step, DeliveryError> {
        match self.bounded {
            Some(bounded) if bounded.scope == RetryScope::AnyFailure => {
                consume_budget(&bounded, state, error.to_string(), RetryReason::Failure, target)
            }
            _ if error.is_transient() => {
                state.last_error = Some(error.to_string());
                Ok(Step::RetryAfter(Duration::ZERO, RetryReason::Network))
            }
            _ => Err(DeliveryError::Transport {
                sink: target.sink.to_string(),
                url: target.url.to_string(),
                message: error.message,
                payload: target.payload.to_string(),
            }),
        }
    }

    /// Drive attempts until delivered or a terminal error
    ///
    /// `build` is called before every attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        transport: &T,
        target: &DeliveryTarget<'_>,
        mut build: F,
    ) -> Result<AttemptState, DeliveryError>
    where
        T: HttpTransport,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpRequest, DeliveryError>>,
    {
        let mut state = AttemptState::default();

        loop {
            let request = build().await?;
            state.calls += 1;
            let outcome = transport.send(&request).await;

            match self.next_step(&mut state, outcome, target)? {
                Step::Delivered => {
                    debug!(
                        sink = target.sink,
                        url = target.url,
                        calls = state.calls,
                        "Delivered"
                    );
                    return Ok(state);
                }
                Step::RetryAfter(wait, reason) => {
                    warn!(
                        sink = target.sink,
                        url = target.url,
                        reason = reason.as_str(),
                        attempt = state.calls,
                        budget_used = state.budget_used,
                        wait_ms = wait.as_millis() as u64,
                        error = state.last_error.as_deref().unwrap_or_default(),
                        "Delivery attempt failed, retrying"
                    );
                    observability::record_delivery_retry(target.sink, reason.as_str());
                    if !wait.is_zero() {
                        observability::record_backoff(target.sink, wait.as_secs_f64());
                        tokio::time::sleep(wait).await;
                        state.waited += wait;
                    }
                }
            }
        }
    }
}

fn consume_budget(
    bounded: &BoundedRetry,
    state: &mut AttemptState,
    error: String,
    reason: RetryReason,
    target: &DeliveryTarget<'_>,
) -> Result<Step, DeliveryError> {
    state.budget_used += 1;
    state.last_error = Some(error);
    if state.budget_used >= bounded.max_attempts {
        return Err(DeliveryError::Exhausted {
            sink: target.sink.to_string(),
            url: target.url.to_string(),
            attempts: state.budget_used,
            last_error: state.last_error.clone().unwrap_or_default(),
            payload: target.payload.to_string(),
        });
    }
    Ok(Step::RetryAfter(bounded.wait, reason))
}
