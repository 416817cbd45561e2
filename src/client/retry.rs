//! # Retry Policy
//!
//! Attempt loop for the processing endpoint. Each attempt runs under a hard
//! deadline and its reply is classified exactly once:
//!
//! | Reply            | Outcome                                              |
//! |------------------|------------------------------------------------------|
//! | 2xx              | body returned, loop ends                             |
//! | 503              | wait `attempt * base` and retry, fail on last attempt |
//! | 429              | fail immediately                                     |
//! | other non-2xx    | fail immediately with the body text                  |
//! | deadline         | fail immediately (`DeadlineExceeded`)                |
//! | transport error  | fail immediately (`Network`)                         |
//!
//! With the stock policy (3 attempts, 2000 ms base) a service answering
//! `503, 503, 200` costs 2000 ms + 4000 ms of waiting.
//!
//! The loop is generic over the attempt future so it can be driven without a
//! network, under tokio's paused clock.

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::common::config::{RetryConfig, TimeoutConfig};
use crate::common::error::{ApiFailure, FailureKind, RawResponse};

/// Prefix of the message for non-retryable, non-429 failures.
pub const PROCESS_FAILURE_CONTEXT: &str = "Failed to process image";

/// One HTTP reply, fully read.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the body could not be read.
    pub body: Option<Bytes>,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Some(body.into()),
        }
    }

    /// Snapshot kept inside an [`ApiFailure`]. Non-UTF-8 bytes are replaced.
    pub fn into_raw(self) -> RawResponse {
        RawResponse {
            status: self.status,
            headers: self.headers,
            body: self
                .body
                .map(|b| String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// Per-call attempt bookkeeping. Created fresh by every `send`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempt currently running (1-based); 0 before the first one
    pub attempt: u32,
    /// Sum of all backoff waits so far
    pub backoff_total: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Bounded retry-with-backoff policy for transient (`503`) replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &TimeoutConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts,
            backoff_base: Duration::from_millis(retry.backoff_base_ms),
            attempt_timeout: timeouts.process(),
        }
    }

    /// Wait inserted after a transient failure of `attempt` (1-based).
    ///
    /// # Example
    /// ```
    /// use deaify_client::client::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff_after(1), Duration::from_millis(2000));
    /// assert_eq!(policy.backoff_after(2), Duration::from_millis(4000));
    /// ```
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    /// Runs attempts until one succeeds or a failure ends the loop.
    ///
    /// `attempt_fn` receives the 1-based attempt number and must issue a brand
    /// new request each time. Attempt `k + 1` never starts before attempt `k`
    /// has settled.
    pub async fn run<F, Fut>(&self, state: &mut RetryState, mut attempt_fn: F) -> Result<Bytes, ApiFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Reply, ApiFailure>>,
    {
        let mut last_failure: Option<ApiFailure> = None;

        for attempt in 1..=self.max_attempts {
            state.attempt = attempt;
            debug!("Attempt {}/{}", attempt, self.max_attempts);

            let reply = match timeout(self.attempt_timeout, attempt_fn(attempt)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(failure)) => return Err(failure),
                Err(_) => {
                    warn!(
                        "⏱️  Attempt {}/{} timed out after {:?}",
                        attempt, self.max_attempts, self.attempt_timeout
                    );
                    return Err(ApiFailure::deadline_exceeded(
                        "Image processing request",
                        self.attempt_timeout,
                    ));
                }
            };

            let failure = match classify(reply) {
                Ok(body) => return Ok(body),
                Err(failure) => failure,
            };

            if failure.kind().is_retryable() && attempt < self.max_attempts {
                let delay = self.backoff_after(attempt);
                warn!(
                    "🔄 Service unavailable on attempt {}/{}, retrying in {:?}",
                    attempt, self.max_attempts, delay
                );
                sleep(delay).await;
                state.backoff_total += delay;
                last_failure = Some(failure);
                continue;
            }

            return Err(failure);
        }

        Err(last_failure.unwrap_or_else(|| {
            ApiFailure::new(FailureKind::GenericRequest, "All retry attempts failed")
        }))
    }
}

/// Single classification point for a processing reply.
pub fn classify(reply: Reply) -> Result<Bytes, ApiFailure> {
    if reply.status.is_success() {
        return match reply.body {
            Some(body) => Ok(body),
            None => Err(ApiFailure::network(
                PROCESS_FAILURE_CONTEXT,
                "response body could not be read",
            )),
        };
    }

    let raw = reply.into_raw();
    Err(match raw.status {
        StatusCode::SERVICE_UNAVAILABLE => ApiFailure::transient_service(raw),
        StatusCode::TOO_MANY_REQUESTS => ApiFailure::rate_limited(raw),
        _ => ApiFailure::generic_request(PROCESS_FAILURE_CONTEXT, raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Replays canned replies in order and counts how many were requested.
    struct Script {
        replies: RefCell<VecDeque<Result<Reply, ApiFailure>>>,
        calls: RefCell<u32>,
    }

    impl Script {
        fn new(replies: Vec<Result<Reply, ApiFailure>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::new(0),
            }
        }

        fn statuses(statuses: &[u16]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .map(|s| {
                        let status = StatusCode::from_u16(*s).unwrap();
                        Ok(Reply::new(status, format!("body {}", s)))
                    })
                    .collect(),
            )
        }

        async fn next(&self) -> Result<Reply, ApiFailure> {
            *self.calls.borrow_mut() += 1;
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("script exhausted")
        }

        fn calls(&self) -> u32 {
            *self.calls.borrow()
        }
    }

    async fn run_script(script: &Script) -> (Result<Bytes, ApiFailure>, RetryState, Duration) {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        let started = Instant::now();
        let result = policy.run(&mut state, |_| script.next()).await;
        (result, state, started.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let script = Script::new(vec![Ok(Reply::new(StatusCode::OK, vec![1, 2, 3, 4]))]);

        let (result, state, elapsed) = run_script(&script).await;

        assert_eq!(result.unwrap().len(), 4);
        assert_eq!(script.calls(), 1);
        assert_eq!(state.backoff_total, Duration::ZERO);
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let script = Script::statuses(&[503, 503, 200]);

        let (result, state, elapsed) = run_script(&script).await;

        assert_eq!(result.unwrap(), Bytes::from("body 200"));
        assert_eq!(script.calls(), 3);
        assert_eq!(state.attempt, 3);
        assert_eq!(state.backoff_total, Duration::from_millis(6000));
        assert_eq!(elapsed, Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_transient_failure_waits_base_only() {
        let script = Script::statuses(&[503, 200]);

        let (result, _, elapsed) = run_script(&script).await;

        assert!(result.is_ok());
        assert_eq!(elapsed, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_transient_failures_exhaust_budget() {
        let script = Script::statuses(&[503, 503, 503]);

        let (result, state, elapsed) = run_script(&script).await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::TransientService);
        assert_eq!(failure.status(), Some(503));
        assert!(failure.message().contains("temporarily unavailable"));
        assert_eq!(script.calls(), 3);
        assert_eq!(state.backoff_total, Duration::from_millis(6000));
        assert_eq!(elapsed, Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_fails_without_waiting() {
        let script = Script::statuses(&[429]);

        let (result, _, elapsed) = run_script(&script).await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::RateLimit);
        assert_eq!(failure.status(), Some(429));
        assert!(failure.message().contains("Rate limit"));
        assert_eq!(script.calls(), 1);
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_statuses_fail_with_body_text() {
        for status in [404u16, 500] {
            let script = Script::statuses(&[status]);

            let (result, _, elapsed) = run_script(&script).await;

            let failure = result.unwrap_err();
            assert_eq!(failure.kind(), FailureKind::GenericRequest);
            assert_eq!(failure.status(), Some(status));
            assert!(failure.message().contains(&format!("body {}", status)));
            assert_eq!(script.calls(), 1);
            assert_eq!(elapsed, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_error_body_uses_status_line() {
        let reply = Reply {
            status: StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
            body: None,
        };
        let script = Script::new(vec![Ok(reply)]);

        let (result, _, _) = run_script(&script).await;

        assert_eq!(
            result.unwrap_err().message(),
            "Failed to process image: HTTP 502 Bad Gateway"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_rate_limit_stops() {
        let script = Script::statuses(&[503, 429, 200]);

        let (result, state, _) = run_script(&script).await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::RateLimit);
        assert_eq!(script.calls(), 2);
        assert_eq!(state.backoff_total, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadline_is_not_retried() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        let calls = RefCell::new(0u32);
        let started = Instant::now();

        let result = policy
            .run(&mut state, |_| {
                *calls.borrow_mut() += 1;
                async {
                    sleep(Duration::from_secs(600)).await;
                    Ok(Reply::new(StatusCode::OK, "late"))
                }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::DeadlineExceeded);
        assert_eq!(failure.status(), None);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let script = Script::new(vec![
            Err(ApiFailure::network(PROCESS_FAILURE_CONTEXT, "connection refused")),
            Ok(Reply::new(StatusCode::OK, "never")),
        ]);

        let (result, _, _) = run_script(&script).await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::Network);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_budget_reports_generic_failure() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let mut state = RetryState::new();

        let result = policy
            .run(&mut state, |_| async { Ok(Reply::new(StatusCode::OK, "x")) })
            .await;

        assert_eq!(result.unwrap_err().message(), "All retry attempts failed");
        assert_eq!(state.attempt, 0);
    }

    #[test]
    fn test_success_with_unreadable_body_is_network_failure() {
        let reply = Reply {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
        };
        assert_eq!(classify(reply).unwrap_err().kind(), FailureKind::Network);
    }
}
