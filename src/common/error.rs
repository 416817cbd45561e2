//! # Failure Taxonomy
//!
//! Every failure the client surfaces is a single [`ApiFailure`] value. Callers
//! branch on [`ApiFailure::kind`] (an exhaustive [`FailureKind`] match) rather
//! than on the message text, and present [`ApiFailure::message`] verbatim to
//! the user.
//!
//! ## Kinds
//!
//! | Kind               | Trigger                                   | Retried |
//! |--------------------|-------------------------------------------|---------|
//! | `TransientService` | HTTP 503                                  | yes, within the attempt budget |
//! | `RateLimit`        | HTTP 429                                  | no      |
//! | `GenericRequest`   | any other non-2xx                         | no      |
//! | `DeadlineExceeded` | health probe or attempt ran out of time   | no      |
//! | `HealthGate`       | liveness probe failed                     | no      |
//! | `Network`          | no HTTP response, or unreadable body      | no      |
//! | `InvalidRequest`   | upload parameters failed validation       | no      |

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of an [`ApiFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The service answered 503 "service temporarily unavailable".
    TransientService,
    /// The service answered 429 "too many requests".
    RateLimit,
    /// Any other non-success status.
    GenericRequest,
    /// A hard deadline fired before the service answered.
    DeadlineExceeded,
    /// The liveness probe failed, so no upload was attempted.
    HealthGate,
    /// The request never produced a usable HTTP response.
    Network,
    /// The upload was rejected locally before anything was sent.
    InvalidRequest,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientService => "transient_service",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::GenericRequest => "generic_request",
            FailureKind::DeadlineExceeded => "deadline_exceeded",
            FailureKind::HealthGate => "health_gate",
            FailureKind::Network => "network",
            FailureKind::InvalidRequest => "invalid_request",
        }
    }

    /// Whether the transport's retry policy may issue another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientService)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the HTTP response that caused a failure.
///
/// The response body is consumed while classifying, so this keeps what a
/// caller may still want to inspect: status line, headers and the body text
/// when it could be read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl RawResponse {
    /// `"HTTP 500 Internal Server Error"`, used when the body is unreadable.
    pub fn status_line(&self) -> String {
        format!(
            "HTTP {} {}",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }
}

/// A classified failure of a call to the processing service.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiFailure {
    kind: FailureKind,
    message: String,
    status: Option<u16>,
    raw_response: Option<RawResponse>,
}

impl ApiFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            raw_response: None,
        }
    }

    /// Builds a failure from a response, mirroring its status code.
    pub fn from_response(kind: FailureKind, message: impl Into<String>, raw: RawResponse) -> Self {
        Self {
            kind,
            message: message.into(),
            status: Some(raw.status.as_u16()),
            raw_response: Some(raw),
        }
    }

    pub fn transient_service(raw: RawResponse) -> Self {
        Self::from_response(
            FailureKind::TransientService,
            "Service temporarily unavailable. Please try again in a moment.",
            raw,
        )
    }

    pub fn rate_limited(raw: RawResponse) -> Self {
        Self::from_response(
            FailureKind::RateLimit,
            "Rate limit exceeded. Please wait a moment before trying again.",
            raw,
        )
    }

    /// `context` prefixes the body text, e.g. `"Failed to process image"`.
    pub fn generic_request(context: &str, raw: RawResponse) -> Self {
        let detail = raw.body.clone().unwrap_or_else(|| raw.status_line());
        Self::from_response(FailureKind::GenericRequest, format!("{}: {}", context, detail), raw)
    }

    pub fn health_gate(raw: RawResponse) -> Self {
        Self::from_response(FailureKind::HealthGate, "API health check failed", raw)
    }

    pub fn deadline_exceeded(what: &str, budget: Duration) -> Self {
        Self::new(
            FailureKind::DeadlineExceeded,
            format!("{} timed out after {}s", what, budget.as_secs_f64()),
        )
    }

    pub fn network(context: &str, err: impl fmt::Display) -> Self {
        Self::new(FailureKind::Network, format!("{}: {}", context, err))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRequest, message)
    }

    /// Re-tags a failure that happened while probing liveness.
    pub fn into_health_gate(mut self) -> Self {
        self.kind = FailureKind::HealthGate;
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failing response; `None` when no response arrived
    /// (deadline, network, or local validation).
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn raw_response(&self) -> Option<&RawResponse> {
        self.raw_response.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: StatusCode, body: Option<&str>) -> RawResponse {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: body.map(str::to_string),
        }
    }

    #[test]
    fn test_generic_request_uses_body_text() {
        let failure = ApiFailure::generic_request(
            "Failed to process image",
            raw(StatusCode::NOT_FOUND, Some("no such route")),
        );
        assert_eq!(failure.kind(), FailureKind::GenericRequest);
        assert_eq!(failure.status(), Some(404));
        assert_eq!(failure.message(), "Failed to process image: no such route");
        assert_eq!(failure.to_string(), failure.message());
    }

    #[test]
    fn test_generic_request_falls_back_to_status_line() {
        let failure = ApiFailure::generic_request(
            "Failed to process image",
            raw(StatusCode::INTERNAL_SERVER_ERROR, None),
        );
        assert_eq!(
            failure.message(),
            "Failed to process image: HTTP 500 Internal Server Error"
        );
    }

    #[test]
    fn test_deadline_has_no_status() {
        let failure = ApiFailure::deadline_exceeded("Health check", Duration::from_secs(10));
        assert_eq!(failure.kind(), FailureKind::DeadlineExceeded);
        assert_eq!(failure.status(), None);
        assert!(failure.raw_response().is_none());
        assert!(failure.message().contains("10s"));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FailureKind::TransientService.is_retryable());
        assert!(!FailureKind::RateLimit.is_retryable());
        assert!(!FailureKind::DeadlineExceeded.is_retryable());
        assert!(!FailureKind::HealthGate.is_retryable());
    }
}
