//! Failures of model backend calls and the retry policy applied to them.
//!
//! Rate limits, 5xx answers and broken connections are retried by the
//! client; everything else goes straight back to the agent.

use std::time::Duration;

use thiserror::Error;

/// Retries allowed after the first failed attempt.
pub const MAX_RETRIES: u32 = 5;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A failed call to the model backend.
#[derive(Debug, Clone, Error)]
#[error("{kind}{}: {message}", http_suffix(.status_code))]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// Status of the HTTP answer, when there was one.
    pub status_code: Option<u16>,
    pub message: String,
    /// Delay requested by the backend through `Retry-After`.
    pub retry_after: Option<Duration>,
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl LlmError {
    fn of(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    /// 429 from the backend, optionally with its `Retry-After` hint.
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::of(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::of(LlmErrorKind::ServerError, Some(status_code), message)
    }

    /// Rejected request: bad key, unknown model, oversized prompt.
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::of(LlmErrorKind::ClientError, Some(status_code), message)
    }

    pub fn network_error(message: String) -> Self {
        Self::of(LlmErrorKind::NetworkError, None, message)
    }

    /// The backend answered but the body was not a completion we understand.
    pub fn parse_error(message: String) -> Self {
        Self::of(LlmErrorKind::ParseError, None, message)
    }

    /// Map a non-2xx answer to an error, keeping the body as the message.
    pub fn from_status(status_code: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = body.to_string();
        match classify_http_status(status_code) {
            LlmErrorKind::RateLimited => Self::rate_limited(message, retry_after),
            kind => Self::of(kind, Some(status_code), message),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Sleep before retry number `attempt` (zero based).
    ///
    /// A `Retry-After` hint wins. Otherwise the kind's base delay doubles per
    /// attempt, plus a small deterministic jitter, capped at one minute.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(hint) = self.retry_after {
            return hint;
        }

        let secs = self
            .kind
            .base_backoff()
            .as_secs()
            .saturating_mul(1u64 << attempt.min(16));
        let spread = secs / 4;
        let jitter = if spread == 0 {
            0
        } else {
            u64::from(attempt) * 7 % spread
        };

        Duration::from_secs(secs + jitter).min(MAX_BACKOFF)
    }
}

/// Broad category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LlmErrorKind {
    #[error("Rate limited")]
    RateLimited,
    #[error("Server error")]
    ServerError,
    #[error("Client error")]
    ClientError,
    /// Timeout, refused connection or a stream cut short.
    #[error("Network error")]
    NetworkError,
    #[error("Parse error")]
    ParseError,
}

impl LlmErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError | Self::NetworkError)
    }

    fn base_backoff(&self) -> Duration {
        match self {
            Self::RateLimited => Duration::from_secs(4),
            Self::ServerError => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        }
    }
}

/// How hard the client tries before giving up on a backend call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Wall-clock budget across all attempts.
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            max_retry_duration: Duration::ZERO,
        }
    }

    /// Whether `error` earns another attempt once `attempt` retries were spent.
    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

/// Kind of failure implied by an HTTP status. Unknown codes count as server errors.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}
