//! Error types for the Slack connector.

use thiserror::Error;

use crate::outcome::{category_for_status, ErrorOutcome, OutcomeCategory, RateLimitSignal};

/// Result type alias using `SlackError`.
pub type SlackResult<T> = Result<T, SlackError>;

/// Errors that can occur while crawling the directory.
#[derive(Debug, Error)]
pub enum SlackError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The Slack API rejected a call; the failure is already classified.
    #[error("Slack API error ({outcome}): {message}")]
    Api {
        outcome: ErrorOutcome,
        message: String,
    },

    /// Continuation token could not be parsed. Never retried.
    #[error("Malformed continuation token: {0}")]
    MalformedToken(String),

    /// The directory cache sub-crawl aborted; wraps the cause.
    #[error("Directory cache population failed: {0}")]
    CachePopulationFailed(#[source] Box<SlackError>),

    /// A request the handler cannot serve (wrong parent, wrong resource type).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Upstream response did not have the expected shape.
    #[error("Response decoding error: {0}")]
    Decode(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl SlackError {
    /// Creates a classified API error.
    pub fn api(outcome: ErrorOutcome, message: impl Into<String>) -> Self {
        SlackError::Api {
            outcome,
            message: message.into(),
        }
    }

    /// Error for a deadline that elapsed before the upstream answered.
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self::api(
            ErrorOutcome::new(OutcomeCategory::DeadlineExceeded),
            "deadline elapsed before the upstream responded",
        )
    }

    /// Classified outcome carried by this error.
    ///
    /// `None` for core-local conditions (malformed token, cancellation,
    /// configuration) that have no upstream counterpart.
    #[must_use]
    pub fn outcome(&self) -> Option<ErrorOutcome> {
        match self {
            SlackError::Api { outcome, .. } => Some(outcome.clone()),
            SlackError::CachePopulationFailed(inner) => inner.outcome(),
            SlackError::Http(e) => {
                let category = if e.is_timeout() {
                    OutcomeCategory::DeadlineExceeded
                } else if let Some(status) = e.status() {
                    category_for_status(status.as_u16())
                } else {
                    OutcomeCategory::Unavailable
                };
                Some(ErrorOutcome::new(category))
            }
            SlackError::Decode(_) | SlackError::Json(_) => {
                Some(ErrorOutcome::new(OutcomeCategory::Internal))
            }
            SlackError::InvalidRequest(_) => {
                Some(ErrorOutcome::new(OutcomeCategory::InvalidArgument))
            }
            SlackError::Config(_)
            | SlackError::MalformedToken(_)
            | SlackError::Cancelled
            | SlackError::Url(_) => None,
        }
    }

    /// Returns true if the caller may retry the same page later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.outcome().is_some_and(|o| o.is_retryable())
    }

    /// Backpressure hint attached to the error, if any.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitSignal> {
        self.outcome().and_then(|o| o.rate_limit)
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SlackError::Config(_) => "INVALID_CONFIG",
            SlackError::Api { outcome, .. } => match outcome.category {
                OutcomeCategory::Unauthenticated => "UNAUTHENTICATED",
                OutcomeCategory::PermissionDenied => "PERMISSION_DENIED",
                OutcomeCategory::NotFound => "NOT_FOUND",
                OutcomeCategory::InvalidArgument => "INVALID_ARGUMENT",
                OutcomeCategory::AlreadyExists => "ALREADY_EXISTS",
                OutcomeCategory::RateLimited => "RATE_LIMITED",
                OutcomeCategory::Unavailable => "UNAVAILABLE",
                OutcomeCategory::DeadlineExceeded => "DEADLINE_EXCEEDED",
                OutcomeCategory::Internal => "INTERNAL",
                OutcomeCategory::Unknown => "UNKNOWN",
            },
            SlackError::MalformedToken(_) => "MALFORMED_TOKEN",
            SlackError::CachePopulationFailed(_) => "CACHE_POPULATION_FAILED",
            SlackError::InvalidRequest(_) => "INVALID_REQUEST",
            SlackError::Cancelled => "CANCELLED",
            SlackError::Decode(_) => "DECODE_ERROR",
            SlackError::Http(_) => "HTTP_ERROR",
            SlackError::Json(_) => "JSON_ERROR",
            SlackError::Url(_) => "URL_ERROR",
        }
    }
}
