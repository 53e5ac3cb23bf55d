//! Classification of upstream failure signals.
//!
//! The Slack Web API reports failures three different ways: an HTTP status,
//! an in-body error identifier (`{"ok": false, "error": "invalid_auth"}`) and
//! throttling headers. [`classify`] folds all of them into one [`ErrorOutcome`]
//! so retry policies outside the connector only ever look at a category.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Canonical outcome category of a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    /// Credentials missing, invalid, revoked or expired.
    Unauthenticated,
    /// Credentials valid but lacking a scope or permission.
    PermissionDenied,
    /// The addressed object does not exist.
    NotFound,
    /// The request itself was rejected.
    InvalidArgument,
    /// The object being created already exists.
    AlreadyExists,
    /// Throttled by the upstream.
    RateLimited,
    /// Upstream temporarily unable to serve the request.
    Unavailable,
    /// The call did not finish in time.
    DeadlineExceeded,
    /// Unimplemented method or a configuration problem on either side.
    Internal,
    /// Nothing in the signal could be classified.
    Unknown,
}

impl OutcomeCategory {
    /// Returns true when the caller may retry the same page later.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable | Self::DeadlineExceeded
        )
    }

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::AlreadyExists => "already_exists",
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backpressure hint attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSignal {
    /// Request budget of the current window, when the upstream reports it.
    pub limit: Option<u64>,
    /// Requests left in the current window.
    pub remaining: Option<u64>,
    /// When the window resets (or when a throttled request may be retried).
    pub reset_at: Option<DateTime<Utc>>,
}

/// Rate-limit related headers as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Parsed `Retry-After`.
    pub retry_after: Option<Duration>,
    /// Parsed `X-RateLimit-Limit`.
    pub limit: Option<u64>,
    /// Parsed `X-RateLimit-Remaining`.
    pub remaining: Option<u64>,
    /// Parsed `X-RateLimit-Reset` (epoch seconds).
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitHeaders {
    /// Returns true if no header carried a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retry_after.is_none()
            && self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_at.is_none()
    }

    /// Converts the headers into a backpressure hint relative to `observed_at`.
    ///
    /// An explicit `Retry-After` wins over `X-RateLimit-Reset` for the reset time
    /// and implies an exhausted window when no remaining count was sent.
    #[must_use]
    pub fn to_signal(&self, observed_at: DateTime<Utc>) -> Option<RateLimitSignal> {
        if self.is_empty() {
            return None;
        }

        match self.retry_after {
            Some(retry_after) => Some(RateLimitSignal {
                limit: self.limit,
                remaining: Some(self.remaining.unwrap_or(0)),
                reset_at: ChronoDuration::from_std(retry_after)
                    .ok()
                    .and_then(|delay| observed_at.checked_add_signed(delay)),
            }),
            None => Some(RateLimitSignal {
                limit: self.limit,
                remaining: self.remaining,
                reset_at: self.reset_at,
            }),
        }
    }
}

/// Parses a `Retry-After` header value given in seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Everything the transport observed about one failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFailureSignal {
    /// HTTP status code, if a response arrived.
    pub status: Option<u16>,
    /// Lowercase, underscore-delimited error identifier from the body.
    pub error_id: Option<String>,
    /// Throttling headers, if any were present.
    pub rate_limit: Option<RateLimitHeaders>,
    /// When the response was received; reset times are relative to it.
    pub observed_at: DateTime<Utc>,
}

impl RawFailureSignal {
    /// Creates an empty signal observed at the given instant.
    #[must_use]
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            error_id: None,
            rate_limit: None,
            observed_at,
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the textual error identifier.
    #[must_use]
    pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
        self.error_id = Some(error_id.into());
        self
    }

    /// Sets the rate-limit headers; empty header sets are dropped.
    #[must_use]
    pub fn with_rate_limit(mut self, headers: RateLimitHeaders) -> Self {
        self.rate_limit = (!headers.is_empty()).then_some(headers);
        self
    }
}

/// Classified outcome of a failed upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOutcome {
    /// Outcome category.
    pub category: OutcomeCategory,
    /// Backpressure hint, when the upstream sent one.
    pub rate_limit: Option<RateLimitSignal>,
}

impl ErrorOutcome {
    /// Creates an outcome without a rate-limit hint.
    #[must_use]
    pub fn new(category: OutcomeCategory) -> Self {
        Self {
            category,
            rate_limit: None,
        }
    }

    /// Attaches a rate-limit hint.
    #[must_use]
    pub fn with_rate_limit(mut self, signal: Option<RateLimitSignal>) -> Self {
        self.rate_limit = signal;
        self
    }

    /// Returns true when the caller may retry the same page later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

impl fmt::Display for ErrorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rate_limit.as_ref().and_then(|s| s.reset_at) {
            Some(reset_at) => write!(f, "{} (reset at {})", self.category, reset_at.to_rfc3339()),
            None => write!(f, "{}", self.category),
        }
    }
}

struct KeywordRule {
    category: OutcomeCategory,
    keywords: &'static [&'static str],
}

/// Identifier rules, matched by substring in declaration order.
///
/// Overlaps (e.g. `invalid_auth` also contains `invalid_`) resolve to the rule
/// declared first.
const IDENTIFIER_RULES: &[KeywordRule] = &[
    KeywordRule {
        category: OutcomeCategory::Unauthenticated,
        keywords: &[
            "not_authed",
            "invalid_auth",
            "account_inactive",
            "token_revoked",
            "token_expired",
            "unauthenticated",
            "two_factor_setup_required",
        ],
    },
    KeywordRule {
        category: OutcomeCategory::PermissionDenied,
        keywords: &[
            "missing_scope",
            "not_allowed",
            "no_permission",
            "permission_denied",
            "access_denied",
            "restricted_action",
            "not_authorized",
            "team_access_not_granted",
            "forbidden",
        ],
    },
    KeywordRule {
        category: OutcomeCategory::NotFound,
        keywords: &["not_found", "no_such_", "does_not_exist"],
    },
    KeywordRule {
        category: OutcomeCategory::InvalidArgument,
        keywords: &["invalid_", "bad_", "missing_", "malformed", "too_long"],
    },
    KeywordRule {
        category: OutcomeCategory::RateLimited,
        keywords: &["ratelimited", "rate_limited", "too_many_requests"],
    },
    KeywordRule {
        category: OutcomeCategory::Unavailable,
        keywords: &[
            "service_unavailable",
            "temporarily_unavailable",
            "fatal_error",
            "unavailable",
        ],
    },
    KeywordRule {
        category: OutcomeCategory::DeadlineExceeded,
        keywords: &["timeout", "timed_out", "deadline_exceeded"],
    },
    KeywordRule {
        category: OutcomeCategory::AlreadyExists,
        keywords: &["already_", "name_taken", "_exists", "duplicate"],
    },
    KeywordRule {
        category: OutcomeCategory::Internal,
        keywords: &[
            "unknown_method",
            "method_deprecated",
            "not_implemented",
            "unimplemented",
            "feature_not_enabled",
            "not_enabled",
            "internal_error",
        ],
    },
];

fn category_for_identifier(error_id: &str) -> Option<OutcomeCategory> {
    let error_id = error_id.to_ascii_lowercase();
    IDENTIFIER_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| error_id.contains(kw)))
        .map(|rule| rule.category)
}

/// Maps an HTTP status to an outcome category.
#[must_use]
pub fn category_for_status(status: u16) -> OutcomeCategory {
    match status {
        400 => OutcomeCategory::InvalidArgument,
        401 => OutcomeCategory::Unauthenticated,
        403 => OutcomeCategory::PermissionDenied,
        404 => OutcomeCategory::NotFound,
        409 => OutcomeCategory::AlreadyExists,
        429 => OutcomeCategory::RateLimited,
        500..=599 => OutcomeCategory::Unavailable,
        _ => OutcomeCategory::Unknown,
    }
}

/// Classifies a raw failure signal.
///
/// Pure and total: the same signal always yields the same outcome.
/// 1. An explicit `Retry-After` always yields [`OutcomeCategory::RateLimited`].
/// 2. Otherwise the error identifier is matched against [`IDENTIFIER_RULES`].
/// 3. Otherwise (or when no rule matches) the status table decides.
#[must_use]
pub fn classify(signal: &RawFailureSignal) -> ErrorOutcome {
    let hint = signal
        .rate_limit
        .as_ref()
        .and_then(|headers| headers.to_signal(signal.observed_at));

    let explicit_retry = signal
        .rate_limit
        .as_ref()
        .is_some_and(|headers| headers.retry_after.is_some());
    if explicit_retry {
        return ErrorOutcome::new(OutcomeCategory::RateLimited).with_rate_limit(hint);
    }

    let category = signal
        .error_id
        .as_deref()
        .and_then(category_for_identifier)
        .or_else(|| signal.status.map(category_for_status))
        .unwrap_or(OutcomeCategory::Unknown);

    ErrorOutcome::new(category).with_rate_limit(hint)
}
