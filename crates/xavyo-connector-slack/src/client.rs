//! Slack Web API transport.
//!
//! Handlers never talk HTTP directly; they go through [`DirectorySource`], which
//! [`SlackClient`] implements over reqwest. Failed calls come back as
//! [`SlackError::Api`] with the outcome already classified.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{SlackConfig, SlackCredentials};
use crate::outcome::{
    classify, parse_retry_after, RateLimitHeaders, RateLimitSignal, RawFailureSignal,
};
use crate::{SlackError, SlackResult};

/// Web API methods the connector calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    AuthTest,
    AdminTeamsList,
    TeamInfo,
    UsersList,
    UsergroupsList,
    UsergroupsUsersList,
    AdminRolesListAssignments,
}

impl Method {
    /// Method name as used in the URL path.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthTest => "auth.test",
            Self::AdminTeamsList => "admin.teams.list",
            Self::TeamInfo => "team.info",
            Self::UsersList => "users.list",
            Self::UsergroupsList => "usergroups.list",
            Self::UsergroupsUsersList => "usergroups.users.list",
            Self::AdminRolesListAssignments => "admin.roles.listAssignments",
        }
    }

    /// Response field holding the payload: the item array for list methods,
    /// the object for lookups. `None` for methods answered at the top level.
    #[must_use]
    pub fn payload_key(self) -> Option<&'static str> {
        match self {
            Self::AuthTest => None,
            Self::AdminTeamsList => Some("teams"),
            Self::TeamInfo => Some("team"),
            Self::UsersList => Some("members"),
            Self::UsergroupsList => Some("usergroups"),
            Self::UsergroupsUsersList => Some("users"),
            Self::AdminRolesListAssignments => Some("role_assignments"),
        }
    }

    /// Largest `limit` the method accepts, if lower than the general ceiling.
    #[must_use]
    pub fn max_limit(self) -> Option<u32> {
        match self {
            Self::AdminTeamsList => Some(100),
            Self::AdminRolesListAssignments => Some(200),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered query parameters of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(&'static str, String)>);

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.push((key, value.into()));
        self
    }

    /// Scopes the call to a workspace.
    #[must_use]
    pub fn team_id(self, team_id: impl Into<String>) -> Self {
        self.with("team_id", team_id)
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Request for one page of a cursor-paginated list method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: Method,
    pub params: QueryParams,
    /// Cursor from the previous page; empty for the first page.
    pub cursor: String,
    pub limit: Option<u32>,
}

impl PageRequest {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            params: QueryParams::new(),
            cursor: String::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }

    /// Sets the page size, clamped to the method's ceiling.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(self.method.max_limit().map_or(limit, |max| limit.min(max)));
        self
    }
}

/// Request for a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub method: Method,
    pub params: QueryParams,
}

impl LookupRequest {
    #[must_use]
    pub fn new(method: Method, params: QueryParams) -> Self {
        Self { method, params }
    }
}

/// One page of raw upstream items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor of the next page; `None` once the list is exhausted.
    pub next_cursor: Option<String>,
    /// Rate-limit window reported with the page.
    pub rate_limit: Option<RateLimitSignal>,
}

/// Source of raw directory data.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetches one page of a list method.
    async fn fetch_page(&self, request: &PageRequest) -> SlackResult<Page<Value>>;

    /// Fetches a single object.
    async fn fetch_one(&self, request: &LookupRequest) -> SlackResult<Value>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    error: Option<String>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    next_cursor: Option<String>,
}

/// Reads the throttling headers off a response.
#[must_use]
pub fn rate_limit_headers(headers: &HeaderMap) -> RateLimitHeaders {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let number = |name: &str| text(name).and_then(|v| v.trim().parse::<u64>().ok());

    RateLimitHeaders {
        retry_after: text("retry-after").and_then(parse_retry_after),
        limit: number("x-ratelimit-limit"),
        remaining: number("x-ratelimit-remaining"),
        reset_at: number("x-ratelimit-reset")
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

/// Slack Web API client.
#[derive(Debug)]
pub struct SlackClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl SlackClient {
    /// Creates a client for the configured workspace or organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: &SlackConfig, credentials: &SlackCredentials) -> SlackResult<Self> {
        config.validate()?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SlackError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url,
            token: credentials.bot_token.clone(),
        })
    }

    /// Base URL method names are joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Verifies the token (`auth.test`); returns the identity document.
    #[instrument(skip(self))]
    pub async fn auth_test(&self) -> SlackResult<Value> {
        let (body, _) = self.call(Method::AuthTest, &[]).await?;
        Ok(body)
    }

    async fn call(
        &self,
        method: Method,
        params: &[(&str, &str)],
    ) -> SlackResult<(Value, Option<RateLimitSignal>)> {
        let url = self.base_url.join(method.as_str())?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .query(params)
            .send()
            .await?;

        let observed_at = Utc::now();
        let status = response.status();
        let headers = rate_limit_headers(response.headers());
        let window = headers.to_signal(observed_at);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error_id = serde_json::from_str::<Envelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error);
            return Err(Self::failure(method, status.as_u16(), error_id, headers, observed_at));
        }

        let body: Value = response.json().await?;
        let envelope = Envelope::deserialize(&body)?;
        if !envelope.ok {
            let error_id = envelope.error.or_else(|| Some("unknown_error".to_string()));
            return Err(Self::failure(method, status.as_u16(), error_id, headers, observed_at));
        }

        Ok((body, window))
    }

    fn failure(
        method: Method,
        status: u16,
        error_id: Option<String>,
        headers: RateLimitHeaders,
        observed_at: DateTime<Utc>,
    ) -> SlackError {
        let mut signal = RawFailureSignal::new(observed_at)
            .with_status(status)
            .with_rate_limit(headers);
        if let Some(id) = &error_id {
            signal = signal.with_error_id(id.clone());
        }

        let outcome = classify(&signal);
        let message = format!(
            "{method} failed with status {status}: {}",
            error_id.as_deref().unwrap_or("no error identifier")
        );
        warn!(%method, status, category = %outcome.category, "Slack API call failed");
        SlackError::api(outcome, message)
    }
}

#[async_trait]
impl DirectorySource for SlackClient {
    #[instrument(skip(self, request), fields(method = %request.method, cursor = %request.cursor))]
    async fn fetch_page(&self, request: &PageRequest) -> SlackResult<Page<Value>> {
        let limit = request.limit.map(|l| l.to_string());
        let mut params: Vec<(&str, &str)> = request.params.iter().collect();
        if let Some(limit) = &limit {
            params.push(("limit", limit.as_str()));
        }
        if !request.cursor.is_empty() {
            params.push(("cursor", request.cursor.as_str()));
        }

        let (mut body, rate_limit) = self.call(request.method, &params).await?;

        let items = match request.method.payload_key().and_then(|key| body.get_mut(key)) {
            Some(Value::Array(items)) => std::mem::take(items),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(SlackError::Decode(format!(
                    "{}: expected an array, got {other}",
                    request.method
                )))
            }
        };

        let next_cursor = Envelope::deserialize(&body)?
            .response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        debug!(items = items.len(), has_more = next_cursor.is_some(), "Fetched page");

        Ok(Page {
            items,
            next_cursor,
            rate_limit,
        })
    }

    #[instrument(skip(self, request), fields(method = %request.method))]
    async fn fetch_one(&self, request: &LookupRequest) -> SlackResult<Value> {
        let params: Vec<(&str, &str)> = request.params.iter().collect();
        let (mut body, _) = self.call(request.method, &params).await?;

        match request.method.payload_key() {
            Some(key) => match body.get_mut(key) {
                Some(object) if !object.is_null() => Ok(object.take()),
                _ => Err(SlackError::Decode(format!(
                    "{}: response has no `{key}` field",
                    request.method
                ))),
            },
            None => Ok(body),
        }
    }
}
