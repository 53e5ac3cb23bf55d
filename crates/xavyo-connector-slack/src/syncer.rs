//! Resource syncer trait and its page types.
//!
//! Every resource type is crawled through the same three operations: list the
//! resources, list the entitlements a resource offers, and list the grants of
//! those entitlements. Each call does at most one upstream request and hands
//! back an opaque token to resume from; the caller drives the loop, decides on
//! retries and honours backpressure hints.

use async_trait::async_trait;
use std::fmt;

use crate::context::SyncContext;
use crate::ids::{ResourceKey, ResourceType};
use crate::model::{Entitlement, Grant, Resource};
use crate::outcome::RateLimitSignal;
use crate::SlackError;

/// A successful page.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPage<T> {
    pub items: Vec<T>,
    /// Token for the next call; `""` when the listing is complete.
    pub next_token: String,
    /// Rate-limit window reported by the upstream for this page.
    pub rate_limit: Option<RateLimitSignal>,
}

impl<T> SyncPage<T> {
    /// A page followed by `next_token`.
    #[must_use]
    pub fn new(items: Vec<T>, next_token: String) -> Self {
        Self {
            items,
            next_token,
            rate_limit: None,
        }
    }

    /// The final page of a listing.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, String::new())
    }

    /// An empty, final page.
    #[must_use]
    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitSignal>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Returns true when no further call is needed.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_token.is_empty()
    }
}

/// A failed page: the classified error plus anything produced before it.
#[derive(Debug)]
pub struct SyncFailure<T> {
    pub error: SlackError,
    pub partial: Vec<T>,
}

impl<T> SyncFailure<T> {
    /// Attaches items produced before the failure.
    #[must_use]
    pub fn with_partial(mut self, partial: Vec<T>) -> Self {
        self.partial = partial;
        self
    }
}

impl<T> From<SlackError> for SyncFailure<T> {
    fn from(error: SlackError) -> Self {
        Self {
            error,
            partial: Vec::new(),
        }
    }
}

impl<T> fmt::Display for SyncFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.partial.is_empty() {
            write!(f, " ({} partial items)", self.partial.len())?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug> std::error::Error for SyncFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of one syncer call.
pub type SyncResult<T> = Result<SyncPage<T>, SyncFailure<T>>;

/// Handler for one resource type.
#[async_trait]
pub trait ResourceSyncer: Send + Sync {
    /// The resource type this handler emits.
    fn resource_type(&self) -> ResourceType;

    /// Lists resources under `parent`, resuming from `token` (`""` to start).
    async fn list(
        &self,
        parent: Option<&ResourceKey>,
        token: &str,
        ctx: &SyncContext,
    ) -> SyncResult<Resource>;

    /// Entitlements `resource` offers. Always a single page.
    async fn entitlements(&self, resource: &Resource, ctx: &SyncContext) -> SyncResult<Entitlement>;

    /// Grants on `resource`'s entitlements, resuming from `token` (`""` to start).
    async fn grants(&self, resource: &Resource, token: &str, ctx: &SyncContext) -> SyncResult<Grant>;
}
