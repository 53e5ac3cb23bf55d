//! Slack connector configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{SlackError, SlackResult};

/// Largest page size the Slack Web API accepts for list methods.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Configuration for the Slack connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Web API base URL; method names are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Enterprise Grid organization id. Enables enterprise mode (workspace
    /// discovery, enterprise admin roles) when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_id: Option<String>,

    /// Items requested per upstream page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Whether user groups are synced.
    #[serde(default = "default_true")]
    pub sync_user_groups: bool,

    /// Whether enterprise admin roles are synced (enterprise mode only).
    #[serde(default = "default_true")]
    pub sync_enterprise_roles: bool,

    /// Skip deactivated users in user listings.
    ///
    /// Deactivated users never hold grants, whatever this is set to.
    #[serde(default)]
    pub skip_deleted_users: bool,
}

fn default_base_url() -> String {
    "https://slack.com/api/".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enterprise_id: None,
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            sync_user_groups: true,
            sync_enterprise_roles: true,
            skip_deleted_users: false,
        }
    }
}

impl SlackConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> SlackConfigBuilder {
        SlackConfigBuilder::default()
    }

    /// Returns true when an enterprise organization is configured.
    #[must_use]
    pub fn is_enterprise(&self) -> bool {
        self.enterprise_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SlackResult<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| SlackError::Config(format!("invalid base_url: {e}")))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(SlackError::Config(format!(
                "unsupported base_url scheme: {}",
                url.scheme()
            )));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SlackError::Config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(SlackError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        if matches!(self.enterprise_id.as_deref(), Some("")) {
            return Err(SlackError::Config(
                "enterprise_id must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`SlackConfig`].
#[derive(Debug, Default)]
pub struct SlackConfigBuilder {
    config: SlackConfig,
}

impl SlackConfigBuilder {
    /// Set the Web API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Enable enterprise mode for the given organization.
    pub fn enterprise_id(mut self, enterprise_id: impl Into<String>) -> Self {
        self.config.enterprise_id = Some(enterprise_id.into());
        self
    }

    /// Set the upstream page size.
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Enable or disable user group sync.
    #[must_use]
    pub fn sync_user_groups(mut self, enabled: bool) -> Self {
        self.config.sync_user_groups = enabled;
        self
    }

    /// Enable or disable enterprise role sync.
    #[must_use]
    pub fn sync_enterprise_roles(mut self, enabled: bool) -> Self {
        self.config.sync_enterprise_roles = enabled;
        self
    }

    /// Skip deactivated users.
    #[must_use]
    pub fn skip_deleted_users(mut self, skip: bool) -> Self {
        self.config.skip_deleted_users = skip;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> SlackResult<SlackConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Credentials for the Slack Web API.
#[derive(Debug, Clone)]
pub struct SlackCredentials {
    /// Bot or user OAuth token (`xoxb-...` / `xoxp-...`).
    pub bot_token: SecretString,
}

impl SlackCredentials {
    /// Wrap a token.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::from(bot_token.into()),
        }
    }
}
