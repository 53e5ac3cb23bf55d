//! Slack connector: one syncer per resource type over a shared source.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::{DirectorySource, LookupRequest, Method, QueryParams, SlackClient};
use crate::config::{SlackConfig, SlackCredentials};
use crate::context::SyncContext;
use crate::ids::ResourceType;
use crate::resources::{
    EnterpriseRoleSyncer, UserGroupSyncer, UserSyncer, WorkspaceRoleSyncer, WorkspaceSyncer,
};
use crate::roles::RoleCatalog;
use crate::syncer::ResourceSyncer;
use crate::SlackResult;

/// Slack directory connector.
///
/// Handlers are built once and keep their state (the enterprise role cache)
/// for the connector's lifetime.
pub struct SlackConnector {
    config: Arc<SlackConfig>,
    source: Arc<dyn DirectorySource>,
    catalog: Arc<RoleCatalog>,
    syncers: Vec<Arc<dyn ResourceSyncer>>,
}

impl std::fmt::Debug for SlackConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConnector")
            .field("config", &self.config)
            .field(
                "resource_types",
                &self.syncers.iter().map(|s| s.resource_type()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl SlackConnector {
    /// Creates a connector talking to the Slack Web API.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SlackConfig, credentials: SlackCredentials) -> SlackResult<Self> {
        let client = SlackClient::new(&config, &credentials)?;
        Self::with_source(config, Arc::new(client))
    }

    /// Creates a connector over any directory source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_source(config: SlackConfig, source: Arc<dyn DirectorySource>) -> SlackResult<Self> {
        config.validate()?;
        Ok(Self::build(Arc::new(config), source, RoleCatalog::standard()))
    }

    /// Replaces the role catalog; rebuilds the handlers.
    #[must_use]
    pub fn with_catalog(self, catalog: Arc<RoleCatalog>) -> Self {
        Self::build(self.config, self.source, catalog)
    }

    fn build(
        config: Arc<SlackConfig>,
        source: Arc<dyn DirectorySource>,
        catalog: Arc<RoleCatalog>,
    ) -> Self {
        let mut syncers: Vec<Arc<dyn ResourceSyncer>> = vec![
            Arc::new(WorkspaceSyncer::new(Arc::clone(&source), Arc::clone(&config))),
            Arc::new(UserSyncer::new(Arc::clone(&source), Arc::clone(&config))),
        ];
        if config.sync_user_groups {
            syncers.push(Arc::new(UserGroupSyncer::new(
                Arc::clone(&source),
                Arc::clone(&config),
            )));
        }
        syncers.push(Arc::new(WorkspaceRoleSyncer::new(Arc::clone(&catalog))));
        if let Some(enterprise_id) = config.enterprise_id.as_deref() {
            if config.is_enterprise() && config.sync_enterprise_roles {
                syncers.push(Arc::new(EnterpriseRoleSyncer::new(
                    Arc::clone(&source),
                    Arc::clone(&catalog),
                    enterprise_id,
                    config.page_size,
                )));
            }
        }

        Self {
            config,
            source,
            catalog,
            syncers,
        }
    }

    /// Connector configuration.
    #[must_use]
    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    /// Role catalog the handlers use.
    #[must_use]
    pub fn catalog(&self) -> &Arc<RoleCatalog> {
        &self.catalog
    }

    /// Enabled handlers, in sync order.
    #[must_use]
    pub fn syncers(&self) -> &[Arc<dyn ResourceSyncer>] {
        &self.syncers
    }

    /// Handler for one resource type, if enabled.
    #[must_use]
    pub fn syncer(&self, resource_type: ResourceType) -> Option<Arc<dyn ResourceSyncer>> {
        self.syncers
            .iter()
            .find(|s| s.resource_type() == resource_type)
            .cloned()
    }

    /// Verifies the credentials with `auth.test`; returns the identity document.
    #[instrument(skip(self, ctx))]
    pub async fn test_connection(&self, ctx: &SyncContext) -> SlackResult<Value> {
        let request = LookupRequest::new(Method::AuthTest, QueryParams::new());
        let identity = ctx.run(self.source.fetch_one(&request)).await?;
        let team = identity
            .get("team_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(team, "Slack connection verified");
        Ok(identity)
    }
}
