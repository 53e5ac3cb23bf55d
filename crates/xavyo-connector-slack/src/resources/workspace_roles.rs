//! Attribute-derived workspace roles.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{ensure_resource_type, pop_scoped_frame, workspace_parent};
use crate::context::SyncContext;
use crate::ids::{ResourceKey, ResourceType, Scope};
use crate::model::{Entitlement, Grant, Resource, ResourceProfile, RoleProfile};
use crate::roles::RoleCatalog;
use crate::syncer::{ResourceSyncer, SyncPage, SyncResult};
use crate::token::{decode, encode};
use crate::SlackError;

/// Lists the fixed set of workspace roles of a workspace.
///
/// Nothing is fetched: the roles come from the [`RoleCatalog`]. Their grants
/// are emitted by the user handler, so [`grants`](ResourceSyncer::grants) here
/// is always empty.
pub struct WorkspaceRoleSyncer {
    catalog: Arc<RoleCatalog>,
}

impl WorkspaceRoleSyncer {
    pub fn new(catalog: Arc<RoleCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ResourceSyncer for WorkspaceRoleSyncer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::WorkspaceRole
    }

    #[instrument(skip(self, parent, _ctx))]
    async fn list(
        &self,
        parent: Option<&ResourceKey>,
        token: &str,
        _ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let workspace_id = workspace_parent(parent)?.ok_or_else(|| {
            SlackError::InvalidRequest("workspace roles are listed per workspace".to_string())
        })?;

        let scope = Scope::catalog(workspace_id);
        let mut stack = decode(token, &scope)?;
        pop_scoped_frame(&mut stack, &scope)?;

        let roles: Vec<Resource> = self
            .catalog
            .workspace_roles()
            .map(|(role, info)| {
                Resource::new(
                    ResourceKey::WorkspaceRole {
                        workspace_id: workspace_id.to_string(),
                        role,
                    },
                    info.display_name.clone(),
                    ResourceProfile::Role(RoleProfile {
                        description: info.description.clone(),
                        system: true,
                    }),
                )
            })
            .collect();

        debug!(count = roles.len(), "Listed workspace roles");
        Ok(SyncPage::new(roles, encode(&stack)))
    }

    async fn entitlements(&self, resource: &Resource, _ctx: &SyncContext) -> SyncResult<Entitlement> {
        ensure_resource_type(resource, ResourceType::WorkspaceRole)?;
        Ok(SyncPage::last(vec![Entitlement::assignment(resource)]))
    }

    async fn grants(&self, resource: &Resource, _token: &str, _ctx: &SyncContext) -> SyncResult<Grant> {
        ensure_resource_type(resource, ResourceType::WorkspaceRole)?;
        Ok(SyncPage::empty())
    }
}
