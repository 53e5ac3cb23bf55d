//! Workspace (team) resources.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    bool_field, current_frame, current_scoped_frame, ensure_resource_type, required_id, str_field,
};
use crate::client::{DirectorySource, LookupRequest, Method, PageRequest, QueryParams};
use crate::config::SlackConfig;
use crate::context::SyncContext;
use crate::ids::{EntitlementKey, ResourceKey, ResourceType, Scope, ScopeType};
use crate::model::{Entitlement, Grant, Resource, ResourceProfile, WorkspaceProfile, MEMBER_SLUG};
use crate::syncer::{ResourceSyncer, SyncPage, SyncResult};
use crate::token::{decode, encode};
use crate::SlackResult;

/// Lists workspaces and their memberships.
///
/// In enterprise mode workspaces are paged from `admin.teams.list`. A
/// standalone installation has exactly one workspace, read with `team.info`.
pub struct WorkspaceSyncer {
    source: Arc<dyn DirectorySource>,
    config: Arc<SlackConfig>,
}

impl WorkspaceSyncer {
    pub fn new(source: Arc<dyn DirectorySource>, config: Arc<SlackConfig>) -> Self {
        Self { source, config }
    }

    fn root_scope(&self) -> Scope {
        match &self.config.enterprise_id {
            Some(id) if self.config.is_enterprise() => Scope::enterprise(id.clone()),
            _ => Scope::standalone(),
        }
    }
}

/// Maps a team object to a workspace resource.
pub(crate) fn workspace_from_json(value: &Value) -> SlackResult<Resource> {
    let id = required_id(value, "workspace")?;
    let name = str_field(value, "name").unwrap_or(id.as_str()).to_string();
    let profile = WorkspaceProfile {
        domain: str_field(value, "domain").map(String::from),
        enterprise_id: str_field(value, "enterprise_id").map(String::from),
    };

    Ok(Resource::new(
        ResourceKey::Workspace { workspace_id: id },
        name,
        ResourceProfile::Workspace(profile),
    ))
}

fn parse_workspaces(items: &[Value]) -> Vec<Resource> {
    items
        .iter()
        .filter_map(|item| match workspace_from_json(item) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!("Failed to parse workspace: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ResourceSyncer for WorkspaceSyncer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Workspace
    }

    #[instrument(skip(self, _parent, ctx))]
    async fn list(
        &self,
        _parent: Option<&ResourceKey>,
        token: &str,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let mut stack = decode(token, &self.root_scope())?;
        let frame = current_frame(&stack, &[ScopeType::Enterprise, ScopeType::Standalone])?;

        if frame.scope.scope_type == ScopeType::Standalone {
            let request = LookupRequest::new(Method::TeamInfo, QueryParams::new());
            let team = ctx.run(self.source.fetch_one(&request)).await?;
            stack.pop();
            info!("Listed standalone workspace");
            return Ok(SyncPage::new(vec![workspace_from_json(&team)?], encode(&stack)));
        }

        let request = PageRequest::new(Method::AdminTeamsList)
            .with_cursor(frame.cursor.clone())
            .with_limit(self.config.page_size);
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let workspaces = parse_workspaces(&page.items);
        stack.advance(page.next_cursor);
        info!(count = workspaces.len(), more = !stack.is_empty(), "Listed workspaces");

        Ok(SyncPage::new(workspaces, encode(&stack)).with_rate_limit(page.rate_limit))
    }

    async fn entitlements(&self, resource: &Resource, _ctx: &SyncContext) -> SyncResult<Entitlement> {
        ensure_resource_type(resource, ResourceType::Workspace)?;
        Ok(SyncPage::last(vec![Entitlement::membership(resource)]))
    }

    #[instrument(skip(self, resource, ctx), fields(workspace = %resource.key))]
    async fn grants(&self, resource: &Resource, token: &str, ctx: &SyncContext) -> SyncResult<Grant> {
        ensure_resource_type(resource, ResourceType::Workspace)?;
        let workspace_id = resource.key.id().to_string();

        let scope = Scope::workspace(workspace_id.clone());
        let mut stack = decode(token, &scope)?;
        let frame = current_scoped_frame(&stack, &scope)?;

        let mut params = QueryParams::new();
        if self.config.is_enterprise() {
            params = params.team_id(workspace_id.clone());
        }
        let request = PageRequest::new(Method::UsersList)
            .with_params(params)
            .with_cursor(frame.cursor.clone())
            .with_limit(self.config.page_size);
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let entitlement = EntitlementKey::new(resource.key.clone(), MEMBER_SLUG);
        let grants: Vec<Grant> = page
            .items
            .iter()
            .filter(|member| !bool_field(member, "deleted") && !bool_field(member, "is_stranger"))
            .filter_map(|member| str_field(member, "id"))
            .map(|user_id| {
                Grant::new(
                    entitlement.clone(),
                    ResourceKey::User {
                        workspace_id: workspace_id.clone(),
                        user_id: user_id.to_string(),
                    },
                )
            })
            .collect();

        debug!(
            fetched = page.items.len(),
            granted = grants.len(),
            "Workspace membership page"
        );
        stack.advance(page.next_cursor);

        Ok(SyncPage::new(grants, encode(&stack)).with_rate_limit(page.rate_limit))
    }
}
