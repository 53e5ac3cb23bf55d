//! Users and the role grants they hold.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::enterprise_roles::{RoleAssignmentSource, UserRoleAssignments};
use super::{
    bool_field, ensure_resource_type, pop_frame, pop_scoped_frame, required_id, str_field,
    workspace_parent,
};
use crate::cache::DirectoryEntryCache;
use crate::client::{DirectorySource, Method, PageRequest, QueryParams};
use crate::config::SlackConfig;
use crate::context::SyncContext;
use crate::ids::{EntitlementKey, ResourceKey, ResourceType, Scope, ScopeType};
use crate::model::{Entitlement, Grant, Resource, ResourceProfile, UserProfile, ASSIGNED_SLUG};
use crate::roles::{derive_assignments, PrincipalAttributes, RoleAssignment, WorkspaceRole};
use crate::syncer::{ResourceSyncer, SyncFailure, SyncPage, SyncResult};
use crate::token::{decode, encode, FrameStack, PageFrame};
use crate::{SlackError, SlackResult};

/// Slackbot has no `is_bot` flag but is one.
const SLACKBOT_ID: &str = "USLACKBOT";

/// Maps a user object to a user resource.
///
/// `workspace_id` is the workspace the listing ran under; a standalone listing
/// has none and falls back to the user's own `team_id`.
pub(crate) fn user_from_json(value: &Value, workspace_id: Option<&str>) -> SlackResult<Resource> {
    let id = required_id(value, "user")?;
    let workspace_id = workspace_id
        .or_else(|| str_field(value, "team_id"))
        .ok_or_else(|| SlackError::Decode(format!("User {id} has no team_id")))?
        .to_string();

    let profile = value.get("profile").unwrap_or(&Value::Null);
    let real_name = str_field(value, "real_name")
        .or_else(|| str_field(profile, "real_name"))
        .map(String::from);
    let display_name = real_name
        .clone()
        .or_else(|| str_field(profile, "display_name").map(String::from))
        .or_else(|| str_field(value, "name").map(String::from))
        .unwrap_or_else(|| id.clone());

    let attributes = PrincipalAttributes {
        is_primary_owner: bool_field(value, "is_primary_owner"),
        is_owner: bool_field(value, "is_owner"),
        is_admin: bool_field(value, "is_admin"),
        is_restricted: bool_field(value, "is_restricted"),
        is_ultra_restricted: bool_field(value, "is_ultra_restricted"),
        is_invited: bool_field(value, "is_invited_user"),
        is_bot: bool_field(value, "is_bot") || id == SLACKBOT_ID,
        is_stranger: bool_field(value, "is_stranger"),
    };

    let user = UserProfile {
        email: str_field(profile, "email").map(String::from),
        real_name,
        deleted: bool_field(value, "deleted"),
        attributes,
        raw: value.clone(),
    };

    Ok(Resource::new(
        ResourceKey::User {
            workspace_id,
            user_id: id,
        },
        display_name,
        ResourceProfile::User(user),
    ))
}

fn workspace_role_grant(assignment: &RoleAssignment, principal: &ResourceKey) -> Option<Grant> {
    let role = WorkspaceRole::from_id(&assignment.role_id)?;
    let role_key = ResourceKey::WorkspaceRole {
        workspace_id: assignment.parent_scope_id.clone(),
        role,
    };
    Some(Grant::new(EntitlementKey::new(role_key, ASSIGNED_SLUG), principal.clone()))
}

fn enterprise_role_grant(assignment: RoleAssignment, principal: &ResourceKey) -> Grant {
    let role_key = ResourceKey::EnterpriseRole {
        enterprise_id: assignment.parent_scope_id,
        role_id: assignment.role_id,
    };
    Grant::new(EntitlementKey::new(role_key, ASSIGNED_SLUG), principal.clone())
}

/// Lists users and emits their role grants.
///
/// Under a workspace parent the handler pages `users.list` for that workspace.
/// Without a parent, an enterprise installation walks every workspace: the
/// bottom frame pages `admin.teams.list` and pushes one frame per workspace,
/// each of which pages that workspace's users before it is popped.
///
/// Role grants come from this handler too, so every user is visited once:
/// workspace roles are derived from the user's flags, enterprise roles are
/// looked up in a cache of `admin.roles.listAssignments`.
pub struct UserSyncer {
    source: Arc<dyn DirectorySource>,
    config: Arc<SlackConfig>,
    role_cache: Option<DirectoryEntryCache<UserRoleAssignments>>,
}

impl UserSyncer {
    pub fn new(source: Arc<dyn DirectorySource>, config: Arc<SlackConfig>) -> Self {
        let role_cache = (config.is_enterprise() && config.sync_enterprise_roles).then(|| {
            DirectoryEntryCache::new(Arc::new(RoleAssignmentSource::new(
                Arc::clone(&source),
                config.page_size,
            )))
        });

        Self {
            source,
            config,
            role_cache,
        }
    }

    /// Cache of enterprise role assignments, when enterprise roles are synced.
    #[must_use]
    pub fn role_cache(&self) -> Option<&DirectoryEntryCache<UserRoleAssignments>> {
        self.role_cache.as_ref()
    }

    /// Pages the users of a workspace or standalone frame.
    async fn page_users(
        &self,
        mut frame: PageFrame,
        mut stack: FrameStack,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let workspace_id = match frame.scope.scope_type {
            ScopeType::Workspace => Some(frame.scope.id.clone()),
            _ => None,
        };

        let mut params = QueryParams::new();
        if let (Some(id), true) = (&workspace_id, self.config.is_enterprise()) {
            params = params.team_id(id.clone());
        }
        let request = PageRequest::new(Method::UsersList)
            .with_params(params)
            .with_cursor(frame.cursor.clone())
            .with_limit(self.config.page_size);
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let mut users = Vec::with_capacity(page.items.len());
        for item in &page.items {
            match user_from_json(item, workspace_id.as_deref()) {
                Ok(user) => {
                    let deleted = user.user_profile().is_some_and(|p| p.deleted);
                    if !(deleted && self.config.skip_deleted_users) {
                        users.push(user);
                    }
                }
                Err(e) => warn!("Failed to parse user: {}", e),
            }
        }

        if let Some(next) = page.next_cursor.filter(|c| !c.is_empty()) {
            frame.cursor = next;
            stack.push(frame);
        }

        info!(
            workspace = workspace_id.as_deref().unwrap_or("standalone"),
            count = users.len(),
            more = !stack.is_empty(),
            "Listed users"
        );

        Ok(SyncPage::new(users, encode(&stack)).with_rate_limit(page.rate_limit))
    }

    /// Pages workspaces and schedules a user walk for each of them.
    async fn page_workspaces(
        &self,
        mut frame: PageFrame,
        mut stack: FrameStack,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let request = PageRequest::new(Method::AdminTeamsList)
            .with_cursor(frame.cursor.clone())
            .with_limit(self.config.page_size);
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        if let Some(next) = page.next_cursor.filter(|c| !c.is_empty()) {
            frame.cursor = next;
            stack.push(frame);
        }

        let workspace_ids: Vec<&str> = page.items.iter().filter_map(|t| str_field(t, "id")).collect();
        // Reverse so the first workspace of the page ends up on top.
        for id in workspace_ids.iter().rev() {
            stack.push(PageFrame::new(Scope::workspace(*id)));
        }

        debug!(workspaces = workspace_ids.len(), "Scheduled workspace user walks");

        Ok(SyncPage::new(Vec::new(), encode(&stack)).with_rate_limit(page.rate_limit))
    }
}

#[async_trait]
impl ResourceSyncer for UserSyncer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::User
    }

    #[instrument(skip(self, parent, ctx))]
    async fn list(
        &self,
        parent: Option<&ResourceKey>,
        token: &str,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        match (workspace_parent(parent)?, &self.config.enterprise_id) {
            (Some(workspace_id), _) => {
                let scope = Scope::workspace(workspace_id);
                let mut stack = decode(token, &scope)?;
                let frame = pop_scoped_frame(&mut stack, &scope)?;
                self.page_users(frame, stack, ctx).await
            }
            (None, Some(enterprise_id)) if self.config.is_enterprise() => {
                let mut stack = decode(token, &Scope::enterprise(enterprise_id.clone()))?;
                let frame = pop_frame(&mut stack, &[ScopeType::Enterprise, ScopeType::Workspace])?;
                if frame.scope.scope_type == ScopeType::Enterprise {
                    self.page_workspaces(frame, stack, ctx).await
                } else {
                    self.page_users(frame, stack, ctx).await
                }
            }
            (None, _) => {
                let mut stack = decode(token, &Scope::standalone())?;
                let frame = pop_frame(&mut stack, &[ScopeType::Standalone])?;
                self.page_users(frame, stack, ctx).await
            }
        }
    }

    /// Users offer no entitlements.
    async fn entitlements(&self, resource: &Resource, _ctx: &SyncContext) -> SyncResult<Entitlement> {
        ensure_resource_type(resource, ResourceType::User)?;
        Ok(SyncPage::empty())
    }

    #[instrument(skip(self, resource, _token, ctx), fields(user = %resource.key))]
    async fn grants(&self, resource: &Resource, _token: &str, ctx: &SyncContext) -> SyncResult<Grant> {
        let (workspace_id, user_id) = match &resource.key {
            ResourceKey::User {
                workspace_id,
                user_id,
            } => (workspace_id, user_id),
            other => {
                return Err(SlackError::InvalidRequest(format!(
                    "expected a user resource, got {other}"
                ))
                .into())
            }
        };
        let profile = resource.user_profile().ok_or_else(|| {
            SlackError::InvalidRequest(format!("user {} carries no user profile", resource.key))
        })?;

        if profile.deleted {
            return Ok(SyncPage::empty());
        }

        let mut grants: Vec<Grant> = derive_assignments(user_id, workspace_id, &profile.attributes)
            .iter()
            .filter_map(|assignment| workspace_role_grant(assignment, &resource.key))
            .collect();

        if let (Some(cache), Some(enterprise_id)) = (&self.role_cache, &self.config.enterprise_id) {
            match cache.get(user_id, ctx).await {
                Ok(Some(held)) => {
                    grants.extend(held.role_ids.into_iter().map(|role_id| {
                        let assignment =
                            RoleAssignment::enterprise(role_id, user_id.clone(), enterprise_id.clone());
                        enterprise_role_grant(assignment, &resource.key)
                    }));
                }
                Ok(None) => {}
                Err(error) => return Err(SyncFailure::from(error).with_partial(grants)),
            }
        }

        debug!(grants = grants.len(), "Derived user grants");
        Ok(SyncPage::last(grants))
    }
}
