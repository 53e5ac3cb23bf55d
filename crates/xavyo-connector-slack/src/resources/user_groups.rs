//! User groups and their memberships.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{ensure_resource_type, pop_scoped_frame, required_id, str_field, workspace_parent};
use crate::client::{DirectorySource, Method, PageRequest, QueryParams};
use crate::config::SlackConfig;
use crate::context::SyncContext;
use crate::ids::{EntitlementKey, ResourceKey, ResourceType, Scope};
use crate::model::{Entitlement, Grant, Resource, ResourceProfile, UserGroupProfile, MEMBER_SLUG};
use crate::syncer::{ResourceSyncer, SyncPage, SyncResult};
use crate::token::{decode, encode};
use crate::{SlackError, SlackResult};

/// Maps a user group object to a resource.
pub(crate) fn user_group_from_json(value: &Value, workspace_id: Option<&str>) -> SlackResult<Resource> {
    let id = required_id(value, "user group")?;
    let workspace_id = workspace_id
        .or_else(|| str_field(value, "team_id"))
        .ok_or_else(|| SlackError::Decode(format!("User group {id} has no team_id")))?
        .to_string();
    let name = str_field(value, "name").unwrap_or(id.as_str()).to_string();

    let profile = UserGroupProfile {
        handle: str_field(value, "handle").map(String::from),
        description: str_field(value, "description").map(String::from),
        user_count: value.get("user_count").and_then(Value::as_u64).unwrap_or(0),
    };

    Ok(Resource::new(
        ResourceKey::UserGroup {
            workspace_id,
            group_id: id,
        },
        name,
        ResourceProfile::UserGroup(profile),
    ))
}

fn is_disabled(value: &Value) -> bool {
    value
        .get("date_delete")
        .and_then(Value::as_i64)
        .is_some_and(|ts| ts > 0)
}

/// Lists user groups.
///
/// `usergroups.list` and `usergroups.users.list` return everything in one
/// response, so both listings are local enumerations: one page, then done.
pub struct UserGroupSyncer {
    source: Arc<dyn DirectorySource>,
    config: Arc<SlackConfig>,
}

impl UserGroupSyncer {
    pub fn new(source: Arc<dyn DirectorySource>, config: Arc<SlackConfig>) -> Self {
        Self { source, config }
    }

    fn team_params(&self, workspace_id: Option<&str>) -> QueryParams {
        match workspace_id {
            Some(id) if self.config.is_enterprise() => QueryParams::new().team_id(id),
            _ => QueryParams::new(),
        }
    }
}

#[async_trait]
impl ResourceSyncer for UserGroupSyncer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::UserGroup
    }

    #[instrument(skip(self, parent, ctx))]
    async fn list(
        &self,
        parent: Option<&ResourceKey>,
        token: &str,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let workspace_id = workspace_parent(parent)?;
        let scope = match workspace_id {
            Some(id) => Scope::workspace(id),
            None => Scope::standalone(),
        };
        let mut stack = decode(token, &scope)?;
        pop_scoped_frame(&mut stack, &scope)?;

        let request = PageRequest::new(Method::UsergroupsList)
            .with_params(self.team_params(workspace_id).with("include_count", "true"));
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let groups: Vec<Resource> = page
            .items
            .iter()
            .filter(|item| !is_disabled(item))
            .filter_map(|item| match user_group_from_json(item, workspace_id) {
                Ok(group) => Some(group),
                Err(e) => {
                    warn!("Failed to parse user group: {}", e);
                    None
                }
            })
            .collect();

        info!(count = groups.len(), "Listed user groups");
        Ok(SyncPage::new(groups, encode(&stack)).with_rate_limit(page.rate_limit))
    }

    async fn entitlements(&self, resource: &Resource, _ctx: &SyncContext) -> SyncResult<Entitlement> {
        ensure_resource_type(resource, ResourceType::UserGroup)?;
        Ok(SyncPage::last(vec![Entitlement::membership(resource)]))
    }

    #[instrument(skip(self, resource, ctx), fields(group = %resource.key))]
    async fn grants(&self, resource: &Resource, token: &str, ctx: &SyncContext) -> SyncResult<Grant> {
        let (workspace_id, group_id) = match &resource.key {
            ResourceKey::UserGroup {
                workspace_id,
                group_id,
            } => (workspace_id, group_id),
            other => {
                return Err(SlackError::InvalidRequest(format!(
                    "expected a user group resource, got {other}"
                ))
                .into())
            }
        };

        let scope = Scope::user_group(group_id.clone());
        let mut stack = decode(token, &scope)?;
        pop_scoped_frame(&mut stack, &scope)?;

        let request = PageRequest::new(Method::UsergroupsUsersList).with_params(
            self.team_params(Some(workspace_id))
                .with("usergroup", group_id.clone()),
        );
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let entitlement = EntitlementKey::new(resource.key.clone(), MEMBER_SLUG);
        let grants: Vec<Grant> = page
            .items
            .iter()
            .filter_map(Value::as_str)
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

        info!(count = grants.len(), "Listed user group members");
        Ok(SyncPage::new(grants, encode(&stack)).with_rate_limit(page.rate_limit))
    }
}
