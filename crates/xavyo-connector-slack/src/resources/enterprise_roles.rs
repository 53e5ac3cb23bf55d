//! Enterprise admin roles and the role-assignment stream behind them.
//!
//! `admin.roles.listAssignments` lists (role, user) pairs for the whole
//! organization. The role listing walks it to discover which roles exist; the
//! user grant step reads the same stream once, through a
//! [`DirectoryEntryCache`](crate::DirectoryEntryCache), to answer "which
//! enterprise roles does this user hold".

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{ensure_resource_type, pop_frame, str_field};
use crate::cache::{CacheRecord, EnrichmentPage, EnrichmentSource};
use crate::client::{DirectorySource, Method, PageRequest};
use crate::context::SyncContext;
use crate::ids::{ResourceKey, ResourceType, Scope, ScopeType};
use crate::model::{Entitlement, Grant, Resource, ResourceProfile, RoleProfile};
use crate::roles::RoleCatalog;
use crate::syncer::{ResourceSyncer, SyncPage, SyncResult};
use crate::token::{decode, encode, PageFrame};
use crate::SlackResult;

/// Enterprise roles held by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoleAssignments {
    pub user_id: String,
    pub role_ids: BTreeSet<String>,
}

impl CacheRecord for UserRoleAssignments {
    fn principal_id(&self) -> &str {
        &self.user_id
    }

    fn absorb(&mut self, other: Self) {
        self.role_ids.extend(other.role_ids);
    }
}

fn assignment_from_json(value: &Value) -> Option<UserRoleAssignments> {
    let role_id = str_field(value, "role_id")?;
    let user_id = str_field(value, "user_id")?;
    Some(UserRoleAssignments {
        user_id: user_id.to_string(),
        role_ids: BTreeSet::from([role_id.to_string()]),
    })
}

/// Pages `admin.roles.listAssignments` for the directory cache.
pub struct RoleAssignmentSource {
    source: Arc<dyn DirectorySource>,
    page_size: u32,
}

impl RoleAssignmentSource {
    pub fn new(source: Arc<dyn DirectorySource>, page_size: u32) -> Self {
        Self {
            source,
            page_size,
        }
    }
}

#[async_trait]
impl EnrichmentSource<UserRoleAssignments> for RoleAssignmentSource {
    async fn fetch_page(
        &self,
        cursor: &str,
        _ctx: &SyncContext,
    ) -> SlackResult<EnrichmentPage<UserRoleAssignments>> {
        let request = PageRequest::new(Method::AdminRolesListAssignments)
            .with_cursor(cursor)
            .with_limit(self.page_size);
        let page = self.source.fetch_page(&request).await?;

        let records = page
            .items
            .iter()
            .filter_map(|item| {
                let record = assignment_from_json(item);
                if record.is_none() {
                    warn!("Skipping role assignment without role_id or user_id");
                }
                record
            })
            .collect();

        Ok(EnrichmentPage {
            records,
            next_cursor: page.next_cursor,
        })
    }
}

/// Lists the organization's admin roles.
///
/// Roles seen in assignments come first, deduplicated through the frame's
/// found set. Once the assignment stream is exhausted, well-known system roles
/// nobody holds are appended from the catalog so they can still be governed.
pub struct EnterpriseRoleSyncer {
    source: Arc<dyn DirectorySource>,
    catalog: Arc<RoleCatalog>,
    enterprise_id: String,
    page_size: u32,
}

impl EnterpriseRoleSyncer {
    pub fn new(
        source: Arc<dyn DirectorySource>,
        catalog: Arc<RoleCatalog>,
        enterprise_id: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            source,
            catalog,
            enterprise_id: enterprise_id.into(),
            page_size,
        }
    }

    fn role_resource(&self, role_id: &str) -> Resource {
        let (display_name, description, system) = match self.catalog.enterprise_role(role_id) {
            Some(info) => (info.display_name.clone(), info.description.clone(), true),
            None => (role_id.to_string(), String::new(), false),
        };

        Resource::new(
            ResourceKey::EnterpriseRole {
                enterprise_id: self.enterprise_id.clone(),
                role_id: role_id.to_string(),
            },
            display_name,
            ResourceProfile::Role(RoleProfile {
                description,
                system,
            }),
        )
    }
}

#[async_trait]
impl ResourceSyncer for EnterpriseRoleSyncer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::EnterpriseRole
    }

    #[instrument(skip(self, _parent, ctx), fields(enterprise = %self.enterprise_id))]
    async fn list(
        &self,
        _parent: Option<&ResourceKey>,
        token: &str,
        ctx: &SyncContext,
    ) -> SyncResult<Resource> {
        let mut stack = decode(token, &Scope::enterprise(self.enterprise_id.clone()))?;
        let mut frame = pop_frame(&mut stack, &[ScopeType::Enterprise, ScopeType::Catalog])?;

        if frame.scope.scope_type == ScopeType::Catalog {
            let roles: Vec<Resource> = self
                .catalog
                .enterprise_roles()
                .filter(|(id, _)| !frame.found.contains(*id))
                .map(|(id, _)| self.role_resource(id))
                .collect();
            info!(count = roles.len(), "Listed unassigned system roles");
            return Ok(SyncPage::new(roles, encode(&stack)));
        }

        let request = PageRequest::new(Method::AdminRolesListAssignments)
            .with_cursor(frame.cursor.clone())
            .with_limit(self.page_size);
        let page = ctx.run(self.source.fetch_page(&request)).await?;

        let mut roles = Vec::new();
        for item in &page.items {
            match str_field(item, "role_id") {
                Some(role_id) => {
                    if frame.mark_found(role_id) {
                        roles.push(self.role_resource(role_id));
                    }
                }
                None => warn!("Skipping role assignment without role_id"),
            }
        }

        match page.next_cursor.filter(|c| !c.is_empty()) {
            Some(next) => {
                frame.cursor = next;
                stack.push(frame);
            }
            None => {
                let unassigned = self
                    .catalog
                    .enterprise_roles()
                    .any(|(id, _)| !frame.found.contains(id));
                if unassigned {
                    stack.push(
                        PageFrame::new(Scope::catalog(self.enterprise_id.clone()))
                            .with_found(frame.found),
                    );
                }
            }
        }

        debug!(
            assignments = page.items.len(),
            new_roles = roles.len(),
            "Enterprise role assignment page"
        );

        Ok(SyncPage::new(roles, encode(&stack)).with_rate_limit(page.rate_limit))
    }

    async fn entitlements(&self, resource: &Resource, _ctx: &SyncContext) -> SyncResult<Entitlement> {
        ensure_resource_type(resource, ResourceType::EnterpriseRole)?;
        Ok(SyncPage::last(vec![Entitlement::assignment(resource)]))
    }

    /// Always empty: enterprise role grants are emitted from the user side.
    async fn grants(&self, resource: &Resource, _token: &str, _ctx: &SyncContext) -> SyncResult<Grant> {
        ensure_resource_type(resource, ResourceType::EnterpriseRole)?;
        Ok(SyncPage::empty())
    }
}
