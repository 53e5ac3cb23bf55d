//! Typed identifiers for scopes, resources and entitlements.
//!
//! Composite identities (a user inside a workspace, a role inside a workspace)
//! are structs with named fields. They are built and matched field by field and
//! never reassembled from a delimited string.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::roles::WorkspaceRole;

/// Level of the directory hierarchy a page walk runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// An Enterprise Grid organization.
    Enterprise,
    /// A single workspace (team).
    Workspace,
    /// A user group inside a workspace.
    UserGroup,
    /// A standalone workspace with no enterprise above it.
    Standalone,
    /// A fixed, locally known enumeration (no remote cursor).
    Catalog,
}

impl ScopeType {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enterprise => "enterprise",
            Self::Workspace => "workspace",
            Self::UserGroup => "user_group",
            Self::Standalone => "standalone",
            Self::Catalog => "catalog",
        }
    }
}

/// A hierarchical context under which a resource type is enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Level of the hierarchy.
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    /// Upstream id of the scope object (enterprise id, team id, ...).
    pub id: String,
}

impl Scope {
    /// Creates a scope.
    pub fn new(scope_type: ScopeType, id: impl Into<String>) -> Self {
        Self {
            scope_type,
            id: id.into(),
        }
    }

    /// Enterprise organization scope.
    pub fn enterprise(id: impl Into<String>) -> Self {
        Self::new(ScopeType::Enterprise, id)
    }

    /// Workspace scope.
    pub fn workspace(id: impl Into<String>) -> Self {
        Self::new(ScopeType::Workspace, id)
    }

    /// User group scope.
    pub fn user_group(id: impl Into<String>) -> Self {
        Self::new(ScopeType::UserGroup, id)
    }

    /// Standalone workspace scope; the id is empty because the token decides it.
    #[must_use]
    pub fn standalone() -> Self {
        Self::new(ScopeType::Standalone, "")
    }

    /// Local catalog scope nested under `id`.
    pub fn catalog(id: impl Into<String>) -> Self {
        Self::new(ScopeType::Catalog, id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type.as_str(), self.id)
    }
}

/// Resource types emitted by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Workspace (team).
    Workspace,
    /// Workspace member.
    User,
    /// User group.
    UserGroup,
    /// Attribute-derived workspace role.
    WorkspaceRole,
    /// Enterprise system or custom admin role.
    EnterpriseRole,
}

impl ResourceType {
    /// Every resource type, in sync order.
    pub const ALL: [ResourceType; 5] = [
        Self::Workspace,
        Self::User,
        Self::UserGroup,
        Self::WorkspaceRole,
        Self::EnterpriseRole,
    ];

    /// Stable resource type id.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::User => "user",
            Self::UserGroup => "user_group",
            Self::WorkspaceRole => "workspace_role",
            Self::EnterpriseRole => "enterprise_role",
        }
    }

    /// Human readable name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Workspace => "Workspace",
            Self::User => "User",
            Self::UserGroup => "User Group",
            Self::WorkspaceRole => "Workspace Role",
            Self::EnterpriseRole => "Enterprise Role",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one emitted resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKey {
    /// A workspace.
    Workspace { workspace_id: String },
    /// A user, as seen from one workspace.
    User {
        workspace_id: String,
        user_id: String,
    },
    /// A user group of a workspace.
    UserGroup {
        workspace_id: String,
        group_id: String,
    },
    /// A derived role within a workspace.
    WorkspaceRole {
        workspace_id: String,
        role: WorkspaceRole,
    },
    /// An admin role of the enterprise organization.
    EnterpriseRole {
        enterprise_id: String,
        role_id: String,
    },
}

impl ResourceKey {
    /// Resource type tag.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Workspace { .. } => ResourceType::Workspace,
            Self::User { .. } => ResourceType::User,
            Self::UserGroup { .. } => ResourceType::UserGroup,
            Self::WorkspaceRole { .. } => ResourceType::WorkspaceRole,
            Self::EnterpriseRole { .. } => ResourceType::EnterpriseRole,
        }
    }

    /// The innermost id (user id, group id, role id, ...).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Workspace { workspace_id } => workspace_id,
            Self::User { user_id, .. } => user_id,
            Self::UserGroup { group_id, .. } => group_id,
            Self::WorkspaceRole { role, .. } => role.as_str(),
            Self::EnterpriseRole { role_id, .. } => role_id,
        }
    }

    /// Workspace the resource lives in, if any.
    #[must_use]
    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            Self::Workspace { workspace_id }
            | Self::User { workspace_id, .. }
            | Self::UserGroup { workspace_id, .. }
            | Self::WorkspaceRole { workspace_id, .. } => Some(workspace_id),
            Self::EnterpriseRole { .. } => None,
        }
    }

    /// Parent resource reference; workspace-scoped resources hang off their workspace.
    #[must_use]
    pub fn parent(&self) -> Option<ResourceKey> {
        match self {
            Self::User { workspace_id, .. }
            | Self::UserGroup { workspace_id, .. }
            | Self::WorkspaceRole { workspace_id, .. } => Some(Self::Workspace {
                workspace_id: workspace_id.clone(),
            }),
            Self::Workspace { .. } | Self::EnterpriseRole { .. } => None,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workspace { workspace_id } => write!(f, "workspace:{workspace_id}"),
            Self::User {
                workspace_id,
                user_id,
            } => write!(f, "user:{workspace_id}/{user_id}"),
            Self::UserGroup {
                workspace_id,
                group_id,
            } => write!(f, "user_group:{workspace_id}/{group_id}"),
            Self::WorkspaceRole { workspace_id, role } => {
                write!(f, "workspace_role:{workspace_id}/{}", role.as_str())
            }
            Self::EnterpriseRole {
                enterprise_id,
                role_id,
            } => write!(f, "enterprise_role:{enterprise_id}/{role_id}"),
        }
    }
}

/// Identity of an entitlement: a slug on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitlementKey {
    /// Resource the entitlement is attached to.
    pub resource: ResourceKey,
    /// Entitlement slug (`member`, `assigned`).
    pub slug: String,
}

impl EntitlementKey {
    /// Creates an entitlement key.
    pub fn new(resource: ResourceKey, slug: impl Into<String>) -> Self {
        Self {
            resource,
            slug: slug.into(),
        }
    }
}

impl fmt::Display for EntitlementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.slug)
    }
}
