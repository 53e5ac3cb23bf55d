//! Normalized records emitted by the resource syncers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EntitlementKey, ResourceKey, ResourceType};
use crate::roles::PrincipalAttributes;

/// Entitlement slug for membership of a workspace or user group.
pub const MEMBER_SLUG: &str = "member";

/// Entitlement slug for holding a role.
pub const ASSIGNED_SLUG: &str = "assigned";

/// A node of the emitted directory graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub key: ResourceKey,
    pub display_name: String,
    /// Parent resource, when the resource is workspace scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ResourceKey>,
    pub profile: ResourceProfile,
}

impl Resource {
    /// Creates a resource whose parent is derived from its key.
    pub fn new(key: ResourceKey, display_name: impl Into<String>, profile: ResourceProfile) -> Self {
        let parent = key.parent();
        Self {
            key,
            display_name: display_name.into(),
            parent,
            profile,
        }
    }

    /// Resource type tag.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.key.resource_type()
    }

    /// The user profile, for user resources.
    #[must_use]
    pub fn user_profile(&self) -> Option<&UserProfile> {
        match &self.profile {
            ResourceProfile::User(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Type specific payload of a [`Resource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceProfile {
    Workspace(WorkspaceProfile),
    User(UserProfile),
    UserGroup(UserGroupProfile),
    Role(RoleProfile),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_id: Option<String>,
}

/// Profile of a workspace member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Flags the workspace roles are derived from.
    pub attributes: PrincipalAttributes,
    /// Raw upstream record, kept for downstream mapping.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserGroupProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub user_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub description: String,
    /// Well-known system role as opposed to one observed only in assignments.
    #[serde(default)]
    pub system: bool,
}

/// A permission that can be granted on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub key: EntitlementKey,
    pub display_name: String,
    pub description: String,
    /// Resource types that can hold this entitlement.
    pub grantable_to: Vec<ResourceType>,
}

impl Entitlement {
    /// Membership of `resource`, grantable to users.
    #[must_use]
    pub fn membership(resource: &Resource) -> Self {
        Self {
            key: EntitlementKey::new(resource.key.clone(), MEMBER_SLUG),
            display_name: format!("{} Member", resource.display_name),
            description: format!(
                "Member of {} {}",
                resource.resource_type().display_name(),
                resource.display_name
            ),
            grantable_to: vec![ResourceType::User],
        }
    }

    /// Assignment of the role `resource`, grantable to users.
    #[must_use]
    pub fn assignment(resource: &Resource) -> Self {
        Self {
            key: EntitlementKey::new(resource.key.clone(), ASSIGNED_SLUG),
            display_name: format!("{} Role", resource.display_name),
            description: format!("Has the {} role", resource.display_name),
            grantable_to: vec![ResourceType::User],
        }
    }
}

/// An entitlement held by a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub entitlement: EntitlementKey,
    pub principal: ResourceKey,
}

impl Grant {
    /// Creates a grant.
    #[must_use]
    pub fn new(entitlement: EntitlementKey, principal: ResourceKey) -> Self {
        Self {
            entitlement,
            principal,
        }
    }
}
