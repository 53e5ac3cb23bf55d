//! Workspace role derivation and role lookup tables.
//!
//! Workspace roles are not fetched: Slack exposes them as flags on the user
//! object (`is_admin`, `is_restricted`, ...). [`derive_roles`] turns those
//! flags into the set of roles a governance pipeline should see granted.
//! Enterprise admin roles do need a remote fetch and are handled by the
//! enterprise role resource and the user grant step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

/// Roles a workspace member can hold.
///
/// Declaration order is precedence order and drives the ordering of derived sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    PrimaryOwner,
    Owner,
    Admin,
    MultiChannelGuest,
    SingleChannelGuest,
    InvitedMember,
    Bot,
    Member,
}

impl WorkspaceRole {
    /// Every workspace role, in precedence order.
    pub const ALL: [WorkspaceRole; 8] = [
        Self::PrimaryOwner,
        Self::Owner,
        Self::Admin,
        Self::MultiChannelGuest,
        Self::SingleChannelGuest,
        Self::InvitedMember,
        Self::Bot,
        Self::Member,
    ];

    /// Stable role id.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryOwner => "primary_owner",
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::MultiChannelGuest => "multi_channel_guest",
            Self::SingleChannelGuest => "single_channel_guest",
            Self::InvitedMember => "invited_member",
            Self::Bot => "bot",
            Self::Member => "member",
        }
    }

    /// Parses a stable role id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == id)
    }
}

/// Attribute bundle role derivation works from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalAttributes {
    pub is_primary_owner: bool,
    pub is_owner: bool,
    pub is_admin: bool,
    pub is_restricted: bool,
    pub is_ultra_restricted: bool,
    pub is_invited: bool,
    pub is_bot: bool,
    /// External shadow principal (seen through a shared channel).
    pub is_stranger: bool,
}

/// Derives the workspace roles implied by a principal's attributes.
///
/// Owner, admin, invited and bot roles are additive. The guest tiers are
/// exclusive: an ultra-restricted user is only a single-channel guest. When
/// nothing else applies the principal is a plain member, unless it is a
/// stranger, which derives no role at all.
#[must_use]
pub fn derive_roles(attributes: &PrincipalAttributes) -> BTreeSet<WorkspaceRole> {
    let mut roles = BTreeSet::new();

    if attributes.is_primary_owner {
        roles.insert(WorkspaceRole::PrimaryOwner);
    }
    if attributes.is_owner {
        roles.insert(WorkspaceRole::Owner);
    }
    if attributes.is_admin {
        roles.insert(WorkspaceRole::Admin);
    }
    if attributes.is_restricted {
        if attributes.is_ultra_restricted {
            roles.insert(WorkspaceRole::SingleChannelGuest);
        } else {
            roles.insert(WorkspaceRole::MultiChannelGuest);
        }
    }
    if attributes.is_invited {
        roles.insert(WorkspaceRole::InvitedMember);
    }
    if attributes.is_bot {
        roles.insert(WorkspaceRole::Bot);
    }
    if roles.is_empty() && !attributes.is_stranger {
        roles.insert(WorkspaceRole::Member);
    }

    roles
}

/// A role held by a principal within a parent scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: String,
    pub principal_id: String,
    /// Workspace id for workspace roles, enterprise id for enterprise roles.
    pub parent_scope_id: String,
}

impl RoleAssignment {
    /// An enterprise admin role held by a principal.
    pub fn enterprise(
        role_id: impl Into<String>,
        principal_id: impl Into<String>,
        enterprise_id: impl Into<String>,
    ) -> Self {
        Self {
            role_id: role_id.into(),
            principal_id: principal_id.into(),
            parent_scope_id: enterprise_id.into(),
        }
    }
}

/// Computes the workspace role assignments of one principal.
#[must_use]
pub fn derive_assignments(
    principal_id: &str,
    workspace_id: &str,
    attributes: &PrincipalAttributes,
) -> Vec<RoleAssignment> {
    derive_roles(attributes)
        .into_iter()
        .map(|role| RoleAssignment {
            role_id: role.as_str().to_string(),
            principal_id: principal_id.to_string(),
            parent_scope_id: workspace_id.to_string(),
        })
        .collect()
}

/// Display data for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub display_name: String,
    pub description: String,
}

impl RoleInfo {
    fn new(display_name: &str, description: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Immutable role lookup tables.
///
/// Built once and shared by reference between handlers; nothing mutates it after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    workspace_roles: BTreeMap<WorkspaceRole, RoleInfo>,
    enterprise_roles: BTreeMap<String, RoleInfo>,
}

static STANDARD_CATALOG: LazyLock<Arc<RoleCatalog>> =
    LazyLock::new(|| Arc::new(RoleCatalog::build_standard()));

impl RoleCatalog {
    /// Creates a catalog from explicit tables.
    #[must_use]
    pub fn new(
        workspace_roles: BTreeMap<WorkspaceRole, RoleInfo>,
        enterprise_roles: BTreeMap<String, RoleInfo>,
    ) -> Self {
        Self {
            workspace_roles,
            enterprise_roles,
        }
    }

    /// The shared standard catalog.
    #[must_use]
    pub fn standard() -> Arc<RoleCatalog> {
        Arc::clone(&STANDARD_CATALOG)
    }

    /// Standard workspace roles with a caller-supplied enterprise role table.
    #[must_use]
    pub fn with_enterprise_roles(enterprise_roles: BTreeMap<String, RoleInfo>) -> Self {
        Self {
            enterprise_roles,
            ..Self::build_standard()
        }
    }

    fn build_standard() -> Self {
        let workspace_roles = BTreeMap::from([
            (
                WorkspaceRole::PrimaryOwner,
                RoleInfo::new("Primary Owner", "Primary owner of the workspace"),
            ),
            (
                WorkspaceRole::Owner,
                RoleInfo::new("Owner", "Workspace owner"),
            ),
            (
                WorkspaceRole::Admin,
                RoleInfo::new("Admin", "Workspace administrator"),
            ),
            (
                WorkspaceRole::MultiChannelGuest,
                RoleInfo::new("Multi-Channel Guest", "Guest with access to selected channels"),
            ),
            (
                WorkspaceRole::SingleChannelGuest,
                RoleInfo::new("Single-Channel Guest", "Guest restricted to a single channel"),
            ),
            (
                WorkspaceRole::InvitedMember,
                RoleInfo::new("Invited Member", "Invited user who has not joined yet"),
            ),
            (WorkspaceRole::Bot, RoleInfo::new("Bot", "Bot user")),
            (
                WorkspaceRole::Member,
                RoleInfo::new("Member", "Full member of the workspace"),
            ),
        ]);

        let enterprise_roles = [
            ("Rl0A", "Users Admin", "Manages users across the organization"),
            ("Rl0B", "Channels Admin", "Manages channels across the organization"),
            ("Rl0C", "Roles Admin", "Assigns admin roles"),
            ("Rl0D", "Analytics Admin", "Views organization analytics"),
            ("Rl0E", "Security Admin", "Manages security settings"),
            ("Rl0F", "Compliance Admin", "Manages exports and retention"),
        ]
        .into_iter()
        .map(|(id, name, description)| (id.to_string(), RoleInfo::new(name, description)))
        .collect();

        Self {
            workspace_roles,
            enterprise_roles,
        }
    }

    /// Display data of a workspace role.
    #[must_use]
    pub fn workspace_role(&self, role: WorkspaceRole) -> Option<&RoleInfo> {
        self.workspace_roles.get(&role)
    }

    /// Workspace roles known to the catalog, in precedence order.
    pub fn workspace_roles(&self) -> impl Iterator<Item = (WorkspaceRole, &RoleInfo)> {
        self.workspace_roles.iter().map(|(role, info)| (*role, info))
    }

    /// Display data of an enterprise role.
    #[must_use]
    pub fn enterprise_role(&self, role_id: &str) -> Option<&RoleInfo> {
        self.enterprise_roles.get(role_id)
    }

    /// Well-known enterprise system roles, ordered by id.
    pub fn enterprise_roles(&self) -> impl Iterator<Item = (&str, &RoleInfo)> {
        self.enterprise_roles
            .iter()
            .map(|(id, info)| (id.as_str(), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(roles: &[WorkspaceRole]) -> BTreeSet<WorkspaceRole> {
        roles.iter().copied().collect()
    }

    #[test]
    fn test_no_flags_is_member() {
        let roles = derive_roles(&PrincipalAttributes::default());
        assert_eq!(roles, set(&[WorkspaceRole::Member]));
    }

    #[test]
    fn test_stranger_without_flags_has_no_roles() {
        let attrs = PrincipalAttributes {
            is_stranger: true,
            ..Default::default()
        };
        assert!(derive_roles(&attrs).is_empty());
    }

    #[test]
    fn test_ultra_restricted_is_single_channel_guest_only() {
        let attrs = PrincipalAttributes {
            is_restricted: true,
            is_ultra_restricted: true,
            ..Default::default()
        };
        assert_eq!(
            derive_roles(&attrs),
            set(&[WorkspaceRole::SingleChannelGuest])
        );
    }

    #[test]
    fn test_guest_tiers_never_both() {
        for ultra in [false, true] {
            for invited in [false, true] {
                let attrs = PrincipalAttributes {
                    is_restricted: true,
                    is_ultra_restricted: ultra,
                    is_invited: invited,
                    ..Default::default()
                };
                let roles = derive_roles(&attrs);
                let guests = roles
                    .iter()
                    .filter(|r| {
                        matches!(
                            r,
                            WorkspaceRole::SingleChannelGuest | WorkspaceRole::MultiChannelGuest
                        )
                    })
                    .count();
                assert_eq!(guests, 1);
                assert_eq!(roles.contains(&WorkspaceRole::InvitedMember), invited);
            }
        }
    }

    #[test]
    fn test_restricted_guest_with_additive_flags() {
        let attrs = PrincipalAttributes {
            is_restricted: true,
            is_ultra_restricted: true,
            is_invited: true,
            ..Default::default()
        };
        assert_eq!(
            derive_roles(&attrs),
            set(&[
                WorkspaceRole::SingleChannelGuest,
                WorkspaceRole::InvitedMember
            ])
        );
    }

    #[test]
    fn test_multi_channel_guest() {
        let attrs = PrincipalAttributes {
            is_restricted: true,
            ..Default::default()
        };
        assert_eq!(derive_roles(&attrs), set(&[WorkspaceRole::MultiChannelGuest]));
    }

    #[test]
    fn test_owner_roles_are_additive() {
        let attrs = PrincipalAttributes {
            is_primary_owner: true,
            is_owner: true,
            is_admin: true,
            ..Default::default()
        };
        let roles: Vec<_> = derive_roles(&attrs).into_iter().collect();
        assert_eq!(
            roles,
            vec![
                WorkspaceRole::PrimaryOwner,
                WorkspaceRole::Owner,
                WorkspaceRole::Admin
            ]
        );
    }

    #[test]
    fn test_bot_is_not_member() {
        let attrs = PrincipalAttributes {
            is_bot: true,
            ..Default::default()
        };
        assert_eq!(derive_roles(&attrs), set(&[WorkspaceRole::Bot]));
    }

    #[test]
    fn test_ultra_restricted_without_restricted_is_member() {
        let attrs = PrincipalAttributes {
            is_ultra_restricted: true,
            ..Default::default()
        };
        assert_eq!(derive_roles(&attrs), set(&[WorkspaceRole::Member]));
    }

    #[test]
    fn test_derive_assignments_carry_scope() {
        let attrs = PrincipalAttributes {
            is_admin: true,
            ..Default::default()
        };
        let assignments = derive_assignments("U1", "T1", &attrs);
        assert_eq!(
            assignments,
            vec![RoleAssignment {
                role_id: "admin".to_string(),
                principal_id: "U1".to_string(),
                parent_scope_id: "T1".to_string(),
            }]
        );
    }

    #[test]
    fn test_role_ids_parse_back() {
        for role in WorkspaceRole::ALL {
            assert_eq!(WorkspaceRole::from_id(role.as_str()), Some(role));
        }
        assert_eq!(WorkspaceRole::from_id("Rl0A"), None);
    }

    #[test]
    fn test_enterprise_assignment_scoped_to_enterprise() {
        let assignment = RoleAssignment::enterprise("Rl0A", "U1", "E1");
        assert_eq!(assignment.role_id, "Rl0A");
        assert_eq!(assignment.principal_id, "U1");
        assert_eq!(assignment.parent_scope_id, "E1");
    }

    #[test]
    fn test_standard_catalog_covers_every_workspace_role() {
        let catalog = RoleCatalog::standard();
        for role in WorkspaceRole::ALL {
            assert!(catalog.workspace_role(role).is_some(), "{role:?}");
        }
        assert_eq!(catalog.workspace_roles().count(), WorkspaceRole::ALL.len());
        assert!(Arc::ptr_eq(&catalog, &RoleCatalog::standard()));
    }

    #[test]
    fn test_custom_enterprise_roles() {
        let catalog = RoleCatalog::with_enterprise_roles(BTreeMap::new());
        assert_eq!(catalog.enterprise_roles().count(), 0);
        assert!(catalog.workspace_role(WorkspaceRole::Admin).is_some());
    }
}
