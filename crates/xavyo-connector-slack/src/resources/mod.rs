//! One [`ResourceSyncer`](crate::ResourceSyncer) per resource type.

mod enterprise_roles;
mod user_groups;
mod users;
mod workspace_roles;
mod workspaces;

pub use enterprise_roles::{EnterpriseRoleSyncer, RoleAssignmentSource, UserRoleAssignments};
pub use user_groups::UserGroupSyncer;
pub use users::UserSyncer;
pub use workspace_roles::WorkspaceRoleSyncer;
pub use workspaces::WorkspaceSyncer;

use serde_json::Value;

use crate::ids::{ResourceKey, ResourceType, Scope, ScopeType};
use crate::model::Resource;
use crate::token::{FrameStack, PageFrame};
use crate::{SlackError, SlackResult};

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn required_id(value: &Value, what: &str) -> SlackResult<String> {
    str_field(value, "id")
        .map(String::from)
        .ok_or_else(|| SlackError::Decode(format!("Missing {what} id")))
}

/// Top frame of a decoded stack, checked against the scopes the handler walks.
pub(crate) fn current_frame<'a>(
    stack: &'a FrameStack,
    expected: &[ScopeType],
) -> SlackResult<&'a PageFrame> {
    let frame = stack
        .current()
        .ok_or_else(|| SlackError::MalformedToken("token holds no frames".to_string()))?;
    if !expected.contains(&frame.scope.scope_type) {
        return Err(SlackError::MalformedToken(format!(
            "unexpected {} frame",
            frame.scope.scope_type.as_str()
        )));
    }
    Ok(frame)
}

/// Pops the top frame of a decoded stack, checked the same way as [`current_frame`].
pub(crate) fn pop_frame(stack: &mut FrameStack, expected: &[ScopeType]) -> SlackResult<PageFrame> {
    current_frame(stack, expected)?;
    stack
        .pop()
        .ok_or_else(|| SlackError::MalformedToken("token holds no frames".to_string()))
}

/// Top frame of a single-level walk, which must page exactly `scope`.
///
/// A token minted for another workspace or group is rejected rather than
/// paged under the caller's parent.
pub(crate) fn current_scoped_frame<'a>(
    stack: &'a FrameStack,
    scope: &Scope,
) -> SlackResult<&'a PageFrame> {
    let frame = current_frame(stack, &[scope.scope_type])?;
    if frame.scope.id != scope.id {
        return Err(SlackError::MalformedToken(format!(
            "token pages {}, not {scope}",
            frame.scope
        )));
    }
    Ok(frame)
}

/// Pops the top frame, checked the same way as [`current_scoped_frame`].
pub(crate) fn pop_scoped_frame(stack: &mut FrameStack, scope: &Scope) -> SlackResult<PageFrame> {
    current_scoped_frame(stack, scope)?;
    stack
        .pop()
        .ok_or_else(|| SlackError::MalformedToken("token holds no frames".to_string()))
}

pub(crate) fn ensure_resource_type(resource: &Resource, expected: ResourceType) -> SlackResult<()> {
    if resource.resource_type() == expected {
        Ok(())
    } else {
        Err(SlackError::InvalidRequest(format!(
            "expected a {expected} resource, got {}",
            resource.key
        )))
    }
}

/// Workspace id of an optional parent, which must be a workspace when present.
pub(crate) fn workspace_parent(parent: Option<&ResourceKey>) -> SlackResult<Option<&str>> {
    match parent {
        None => Ok(None),
        Some(ResourceKey::Workspace { workspace_id }) => Ok(Some(workspace_id)),
        Some(other) => Err(SlackError::InvalidRequest(format!(
            "parent must be a workspace, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_helpers() {
        let value = json!({"id": "U1", "name": "", "is_admin": true});
        assert_eq!(str_field(&value, "id"), Some("U1"));
        assert_eq!(str_field(&value, "name"), None);
        assert!(bool_field(&value, "is_admin"));
        assert!(!bool_field(&value, "is_owner"));
        assert!(required_id(&json!({}), "user").is_err());
    }

    #[test]
    fn test_current_frame_rejects_foreign_scope() {
        let stack = FrameStack::seeded(Scope::catalog("E1"));
        assert!(current_frame(&stack, &[ScopeType::Catalog]).is_ok());
        assert!(matches!(
            current_frame(&stack, &[ScopeType::Workspace]),
            Err(SlackError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_scoped_frame_rejects_other_scope_id() {
        let mut stack = FrameStack::seeded(Scope::workspace("T7"));
        assert!(current_scoped_frame(&stack, &Scope::workspace("T7")).is_ok());
        assert!(matches!(
            current_scoped_frame(&stack, &Scope::workspace("T1")),
            Err(SlackError::MalformedToken(_))
        ));
        assert!(matches!(
            pop_scoped_frame(&mut stack, &Scope::user_group("T7")),
            Err(SlackError::MalformedToken(_))
        ));
        assert_eq!(stack.len(), 1);

        let frame = pop_scoped_frame(&mut stack, &Scope::workspace("T7")).unwrap();
        assert_eq!(frame.scope, Scope::workspace("T7"));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_workspace_parent() {
        let ws = ResourceKey::Workspace {
            workspace_id: "T1".into(),
        };
        assert_eq!(workspace_parent(Some(&ws)).unwrap(), Some("T1"));
        assert_eq!(workspace_parent(None).unwrap(), None);

        let user = ResourceKey::User {
            workspace_id: "T1".into(),
            user_id: "U1".into(),
        };
        assert!(matches!(
            workspace_parent(Some(&user)),
            Err(SlackError::InvalidRequest(_))
        ));
    }
}
