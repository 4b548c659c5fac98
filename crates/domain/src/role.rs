use std::collections::BTreeSet;

use gatewarden_core::{AppError, AppResult, Scope};
use serde::{Deserialize, Serialize};

use crate::Permission;

/// Wildcard matching one scope segment inside a [`ScopePattern`].
const SEGMENT_WILDCARD: &str = "*";
/// Trailing wildcard matching any descendant subtree.
const SUBTREE_WILDCARD: &str = "**";

/// A pattern restricting the scopes a role may be assigned at.
///
/// Patterns are scope paths where `*` matches exactly one segment and a
/// trailing `**` matches the remaining subtree, e.g.
/// `organizations/*/tenants/**`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopePattern {
    pattern: String,
}

impl ScopePattern {
    /// Parses a scope pattern.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "scope pattern must not be empty".to_owned(),
            ));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        for (index, segment) in segments.iter().enumerate() {
            if segment.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "scope pattern '{value}' contains an empty segment"
                )));
            }
            if *segment == SUBTREE_WILDCARD && index != segments.len() - 1 {
                return Err(AppError::Validation(format!(
                    "scope pattern '{value}' may only use '**' as the final segment"
                )));
            }
        }

        Ok(Self {
            pattern: trimmed.to_owned(),
        })
    }

    /// Returns the pattern source string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns whether the scope satisfies this pattern.
    #[must_use]
    pub fn matches(&self, scope: &Scope) -> bool {
        let pattern_segments: Vec<&str> = self.pattern.split('/').collect();
        let scope_segments = scope.segments();

        let subtree = pattern_segments.last() == Some(&SUBTREE_WILDCARD);
        let fixed_len = if subtree {
            pattern_segments.len() - 1
        } else {
            pattern_segments.len()
        };

        if subtree {
            if scope_segments.len() < fixed_len {
                return false;
            }
        } else if scope_segments.len() != fixed_len {
            return false;
        }

        pattern_segments[..fixed_len]
            .iter()
            .zip(scope_segments.iter())
            .all(|(pattern_segment, scope_segment)| {
                *pattern_segment == SEGMENT_WILDCARD || pattern_segment == scope_segment
            })
    }
}

impl TryFrom<String> for ScopePattern {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<ScopePattern> for String {
    fn from(value: ScopePattern) -> Self {
        value.pattern
    }
}

/// Input for creating a role definition.
#[derive(Debug, Clone)]
pub struct NewRoleDefinition {
    /// Stable role identifier, e.g. `owner`.
    pub role_id: String,
    /// Human-readable role name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the role is seeded at store initialization.
    pub is_built_in: bool,
    /// Permissions granted by the role.
    pub permissions: BTreeSet<Permission>,
    /// Ordered scope patterns the role may be assigned at; empty means
    /// assignable anywhere.
    pub assignable_scopes: Vec<ScopePattern>,
}

/// A named bundle of permissions assignable to a principal at a scope.
///
/// Built-in roles are seeded at store initialization and immutable
/// thereafter; custom roles are tenant-mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    role_id: String,
    name: String,
    description: Option<String>,
    is_built_in: bool,
    permissions: BTreeSet<Permission>,
    assignable_scopes: Vec<ScopePattern>,
}

impl RoleDefinition {
    /// Creates a validated role definition.
    pub fn new(input: NewRoleDefinition) -> AppResult<Self> {
        if input.role_id.trim().is_empty() {
            return Err(AppError::Validation(
                "role_id must not be empty".to_owned(),
            ));
        }
        if input.name.trim().is_empty() {
            return Err(AppError::Validation(
                "role name must not be empty".to_owned(),
            ));
        }
        if input.permissions.is_empty() {
            return Err(AppError::Validation(format!(
                "role '{}' must grant at least one permission",
                input.role_id
            )));
        }

        Ok(Self {
            role_id: input.role_id,
            name: input.name,
            description: input.description,
            is_built_in: input.is_built_in,
            permissions: input.permissions,
            assignable_scopes: input.assignable_scopes,
        })
    }

    /// Returns the stable role identifier.
    #[must_use]
    pub fn role_id(&self) -> &str {
        self.role_id.as_str()
    }

    /// Returns the human-readable role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the role is a seeded built-in.
    #[must_use]
    pub fn is_built_in(&self) -> bool {
        self.is_built_in
    }

    /// Returns the permissions granted by the role.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns the assignable scope patterns.
    #[must_use]
    pub fn assignable_scopes(&self) -> &[ScopePattern] {
        self.assignable_scopes.as_slice()
    }

    /// Returns whether the role grants the permission.
    #[must_use]
    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Returns whether the role may be assigned at the scope.
    ///
    /// An empty pattern list means the role is assignable anywhere.
    #[must_use]
    pub fn is_assignable_at(&self, scope: &Scope) -> bool {
        self.assignable_scopes.is_empty()
            || self
                .assignable_scopes
                .iter()
                .any(|pattern| pattern.matches(scope))
    }
}

fn permission_set(tokens: &[&str]) -> AppResult<BTreeSet<Permission>> {
    tokens.iter().copied().map(Permission::parse).collect()
}

fn builtin(role_id: &str, name: &str, tokens: &[&str]) -> AppResult<RoleDefinition> {
    RoleDefinition::new(NewRoleDefinition {
        role_id: role_id.to_owned(),
        name: name.to_owned(),
        description: None,
        is_built_in: true,
        permissions: permission_set(tokens)?,
        assignable_scopes: Vec::new(),
    })
}

/// Returns the built-in roles seeded into every tenant store.
pub fn builtin_roles() -> AppResult<Vec<RoleDefinition>> {
    Ok(vec![
        builtin(
            "owner",
            "Owner",
            &[
                "prompts:read",
                "prompts:write",
                "prompts:delete",
                "assignments:read",
                "assignments:write",
                "roles:read",
                "roles:write",
            ],
        )?,
        builtin(
            "editor",
            "Editor",
            &["prompts:read", "prompts:write", "assignments:read"],
        )?,
        builtin("viewer", "Viewer", &["prompts:read"])?,
    ])
}
