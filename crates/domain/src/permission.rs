use std::fmt::{Display, Formatter};
use std::str::FromStr;

use gatewarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A permission token in `resource:action` form, e.g. `prompts:read`.
///
/// Permissions are immutable value objects; equality is case-sensitive
/// exact match on the full token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    token: String,
}

impl Permission {
    /// Parses a permission token, requiring one `resource:action` pair.
    pub fn parse(value: &str) -> AppResult<Self> {
        let Some((resource, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission '{value}' must use the 'resource:action' form"
            )));
        };

        if resource.trim().is_empty() || action.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "permission '{value}' must have a non-empty resource and action"
            )));
        }

        if action.contains(':') {
            return Err(AppError::Validation(format!(
                "permission '{value}' must contain exactly one ':' separator"
            )));
        }

        Ok(Self {
            token: value.to_owned(),
        })
    }

    /// Returns the full permission token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.token.as_str()
    }

    /// Returns the resource part of the token.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.token
            .split_once(':')
            .map_or(self.token.as_str(), |(resource, _)| resource)
    }

    /// Returns the action part of the token.
    #[must_use]
    pub fn action(&self) -> &str {
        self.token
            .split_once(':')
            .map_or(self.token.as_str(), |(_, action)| action)
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Permission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.token
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::Permission;

    #[test]
    fn parse_accepts_resource_action_pair() {
        let permission = Permission::parse("prompts:read");
        assert!(permission.is_ok());
        if let Ok(permission) = permission {
            assert_eq!(permission.resource(), "prompts");
            assert_eq!(permission.action(), "read");
        }
    }

    #[test]
    fn parse_rejects_malformed_tokens() {
        assert!(Permission::parse("prompts").is_err());
        assert!(Permission::parse(":read").is_err());
        assert!(Permission::parse("prompts:").is_err());
        assert!(Permission::parse("prompts:read:extra").is_err());
    }

    #[test]
    fn equality_is_case_sensitive() {
        let lower = Permission::parse("prompts:read");
        let upper = Permission::parse("Prompts:read");
        assert_ne!(lower.ok(), upper.ok());
    }
}
