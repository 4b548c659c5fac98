use std::fmt::{Display, Formatter};

use gatewarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind tag for an actor that can hold role assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    /// A human user sourced from the identity provider.
    User,
    /// A directory group; membership is resolved by the evaluation engine.
    Group,
    /// A non-interactive workload identity.
    ServiceAccount,
}

impl PrincipalType {
    /// Returns a stable storage value for this principal type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::ServiceAccount => "service_account",
        }
    }

    /// Parses a storage value into a principal type.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "service_account" => Ok(Self::ServiceAccount),
            _ => Err(AppError::Validation(format!(
                "unknown principal type '{value}'"
            ))),
        }
    }
}

impl Display for PrincipalType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// Full principal projection as resolved from the identity provider.
///
/// Modeled as a tagged union so every consumption site matches
/// exhaustively on the principal kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// Human user.
    User {
        /// Stable object identifier in this service.
        object_id: Uuid,
        /// Identifier in the external identity provider.
        external_id: Option<String>,
        /// Human-readable name.
        display_name: Option<String>,
    },
    /// Directory group.
    Group {
        /// Stable object identifier in this service.
        object_id: Uuid,
        /// Identifier in the external identity provider.
        external_id: Option<String>,
        /// Human-readable name.
        display_name: Option<String>,
    },
    /// Workload identity.
    ServiceAccount {
        /// Stable object identifier in this service.
        object_id: Uuid,
        /// Identifier in the external identity provider.
        external_id: Option<String>,
        /// Human-readable name.
        display_name: Option<String>,
    },
}

impl Principal {
    /// Returns the stable object identifier.
    #[must_use]
    pub fn object_id(&self) -> Uuid {
        match self {
            Self::User { object_id, .. }
            | Self::Group { object_id, .. }
            | Self::ServiceAccount { object_id, .. } => *object_id,
        }
    }

    /// Returns the kind tag for this principal.
    #[must_use]
    pub fn principal_type(&self) -> PrincipalType {
        match self {
            Self::User { .. } => PrincipalType::User,
            Self::Group { .. } => PrincipalType::Group,
            Self::ServiceAccount { .. } => PrincipalType::ServiceAccount,
        }
    }

    /// Returns the compact reference used for cache keys and assignments.
    #[must_use]
    pub fn to_ref(&self) -> PrincipalRef {
        PrincipalRef {
            principal_id: self.object_id(),
            principal_type: self.principal_type(),
        }
    }
}

/// Compact principal reference: opaque identifier plus kind tag.
///
/// This is the shape the permission resolver composes cache keys from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalRef {
    /// Stable principal identifier.
    pub principal_id: Uuid,
    /// Principal kind tag.
    pub principal_type: PrincipalType,
}

impl PrincipalRef {
    /// Creates a principal reference.
    #[must_use]
    pub fn new(principal_id: Uuid, principal_type: PrincipalType) -> Self {
        Self {
            principal_id,
            principal_type,
        }
    }
}

impl Display for PrincipalRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}",
            self.principal_type.as_str(),
            self.principal_id
        )
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Principal, PrincipalType};

    #[test]
    fn principal_type_round_trips_storage_value() {
        for principal_type in [
            PrincipalType::User,
            PrincipalType::Group,
            PrincipalType::ServiceAccount,
        ] {
            let parsed = PrincipalType::parse(principal_type.as_str());
            assert_eq!(parsed.ok(), Some(principal_type));
        }
    }

    #[test]
    fn unknown_principal_type_is_rejected() {
        assert!(PrincipalType::parse("robot").is_err());
    }

    #[test]
    fn principal_ref_carries_kind_and_id() {
        let object_id = Uuid::new_v4();
        let principal = Principal::ServiceAccount {
            object_id,
            external_id: Some("sa-42".to_owned()),
            display_name: None,
        };

        let reference = principal.to_ref();
        assert_eq!(reference.principal_id, object_id);
        assert_eq!(reference.principal_type, PrincipalType::ServiceAccount);
        assert_eq!(
            reference.to_string(),
            format!("service_account:{object_id}")
        );
    }
}
