use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// Separator between scope path segments.
pub const SCOPE_SEPARATOR: char = '/';

/// A normalized hierarchical scope path such as
/// `organizations/org-123/tenants/tenant-456`.
///
/// A scope `A` is an ancestor of scope `B` iff `B`'s path starts with `A`'s
/// path followed by the separator. Scopes are immutable values compared
/// structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
    path: String,
}

impl Scope {
    /// Parses and normalizes a scope path.
    ///
    /// Trailing separators are stripped; empty input, empty segments, and
    /// `.`/`..` segments are rejected with [`AppError::InvalidScope`].
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim_end_matches(SCOPE_SEPARATOR);
        if trimmed.is_empty() {
            return Err(AppError::InvalidScope(
                "scope path must not be empty".to_owned(),
            ));
        }

        for segment in trimmed.split(SCOPE_SEPARATOR) {
            if segment.trim().is_empty() {
                return Err(AppError::InvalidScope(format!(
                    "scope path '{value}' contains an empty segment"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(AppError::InvalidScope(format!(
                    "scope path '{value}' contains a relative segment '{segment}'"
                )));
            }
        }

        Ok(Self {
            path: trimmed.to_owned(),
        })
    }

    /// Returns the canonical path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the ordered path segments.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        self.path.split(SCOPE_SEPARATOR).collect()
    }

    /// Returns the number of path segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.split(SCOPE_SEPARATOR).count()
    }

    /// Returns the parent scope, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.path
            .rfind(SCOPE_SEPARATOR)
            .map(|separator_index| Self {
                path: self.path[..separator_index].to_owned(),
            })
    }

    /// Returns whether this scope is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.path.len() > self.path.len()
            && other.path.starts_with(self.path.as_str())
            && other.path[self.path.len()..].starts_with(SCOPE_SEPARATOR)
    }

    /// Returns this scope followed by each ancestor up to the root.
    ///
    /// The most specific scope comes first; the permission resolver walks
    /// this order so that the grant nearest the requested scope wins.
    #[must_use]
    pub fn self_and_ancestors(&self) -> Vec<Self> {
        let mut chain = vec![self.clone()];
        let mut cursor = self.clone();
        while let Some(parent) = cursor.parent() {
            chain.push(parent.clone());
            cursor = parent;
        }

        chain
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Scope {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.path
    }
}

impl Display for Scope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::Scope;

    fn scope(value: &str) -> Scope {
        match Scope::parse(value) {
            Ok(parsed) => parsed,
            Err(error) => panic!("failed to parse scope '{value}': {error}"),
        }
    }

    #[test]
    fn parse_strips_trailing_separator() {
        assert_eq!(scope("org/a/").as_str(), "org/a");
    }

    #[test]
    fn parse_rejects_empty_and_relative_segments() {
        assert!(Scope::parse("").is_err());
        assert!(Scope::parse("/").is_err());
        assert!(Scope::parse("org//a").is_err());
        assert!(Scope::parse("/org/a").is_err());
        assert!(Scope::parse("org/../a").is_err());
        assert!(Scope::parse("org/./a").is_err());
    }

    #[test]
    fn ancestor_requires_segment_boundary() {
        let org = scope("org/a");
        let tenant = scope("org/a/tenant/b");
        let sibling = scope("org/ab");

        assert!(org.is_ancestor_of(&tenant));
        assert!(!tenant.is_ancestor_of(&org));
        assert!(!org.is_ancestor_of(&sibling));
        assert!(!org.is_ancestor_of(&org));
    }

    #[test]
    fn parent_walks_to_root() {
        let tenant = scope("org/a/tenant/b");
        let chain = tenant.self_and_ancestors();
        let paths: Vec<&str> = chain.iter().map(Scope::as_str).collect();
        assert_eq!(paths, vec!["org/a/tenant/b", "org/a/tenant", "org/a", "org"]);
        assert!(scope("org").parent().is_none());
    }

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-z0-9-]{1,8}"
    }

    fn segments_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(segment_strategy(), 1..6)
    }

    proptest! {
        #[test]
        fn ancestor_iff_strict_segment_prefix(
            base in segments_strategy(),
            extension in segments_strategy(),
            other in segments_strategy(),
        ) {
            let ancestor = scope(base.join("/").as_str());
            let mut extended_segments = base.clone();
            extended_segments.extend(extension);
            let descendant = scope(extended_segments.join("/").as_str());

            prop_assert!(ancestor.is_ancestor_of(&descendant));

            let candidate = scope(other.join("/").as_str());
            let is_strict_prefix = other.len() > base.len()
                && other[..base.len()] == base[..];
            prop_assert_eq!(ancestor.is_ancestor_of(&candidate), is_strict_prefix);
        }

        #[test]
        fn parse_display_round_trip(segments in segments_strategy()) {
            let path = segments.join("/");
            let parsed = scope(path.as_str());
            prop_assert_eq!(parsed.to_string(), path);
            prop_assert_eq!(parsed.depth(), segments.len());
        }
    }
}
