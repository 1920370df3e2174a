//! Permission domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dot-namespaced permission name (`resource.action...`) registered in a
/// tenant before it can be attached anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub key: String,
    pub tenant: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// The resource segment of the name (`repo` for `repo.read`).
    pub fn resource(&self) -> &str {
        resource_of(&self.name)
    }
}

pub fn resource_of(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Extension attributes attached to a unit grant.
pub type Extensions = serde_json::Map<String, serde_json::Value>;

/// A permission granted to a unit, with optional extension attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl PermissionGrant {
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            extensions: Extensions::new(),
        }
    }

    pub fn with_extension(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_is_first_segment() {
        assert_eq!(resource_of("repo.read"), "repo");
        assert_eq!(resource_of("repo.branch.delete"), "repo");
        assert_eq!(resource_of("repo"), "repo");
    }
}
