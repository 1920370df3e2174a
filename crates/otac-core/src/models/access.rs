//! Access-check requests and results.

use serde::{Deserialize, Serialize};

use super::permission::{Extensions, resource_of};
use super::target::Target;

/// Which permissions a check considers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionFilter {
    /// Exactly the listed permission names.
    Names(Vec<String>),
    /// Every permission whose resource segment is listed; all when empty.
    Resources(Vec<String>),
}

impl PermissionFilter {
    pub fn matches(&self, permission: &str) -> bool {
        match self {
            Self::Names(names) => names.iter().any(|n| n == permission),
            Self::Resources(resources) => {
                resources.is_empty() || resources.iter().any(|r| r == resource_of(permission))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckUnitRequest {
    pub subject: String,
    pub unit: Target,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub with_organization: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckScopeRequest {
    pub subject: String,
    pub scope: Target,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub with_organization: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckObjectRequest {
    pub subject: String,
    pub object: Target,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub with_organization: bool,
    /// Skip scope links, leaving only direct object-to-unit paths.
    #[serde(default)]
    pub ignore_scope: bool,
}

/// Lists every grant the subject holds on `target` whose resource segment
/// is in `resources` (all when empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPermissionsRequest {
    pub subject: String,
    pub target: Target,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub with_organization: bool,
    /// Only meaningful when `target` is an object.
    #[serde(default)]
    pub ignore_scope: bool,
}

/// One qualifying grant in a detail-mode answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPayload {
    pub target_type: String,
    pub target_id: String,
    pub permission: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl PermissionPayload {
    pub fn new(target: &Target, permission: impl Into<String>) -> Self {
        Self {
            target_type: target.target_type.clone(),
            target_id: target.target_id.clone(),
            permission: permission.into(),
            extensions: None,
        }
    }
}

/// Result of an access check: a yes/no answer, or the itemized grants when
/// the caller asked for detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckOutcome {
    Granted(bool),
    Detail(Vec<PermissionPayload>),
}

impl CheckOutcome {
    /// The empty answer in the requested mode.
    pub fn denied(detail: bool) -> Self {
        if detail {
            Self::Detail(Vec::new())
        } else {
            Self::Granted(false)
        }
    }

    pub fn is_granted(&self) -> bool {
        match self {
            Self::Granted(granted) => *granted,
            Self::Detail(payloads) => !payloads.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_filter_is_exact() {
        let filter = PermissionFilter::Names(vec!["repo.read".into()]);
        assert!(filter.matches("repo.read"));
        assert!(!filter.matches("repo.write"));
        assert!(!PermissionFilter::Names(vec![]).matches("repo.read"));
    }

    #[test]
    fn resource_filter_matches_first_segment() {
        let filter = PermissionFilter::Resources(vec!["repo".into()]);
        assert!(filter.matches("repo.read"));
        assert!(!filter.matches("repository.read"));
        assert!(PermissionFilter::Resources(vec![]).matches("anything.at.all"));
    }

    #[test]
    fn payload_serializes_camel_case_without_empty_extensions() {
        let payload = PermissionPayload::new(&Target::new("repo", "api"), "repo.read");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "targetType": "repo",
                "targetId": "api",
                "permission": "repo.read"
            })
        );
    }

    #[test]
    fn denied_matches_mode() {
        assert_eq!(CheckOutcome::denied(false), CheckOutcome::Granted(false));
        assert_eq!(CheckOutcome::denied(true), CheckOutcome::Detail(vec![]));
        assert!(!CheckOutcome::denied(true).is_granted());
    }
}
