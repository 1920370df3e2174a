//! Organization, OU and member models.
//!
//! Organizations form an identity hierarchy separate from units: an
//! organization has OUs (a DAG through OU parent edges) and members wrapping
//! subjects. Units can be created from an organization, an OU or a set of
//! members, which makes them reachable through that membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub key: String,
    pub name: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}

/// An organizational unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    pub key: String,
    /// Key of the owning organization.
    pub org: String,
    pub name: String,
    pub status: i64,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrgUnit {
    pub name: String,
    /// Name of the parent OU in the same organization.
    pub parent: Option<String>,
    #[serde(default)]
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub key: String,
    pub org: String,
    /// External id of the wrapped subject.
    pub subject: String,
    pub status: i64,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMember {
    pub subject: String,
    #[serde(default)]
    pub terms: Vec<String>,
}
