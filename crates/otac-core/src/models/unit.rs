//! Unit domain model.
//!
//! Units are administrative nodes. They form a DAG through parent edges,
//! hold subjects and permission grants, and may attach to scopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::target::Target;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub key: String,
    /// Key of the owning tenant.
    pub tenant: String,
    pub target_type: String,
    pub target_id: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}

impl Unit {
    pub fn target(&self) -> Target {
        Target::new(&self.target_type, &self.target_id)
    }
}

/// Fields required to create a batch of units under an optional parent and
/// scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUnits {
    pub units: Vec<Target>,
    pub parent: Option<Target>,
    pub scope: Option<Target>,
}

/// Identity-hierarchy node a unit is created from. Subjects reaching that
/// node through organization membership reach the unit when the check runs
/// with organization expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnitSource {
    Organization { org: String },
    OrgUnit { org: String, ou: String },
    Members { org: String, subjects: Vec<String> },
}
