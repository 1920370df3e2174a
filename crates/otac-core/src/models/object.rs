//! Object domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::target::Target;

/// A protected resource. Objects form a DAG through parent edges and carry
/// their own permission list, which filters what is inherited from units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub key: String,
    pub tenant: String,
    pub target_type: String,
    pub target_id: String,
    /// Search terms.
    pub terms: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Object {
    pub fn target(&self) -> Target {
        Target::new(&self.target_type, &self.target_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateObjects {
    pub objects: Vec<Target>,
    pub parent: Option<Target>,
    pub scope: Option<Target>,
}
