//! Typed addressing of units, objects and scopes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(targetType, targetId)` pair naming a unit, object or scope within a
/// tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub target_type: String,
    pub target_id: String,
}

impl Target {
    pub fn new(target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            target_id: target_id.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target_type, self.target_id)
    }
}

/// Status value of a disabled entity. Anything below zero is disabled.
pub const STATUS_DISABLED: i64 = -1;

/// Status value given to every newly created entity.
pub const STATUS_ACTIVE: i64 = 0;
