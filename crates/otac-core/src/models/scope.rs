//! Scope domain model.
//!
//! A scope joins the unit side and the object side of the graph: a unit and
//! an object attached to the same scope are connected without a direct edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub key: String,
    pub tenant: String,
    pub target_type: String,
    pub target_id: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}
