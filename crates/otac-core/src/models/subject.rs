//! Subject domain model.

use serde::{Deserialize, Serialize};

/// An authenticated identity. Subjects are global and are created on first
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub key: String,
    pub external_id: String,
    pub status: i64,
}
