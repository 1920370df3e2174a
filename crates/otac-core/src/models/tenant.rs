//! Tenant domain model.
//!
//! Tenants isolate units, objects, scopes and permissions from each other.
//! Subjects and organizations are global.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OtacError, OtacResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique key, see [`crate::ukey::tenant_key`].
    pub key: String,
    /// Identifier handed over by the authenticating middleware.
    pub external_id: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_disabled(&self) -> bool {
        self.status < 0
    }

    /// Disabled tenants reject every operation except deletion.
    pub fn ensure_active(&self) -> OtacResult<()> {
        if self.is_disabled() {
            return Err(OtacError::Forbidden {
                message: format!("tenant {} is disabled", self.external_id),
            });
        }
        Ok(())
    }
}
