//! Schema definitions and migration runner for SurrealDB.
//!
//! Node tables are SCHEMAFULL and keyed by the deterministic unique keys of
//! `otac_core::ukey`; references between nodes that are not traversed
//! (tenant, org) are stored as key strings. Traversed relationships are
//! RELATION tables with a unique `(in, out)` index.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "access_graph",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: access graph
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants and subjects (global scope)
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD external_id ON TABLE tenant TYPE string;
DEFINE FIELD status ON TABLE tenant TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();

DEFINE TABLE subject SCHEMAFULL;
DEFINE FIELD external_id ON TABLE subject TYPE string;
DEFINE FIELD status ON TABLE subject TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE subject TYPE datetime \
    DEFAULT time::now();

-- =======================================================================
-- Units, objects, scopes, permissions (tenant scope)
-- =======================================================================
DEFINE TABLE unit SCHEMAFULL;
DEFINE FIELD tenant ON TABLE unit TYPE string;
DEFINE FIELD target_type ON TABLE unit TYPE string;
DEFINE FIELD target_id ON TABLE unit TYPE string;
DEFINE FIELD status ON TABLE unit TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE unit TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_unit_tenant_type ON TABLE unit \
    COLUMNS tenant, target_type;

DEFINE TABLE object SCHEMAFULL;
DEFINE FIELD tenant ON TABLE object TYPE string;
DEFINE FIELD target_type ON TABLE object TYPE string;
DEFINE FIELD target_id ON TABLE object TYPE string;
DEFINE FIELD terms ON TABLE object TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE object TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_object_tenant_type ON TABLE object \
    COLUMNS tenant, target_type;
DEFINE INDEX idx_object_terms ON TABLE object COLUMNS terms;

DEFINE TABLE scope SCHEMAFULL;
DEFINE FIELD tenant ON TABLE scope TYPE string;
DEFINE FIELD target_type ON TABLE scope TYPE string;
DEFINE FIELD target_id ON TABLE scope TYPE string;
DEFINE FIELD status ON TABLE scope TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE scope TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_scope_tenant_type ON TABLE scope \
    COLUMNS tenant, target_type;

DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD tenant ON TABLE permission TYPE string;
DEFINE FIELD name ON TABLE permission TYPE string;
DEFINE FIELD resource ON TABLE permission TYPE string;
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_tenant_resource ON TABLE permission \
    COLUMNS tenant, resource;

-- =======================================================================
-- Identity hierarchy (global scope)
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD status ON TABLE organization TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();

DEFINE TABLE ou SCHEMAFULL;
DEFINE FIELD org ON TABLE ou TYPE string;
DEFINE FIELD name ON TABLE ou TYPE string;
DEFINE FIELD status ON TABLE ou TYPE int DEFAULT 0;
DEFINE FIELD terms ON TABLE ou TYPE array<string> DEFAULT [];
DEFINE INDEX idx_ou_org ON TABLE ou COLUMNS org;

DEFINE TABLE member SCHEMAFULL;
DEFINE FIELD org ON TABLE member TYPE string;
DEFINE FIELD subject ON TABLE member TYPE string;
DEFINE FIELD status ON TABLE member TYPE int DEFAULT 0;
DEFINE FIELD terms ON TABLE member TYPE array<string> DEFAULT [];
DEFINE INDEX idx_member_org ON TABLE member COLUMNS org;
DEFINE INDEX idx_member_subject ON TABLE member COLUMNS subject;

-- =======================================================================
-- Graph Edge Tables (relations)
-- =======================================================================

-- Unit -> parent Unit (U-Us)
DEFINE TABLE unit_parent TYPE RELATION IN unit OUT unit SCHEMAFULL;
DEFINE INDEX idx_unit_parent_pair ON TABLE unit_parent COLUMNS in, out UNIQUE;

-- Object -> parent Object (O-Os)
DEFINE TABLE object_parent TYPE RELATION IN object OUT object SCHEMAFULL;
DEFINE INDEX idx_object_parent_pair ON TABLE object_parent COLUMNS in, out UNIQUE;

-- OU -> parent OU
DEFINE TABLE ou_parent TYPE RELATION IN ou OUT ou SCHEMAFULL;
DEFINE INDEX idx_ou_parent_pair ON TABLE ou_parent COLUMNS in, out UNIQUE;

-- Unit -> Scope
DEFINE TABLE unit_scope TYPE RELATION IN unit OUT scope SCHEMAFULL;
DEFINE INDEX idx_unit_scope_pair ON TABLE unit_scope COLUMNS in, out UNIQUE;

-- Object -> Scope
DEFINE TABLE object_scope TYPE RELATION IN object OUT scope SCHEMAFULL;
DEFINE INDEX idx_object_scope_pair ON TABLE object_scope COLUMNS in, out UNIQUE;

-- Object -> Unit (O-Us, created by assigning an object to a unit)
DEFINE TABLE object_unit TYPE RELATION IN object OUT unit SCHEMAFULL;
DEFINE INDEX idx_object_unit_pair ON TABLE object_unit COLUMNS in, out UNIQUE;

-- Unit -> Subject membership (U-Ss)
DEFINE TABLE unit_subject TYPE RELATION IN unit OUT subject SCHEMAFULL;
DEFINE INDEX idx_unit_subject_pair ON TABLE unit_subject COLUMNS in, out UNIQUE;

-- Unit -> Permission grant, with extension attributes
DEFINE TABLE unit_permission TYPE RELATION IN unit OUT permission SCHEMAFULL;
DEFINE FIELD extensions ON TABLE unit_permission TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE INDEX idx_unit_permission_pair ON TABLE unit_permission \
    COLUMNS in, out UNIQUE;

-- Object -> Permission (the object's own override list)
DEFINE TABLE object_permission TYPE RELATION IN object OUT permission \
    SCHEMAFULL;
DEFINE INDEX idx_object_permission_pair ON TABLE object_permission \
    COLUMNS in, out UNIQUE;

-- Unit -> Organization / OU / Member (units created from the identity
-- hierarchy)
DEFINE TABLE unit_org TYPE RELATION IN unit OUT organization SCHEMAFULL;
DEFINE INDEX idx_unit_org_pair ON TABLE unit_org COLUMNS in, out UNIQUE;
DEFINE TABLE unit_ou TYPE RELATION IN unit OUT ou SCHEMAFULL;
DEFINE INDEX idx_unit_ou_pair ON TABLE unit_ou COLUMNS in, out UNIQUE;
DEFINE TABLE unit_member TYPE RELATION IN unit OUT member SCHEMAFULL;
DEFINE INDEX idx_unit_member_pair ON TABLE unit_member COLUMNS in, out UNIQUE;

-- OU -> Member
DEFINE TABLE ou_member TYPE RELATION IN ou OUT member SCHEMAFULL;
DEFINE INDEX idx_ou_member_pair ON TABLE ou_member COLUMNS in, out UNIQUE;
";

/// Every relation table as `(edge, in table, out table)`.
pub(crate) const EDGES: &[(&str, &str, &str)] = &[
    ("unit_parent", "unit", "unit"),
    ("object_parent", "object", "object"),
    ("ou_parent", "ou", "ou"),
    ("unit_scope", "unit", "scope"),
    ("object_scope", "object", "scope"),
    ("object_unit", "object", "unit"),
    ("unit_subject", "unit", "subject"),
    ("unit_permission", "unit", "permission"),
    ("object_permission", "object", "permission"),
    ("unit_org", "unit", "organization"),
    ("unit_ou", "unit", "ou"),
    ("unit_member", "unit", "member"),
    ("ou_member", "ou", "member"),
];

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn edge_list_matches_schema() {
        for (edge, from, to) in EDGES {
            let ddl = format!("DEFINE TABLE {edge} TYPE RELATION IN {from} OUT {to}");
            assert!(SCHEMA_V1.contains(&ddl), "missing {ddl}");
        }
        let defined = SCHEMA_V1
            .lines()
            .filter(|l| l.contains("TYPE RELATION"))
            .count();
        assert_eq!(defined, EDGES.len());
    }

    #[test]
    fn every_edge_table_has_a_unique_pair_index() {
        for line in SCHEMA_V1.lines() {
            if let Some(rest) = line.strip_prefix("DEFINE TABLE ")
                && line.contains("TYPE RELATION")
            {
                let table = rest.split_whitespace().next().unwrap_or_default();
                let index = format!("idx_{table}_pair");
                assert!(SCHEMA_V1.contains(&index), "missing {index}");
            }
        }
    }
}
