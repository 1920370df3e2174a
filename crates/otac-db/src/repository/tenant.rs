//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::tenant::Tenant;
use otac_core::options::RequestOptions;
use otac_core::repository::{Page, Pagination, TenantRepository};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::query::{Mutation, create_once, exists, params, purge, rec, select_one, select_page};

/// DB-side row struct that includes the record key via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRow {
    record_id: String,
    external_id: String,
    status: i64,
    created_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            key: row.record_id,
            external_id: row.external_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Tables owned by a tenant, deleted with it.
const TENANT_TABLES: &[&str] = &["unit", "object", "scope", "permission"];

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, external_id: &str, options: RequestOptions) -> OtacResult<Tenant> {
        validation::check_name("tenant", external_id)?;
        let key = ukey::tenant_key(external_id);
        let record = rec("tenant", &key);

        let mut mutation = Mutation::new();
        if options.strict_create {
            mutation =
                mutation.conflict_if(exists(&record), format!("tenant {external_id} exists"));
        }
        mutation
            .param("external_id", external_id)
            .write(create_once(&record, "external_id = $p.external_id"))
            .run(&self.db)
            .await?;

        info!(tenant = %external_id, "Tenant created");
        self.get(external_id).await
    }

    async fn get(&self, external_id: &str) -> OtacResult<Tenant> {
        let key = ukey::tenant_key(external_id);
        let row: TenantRow = select_one(&self.db, "tenant", &key, "tenant", external_id).await?;
        Ok(row.into())
    }

    async fn list(&self, pagination: Pagination) -> OtacResult<Page<Tenant>> {
        let pagination = pagination.validate(&self.limits)?;
        let rows: Vec<TenantRow> =
            select_page(&self.db, "tenant", &[], params([]), &pagination).await?;
        let items = rows.into_iter().map(Tenant::from).collect();
        Ok(Page::new(items, pagination.page_size, |t: &Tenant| {
            t.key.as_str()
        }))
    }

    async fn update_status(&self, external_id: &str, status: i64) -> OtacResult<Tenant> {
        let record = rec("tenant", &ukey::tenant_key(external_id));
        Mutation::new()
            .require(&record, "tenant", external_id)
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "tenant",
                external_id,
            )
            .run(&self.db)
            .await?;

        info!(tenant = %external_id, status, "Tenant status updated");
        self.get(external_id).await
    }

    async fn delete(&self, external_id: &str) -> OtacResult<()> {
        let key = ukey::tenant_key(external_id);
        let record = rec("tenant", &key);

        let mut mutation = Mutation::new()
            .require(&record, "tenant", external_id)
            .conflict_if(
                format!("{record}.status >= 0"),
                format!("tenant {external_id} is enabled"),
            )
            .param("tenant", key.as_str());
        for table in TENANT_TABLES {
            let selector = format!("(SELECT VALUE id FROM {table} WHERE tenant = $p.tenant)");
            for statement in purge(table, &selector) {
                mutation = mutation.write(statement);
            }
        }
        mutation
            .write(format!("DELETE {record}"))
            .run(&self.db)
            .await?;

        info!(tenant = %external_id, "Tenant deleted");
        Ok(())
    }
}
