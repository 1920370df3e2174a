//! SurrealDB implementation of [`ScopeRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::object::Object;
use otac_core::models::scope::Scope;
use otac_core::models::target::Target;
use otac_core::models::tenant::Tenant;
use otac_core::models::unit::Unit;
use otac_core::options::RequestOptions;
use otac_core::repository::{Page, Pagination, ScopeRepository};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use super::object::ObjectRow;
use super::unit::{UnitRow, scope_record};
use crate::query::{LISTED, Mutation, create_once, exists, params, purge, select_one, select_page};

#[derive(Debug, SurrealValue)]
struct ScopeRow {
    record_id: String,
    tenant: String,
    target_type: String,
    target_id: String,
    status: i64,
    created_at: DateTime<Utc>,
}

impl From<ScopeRow> for Scope {
    fn from(row: ScopeRow) -> Self {
        Scope {
            key: row.record_id,
            tenant: row.tenant,
            target_type: row.target_type,
            target_id: row.target_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// SurrealDB implementation of the Scope repository.
#[derive(Clone)]
pub struct SurrealScopeRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealScopeRepository<C> {
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

impl<C: Connection> ScopeRepository for SurrealScopeRepository<C> {
    async fn add(
        &self,
        tenant: &Tenant,
        scope: &Target,
        options: RequestOptions,
    ) -> OtacResult<Scope> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;

        let record = scope_record(tenant, scope);
        let mut mutation = Mutation::new();
        if options.strict_create {
            mutation = mutation.conflict_if(exists(&record), format!("scope {scope} exists"));
        }
        mutation
            .param("tenant", tenant.key.as_str())
            .param("type", scope.target_type.as_str())
            .param("id", scope.target_id.as_str())
            .write(create_once(
                &record,
                "tenant = $p.tenant, target_type = $p.type, target_id = $p.id",
            ))
            .run(&self.db)
            .await?;

        info!(tenant = %tenant.external_id, scope = %scope, "Scope added");
        self.get(tenant, scope).await
    }

    async fn update_status(
        &self,
        tenant: &Tenant,
        scope: &Target,
        status: i64,
    ) -> OtacResult<Scope> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;

        let record = scope_record(tenant, scope);
        Mutation::new()
            .require(&record, "scope", scope)
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "scope",
                scope,
            )
            .run(&self.db)
            .await?;

        info!(tenant = %tenant.external_id, scope = %scope, status, "Scope status updated");
        self.get(tenant, scope).await
    }

    async fn get(&self, tenant: &Tenant, scope: &Target) -> OtacResult<Scope> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;
        let key = ukey::scope_key(&tenant.key, &scope.target_type, &scope.target_id);
        let row: ScopeRow = select_one(&self.db, "scope", &key, "scope", scope).await?;
        Ok(row.into())
    }

    async fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<Scope>> {
        tenant.ensure_active()?;
        if let Some(target_type) = target_type {
            validation::check_resource(target_type)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<ScopeRow> = select_page(
            &self.db,
            "scope",
            &[
                Some("tenant = $p.tenant"),
                target_type.map(|_| "target_type = $p.target_type"),
                Some(LISTED),
            ],
            params([
                ("tenant", tenant.key.as_str().into()),
                ("target_type", target_type.unwrap_or_default().into()),
            ]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Scope::from).collect();
        Ok(Page::new(items, pagination.page_size, |s: &Scope| {
            s.key.as_str()
        }))
    }

    async fn list_units(
        &self,
        tenant: &Tenant,
        scope: &Target,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<Unit>> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;
        if let Some(target_type) = target_type {
            validation::check_resource(target_type)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let attached = format!(
            "id IN (SELECT VALUE in FROM unit_scope WHERE out = {})",
            scope_record(tenant, scope)
        );
        let rows: Vec<UnitRow> = select_page(
            &self.db,
            "unit",
            &[
                Some(attached.as_str()),
                target_type.map(|_| "target_type = $p.target_type"),
                Some(LISTED),
            ],
            params([("target_type", target_type.unwrap_or_default().into())]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Unit::from).collect();
        Ok(Page::new(items, pagination.page_size, |u: &Unit| {
            u.key.as_str()
        }))
    }

    async fn list_objects(
        &self,
        tenant: &Tenant,
        scope: &Target,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<Object>> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;
        if let Some(target_type) = target_type {
            validation::check_resource(target_type)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let attached = format!(
            "id IN (SELECT VALUE in FROM object_scope WHERE out = {})",
            scope_record(tenant, scope)
        );
        let rows: Vec<ObjectRow> = select_page(
            &self.db,
            "object",
            &[
                Some(attached.as_str()),
                target_type.map(|_| "target_type = $p.target_type"),
            ],
            params([("target_type", target_type.unwrap_or_default().into())]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Object::from).collect();
        Ok(Page::new(items, pagination.page_size, |o: &Object| {
            o.key.as_str()
        }))
    }

    async fn delete(&self, tenant: &Tenant, scope: &Target) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;

        let record = scope_record(tenant, scope);
        Mutation::new()
            .require(&record, "scope", scope)
            .write(format!("DELETE unit_scope WHERE out = {record}"))
            .write(format!("DELETE object_scope WHERE out = {record}"))
            .write(format!("DELETE {record}"))
            .run(&self.db)
            .await?;

        info!(tenant = %tenant.external_id, scope = %scope, "Scope deleted");
        Ok(())
    }

    async fn delete_all(&self, tenant: &Tenant, scope: &Target) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(scope)?;

        let record = scope_record(tenant, scope);
        let mut mutation = Mutation::new()
            .require(&record, "scope", scope)
            .write(format!(
                "LET $units = (SELECT VALUE in FROM unit_scope WHERE out = {record})"
            ))
            .write(format!(
                "LET $objects = (SELECT VALUE in FROM object_scope WHERE out = {record})"
            ));
        for statement in purge("unit", "$units")
            .into_iter()
            .chain(purge("object", "$objects"))
            .chain(purge("scope", &format!("[{record}]")))
        {
            mutation = mutation.write(statement);
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            scope = %scope,
            "Scope deleted with its units and objects"
        );
        Ok(())
    }
}
