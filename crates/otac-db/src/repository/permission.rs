//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::permission::{Permission, resource_of};
use otac_core::models::tenant::Tenant;
use otac_core::options::RequestOptions;
use otac_core::repository::{Page, Pagination, PermissionRepository};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::query::{Mutation, create_once, exists, params, rec, select_one, select_page};

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    record_id: String,
    tenant: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            key: row.record_id,
            tenant: row.tenant,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealPermissionRepository<C> {
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

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn batch_add(
        &self,
        tenant: &Tenant,
        permissions: &[String],
        options: RequestOptions,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_permissions(permissions, &self.limits)?;

        let mut mutation = Mutation::new().param("tenant", tenant.key.as_str());
        let records: Vec<String> = permissions
            .iter()
            .map(|p| rec("permission", &ukey::permission_key(&tenant.key, p)))
            .collect();
        if options.strict_create {
            for (permission, record) in permissions.iter().zip(&records) {
                mutation =
                    mutation.conflict_if(exists(record), format!("permission {permission} exists"));
            }
        }
        for (i, (permission, record)) in permissions.iter().zip(&records).enumerate() {
            mutation = mutation
                .param(&format!("name{i}"), permission.as_str())
                .param(&format!("resource{i}"), resource_of(permission))
                .write(create_once(
                    record,
                    &format!("tenant = $p.tenant, name = $p.name{i}, resource = $p.resource{i}"),
                ));
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            count = permissions.len(),
            "Permissions added"
        );
        Ok(())
    }

    async fn get(&self, tenant: &Tenant, permission: &str) -> OtacResult<Permission> {
        tenant.ensure_active()?;
        validation::check_permission(permission)?;
        let key = ukey::permission_key(&tenant.key, permission);
        let row: PermissionRow =
            select_one(&self.db, "permission", &key, "permission", permission).await?;
        Ok(row.into())
    }

    async fn list(
        &self,
        tenant: &Tenant,
        resources: &[String],
        pagination: Pagination,
    ) -> OtacResult<Page<Permission>> {
        tenant.ensure_active()?;
        resources
            .iter()
            .try_for_each(|r| validation::check_resource(r))?;
        let pagination = pagination.validate(&self.limits)?;

        let by_resource = (!resources.is_empty()).then_some("resource IN $p.resources");
        let rows: Vec<PermissionRow> = select_page(
            &self.db,
            "permission",
            &[Some("tenant = $p.tenant"), by_resource],
            params([
                ("tenant", tenant.key.as_str().into()),
                ("resources", resources.into()),
            ]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Permission::from).collect();
        Ok(Page::new(items, pagination.page_size, |p: &Permission| {
            p.key.as_str()
        }))
    }

    async fn delete(&self, tenant: &Tenant, permission: &str) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_permission(permission)?;
        let record = rec("permission", &ukey::permission_key(&tenant.key, permission));

        Mutation::new()
            .require(&record, "permission", permission)
            .write(format!("DELETE unit_permission WHERE out = {record}"))
            .write(format!("DELETE object_permission WHERE out = {record}"))
            .write(format!("DELETE {record}"))
            .run(&self.db)
            .await?;

        info!(tenant = %tenant.external_id, permission = %permission, "Permission deleted");
        Ok(())
    }
}
