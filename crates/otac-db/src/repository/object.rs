//! SurrealDB implementation of [`ObjectRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::object::{CreateObjects, Object};
use otac_core::models::target::Target;
use otac_core::models::tenant::Tenant;
use otac_core::options::RequestOptions;
use otac_core::repository::{ObjectRepository, Page, Pagination};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use super::unit::scope_record;
use crate::query::{
    Mutation, closes_cycle, create_once, exists, params, rec, relate_once, select_one,
    select_page, select_records,
};

#[derive(Debug, SurrealValue)]
pub(crate) struct ObjectRow {
    record_id: String,
    tenant: String,
    target_type: String,
    target_id: String,
    terms: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<ObjectRow> for Object {
    fn from(row: ObjectRow) -> Self {
        Object {
            key: row.record_id,
            tenant: row.tenant,
            target_type: row.target_type,
            target_id: row.target_id,
            terms: row.terms,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn object_record(tenant: &Tenant, object: &Target) -> String {
    rec(
        "object",
        &ukey::object_key(&tenant.key, &object.target_type, &object.target_id),
    )
}

/// SurrealDB implementation of the Object repository.
#[derive(Clone)]
pub struct SurrealObjectRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealObjectRepository<C> {
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

impl<C: Connection> ObjectRepository for SurrealObjectRepository<C> {
    async fn batch_add(
        &self,
        tenant: &Tenant,
        input: CreateObjects,
        options: RequestOptions,
    ) -> OtacResult<Vec<Object>> {
        tenant.ensure_active()?;
        validation::check_targets(&input.objects, &self.limits)?;
        if let Some(parent) = &input.parent {
            validation::check_target(parent)?;
        }
        if let Some(scope) = &input.scope {
            validation::check_target(scope)?;
        }

        let keys: Vec<String> = input
            .objects
            .iter()
            .map(|o| ukey::object_key(&tenant.key, &o.target_type, &o.target_id))
            .collect();
        let records: Vec<String> = keys.iter().map(|k| rec("object", k)).collect();
        let parent = input.parent.as_ref().map(|p| (p, object_record(tenant, p)));
        let scope = input.scope.as_ref().map(|s| (s, scope_record(tenant, s)));

        let mut mutation = Mutation::new().param("tenant", tenant.key.as_str());
        if let Some((target, record)) = &parent {
            mutation = mutation.require(record, "object", target);
        }
        if let Some((target, record)) = &scope {
            mutation = mutation.require(record, "scope", target);
        }
        for (object, record) in input.objects.iter().zip(&records) {
            if options.strict_create {
                mutation = mutation.conflict_if(exists(record), format!("object {object} exists"));
            }
            if let Some((target, parent_record)) = &parent {
                mutation = mutation.conflict_if(
                    closes_cycle("object", "object_parent", record, parent_record),
                    format!("object {object} -> {target} would create a cycle"),
                );
            }
        }
        for (i, (object, record)) in input.objects.iter().zip(&records).enumerate() {
            mutation = mutation
                .param(&format!("o{i}_type"), object.target_type.as_str())
                .param(&format!("o{i}_id"), object.target_id.as_str())
                .write(create_once(
                    record,
                    &format!(
                        "tenant = $p.tenant, target_type = $p.o{i}_type, \
                         target_id = $p.o{i}_id"
                    ),
                ));
            if let Some((_, parent_record)) = &parent {
                mutation = mutation.write(relate_once("object_parent", record, parent_record));
            }
            if let Some((_, scope_record)) = &scope {
                mutation = mutation.write(relate_once("object_scope", record, scope_record));
            }
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            count = input.objects.len(),
            "Objects added"
        );
        let rows: Vec<ObjectRow> = select_records(&self.db, "object", &keys).await?;
        Ok(rows.into_iter().map(Object::from).collect())
    }

    async fn add_permissions(
        &self,
        tenant: &Tenant,
        object: &Target,
        permissions: &[String],
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(object)?;
        validation::check_permissions(permissions, &self.limits)?;

        let record = object_record(tenant, object);
        let mut mutation = Mutation::new().require(&record, "object", object);
        let mut writes = Vec::with_capacity(permissions.len());
        for permission in permissions {
            let permission_record =
                rec("permission", &ukey::permission_key(&tenant.key, permission));
            mutation = mutation.reject_if(
                format!("!({})", exists(&permission_record)),
                format!("permission {permission} not found"),
            );
            writes.push(relate_once("object_permission", &record, &permission_record));
        }
        for write in writes {
            mutation = mutation.write(write);
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            object = %object,
            count = permissions.len(),
            "Permissions attached to object"
        );
        Ok(())
    }

    async fn assign_parent(
        &self,
        tenant: &Tenant,
        object: &Target,
        parent: &Target,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(object)?;
        validation::check_target(parent)?;

        let record = object_record(tenant, object);
        let parent_record = object_record(tenant, parent);
        Mutation::new()
            .require(&record, "object", object)
            .require(&parent_record, "object", parent)
            .conflict_if(
                closes_cycle("object", "object_parent", &record, &parent_record),
                format!("object {object} -> {parent} would create a cycle"),
            )
            .write(relate_once("object_parent", &record, &parent_record))
            .run(&self.db)
            .await?;

        info!(
            tenant = %tenant.external_id,
            object = %object,
            parent = %parent,
            "Object parent assigned"
        );
        Ok(())
    }

    async fn assign_scope(
        &self,
        tenant: &Tenant,
        object: &Target,
        scope: &Target,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(object)?;
        validation::check_target(scope)?;

        let record = object_record(tenant, object);
        let scope_record = scope_record(tenant, scope);
        Mutation::new()
            .require(&record, "object", object)
            .require(&scope_record, "scope", scope)
            .write(relate_once("object_scope", &record, &scope_record))
            .run(&self.db)
            .await?;

        info!(
            tenant = %tenant.external_id,
            object = %object,
            scope = %scope,
            "Object scope assigned"
        );
        Ok(())
    }

    async fn update_terms(
        &self,
        tenant: &Tenant,
        object: &Target,
        terms: Vec<String>,
    ) -> OtacResult<Object> {
        tenant.ensure_active()?;
        validation::check_target(object)?;
        validation::check_terms(&terms)?;

        let record = object_record(tenant, object);
        Mutation::new()
            .require(&record, "object", object)
            .param("terms", terms)
            .write(format!("UPDATE {record} SET terms = $p.terms"))
            .run(&self.db)
            .await?;

        self.get(tenant, object).await
    }

    async fn get(&self, tenant: &Tenant, object: &Target) -> OtacResult<Object> {
        tenant.ensure_active()?;
        validation::check_target(object)?;
        let key = ukey::object_key(&tenant.key, &object.target_type, &object.target_id);
        let row: ObjectRow = select_one(&self.db, "object", &key, "object", object).await?;
        Ok(row.into())
    }

    async fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<Object>> {
        tenant.ensure_active()?;
        if let Some(target_type) = target_type {
            validation::check_resource(target_type)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<ObjectRow> = select_page(
            &self.db,
            "object",
            &[
                Some("tenant = $p.tenant"),
                target_type.map(|_| "target_type = $p.target_type"),
            ],
            params([
                ("tenant", tenant.key.as_str().into()),
                ("target_type", target_type.unwrap_or_default().into()),
            ]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Object::from).collect();
        Ok(Page::new(items, pagination.page_size, |o: &Object| {
            o.key.as_str()
        }))
    }

    async fn search(
        &self,
        tenant: &Tenant,
        term: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<Object>> {
        tenant.ensure_active()?;
        validation::check_term(term)?;
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<ObjectRow> = select_page(
            &self.db,
            "object",
            &[Some("tenant = $p.tenant"), Some("terms CONTAINS $p.term")],
            params([
                ("tenant", tenant.key.as_str().into()),
                ("term", term.into()),
            ]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Object::from).collect();
        Ok(Page::new(items, pagination.page_size, |o: &Object| {
            o.key.as_str()
        }))
    }
}
