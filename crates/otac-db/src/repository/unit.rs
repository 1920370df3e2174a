//! SurrealDB implementation of [`UnitRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::permission::PermissionGrant;
use otac_core::models::target::Target;
use otac_core::models::tenant::Tenant;
use otac_core::models::unit::{CreateUnits, Unit, UnitSource};
use otac_core::options::RequestOptions;
use otac_core::repository::{Page, Pagination, UnitRepository};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use super::subject::create_subjects;
use crate::query::{
    Mutation, closes_cycle, create_once, edge_exists, exists, params, rec, relate_once,
    LISTED, select_one, select_page, select_records,
};

#[derive(Debug, SurrealValue)]
pub(crate) struct UnitRow {
    record_id: String,
    tenant: String,
    target_type: String,
    target_id: String,
    status: i64,
    created_at: DateTime<Utc>,
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Unit {
            key: row.record_id,
            tenant: row.tenant,
            target_type: row.target_type,
            target_id: row.target_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn unit_record(tenant: &Tenant, unit: &Target) -> String {
    rec(
        "unit",
        &ukey::unit_key(&tenant.key, &unit.target_type, &unit.target_id),
    )
}

pub(crate) fn scope_record(tenant: &Tenant, scope: &Target) -> String {
    rec(
        "scope",
        &ukey::scope_key(&tenant.key, &scope.target_type, &scope.target_id),
    )
}

/// Append the creation of `unit` (when missing) to `mutation`, with
/// parameters named `<name>_type` and `<name>_id`.
fn create_unit(mutation: Mutation, record: &str, unit: &Target, name: &str) -> Mutation {
    mutation
        .param(&format!("{name}_type"), unit.target_type.as_str())
        .param(&format!("{name}_id"), unit.target_id.as_str())
        .write(create_once(
            record,
            &format!(
                "tenant = $p.tenant, target_type = $p.{name}_type, target_id = $p.{name}_id"
            ),
        ))
}

/// SurrealDB implementation of the Unit repository.
#[derive(Clone)]
pub struct SurrealUnitRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealUnitRepository<C> {
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

impl<C: Connection> UnitRepository for SurrealUnitRepository<C> {
    async fn batch_add(
        &self,
        tenant: &Tenant,
        input: CreateUnits,
        options: RequestOptions,
    ) -> OtacResult<Vec<Unit>> {
        tenant.ensure_active()?;
        validation::check_targets(&input.units, &self.limits)?;
        if let Some(parent) = &input.parent {
            validation::check_target(parent)?;
        }
        if let Some(scope) = &input.scope {
            validation::check_target(scope)?;
        }

        let keys: Vec<String> = input
            .units
            .iter()
            .map(|u| ukey::unit_key(&tenant.key, &u.target_type, &u.target_id))
            .collect();
        let records: Vec<String> = keys.iter().map(|k| rec("unit", k)).collect();
        let parent = input.parent.as_ref().map(|p| (p, unit_record(tenant, p)));
        let scope = input.scope.as_ref().map(|s| (s, scope_record(tenant, s)));

        let mut mutation = Mutation::new().param("tenant", tenant.key.as_str());
        if let Some((target, record)) = &parent {
            mutation = mutation.require(record, "unit", target);
        }
        if let Some((target, record)) = &scope {
            mutation = mutation.require(record, "scope", target);
        }
        for (unit, record) in input.units.iter().zip(&records) {
            if options.strict_create {
                mutation = mutation.conflict_if(exists(record), format!("unit {unit} exists"));
            }
            if let Some((target, parent_record)) = &parent {
                mutation = mutation.conflict_if(
                    closes_cycle("unit", "unit_parent", record, parent_record),
                    format!("unit {unit} -> {target} would create a cycle"),
                );
            }
        }
        for (i, (unit, record)) in input.units.iter().zip(&records).enumerate() {
            mutation = create_unit(mutation, record, unit, &format!("u{i}"));
            if let Some((_, parent_record)) = &parent {
                mutation = mutation.write(relate_once("unit_parent", record, parent_record));
            }
            if let Some((_, scope_record)) = &scope {
                mutation = mutation.write(relate_once("unit_scope", record, scope_record));
            }
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            count = input.units.len(),
            "Units added"
        );
        let rows: Vec<UnitRow> = select_records(&self.db, "unit", &keys).await?;
        Ok(rows.into_iter().map(Unit::from).collect())
    }

    async fn add_from(
        &self,
        tenant: &Tenant,
        unit: Target,
        source: UnitSource,
        parent: Option<Target>,
        scope: Option<Target>,
    ) -> OtacResult<Unit> {
        tenant.ensure_active()?;
        validation::check_target(&unit)?;
        if let Some(parent) = &parent {
            validation::check_target(parent)?;
        }
        if let Some(scope) = &scope {
            validation::check_target(scope)?;
        }

        let record = unit_record(tenant, &unit);
        let mut mutation = Mutation::new().param("tenant", tenant.key.as_str());
        let mut links = Vec::new();
        match &source {
            UnitSource::Organization { org } => {
                validation::check_name("organization", org)?;
                let org_record = rec("organization", &ukey::org_key(org));
                mutation = mutation.reject_if(
                    format!("!({})", exists(&org_record)),
                    format!("organization {org} not found"),
                );
                links.push(relate_once("unit_org", &record, &org_record));
            }
            UnitSource::OrgUnit { org, ou } => {
                validation::check_name("organization", org)?;
                validation::check_name("ou", ou)?;
                let ou_record = rec("ou", &ukey::ou_key(org, ou));
                mutation = mutation.reject_if(
                    format!("!({})", exists(&ou_record)),
                    format!("ou {org}/{ou} not found"),
                );
                links.push(relate_once("unit_ou", &record, &ou_record));
            }
            UnitSource::Members { org, subjects } => {
                validation::check_name("organization", org)?;
                validation::check_subjects(subjects, &self.limits)?;
                for subject in subjects {
                    let member_record = rec("member", &ukey::member_key(org, subject));
                    mutation = mutation.reject_if(
                        format!("!({})", exists(&member_record)),
                        format!("member {subject} of {org} not found"),
                    );
                    links.push(relate_once("unit_member", &record, &member_record));
                }
            }
        }
        if let Some(parent) = &parent {
            let parent_record = unit_record(tenant, parent);
            mutation = mutation
                .require(&parent_record, "unit", parent)
                .conflict_if(
                    closes_cycle("unit", "unit_parent", &record, &parent_record),
                    format!("unit {unit} -> {parent} would create a cycle"),
                );
            links.push(relate_once("unit_parent", &record, &parent_record));
        }
        if let Some(scope) = &scope {
            let scope_record = scope_record(tenant, scope);
            mutation = mutation.require(&scope_record, "scope", scope);
            links.push(relate_once("unit_scope", &record, &scope_record));
        }

        mutation = create_unit(mutation, &record, &unit, "u");
        for link in links {
            mutation = mutation.write(link);
        }
        mutation.run(&self.db).await?;

        info!(tenant = %tenant.external_id, unit = %unit, "Unit added from organization");
        self.get(tenant, &unit).await
    }

    async fn add_subjects(
        &self,
        tenant: &Tenant,
        unit: &Target,
        subjects: &[String],
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        validation::check_subjects(subjects, &self.limits)?;

        let record = unit_record(tenant, unit);
        let mutation = Mutation::new().require(&record, "unit", unit);
        let mut mutation = create_subjects(mutation, subjects, "s");
        for subject in subjects {
            let subject_record = rec("subject", &ukey::subject_key(subject));
            mutation = mutation.write(relate_once("unit_subject", &record, &subject_record));
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            unit = %unit,
            count = subjects.len(),
            "Subjects added to unit"
        );
        Ok(())
    }

    async fn add_permissions(
        &self,
        tenant: &Tenant,
        unit: &Target,
        grants: &[PermissionGrant],
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        validation::check_batch(
            grants,
            &self.limits,
            |g| g.permission.clone(),
            |g| {
                validation::check_permission(&g.permission)?;
                validation::check_extensions(&g.extensions)
            },
        )?;

        let record = unit_record(tenant, unit);
        let mut mutation = Mutation::new().require(&record, "unit", unit);
        let mut writes = Vec::with_capacity(grants.len());
        for (i, grant) in grants.iter().enumerate() {
            let permission_record = rec(
                "permission",
                &ukey::permission_key(&tenant.key, &grant.permission),
            );
            mutation = mutation
                .reject_if(
                    format!("!({})", exists(&permission_record)),
                    format!("permission {} not found", grant.permission),
                )
                .param(&format!("ext{i}"), grant.extensions.clone());
            // Re-granting replaces the extensions.
            writes.push(format!(
                "IF {} {{ UPDATE unit_permission SET extensions = $p.ext{i} \
                 WHERE in = {record} AND out = {permission_record} }} \
                 ELSE {{ RELATE {record}->unit_permission->{permission_record} \
                 SET extensions = $p.ext{i} }}",
                edge_exists("unit_permission", &record, &permission_record)
            ));
        }
        for write in writes {
            mutation = mutation.write(write);
        }
        mutation.run(&self.db).await?;

        info!(
            tenant = %tenant.external_id,
            unit = %unit,
            count = grants.len(),
            "Permissions granted to unit"
        );
        Ok(())
    }

    async fn assign_parent(
        &self,
        tenant: &Tenant,
        unit: &Target,
        parent: &Target,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        validation::check_target(parent)?;

        let record = unit_record(tenant, unit);
        let parent_record = unit_record(tenant, parent);
        Mutation::new()
            .require(&record, "unit", unit)
            .require(&parent_record, "unit", parent)
            .conflict_if(
                closes_cycle("unit", "unit_parent", &record, &parent_record),
                format!("unit {unit} -> {parent} would create a cycle"),
            )
            .write(relate_once("unit_parent", &record, &parent_record))
            .run(&self.db)
            .await?;

        info!(
            tenant = %tenant.external_id,
            unit = %unit,
            parent = %parent,
            "Unit parent assigned"
        );
        Ok(())
    }

    async fn assign_scope(
        &self,
        tenant: &Tenant,
        unit: &Target,
        scope: &Target,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        validation::check_target(scope)?;

        let record = unit_record(tenant, unit);
        let scope_record = scope_record(tenant, scope);
        Mutation::new()
            .require(&record, "unit", unit)
            .require(&scope_record, "scope", scope)
            .write(relate_once("unit_scope", &record, &scope_record))
            .run(&self.db)
            .await?;

        info!(
            tenant = %tenant.external_id,
            unit = %unit,
            scope = %scope,
            "Unit scope assigned"
        );
        Ok(())
    }

    async fn assign_object(
        &self,
        tenant: &Tenant,
        unit: &Target,
        object: &Target,
    ) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        validation::check_target(object)?;

        let record = unit_record(tenant, unit);
        let object_record = rec(
            "object",
            &ukey::object_key(&tenant.key, &object.target_type, &object.target_id),
        );
        Mutation::new()
            .require(&record, "unit", unit)
            .require(&object_record, "object", object)
            .write(relate_once("object_unit", &object_record, &record))
            .run(&self.db)
            .await?;

        info!(
            tenant = %tenant.external_id,
            unit = %unit,
            object = %object,
            "Object assigned to unit"
        );
        Ok(())
    }

    async fn update_status(
        &self,
        tenant: &Tenant,
        unit: &Target,
        status: i64,
    ) -> OtacResult<Unit> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;

        let record = unit_record(tenant, unit);
        Mutation::new()
            .require(&record, "unit", unit)
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "unit",
                unit,
            )
            .run(&self.db)
            .await?;

        info!(tenant = %tenant.external_id, unit = %unit, status, "Unit status updated");
        self.get(tenant, unit).await
    }

    async fn get(&self, tenant: &Tenant, unit: &Target) -> OtacResult<Unit> {
        tenant.ensure_active()?;
        validation::check_target(unit)?;
        let key = ukey::unit_key(&tenant.key, &unit.target_type, &unit.target_id);
        let row: UnitRow = select_one(&self.db, "unit", &key, "unit", unit).await?;
        Ok(row.into())
    }

    async fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<Unit>> {
        tenant.ensure_active()?;
        if let Some(target_type) = target_type {
            validation::check_resource(target_type)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<UnitRow> = select_page(
            &self.db,
            "unit",
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
        let items = rows.into_iter().map(Unit::from).collect();
        Ok(Page::new(items, pagination.page_size, |u: &Unit| {
            u.key.as_str()
        }))
    }
}
