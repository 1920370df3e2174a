//! SurrealDB implementation of [`AccessChecker`].
//!
//! Each check loads the subject's unit DAG (and for objects, the object's
//! ancestor DAG), closes it between subject and target, loads grants onto
//! the remaining vertices and hands the result to the pure evaluator in
//! `otac_core::evaluator`.

use otac_core::dag::VertexKind;
use otac_core::error::OtacResult;
use otac_core::evaluator::{self, Grant};
use otac_core::models::access::{
    CheckObjectRequest, CheckOutcome, CheckScopeRequest, CheckUnitRequest,
    ListPermissionsRequest, PermissionFilter, PermissionPayload,
};
use otac_core::models::target::{STATUS_ACTIVE, Target};
use otac_core::models::tenant::Tenant;
use otac_core::options::RequestOptions;
use otac_core::repository::AccessChecker;
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::reach::{self, Lookup};

/// Which request fields a traversal needs.
struct Query<'a> {
    subject: &'a str,
    target: &'a Target,
    filter: PermissionFilter,
    with_organization: bool,
    ignore_scope: bool,
}

/// SurrealDB implementation of the access checker.
#[derive(Clone)]
pub struct SurrealAccessChecker<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealAccessChecker<C> {
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

    fn validate(&self, tenant: &Tenant, query: &Query<'_>) -> OtacResult<()> {
        tenant.ensure_active()?;
        validation::check_subject(query.subject)?;
        validation::check_target(query.target)?;
        match &query.filter {
            PermissionFilter::Names(names) => validation::check_permissions(names, &self.limits),
            PermissionFilter::Resources(resources) => resources
                .iter()
                .try_for_each(|r| validation::check_resource(r)),
        }
    }

    async fn unit_grants(&self, tenant: &Tenant, query: &Query<'_>) -> OtacResult<Vec<Grant>> {
        self.validate(tenant, query)?;
        let target = query.target;
        let lookup = Lookup::unit(tenant, target);
        reach::resolve_targets(&self.db, std::slice::from_ref(&lookup), Some(STATUS_ACTIVE))
            .await?;
        let unit = lookup.key();

        let subject = ukey::subject_key(query.subject);
        let units = reach::subject_dag(
            &self.db,
            &tenant.key,
            &subject,
            query.subject,
            query.with_organization,
        )
        .await?;
        let mut closed = units.close(&subject, &[unit]);
        if closed.is_empty() {
            return Ok(Vec::new());
        }
        reach::load_grants(&self.db, &mut closed, &query.filter).await?;
        Ok(evaluator::unit_grants(&closed))
    }

    async fn scope_grants(&self, tenant: &Tenant, query: &Query<'_>) -> OtacResult<Vec<Grant>> {
        self.validate(tenant, query)?;
        let target = query.target;
        let lookup = Lookup::scope(tenant, target);
        reach::resolve_targets(&self.db, std::slice::from_ref(&lookup), Some(STATUS_ACTIVE))
            .await?;
        let scope = lookup.key().to_owned();

        let subject = ukey::subject_key(query.subject);
        let mut units = reach::subject_dag(
            &self.db,
            &tenant.key,
            &subject,
            query.subject,
            query.with_organization,
        )
        .await?;
        reach::link_scopes(&self.db, &mut units, std::slice::from_ref(&scope)).await?;
        let mut closed = units.close(&subject, &[scope.as_str()]);
        if closed.is_empty() {
            return Ok(Vec::new());
        }
        reach::load_grants(&self.db, &mut closed, &query.filter).await?;
        Ok(evaluator::unit_grants(&closed))
    }

    async fn object_grants(&self, tenant: &Tenant, query: &Query<'_>) -> OtacResult<Vec<Grant>> {
        self.validate(tenant, query)?;
        let target = query.target;
        let lookup = Lookup::object(tenant, target);
        reach::resolve_targets(&self.db, std::slice::from_ref(&lookup), None).await?;
        let object = lookup.key();

        let objects = reach::object_dag(&self.db, object, query.ignore_scope).await?;
        let scopes = objects.ids(VertexKind::Scope);
        if scopes.is_empty() && objects.ids(VertexKind::Unit).is_empty() {
            debug!(object = %target, "Object has no unit or scope links");
            return Ok(Vec::new());
        }

        let subject = ukey::subject_key(query.subject);
        let mut units = reach::subject_dag(
            &self.db,
            &tenant.key,
            &subject,
            query.subject,
            query.with_organization,
        )
        .await?;
        if units.ids(VertexKind::Unit).is_empty() {
            return Ok(Vec::new());
        }
        reach::link_scopes(&self.db, &mut units, &scopes).await?;

        let mut dag = evaluator::join_object_dag(&units, &objects, &subject, object)?;
        if dag.is_empty() {
            return Ok(Vec::new());
        }
        reach::load_grants(&self.db, &mut dag, &query.filter).await?;
        Ok(evaluator::fold_with_overrides(&dag, &subject))
    }
}

fn payloads(grants: Vec<Grant>, target: &Target) -> Vec<PermissionPayload> {
    match evaluator::project(grants, target, true) {
        CheckOutcome::Detail(payloads) => payloads,
        CheckOutcome::Granted(_) => Vec::new(),
    }
}

impl<C: Connection> AccessChecker for SurrealAccessChecker<C> {
    async fn check_unit(
        &self,
        tenant: &Tenant,
        request: &CheckUnitRequest,
        options: RequestOptions,
    ) -> OtacResult<CheckOutcome> {
        let query = Query {
            subject: &request.subject,
            target: &request.unit,
            filter: PermissionFilter::Names(request.permissions.clone()),
            with_organization: request.with_organization,
            ignore_scope: false,
        };
        let grants = self.unit_grants(tenant, &query).await?;
        debug!(
            subject = %request.subject,
            unit = %request.unit,
            grants = grants.len(),
            "Unit check evaluated"
        );
        Ok(evaluator::project(grants, &request.unit, options.respond_detail))
    }

    async fn check_scope(
        &self,
        tenant: &Tenant,
        request: &CheckScopeRequest,
        options: RequestOptions,
    ) -> OtacResult<CheckOutcome> {
        let query = Query {
            subject: &request.subject,
            target: &request.scope,
            filter: PermissionFilter::Names(request.permissions.clone()),
            with_organization: request.with_organization,
            ignore_scope: false,
        };
        let grants = self.scope_grants(tenant, &query).await?;
        debug!(
            subject = %request.subject,
            scope = %request.scope,
            grants = grants.len(),
            "Scope check evaluated"
        );
        Ok(evaluator::project(grants, &request.scope, options.respond_detail))
    }

    async fn check_object(
        &self,
        tenant: &Tenant,
        request: &CheckObjectRequest,
        options: RequestOptions,
    ) -> OtacResult<CheckOutcome> {
        let query = Query {
            subject: &request.subject,
            target: &request.object,
            filter: PermissionFilter::Names(request.permissions.clone()),
            with_organization: request.with_organization,
            ignore_scope: request.ignore_scope,
        };
        let grants = self.object_grants(tenant, &query).await?;
        debug!(
            subject = %request.subject,
            object = %request.object,
            grants = grants.len(),
            granted = !grants.is_empty(),
            "Object check evaluated"
        );
        Ok(evaluator::project(grants, &request.object, options.respond_detail))
    }

    async fn list_permissions_by_unit(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> OtacResult<Vec<PermissionPayload>> {
        let query = list_query(request);
        let grants = self.unit_grants(tenant, &query).await?;
        Ok(payloads(grants, &request.target))
    }

    async fn list_permissions_by_scope(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> OtacResult<Vec<PermissionPayload>> {
        let query = list_query(request);
        let grants = self.scope_grants(tenant, &query).await?;
        Ok(payloads(grants, &request.target))
    }

    async fn list_permissions_by_object(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> OtacResult<Vec<PermissionPayload>> {
        let query = list_query(request);
        let grants = self.object_grants(tenant, &query).await?;
        Ok(payloads(grants, &request.target))
    }
}

fn list_query(request: &ListPermissionsRequest) -> Query<'_> {
    Query {
        subject: &request.subject,
        target: &request.target,
        filter: PermissionFilter::Resources(request.resources.clone()),
        with_organization: request.with_organization,
        ignore_scope: request.ignore_scope,
    }
}
