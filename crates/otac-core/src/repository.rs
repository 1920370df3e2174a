//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories take
//! the resolved [`Tenant`] and reject it when disabled. Creation honours
//! [`RequestOptions::strict_create`].

use serde::{Deserialize, Serialize};

use crate::error::{OtacError, OtacResult};
use crate::models::{
    access::{
        CheckObjectRequest, CheckOutcome, CheckScopeRequest, CheckUnitRequest,
        ListPermissionsRequest, PermissionPayload,
    },
    object::{CreateObjects, Object},
    organization::{CreateMember, CreateOrgUnit, Member, OrgUnit, Organization},
    permission::{Permission, PermissionGrant},
    scope::Scope,
    subject::Subject,
    target::Target,
    tenant::Tenant,
    unit::{CreateUnits, Unit, UnitSource},
};
use crate::options::RequestOptions;
use crate::ukey;
use crate::validation::Limits;

/// Pagination parameters for list queries.
///
/// Results are ordered by key; `page_token` is the key of the last item of
/// the previous page. Listings of records carrying a status skip those
/// below `min_status`, so disabled records are hidden by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page_token: Option<String>,
    /// Zero selects the default page size.
    pub page_size: u32,
    pub skip: u32,
    #[serde(default)]
    pub min_status: i64,
}

impl Pagination {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn after(token: impl Into<String>, page_size: u32) -> Self {
        Self {
            page_token: Some(token.into()),
            page_size,
            ..Self::default()
        }
    }

    /// List only records whose status is at least `min_status`; `-1`
    /// includes disabled ones.
    pub fn with_min_status(mut self, min_status: i64) -> Self {
        self.min_status = min_status;
        self
    }

    /// Apply defaults and reject out-of-range or malformed input.
    pub fn validate(mut self, limits: &Limits) -> OtacResult<Self> {
        if self.page_size > limits.max_page_size {
            return Err(OtacError::bad_request(format!(
                "pageSize {} should not be greater than {}",
                self.page_size, limits.max_page_size
            )));
        }
        if self.page_size == 0 {
            self.page_size = limits.default_page_size;
        }
        match self.page_token.as_deref() {
            Some("") => self.page_token = None,
            Some(token) if !ukey::is_unique_key(token) => {
                return Err(OtacError::bad_request(format!("invalid pageToken {token:?}")));
            }
            _ => {}
        }
        Ok(self)
    }
}

/// A page of results. `next_page_token` is set when the page is full, a
/// hint that more results may follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page_size: u32, key: impl Fn(&T) -> &str) -> Self {
        let next_page_token = if items.len() == page_size as usize {
            items.last().map(|item| key(item).to_owned())
        } else {
            None
        };
        Self {
            items,
            next_page_token,
        }
    }
}

// ---------------------------------------------------------------------------
// Global repositories
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(
        &self,
        external_id: &str,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<Tenant>> + Send;
    fn get(&self, external_id: &str) -> impl Future<Output = OtacResult<Tenant>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Tenant>>> + Send;
    fn update_status(
        &self,
        external_id: &str,
        status: i64,
    ) -> impl Future<Output = OtacResult<Tenant>> + Send;
    /// Only a disabled tenant can be deleted; deletion cascades to every
    /// unit, object, scope and permission it owns.
    fn delete(&self, external_id: &str) -> impl Future<Output = OtacResult<()>> + Send;
}

pub trait SubjectRepository: Send + Sync {
    fn batch_add(
        &self,
        subjects: &[String],
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    /// Return the subjects, creating the missing ones.
    fn acquire_or_add(
        &self,
        subjects: &[String],
    ) -> impl Future<Output = OtacResult<Vec<Subject>>> + Send;
    fn get(&self, subject: &str) -> impl Future<Output = OtacResult<Subject>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Subject>>> + Send;
    fn update_status(
        &self,
        subject: &str,
        status: i64,
    ) -> impl Future<Output = OtacResult<Subject>> + Send;
}

pub trait OrganizationRepository: Send + Sync {
    fn add_org(
        &self,
        org: &str,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<Organization>> + Send;
    fn get_org(&self, org: &str) -> impl Future<Output = OtacResult<Organization>> + Send;
    fn update_org_status(
        &self,
        org: &str,
        status: i64,
    ) -> impl Future<Output = OtacResult<Organization>> + Send;
    fn list_orgs(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Organization>>> + Send;
    fn list_subject_orgs(
        &self,
        subject: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Organization>>> + Send;

    fn add_ou(
        &self,
        org: &str,
        input: CreateOrgUnit,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<OrgUnit>> + Send;
    /// Add a parent edge to an OU, rejecting cycles.
    fn update_ou_parent(
        &self,
        org: &str,
        ou: &str,
        parent: &str,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn update_ou_status(
        &self,
        org: &str,
        ou: &str,
        status: i64,
    ) -> impl Future<Output = OtacResult<OrgUnit>> + Send;
    /// OUs of `org`; only the children of `parent` when given.
    fn list_ous(
        &self,
        org: &str,
        parent: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<OrgUnit>>> + Send;
    fn list_subject_ous(
        &self,
        subject: &str,
        org: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<OrgUnit>>> + Send;
    fn search_ous(
        &self,
        org: &str,
        term: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<OrgUnit>>> + Send;

    fn batch_add_members(
        &self,
        org: &str,
        members: &[CreateMember],
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn update_member_status(
        &self,
        org: &str,
        subject: &str,
        status: i64,
    ) -> impl Future<Output = OtacResult<Member>> + Send;
    fn list_members(
        &self,
        org: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Member>>> + Send;
    fn search_members(
        &self,
        org: &str,
        term: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Member>>> + Send;
    /// Place existing members of `org` into an OU.
    fn batch_add_ou_members(
        &self,
        org: &str,
        ou: &str,
        subjects: &[String],
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn list_ou_members(
        &self,
        org: &str,
        ou: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Member>>> + Send;
    /// Members of the OU and of every OU below it.
    fn list_ou_descendant_members(
        &self,
        org: &str,
        ou: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Member>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-scoped repositories
// ---------------------------------------------------------------------------

pub trait PermissionRepository: Send + Sync {
    fn batch_add(
        &self,
        tenant: &Tenant,
        permissions: &[String],
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn get(
        &self,
        tenant: &Tenant,
        permission: &str,
    ) -> impl Future<Output = OtacResult<Permission>> + Send;
    /// Permissions whose resource segment is in `resources` (all when empty).
    fn list(
        &self,
        tenant: &Tenant,
        resources: &[String],
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Permission>>> + Send;
    /// Detach the permission from every unit and object, then delete it.
    fn delete(
        &self,
        tenant: &Tenant,
        permission: &str,
    ) -> impl Future<Output = OtacResult<()>> + Send;
}

pub trait UnitRepository: Send + Sync {
    fn batch_add(
        &self,
        tenant: &Tenant,
        input: CreateUnits,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<Vec<Unit>>> + Send;
    /// Create a unit reachable through an organization, OU or member set.
    fn add_from(
        &self,
        tenant: &Tenant,
        unit: Target,
        source: UnitSource,
        parent: Option<Target>,
        scope: Option<Target>,
    ) -> impl Future<Output = OtacResult<Unit>> + Send;
    fn add_subjects(
        &self,
        tenant: &Tenant,
        unit: &Target,
        subjects: &[String],
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn add_permissions(
        &self,
        tenant: &Tenant,
        unit: &Target,
        grants: &[PermissionGrant],
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn assign_parent(
        &self,
        tenant: &Tenant,
        unit: &Target,
        parent: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn assign_scope(
        &self,
        tenant: &Tenant,
        unit: &Target,
        scope: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    /// Link `object` to `unit`, making the unit's grants flow to it.
    fn assign_object(
        &self,
        tenant: &Tenant,
        unit: &Target,
        object: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn update_status(
        &self,
        tenant: &Tenant,
        unit: &Target,
        status: i64,
    ) -> impl Future<Output = OtacResult<Unit>> + Send;
    fn get(&self, tenant: &Tenant, unit: &Target)
    -> impl Future<Output = OtacResult<Unit>> + Send;
    fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Unit>>> + Send;
}

pub trait ObjectRepository: Send + Sync {
    fn batch_add(
        &self,
        tenant: &Tenant,
        input: CreateObjects,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<Vec<Object>>> + Send;
    /// Add to the object's own permission list, which filters inherited
    /// grants.
    fn add_permissions(
        &self,
        tenant: &Tenant,
        object: &Target,
        permissions: &[String],
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn assign_parent(
        &self,
        tenant: &Tenant,
        object: &Target,
        parent: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn assign_scope(
        &self,
        tenant: &Tenant,
        object: &Target,
        scope: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
    fn update_terms(
        &self,
        tenant: &Tenant,
        object: &Target,
        terms: Vec<String>,
    ) -> impl Future<Output = OtacResult<Object>> + Send;
    fn get(
        &self,
        tenant: &Tenant,
        object: &Target,
    ) -> impl Future<Output = OtacResult<Object>> + Send;
    fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Object>>> + Send;
    fn search(
        &self,
        tenant: &Tenant,
        term: &str,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Object>>> + Send;
}

pub trait ScopeRepository: Send + Sync {
    fn add(
        &self,
        tenant: &Tenant,
        scope: &Target,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<Scope>> + Send;
    fn update_status(
        &self,
        tenant: &Tenant,
        scope: &Target,
        status: i64,
    ) -> impl Future<Output = OtacResult<Scope>> + Send;
    fn get(
        &self,
        tenant: &Tenant,
        scope: &Target,
    ) -> impl Future<Output = OtacResult<Scope>> + Send;
    fn list(
        &self,
        tenant: &Tenant,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Scope>>> + Send;
    fn list_units(
        &self,
        tenant: &Tenant,
        scope: &Target,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Unit>>> + Send;
    fn list_objects(
        &self,
        tenant: &Tenant,
        scope: &Target,
        target_type: Option<&str>,
        pagination: Pagination,
    ) -> impl Future<Output = OtacResult<Page<Object>>> + Send;
    /// Delete the scope, detaching the units and objects placed under it.
    fn delete(&self, tenant: &Tenant, scope: &Target)
    -> impl Future<Output = OtacResult<()>> + Send;
    /// Delete the scope together with every unit and object placed under it.
    fn delete_all(
        &self,
        tenant: &Tenant,
        scope: &Target,
    ) -> impl Future<Output = OtacResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Access checks
// ---------------------------------------------------------------------------

pub trait AccessChecker: Send + Sync {
    fn check_unit(
        &self,
        tenant: &Tenant,
        request: &CheckUnitRequest,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<CheckOutcome>> + Send;
    fn check_scope(
        &self,
        tenant: &Tenant,
        request: &CheckScopeRequest,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<CheckOutcome>> + Send;
    fn check_object(
        &self,
        tenant: &Tenant,
        request: &CheckObjectRequest,
        options: RequestOptions,
    ) -> impl Future<Output = OtacResult<CheckOutcome>> + Send;
    fn list_permissions_by_unit(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> impl Future<Output = OtacResult<Vec<PermissionPayload>>> + Send;
    fn list_permissions_by_scope(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> impl Future<Output = OtacResult<Vec<PermissionPayload>>> + Send;
    fn list_permissions_by_object(
        &self,
        tenant: &Tenant,
        request: &ListPermissionsRequest,
    ) -> impl Future<Output = OtacResult<Vec<PermissionPayload>>> + Send;
}
