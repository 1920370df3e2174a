//! Integration tests for access checks using in-memory SurrealDB.

use otac_core::error::OtacError;
use otac_core::models::access::{
    CheckObjectRequest, CheckOutcome, CheckScopeRequest, CheckUnitRequest,
    ListPermissionsRequest, PermissionPayload,
};
use otac_core::models::object::CreateObjects;
use otac_core::models::organization::{CreateMember, CreateOrgUnit};
use otac_core::models::permission::PermissionGrant;
use otac_core::models::target::Target;
use otac_core::models::tenant::Tenant;
use otac_core::models::unit::{CreateUnits, UnitSource};
use otac_core::options::RequestOptions;
use otac_core::repository::{
    AccessChecker, ObjectRepository, OrganizationRepository, PermissionRepository,
    ScopeRepository, SubjectRepository, TenantRepository, UnitRepository,
};
use otac_db::SurrealAccessChecker;
use otac_db::repository::{
    SurrealObjectRepository, SurrealOrganizationRepository, SurrealPermissionRepository,
    SurrealScopeRepository, SurrealSubjectRepository, SurrealTenantRepository,
    SurrealUnitRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

struct Fixture {
    db: Surreal<Db>,
    tenant: Tenant,
    units: SurrealUnitRepository<Db>,
    objects: SurrealObjectRepository<Db>,
    scopes: SurrealScopeRepository<Db>,
    permissions: SurrealPermissionRepository<Db>,
    checker: SurrealAccessChecker<Db>,
}

/// Helper: spin up in-memory DB, run migrations, create tenant `t1` with
/// the permissions `repo.read`, `repo.write` and `wiki.edit`.
async fn setup() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    otac_db::run_migrations(&db).await.unwrap();

    let tenant = SurrealTenantRepository::new(db.clone())
        .create("t1", RequestOptions::default())
        .await
        .unwrap();
    let permissions = SurrealPermissionRepository::new(db.clone());
    permissions
        .batch_add(
            &tenant,
            &["repo.read".into(), "repo.write".into(), "wiki.edit".into()],
            RequestOptions::default(),
        )
        .await
        .unwrap();

    Fixture {
        units: SurrealUnitRepository::new(db.clone()),
        objects: SurrealObjectRepository::new(db.clone()),
        scopes: SurrealScopeRepository::new(db.clone()),
        checker: SurrealAccessChecker::new(db.clone()),
        permissions,
        tenant,
        db,
    }
}

fn names(permissions: &[&str]) -> Vec<String> {
    permissions.iter().map(|p| p.to_string()).collect()
}

fn grants(permissions: &[&str]) -> Vec<PermissionGrant> {
    permissions.iter().map(|p| PermissionGrant::new(*p)).collect()
}

impl Fixture {
    async fn unit(&self, unit: &Target, parent: Option<&Target>) {
        self.units
            .batch_add(
                &self.tenant,
                CreateUnits {
                    units: vec![unit.clone()],
                    parent: parent.cloned(),
                    scope: None,
                },
                RequestOptions::default(),
            )
            .await
            .unwrap();
    }

    async fn object(&self, object: &Target, scope: Option<&Target>) {
        self.objects
            .batch_add(
                &self.tenant,
                CreateObjects {
                    objects: vec![object.clone()],
                    parent: None,
                    scope: scope.cloned(),
                },
                RequestOptions::default(),
            )
            .await
            .unwrap();
    }

    async fn check_object(
        &self,
        subject: &str,
        object: &Target,
        permissions: &[&str],
        ignore_scope: bool,
        options: RequestOptions,
    ) -> CheckOutcome {
        self.checker
            .check_object(
                &self.tenant,
                &CheckObjectRequest {
                    subject: subject.into(),
                    object: object.clone(),
                    permissions: names(permissions),
                    with_organization: false,
                    ignore_scope,
                },
                options,
            )
            .await
            .unwrap()
    }

    async fn check_unit(&self, subject: &str, unit: &Target, permissions: &[&str]) -> bool {
        self.checker
            .check_unit(
                &self.tenant,
                &CheckUnitRequest {
                    subject: subject.into(),
                    unit: unit.clone(),
                    permissions: names(permissions),
                    with_organization: false,
                },
                RequestOptions::default(),
            )
            .await
            .unwrap()
            .is_granted()
    }
}

#[tokio::test]
async fn scenario_unit_grant_reaches_assigned_object() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read"]))
        .await
        .unwrap();
    f.object(&api, None).await;
    f.units.assign_object(&f.tenant, &eng, &api).await.unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();

    let outcome = f
        .check_object("alice", &api, &["repo.read"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));

    let outcome = f
        .check_object("alice", &api, &["repo.read"], true, RequestOptions::detail())
        .await;
    assert_eq!(
        outcome,
        CheckOutcome::Detail(vec![PermissionPayload::new(&api, "repo.read")])
    );

    let outcome = f
        .check_object("alice", &api, &["repo.write"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(false));

    let outcome = f
        .check_object("bob", &api, &["repo.read"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(false));
}

#[tokio::test]
async fn members_reach_ancestor_units() {
    let f = setup().await;
    let company = Target::new("org", "acme");
    let eng = Target::new("dept", "eng");

    f.unit(&company, None).await;
    f.unit(&eng, Some(&company)).await;
    f.units
        .add_permissions(&f.tenant, &company, &grants(&["wiki.edit"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();

    assert!(f.check_unit("alice", &company, &["wiki.edit"]).await);
    // The grant sits on company, which lies above eng.
    assert!(!f.check_unit("alice", &eng, &["wiki.edit"]).await);
}

#[tokio::test]
async fn object_permission_list_overrides_inherited_grants() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read", "repo.write"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, None).await;
    f.units.assign_object(&f.tenant, &eng, &api).await.unwrap();

    // An empty object list lets every inherited grant through.
    let outcome = f
        .check_object("alice", &api, &["repo.write"], false, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));

    f.objects
        .add_permissions(&f.tenant, &api, &names(&["repo.read"]))
        .await
        .unwrap();

    let outcome = f
        .check_object("alice", &api, &["repo.write"], false, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(false));
    let outcome = f
        .check_object("alice", &api, &["repo.read"], false, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));
}

#[tokio::test]
async fn scope_join_respects_ignore_scope() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let core = Target::new("team", "core");
    let api = Target::new("repo", "api");

    f.scopes
        .add(&f.tenant, &core, RequestOptions::default())
        .await
        .unwrap();
    f.unit(&eng, None).await;
    f.units.assign_scope(&f.tenant, &eng, &core).await.unwrap();
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, Some(&core)).await;

    let outcome = f
        .check_object("alice", &api, &["repo.read"], false, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));

    // Without the scope the object has no path back to eng.
    let outcome = f
        .check_object("alice", &api, &["repo.read"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(false));

    let scope_outcome = f
        .checker
        .check_scope(
            &f.tenant,
            &CheckScopeRequest {
                subject: "alice".into(),
                scope: core.clone(),
                permissions: names(&["repo.read"]),
                with_organization: false,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert!(scope_outcome.is_granted());
}

#[tokio::test]
async fn child_of_assigned_object_inherits_through_ancestors() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");
    let src = Target::new("dir", "src");
    let main = Target::new("file", "main.rs");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read", "repo.write"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, None).await;
    f.object(&src, None).await;
    f.object(&main, None).await;
    f.objects.assign_parent(&f.tenant, &src, &api).await.unwrap();
    f.objects.assign_parent(&f.tenant, &main, &src).await.unwrap();
    f.units.assign_object(&f.tenant, &eng, &api).await.unwrap();

    let outcome = f
        .check_object("alice", &main, &["repo.write"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));
    let outcome = f
        .check_object("alice", &main, &["repo.read"], true, RequestOptions::detail())
        .await;
    assert_eq!(
        outcome,
        CheckOutcome::Detail(vec![PermissionPayload::new(&main, "repo.read")])
    );

    // The list on src filters what flows from api down to main.
    f.objects
        .add_permissions(&f.tenant, &src, &names(&["repo.read"]))
        .await
        .unwrap();
    let outcome = f
        .check_object("alice", &main, &["repo.write"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(false));
    let outcome = f
        .check_object("alice", &main, &["repo.read"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));
    // api itself sits above the filter.
    let outcome = f
        .check_object("alice", &api, &["repo.write"], true, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));
}

#[tokio::test]
async fn scope_detail_lists_grants_of_attached_units() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let ops = Target::new("dept", "ops");
    let core = Target::new("team", "core");

    f.scopes
        .add(&f.tenant, &core, RequestOptions::default())
        .await
        .unwrap();
    f.unit(&eng, None).await;
    f.unit(&ops, None).await;
    f.units.assign_scope(&f.tenant, &eng, &core).await.unwrap();
    f.units
        .add_permissions(
            &f.tenant,
            &eng,
            &[PermissionGrant::new("repo.read").with_extension("level", 2)],
        )
        .await
        .unwrap();
    f.units
        .add_permissions(&f.tenant, &ops, &grants(&["repo.read"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &ops, &["alice".into()])
        .await
        .unwrap();

    let outcome = f
        .checker
        .check_scope(
            &f.tenant,
            &CheckScopeRequest {
                subject: "alice".into(),
                scope: core.clone(),
                permissions: names(&["repo.read", "repo.write"]),
                with_organization: false,
            },
            RequestOptions::detail(),
        )
        .await
        .unwrap();

    // ops is not attached to core, so only eng's grant is listed.
    let CheckOutcome::Detail(payloads) = outcome else {
        panic!("expected detail outcome");
    };
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].target_type, "team");
    assert_eq!(payloads[0].target_id, "core");
    assert_eq!(payloads[0].permission, "repo.read");
    let extensions = payloads[0].extensions.as_ref().unwrap();
    assert_eq!(extensions["level"], 2);
}

#[tokio::test]
async fn unlinked_object_is_denied() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, None).await;

    let outcome = f
        .check_object("alice", &api, &["repo.read"], false, RequestOptions::detail())
        .await;
    assert_eq!(outcome, CheckOutcome::Detail(vec![]));
}

#[tokio::test]
async fn deleting_a_permission_revokes_it_everywhere() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read", "repo.write"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, None).await;
    f.units.assign_object(&f.tenant, &eng, &api).await.unwrap();
    f.objects
        .add_permissions(&f.tenant, &api, &names(&["repo.read"]))
        .await
        .unwrap();

    f.permissions.delete(&f.tenant, "repo.read").await.unwrap();

    assert!(!f.check_unit("alice", &eng, &["repo.read"]).await);
    assert!(f.check_unit("alice", &eng, &["repo.write"]).await);

    // The object's list is now empty, so repo.write passes through.
    let outcome = f
        .check_object("alice", &api, &["repo.write"], false, RequestOptions::default())
        .await;
    assert_eq!(outcome, CheckOutcome::Granted(true));

    let mut result = f
        .db
        .query("SELECT VALUE out.name FROM unit_permission")
        .query("SELECT VALUE out.name FROM object_permission")
        .await
        .unwrap();
    let unit_edges: Vec<String> = result.take(0).unwrap();
    let object_edges: Vec<String> = result.take(1).unwrap();
    assert_eq!(unit_edges, vec!["repo.write".to_string()]);
    assert!(object_edges.is_empty());

    let err = f.permissions.get(&f.tenant, "repo.read").await.unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));
}

#[tokio::test]
async fn unit_detail_carries_extensions() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(
            &f.tenant,
            &eng,
            &[PermissionGrant::new("repo.read").with_extension("branch", "main")],
        )
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();

    let outcome = f
        .checker
        .check_unit(
            &f.tenant,
            &CheckUnitRequest {
                subject: "alice".into(),
                unit: eng.clone(),
                permissions: names(&["repo.read"]),
                with_organization: false,
            },
            RequestOptions::detail(),
        )
        .await
        .unwrap();

    let CheckOutcome::Detail(payloads) = outcome else {
        panic!("expected detail outcome");
    };
    assert_eq!(payloads.len(), 1);
    let extensions = payloads[0].extensions.as_ref().unwrap();
    assert_eq!(extensions["branch"], "main");
}

#[tokio::test]
async fn organization_membership_reaches_units_with_organization() {
    let f = setup().await;
    let orgs = SurrealOrganizationRepository::new(f.db.clone());
    let eng = Target::new("dept", "eng");

    orgs.add_org("acme", RequestOptions::default()).await.unwrap();
    orgs.add_ou(
        "acme",
        CreateOrgUnit {
            name: "platform".into(),
            parent: None,
            terms: vec![],
        },
        RequestOptions::default(),
    )
    .await
    .unwrap();
    orgs.batch_add_members(
        "acme",
        &[CreateMember {
            subject: "carol".into(),
            terms: vec![],
        }],
        RequestOptions::default(),
    )
    .await
    .unwrap();
    orgs.batch_add_ou_members("acme", "platform", &["carol".into()])
        .await
        .unwrap();

    f.units
        .add_from(
            &f.tenant,
            eng.clone(),
            UnitSource::OrgUnit {
                org: "acme".into(),
                ou: "platform".into(),
            },
            None,
            None,
        )
        .await
        .unwrap();
    f.units
        .add_permissions(&f.tenant, &eng, &grants(&["repo.read"]))
        .await
        .unwrap();

    let request = |with_organization| CheckUnitRequest {
        subject: "carol".into(),
        unit: eng.clone(),
        permissions: names(&["repo.read"]),
        with_organization,
    };
    let outcome = f
        .checker
        .check_unit(&f.tenant, &request(false), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::Granted(false));
    let outcome = f
        .checker
        .check_unit(&f.tenant, &request(true), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::Granted(true));

    orgs.update_member_status("acme", "carol", -1).await.unwrap();
    let outcome = f
        .checker
        .check_unit(&f.tenant, &request(true), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, CheckOutcome::Granted(false));
}

#[tokio::test]
async fn disabled_unit_or_subject_is_denied() {
    let f = setup().await;
    let company = Target::new("org", "acme");
    let eng = Target::new("dept", "eng");

    f.unit(&company, None).await;
    f.unit(&eng, Some(&company)).await;
    f.units
        .add_permissions(&f.tenant, &company, &grants(&["repo.read"]))
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    assert!(f.check_unit("alice", &company, &["repo.read"]).await);

    f.units.update_status(&f.tenant, &eng, -1).await.unwrap();
    assert!(!f.check_unit("alice", &company, &["repo.read"]).await);
    f.units.update_status(&f.tenant, &eng, 0).await.unwrap();
    assert!(f.check_unit("alice", &company, &["repo.read"]).await);

    SurrealSubjectRepository::new(f.db.clone())
        .update_status("alice", -1)
        .await
        .unwrap();
    assert!(!f.check_unit("alice", &company, &["repo.read"]).await);

    // A disabled target unit is reported as missing.
    f.units.update_status(&f.tenant, &company, -1).await.unwrap();
    let err = f
        .checker
        .check_unit(
            &f.tenant,
            &CheckUnitRequest {
                subject: "alice".into(),
                unit: company.clone(),
                permissions: names(&["repo.read"]),
                with_organization: false,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));
}

#[tokio::test]
async fn check_rejects_bad_input_and_unknown_targets() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    f.unit(&eng, None).await;

    let err = f
        .checker
        .check_unit(
            &f.tenant,
            &CheckUnitRequest {
                subject: "alice".into(),
                unit: eng.clone(),
                permissions: vec![],
                with_organization: false,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::BadRequest { .. }));

    let err = f
        .checker
        .check_object(
            &f.tenant,
            &CheckObjectRequest {
                subject: "alice".into(),
                object: Target::new("repo", "missing"),
                permissions: names(&["repo.read"]),
                with_organization: false,
                ignore_scope: false,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));
}

#[tokio::test]
async fn list_permissions_filters_by_resource() {
    let f = setup().await;
    let eng = Target::new("dept", "eng");
    let api = Target::new("repo", "api");

    f.unit(&eng, None).await;
    f.units
        .add_permissions(
            &f.tenant,
            &eng,
            &grants(&["repo.read", "repo.write", "wiki.edit"]),
        )
        .await
        .unwrap();
    f.units
        .add_subjects(&f.tenant, &eng, &["alice".into()])
        .await
        .unwrap();
    f.object(&api, None).await;
    f.units.assign_object(&f.tenant, &eng, &api).await.unwrap();

    let request = |target: &Target, resources: &[&str]| ListPermissionsRequest {
        subject: "alice".into(),
        target: target.clone(),
        resources: names(resources),
        with_organization: false,
        ignore_scope: false,
    };

    let all = f
        .checker
        .list_permissions_by_unit(&f.tenant, &request(&eng, &[]))
        .await
        .unwrap();
    let mut all: Vec<String> = all.into_iter().map(|p| p.permission).collect();
    all.sort();
    assert_eq!(all, names(&["repo.read", "repo.write", "wiki.edit"]));

    let repo = f
        .checker
        .list_permissions_by_object(&f.tenant, &request(&api, &["repo"]))
        .await
        .unwrap();
    let mut repo: Vec<String> = repo
        .into_iter()
        .inspect(|p| assert_eq!(p.target_id, "api"))
        .map(|p| p.permission)
        .collect();
    repo.sort();
    assert_eq!(repo, names(&["repo.read", "repo.write"]));

    let none = f
        .checker
        .list_permissions_by_object(&f.tenant, &request(&api, &["billing"]))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn disabled_tenant_cannot_check() {
    let f = setup().await;
    let tenant = SurrealTenantRepository::new(f.db.clone())
        .update_status("t1", -1)
        .await
        .unwrap();

    let err = f
        .checker
        .check_unit(
            &tenant,
            &CheckUnitRequest {
                subject: "alice".into(),
                unit: Target::new("dept", "eng"),
                permissions: names(&["repo.read"]),
                with_organization: false,
            },
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::Forbidden { .. }));
}
