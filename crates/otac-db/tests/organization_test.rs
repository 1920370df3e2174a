//! Integration tests for the Organization repository using in-memory
//! SurrealDB.

use otac_core::error::OtacError;
use otac_core::models::organization::{CreateMember, CreateOrgUnit};
use otac_core::options::RequestOptions;
use otac_core::repository::{OrganizationRepository, Pagination};
use otac_core::ukey;
use otac_db::repository::SurrealOrganizationRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

/// Helper: spin up in-memory DB, run migrations, create org `acme`.
async fn setup() -> SurrealOrganizationRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    otac_db::run_migrations(&db).await.unwrap();

    let repo = SurrealOrganizationRepository::new(db);
    repo.add_org("acme", RequestOptions::default()).await.unwrap();
    repo
}

fn ou(name: &str, parent: Option<&str>) -> CreateOrgUnit {
    CreateOrgUnit {
        name: name.into(),
        parent: parent.map(Into::into),
        terms: vec![],
    }
}

fn members(subjects: &[&str]) -> Vec<CreateMember> {
    subjects
        .iter()
        .map(|s| CreateMember {
            subject: s.to_string(),
            terms: vec![],
        })
        .collect()
}

fn names<T>(items: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
    let mut names: Vec<String> = items.iter().map(|i| name(i).to_owned()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn add_and_list_orgs() {
    let repo = setup().await;

    let again = repo.add_org("acme", RequestOptions::default()).await.unwrap();
    assert_eq!(again.key, ukey::org_key("acme"));
    let err = repo.add_org("acme", RequestOptions::strict()).await.unwrap_err();
    assert!(matches!(err, OtacError::Conflict { .. }));

    repo.add_org("globex", RequestOptions::default()).await.unwrap();
    let page = repo.list_orgs(Pagination::default()).await.unwrap();
    assert_eq!(names(&page.items, |o| o.name.as_str()), vec!["acme", "globex"]);

    let disabled = repo.update_org_status("globex", -1).await.unwrap();
    assert_eq!(disabled.status, -1);
    let page = repo.list_orgs(Pagination::default()).await.unwrap();
    assert_eq!(names(&page.items, |o| o.name.as_str()), vec!["acme"]);
    let err = repo.get_org("initech").await.unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));
}

#[tokio::test]
async fn ou_hierarchy_rejects_cycles() {
    let repo = setup().await;

    repo.add_ou("acme", ou("eng", None), RequestOptions::default())
        .await
        .unwrap();
    let platform = repo
        .add_ou("acme", ou("platform", Some("eng")), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(platform.org, ukey::org_key("acme"));
    repo.add_ou("acme", ou("infra", Some("platform")), RequestOptions::default())
        .await
        .unwrap();

    let err = repo.update_ou_parent("acme", "eng", "infra").await.unwrap_err();
    assert!(matches!(err, OtacError::Conflict { .. }));
    let err = repo.update_ou_parent("acme", "eng", "eng").await.unwrap_err();
    assert!(matches!(err, OtacError::Conflict { .. }));

    let err = repo
        .add_ou("acme", ou("web", Some("missing")), RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));
    let err = repo
        .add_ou("initech", ou("web", None), RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::NotFound { .. }));

    let all = repo.list_ous("acme", None, Pagination::default()).await.unwrap();
    assert_eq!(all.items.len(), 3);
    let children = repo
        .list_ous("acme", Some("eng"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&children.items, |o| o.name.as_str()), vec!["platform"]);
}

#[tokio::test]
async fn ou_terms_are_searchable() {
    let repo = setup().await;
    repo.add_ou(
        "acme",
        CreateOrgUnit {
            name: "eng".into(),
            parent: None,
            terms: vec!["engineering".into()],
        },
        RequestOptions::default(),
    )
    .await
    .unwrap();
    repo.add_ou("acme", ou("sales", None), RequestOptions::default())
        .await
        .unwrap();

    let found = repo
        .search_ous("acme", "engineering", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&found.items, |o| o.name.as_str()), vec!["eng"]);

    let disabled = repo.update_ou_status("acme", "sales", -1).await.unwrap();
    assert_eq!(disabled.status, -1);
}

#[tokio::test]
async fn members_and_ou_membership() {
    let repo = setup().await;
    repo.add_ou("acme", ou("eng", None), RequestOptions::default())
        .await
        .unwrap();
    repo.add_ou("acme", ou("platform", Some("eng")), RequestOptions::default())
        .await
        .unwrap();

    repo.batch_add_members(
        "acme",
        &members(&["alice", "bob", "carol"]),
        RequestOptions::default(),
    )
    .await
    .unwrap();
    let err = repo
        .batch_add_members("acme", &members(&["alice"]), RequestOptions::strict())
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::Conflict { .. }));

    repo.batch_add_ou_members("acme", "eng", &["alice".into()])
        .await
        .unwrap();
    repo.batch_add_ou_members("acme", "platform", &["bob".into()])
        .await
        .unwrap();
    let err = repo
        .batch_add_ou_members("acme", "eng", &["mallory".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, OtacError::BadRequest { .. }));

    let all = repo.list_members("acme", Pagination::default()).await.unwrap();
    assert_eq!(names(&all.items, |m| m.subject.as_str()), vec!["alice", "bob", "carol"]);

    let direct = repo
        .list_ou_members("acme", "eng", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&direct.items, |m| m.subject.as_str()), vec!["alice"]);

    let below = repo
        .list_ou_descendant_members("acme", "eng", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&below.items, |m| m.subject.as_str()), vec!["alice", "bob"]);

    let ous = repo
        .list_subject_ous("bob", "acme", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&ous.items, |o| o.name.as_str()), vec!["platform"]);

    let member = repo.update_member_status("acme", "carol", -1).await.unwrap();
    assert_eq!(member.status, -1);
    assert_eq!(member.org, ukey::org_key("acme"));

    let active = repo.list_members("acme", Pagination::default()).await.unwrap();
    assert_eq!(names(&active.items, |m| m.subject.as_str()), vec!["alice", "bob"]);
    let all = repo
        .list_members("acme", Pagination::default().with_min_status(-1))
        .await
        .unwrap();
    assert_eq!(all.items.len(), 3);

    repo.update_ou_status("acme", "platform", -1).await.unwrap();
    let ous = repo.list_ous("acme", None, Pagination::default()).await.unwrap();
    assert_eq!(names(&ous.items, |o| o.name.as_str()), vec!["eng"]);
}

#[tokio::test]
async fn member_terms_and_subject_orgs() {
    let repo = setup().await;
    repo.add_org("globex", RequestOptions::default()).await.unwrap();
    repo.batch_add_members(
        "acme",
        &[CreateMember {
            subject: "alice".into(),
            terms: vec!["oncall".into()],
        }],
        RequestOptions::default(),
    )
    .await
    .unwrap();
    repo.batch_add_members("globex", &members(&["alice"]), RequestOptions::default())
        .await
        .unwrap();

    let found = repo
        .search_members("acme", "oncall", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&found.items, |m| m.subject.as_str()), vec!["alice"]);
    let found = repo
        .search_members("globex", "oncall", Pagination::default())
        .await
        .unwrap();
    assert!(found.items.is_empty());

    let orgs = repo
        .list_subject_orgs("alice", Pagination::default())
        .await
        .unwrap();
    assert_eq!(names(&orgs.items, |o| o.name.as_str()), vec!["acme", "globex"]);
}
