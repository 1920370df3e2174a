//! SurrealDB implementation of [`OrganizationRepository`].

use chrono::{DateTime, Utc};
use otac_core::error::OtacResult;
use otac_core::models::organization::{
    CreateMember, CreateOrgUnit, Member, OrgUnit, Organization,
};
use otac_core::options::RequestOptions;
use otac_core::repository::{OrganizationRepository, Page, Pagination};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use super::subject::create_subjects;
use crate::query::{
    LISTED, Mutation, closes_cycle, create_once, exists, params, rec, rec_list, relate_once,
    select_one, select_page,
};
use crate::reach::{self, Lookup};

#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    record_id: String,
    name: String,
    status: i64,
    created_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            key: row.record_id,
            name: row.name,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct OrgUnitRow {
    record_id: String,
    org: String,
    name: String,
    status: i64,
    terms: Vec<String>,
}

impl From<OrgUnitRow> for OrgUnit {
    fn from(row: OrgUnitRow) -> Self {
        OrgUnit {
            key: row.record_id,
            org: row.org,
            name: row.name,
            status: row.status,
            terms: row.terms,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct MemberRow {
    record_id: String,
    org: String,
    subject: String,
    status: i64,
    terms: Vec<String>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            key: row.record_id,
            org: row.org,
            subject: row.subject,
            status: row.status,
            terms: row.terms,
        }
    }
}

fn ou_page(rows: Vec<OrgUnitRow>, page_size: u32) -> Page<OrgUnit> {
    let items = rows.into_iter().map(OrgUnit::from).collect();
    Page::new(items, page_size, |o: &OrgUnit| o.key.as_str())
}

fn member_page(rows: Vec<MemberRow>, page_size: u32) -> Page<Member> {
    let items = rows.into_iter().map(Member::from).collect();
    Page::new(items, page_size, |m: &Member| m.key.as_str())
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
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

    async fn get_ou(&self, org: &str, ou: &str) -> OtacResult<OrgUnit> {
        let key = ukey::ou_key(org, ou);
        let row: OrgUnitRow = select_one(&self.db, "ou", &key, "ou", format!("{org}/{ou}")).await?;
        Ok(row.into())
    }

    async fn get_member(&self, org: &str, subject: &str) -> OtacResult<Member> {
        let key = ukey::member_key(org, subject);
        let id = format!("{org}/{subject}");
        let row: MemberRow = select_one(&self.db, "member", &key, "member", id).await?;
        Ok(row.into())
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn add_org(&self, org: &str, options: RequestOptions) -> OtacResult<Organization> {
        validation::check_name("organization", org)?;
        let record = rec("organization", &ukey::org_key(org));

        let mut mutation = Mutation::new();
        if options.strict_create {
            mutation = mutation.conflict_if(exists(&record), format!("organization {org} exists"));
        }
        mutation
            .param("name", org)
            .write(create_once(&record, "name = $p.name"))
            .run(&self.db)
            .await?;

        info!(org = %org, "Organization added");
        self.get_org(org).await
    }

    async fn get_org(&self, org: &str) -> OtacResult<Organization> {
        validation::check_name("organization", org)?;
        let key = ukey::org_key(org);
        let row: OrganizationRow =
            select_one(&self.db, "organization", &key, "organization", org).await?;
        Ok(row.into())
    }

    async fn update_org_status(&self, org: &str, status: i64) -> OtacResult<Organization> {
        validation::check_name("organization", org)?;
        let record = rec("organization", &ukey::org_key(org));
        Mutation::new()
            .require(&record, "organization", org)
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "organization",
                org,
            )
            .run(&self.db)
            .await?;

        info!(org = %org, status, "Organization status updated");
        self.get_org(org).await
    }

    async fn list_orgs(&self, pagination: Pagination) -> OtacResult<Page<Organization>> {
        let pagination = pagination.validate(&self.limits)?;
        let rows: Vec<OrganizationRow> =
            select_page(&self.db, "organization", &[Some(LISTED)], params([]), &pagination)
                .await?;
        let items = rows.into_iter().map(Organization::from).collect();
        Ok(Page::new(items, pagination.page_size, |o: &Organization| {
            o.key.as_str()
        }))
    }

    async fn list_subject_orgs(
        &self,
        subject: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<Organization>> {
        validation::check_subject(subject)?;
        let pagination = pagination.validate(&self.limits)?;
        let rows: Vec<OrganizationRow> = select_page(
            &self.db,
            "organization",
            &[
                Some(
                    "meta::id(id) IN (SELECT VALUE org FROM member \
                     WHERE subject = $p.subject AND status >= $min_status)",
                ),
                Some(LISTED),
            ],
            params([("subject", subject.into())]),
            &pagination,
        )
        .await?;
        let items = rows.into_iter().map(Organization::from).collect();
        Ok(Page::new(items, pagination.page_size, |o: &Organization| {
            o.key.as_str()
        }))
    }

    async fn add_ou(
        &self,
        org: &str,
        input: CreateOrgUnit,
        options: RequestOptions,
    ) -> OtacResult<OrgUnit> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", &input.name)?;
        validation::check_terms(&input.terms)?;
        if let Some(parent) = &input.parent {
            validation::check_name("ou", parent)?;
        }

        let org_key = ukey::org_key(org);
        let record = rec("ou", &ukey::ou_key(org, &input.name));
        let mut mutation =
            Mutation::new().require(&rec("organization", &org_key), "organization", org);
        if options.strict_create {
            mutation = mutation.conflict_if(
                exists(&record),
                format!("ou {org}/{} exists", input.name),
            );
        }
        let mut parent_link = None;
        if let Some(parent) = &input.parent {
            let parent_record = rec("ou", &ukey::ou_key(org, parent));
            mutation = mutation
                .require(&parent_record, "ou", format!("{org}/{parent}"))
                .conflict_if(
                    closes_cycle("ou", "ou_parent", &record, &parent_record),
                    format!("ou {} -> {parent} would create a cycle", input.name),
                );
            parent_link = Some(relate_once("ou_parent", &record, &parent_record));
        }
        mutation = mutation
            .param("org", org_key.as_str())
            .param("name", input.name.as_str())
            .param("terms", input.terms.clone())
            .write(create_once(
                &record,
                "org = $p.org, name = $p.name, terms = $p.terms",
            ));
        if let Some(link) = parent_link {
            mutation = mutation.write(link);
        }
        mutation.run(&self.db).await?;

        info!(org = %org, ou = %input.name, "Organizational unit added");
        self.get_ou(org, &input.name).await
    }

    async fn update_ou_parent(&self, org: &str, ou: &str, parent: &str) -> OtacResult<()> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", ou)?;
        validation::check_name("ou", parent)?;

        let record = rec("ou", &ukey::ou_key(org, ou));
        let parent_record = rec("ou", &ukey::ou_key(org, parent));
        Mutation::new()
            .require(&record, "ou", format!("{org}/{ou}"))
            .require(&parent_record, "ou", format!("{org}/{parent}"))
            .conflict_if(
                closes_cycle("ou", "ou_parent", &record, &parent_record),
                format!("ou {ou} -> {parent} would create a cycle"),
            )
            .write(relate_once("ou_parent", &record, &parent_record))
            .run(&self.db)
            .await?;

        info!(org = %org, ou = %ou, parent = %parent, "Organizational unit parent assigned");
        Ok(())
    }

    async fn update_ou_status(&self, org: &str, ou: &str, status: i64) -> OtacResult<OrgUnit> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", ou)?;

        let record = rec("ou", &ukey::ou_key(org, ou));
        Mutation::new()
            .require(&record, "ou", format!("{org}/{ou}"))
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "ou",
                format!("{org}/{ou}"),
            )
            .run(&self.db)
            .await?;

        info!(org = %org, ou = %ou, status, "Organizational unit status updated");
        self.get_ou(org, ou).await
    }

    async fn list_ous(
        &self,
        org: &str,
        parent: Option<&str>,
        pagination: Pagination,
    ) -> OtacResult<Page<OrgUnit>> {
        validation::check_name("organization", org)?;
        if let Some(parent) = parent {
            validation::check_name("ou", parent)?;
        }
        let pagination = pagination.validate(&self.limits)?;

        let children = parent.map(|parent| {
            format!(
                "id IN (SELECT VALUE in FROM ou_parent WHERE out = {})",
                rec("ou", &ukey::ou_key(org, parent))
            )
        });
        let rows: Vec<OrgUnitRow> = select_page(
            &self.db,
            "ou",
            &[Some("org = $p.org"), children.as_deref(), Some(LISTED)],
            params([("org", ukey::org_key(org).into())]),
            &pagination,
        )
        .await?;
        Ok(ou_page(rows, pagination.page_size))
    }

    async fn list_subject_ous(
        &self,
        subject: &str,
        org: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<OrgUnit>> {
        validation::check_subject(subject)?;
        validation::check_name("organization", org)?;
        let pagination = pagination.validate(&self.limits)?;

        let holding = format!(
            "id IN (SELECT VALUE in FROM ou_member WHERE out = {})",
            rec("member", &ukey::member_key(org, subject))
        );
        let rows: Vec<OrgUnitRow> = select_page(
            &self.db,
            "ou",
            &[Some("org = $p.org"), Some(holding.as_str()), Some(LISTED)],
            params([("org", ukey::org_key(org).into())]),
            &pagination,
        )
        .await?;
        Ok(ou_page(rows, pagination.page_size))
    }

    async fn search_ous(
        &self,
        org: &str,
        term: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<OrgUnit>> {
        validation::check_name("organization", org)?;
        validation::check_term(term)?;
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<OrgUnitRow> = select_page(
            &self.db,
            "ou",
            &[
                Some("org = $p.org"),
                Some("terms CONTAINS $p.term"),
                Some(LISTED),
            ],
            params([("org", ukey::org_key(org).into()), ("term", term.into())]),
            &pagination,
        )
        .await?;
        Ok(ou_page(rows, pagination.page_size))
    }

    async fn batch_add_members(
        &self,
        org: &str,
        members: &[CreateMember],
        options: RequestOptions,
    ) -> OtacResult<()> {
        validation::check_name("organization", org)?;
        validation::check_batch(
            members,
            &self.limits,
            |m| m.subject.clone(),
            |m| {
                validation::check_subject(&m.subject)?;
                validation::check_terms(&m.terms)
            },
        )?;

        let org_key = ukey::org_key(org);
        let records: Vec<String> = members
            .iter()
            .map(|m| rec("member", &ukey::member_key(org, &m.subject)))
            .collect();
        let mut mutation =
            Mutation::new().require(&rec("organization", &org_key), "organization", org);
        if options.strict_create {
            for (member, record) in members.iter().zip(&records) {
                mutation = mutation.conflict_if(
                    exists(record),
                    format!("member {} of {org} exists", member.subject),
                );
            }
        }
        let subjects: Vec<String> = members.iter().map(|m| m.subject.clone()).collect();
        mutation = create_subjects(mutation, &subjects, "s").param("org", org_key.as_str());
        for (i, (member, record)) in members.iter().zip(&records).enumerate() {
            mutation = mutation
                .param(&format!("m{i}_terms"), member.terms.clone())
                .write(create_once(
                    record,
                    &format!("org = $p.org, subject = $p.s{i}, terms = $p.m{i}_terms"),
                ));
        }
        mutation.run(&self.db).await?;

        info!(org = %org, count = members.len(), "Members added");
        Ok(())
    }

    async fn update_member_status(
        &self,
        org: &str,
        subject: &str,
        status: i64,
    ) -> OtacResult<Member> {
        validation::check_name("organization", org)?;
        validation::check_subject(subject)?;

        let record = rec("member", &ukey::member_key(org, subject));
        Mutation::new()
            .require(&record, "member", format!("{org}/{subject}"))
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "member",
                format!("{org}/{subject}"),
            )
            .run(&self.db)
            .await?;

        info!(org = %org, subject = %subject, status, "Member status updated");
        self.get_member(org, subject).await
    }

    async fn list_members(&self, org: &str, pagination: Pagination) -> OtacResult<Page<Member>> {
        validation::check_name("organization", org)?;
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<MemberRow> = select_page(
            &self.db,
            "member",
            &[Some("org = $p.org"), Some(LISTED)],
            params([("org", ukey::org_key(org).into())]),
            &pagination,
        )
        .await?;
        Ok(member_page(rows, pagination.page_size))
    }

    async fn search_members(
        &self,
        org: &str,
        term: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<Member>> {
        validation::check_name("organization", org)?;
        validation::check_term(term)?;
        let pagination = pagination.validate(&self.limits)?;

        let rows: Vec<MemberRow> = select_page(
            &self.db,
            "member",
            &[
                Some("org = $p.org"),
                Some("terms CONTAINS $p.term"),
                Some(LISTED),
            ],
            params([("org", ukey::org_key(org).into()), ("term", term.into())]),
            &pagination,
        )
        .await?;
        Ok(member_page(rows, pagination.page_size))
    }

    async fn batch_add_ou_members(
        &self,
        org: &str,
        ou: &str,
        subjects: &[String],
    ) -> OtacResult<()> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", ou)?;
        validation::check_subjects(subjects, &self.limits)?;

        let record = rec("ou", &ukey::ou_key(org, ou));
        let mut mutation = Mutation::new().require(&record, "ou", format!("{org}/{ou}"));
        let mut links = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let member = rec("member", &ukey::member_key(org, subject));
            mutation = mutation.reject_if(
                format!("!({})", exists(&member)),
                format!("member {subject} of {org} not found"),
            );
            links.push(relate_once("ou_member", &record, &member));
        }
        for link in links {
            mutation = mutation.write(link);
        }
        mutation.run(&self.db).await?;

        info!(
            org = %org,
            ou = %ou,
            count = subjects.len(),
            "Members placed in organizational unit"
        );
        Ok(())
    }

    async fn list_ou_members(
        &self,
        org: &str,
        ou: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<Member>> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", ou)?;
        let pagination = pagination.validate(&self.limits)?;

        let held = format!(
            "id IN (SELECT VALUE out FROM ou_member WHERE in = {})",
            rec("ou", &ukey::ou_key(org, ou))
        );
        let rows: Vec<MemberRow> =
            select_page(
            &self.db,
            "member",
            &[Some(held.as_str()), Some(LISTED)],
            params([]),
            &pagination,
        )
        .await?;
        Ok(member_page(rows, pagination.page_size))
    }

    async fn list_ou_descendant_members(
        &self,
        org: &str,
        ou: &str,
        pagination: Pagination,
    ) -> OtacResult<Page<Member>> {
        validation::check_name("organization", org)?;
        validation::check_name("ou", ou)?;
        let pagination = pagination.validate(&self.limits)?;

        let lookup = Lookup::ou(org, ou);
        reach::resolve_targets(&self.db, std::slice::from_ref(&lookup), None).await?;
        let ous =
            reach::descendants(&self.db, "ou", "ou_parent", &[lookup.key().to_owned()]).await?;
        let held = format!(
            "id IN (SELECT VALUE out FROM ou_member WHERE in IN {})",
            rec_list("ou", &ous)
        );
        let rows: Vec<MemberRow> =
            select_page(
            &self.db,
            "member",
            &[Some(held.as_str()), Some(LISTED)],
            params([]),
            &pagination,
        )
        .await?;
        Ok(member_page(rows, pagination.page_size))
    }
}
