//! SurrealDB implementation of [`SubjectRepository`].

use otac_core::error::OtacResult;
use otac_core::models::subject::Subject;
use otac_core::options::RequestOptions;
use otac_core::repository::{Page, Pagination, SubjectRepository};
use otac_core::ukey;
use otac_core::validation::{self, Limits};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::query::{
    LISTED, Mutation, create_once, exists, params, rec, select_one, select_page, select_records,
};

#[derive(Debug, SurrealValue)]
pub(crate) struct SubjectRow {
    record_id: String,
    external_id: String,
    status: i64,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            key: row.record_id,
            external_id: row.external_id,
            status: row.status,
        }
    }
}

/// Append the creation of every missing subject in `subjects` to
/// `mutation`. Parameters are named `<prefix><index>`.
pub(crate) fn create_subjects(
    mut mutation: Mutation,
    subjects: &[String],
    prefix: &str,
) -> Mutation {
    for (i, subject) in subjects.iter().enumerate() {
        let name = format!("{prefix}{i}");
        let record = rec("subject", &ukey::subject_key(subject));
        mutation = mutation
            .param(&name, subject.as_str())
            .write(create_once(&record, &format!("external_id = $p.{name}")));
    }
    mutation
}

/// SurrealDB implementation of the Subject repository.
#[derive(Clone)]
pub struct SurrealSubjectRepository<C: Connection> {
    db: Surreal<C>,
    limits: Limits,
}

impl<C: Connection> SurrealSubjectRepository<C> {
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

impl<C: Connection> SubjectRepository for SurrealSubjectRepository<C> {
    async fn batch_add(&self, subjects: &[String], options: RequestOptions) -> OtacResult<()> {
        validation::check_subjects(subjects, &self.limits)?;

        let mut mutation = Mutation::new();
        if options.strict_create {
            for subject in subjects {
                let record = rec("subject", &ukey::subject_key(subject));
                mutation =
                    mutation.conflict_if(exists(&record), format!("subject {subject} exists"));
            }
        }
        create_subjects(mutation, subjects, "s").run(&self.db).await?;

        info!(count = subjects.len(), "Subjects added");
        Ok(())
    }

    async fn acquire_or_add(&self, subjects: &[String]) -> OtacResult<Vec<Subject>> {
        validation::check_subjects(subjects, &self.limits)?;
        create_subjects(Mutation::new(), subjects, "s")
            .run(&self.db)
            .await?;

        let keys: Vec<String> = subjects.iter().map(|s| ukey::subject_key(s)).collect();
        let rows: Vec<SubjectRow> = select_records(&self.db, "subject", &keys).await?;
        let mut found: Vec<Subject> = rows.into_iter().map(Subject::from).collect();
        // Keep the caller's order.
        found.sort_by_key(|s| subjects.iter().position(|x| *x == s.external_id));
        Ok(found)
    }

    async fn get(&self, subject: &str) -> OtacResult<Subject> {
        validation::check_subject(subject)?;
        let key = ukey::subject_key(subject);
        let row: SubjectRow = select_one(&self.db, "subject", &key, "subject", subject).await?;
        Ok(row.into())
    }

    async fn list(&self, pagination: Pagination) -> OtacResult<Page<Subject>> {
        let pagination = pagination.validate(&self.limits)?;
        let rows: Vec<SubjectRow> =
            select_page(&self.db, "subject", &[Some(LISTED)], params([]), &pagination).await?;
        let items = rows.into_iter().map(Subject::from).collect();
        Ok(Page::new(items, pagination.page_size, |s: &Subject| {
            s.key.as_str()
        }))
    }

    async fn update_status(&self, subject: &str, status: i64) -> OtacResult<Subject> {
        validation::check_subject(subject)?;
        let record = rec("subject", &ukey::subject_key(subject));
        Mutation::new()
            .require(&record, "subject", subject)
            .param("status", status)
            .update_one(
                format!("UPDATE {record} SET status = $p.status"),
                "subject",
                subject,
            )
            .run(&self.db)
            .await?;

        info!(subject = %subject, status, "Subject status updated");
        self.get(subject).await
    }
}
