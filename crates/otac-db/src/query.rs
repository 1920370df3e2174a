//! SurrealQL building blocks shared by the repositories.
//!
//! Node keys come from `otac_core::ukey` (URL-safe base64), so they are
//! embedded directly as record literals; user-supplied values always travel
//! as bound parameters.

use otac_core::repository::Pagination;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::{
    DbError, THROW_BAD_REQUEST, THROW_CONFLICT, THROW_NOT_FOUND, THROW_UNPROCESSABLE,
};
use crate::schema::EDGES;

/// Record literal `table:`key``.
pub(crate) fn rec(table: &str, key: &str) -> String {
    format!("{table}:`{key}`")
}

/// Array literal of records.
pub(crate) fn rec_list<S: AsRef<str>>(table: &str, keys: &[S]) -> String {
    let items: Vec<String> = keys.iter().map(|k| rec(table, k.as_ref())).collect();
    format!("[{}]", items.join(", "))
}

/// Condition true when `record` exists.
pub(crate) fn exists(record: &str) -> String {
    format!("array::len((SELECT VALUE id FROM {record})) > 0")
}

/// Condition true when an `edge` from `from` to `to` exists.
pub(crate) fn edge_exists(edge: &str, from: &str, to: &str) -> String {
    format!("array::len((SELECT VALUE id FROM {edge} WHERE in = {from} AND out = {to})) > 0")
}

/// Relate `from -> edge -> to` unless that edge already exists.
pub(crate) fn relate_once(edge: &str, from: &str, to: &str) -> String {
    format!(
        "IF !({}) {{ RELATE {from}->{edge}->{to} }}",
        edge_exists(edge, from, to)
    )
}

/// Create `record` with `assignments` unless it already exists.
pub(crate) fn create_once(record: &str, assignments: &str) -> String {
    format!(
        "IF !({}) {{ CREATE {record} SET {assignments} }}",
        exists(record)
    )
}

/// Statements deleting the `table` records selected by `selector` (an
/// array expression of record ids) together with every edge touching them.
pub(crate) fn purge(table: &str, selector: &str) -> Vec<String> {
    let mut statements = Vec::new();
    for (edge, from, to) in EDGES {
        if *from == table {
            statements.push(format!("DELETE {edge} WHERE in IN {selector}"));
        }
        if *to == table {
            statements.push(format!("DELETE {edge} WHERE out IN {selector}"));
        }
    }
    statements.push(format!("DELETE {table} WHERE id IN {selector}"));
    statements
}

/// Condition true when `child` equals `parent` or is one of its ancestors
/// along `edge` within `table`. Adding `child -> parent` would then close
/// a cycle.
pub(crate) fn closes_cycle(table: &str, edge: &str, child: &str, parent: &str) -> String {
    format!("({child} = {parent} OR {child} IN {parent}.{{..+collect}}->{edge}->{table})")
}

/// One atomic guarded write: a chain of guards evaluated in order, each
/// raising a typed error, then the writes. SurrealDB runs a single `IF`
/// statement in one transaction, so the checks and writes cannot be
/// interleaved with another writer.
#[derive(Debug, Default)]
pub(crate) struct Mutation {
    guards: Vec<(String, String)>,
    writes: Vec<String>,
    params: serde_json::Map<String, serde_json::Value>,
}

impl Mutation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail with a conflict when `condition` holds.
    pub(crate) fn conflict_if(self, condition: String, message: impl Into<String>) -> Self {
        self.guard(condition, THROW_CONFLICT, message.into())
    }

    /// Fail with not-found unless `record` exists. `entity` and `id` name
    /// it in the error.
    pub(crate) fn require(self, record: &str, entity: &str, id: impl std::fmt::Display) -> Self {
        let condition = format!("!({})", exists(record));
        self.guard(condition, THROW_NOT_FOUND, format!("{entity} {id}"))
    }

    /// Fail with a bad request when `condition` holds.
    pub(crate) fn reject_if(self, condition: String, message: impl Into<String>) -> Self {
        self.guard(condition, THROW_BAD_REQUEST, message.into())
    }

    pub(crate) fn write(mut self, statement: impl Into<String>) -> Self {
        self.writes.push(statement.into());
        self
    }

    /// An `UPDATE` that must touch exactly one record; any other count
    /// aborts the whole mutation as unprocessable. `entity` and `id` name
    /// the record in the error.
    pub(crate) fn update_one(
        mut self,
        statement: impl std::fmt::Display,
        entity: &str,
        id: impl std::fmt::Display,
    ) -> Self {
        let n = self.writes.len();
        let name = format!("update{n}");
        self.params.insert(
            name.clone(),
            format!("{THROW_UNPROCESSABLE}{entity} {id} matched an unexpected number of records")
                .into(),
        );
        self.writes.push(format!(
            "LET $updated{n} = ({statement}); \
             IF array::len($updated{n}) != 1 {{ THROW $p.{name} }}"
        ));
        self
    }

    /// Bind a value reachable as `$p.<name>`.
    pub(crate) fn param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.to_owned(), value.into());
        self
    }

    fn guard(mut self, condition: String, marker: &str, message: String) -> Self {
        let name = format!("guard{}", self.guards.len());
        self.params
            .insert(name.clone(), format!("{marker}{message}").into());
        self.guards.push((condition, name));
        self
    }

    pub(crate) fn to_sql(&self) -> String {
        let body = if self.writes.is_empty() {
            "NONE".to_owned()
        } else {
            self.writes.join("; ")
        };
        if self.guards.is_empty() {
            return format!("IF true {{ {body} }};");
        }
        let mut sql = String::new();
        for (i, (condition, name)) in self.guards.iter().enumerate() {
            if i > 0 {
                sql.push_str(" ELSE ");
            }
            sql.push_str(&format!("IF {condition} {{ THROW $p.{name} }}"));
        }
        sql.push_str(&format!(" ELSE {{ {body} }};"));
        sql
    }

    pub(crate) async fn run<C: Connection>(self, db: &Surreal<C>) -> Result<(), DbError> {
        let sql = self.to_sql();
        db.query(sql)
            .bind(("p", serde_json::Value::Object(self.params)))
            .await?
            .check()
            .map_err(DbError::from_statement)?;
        Ok(())
    }
}

/// Fetch the listed records of `table`, ordered by key. Missing keys are
/// skipped.
pub(crate) async fn select_records<C, R, S>(
    db: &Surreal<C>,
    table: &str,
    keys: &[S],
) -> Result<Vec<R>, DbError>
where
    C: Connection,
    R: SurrealValue,
    S: AsRef<str>,
{
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT meta::id(id) AS record_id, * FROM {} ORDER BY record_id ASC",
        rec_list(table, keys)
    );
    let mut result = db.query(sql).await?.check().map_err(DbError::from_statement)?;
    Ok(result.take(0)?)
}

/// Fetch a single record, or `NotFound` naming it by `id`. More than one
/// row is an integrity violation.
pub(crate) async fn select_one<C, R>(
    db: &Surreal<C>,
    table: &str,
    key: &str,
    entity: &str,
    id: impl std::fmt::Display,
) -> Result<R, DbError>
where
    C: Connection,
    R: SurrealValue,
{
    let rows: Vec<R> = select_records(db, table, &[key]).await?;
    one_row(rows, entity, id)
}

fn one_row<R>(rows: Vec<R>, entity: &str, id: impl std::fmt::Display) -> Result<R, DbError> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (Some(row), 1) => Ok(row),
        (None, _) => Err(DbError::NotFound {
            entity: entity.to_owned(),
            id: id.to_string(),
        }),
        (Some(_), _) => Err(DbError::Unprocessable(format!(
            "{entity} {id} matched {count} records"
        ))),
    }
}

/// Filter for listings of records that carry a status.
pub(crate) const LISTED: &str = "status >= $min_status";

/// Select one keyset page of `table` rows ordered by key.
///
/// `filters` may reference values bound in `params` as `$p.<name>`, and
/// [`LISTED`] the page's minimum status.
pub(crate) async fn select_page<C, R>(
    db: &Surreal<C>,
    table: &str,
    filters: &[Option<&str>],
    params: serde_json::Map<String, serde_json::Value>,
    pagination: &Pagination,
) -> Result<Vec<R>, DbError>
where
    C: Connection,
    R: SurrealValue,
{
    let after = pagination
        .page_token
        .as_ref()
        .map(|_| "meta::id(id) > $after");
    let mut clauses = filters.to_vec();
    clauses.push(after);
    let sql = format!(
        "SELECT meta::id(id) AS record_id, * FROM {table} {} \
         ORDER BY record_id ASC LIMIT $limit START $start",
        where_all(&clauses)
    );
    let mut result = db
        .query(sql)
        .bind(("p", serde_json::Value::Object(params)))
        .bind(("after", pagination.page_token.clone().unwrap_or_default()))
        .bind(("limit", pagination.page_size))
        .bind(("start", pagination.skip))
        .bind(("min_status", pagination.min_status))
        .await?
        .check()
        .map_err(DbError::from_statement)?;
    Ok(result.take(0)?)
}

/// Parameter object for [`select_page`].
pub(crate) fn params<const N: usize>(
    pairs: [(&str, serde_json::Value); N],
) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

/// Join optional `WHERE` fragments with `AND`.
pub(crate) fn where_all(clauses: &[Option<&str>]) -> String {
    let parts: Vec<&str> = clauses.iter().flatten().copied().collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", parts.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_literals() {
        assert_eq!(rec("unit", "abc"), "unit:`abc`");
        assert_eq!(rec_list("unit", &["a", "b"]), "[unit:`a`, unit:`b`]");
        assert_eq!(rec_list::<&str>("unit", &[]), "[]");
    }

    #[test]
    fn guards_chain_before_writes() {
        let m = Mutation::new()
            .require("unit:`a`", "unit", "dept/eng")
            .conflict_if("x".into(), "boom")
            .write("CREATE unit:`b`");
        let sql = m.to_sql();
        assert!(sql.starts_with("IF !(array::len"));
        assert!(sql.contains("THROW $p.guard0"));
        assert!(sql.contains("ELSE IF x { THROW $p.guard1 }"));
        assert!(sql.ends_with("ELSE { CREATE unit:`b` };"));
        assert_eq!(
            m.params["guard1"],
            serde_json::Value::from(format!("{THROW_CONFLICT}boom"))
        );
    }

    #[test]
    fn update_one_checks_the_affected_count() {
        let m = Mutation::new()
            .require("unit:`a`", "unit", "dept/eng")
            .update_one("UPDATE unit:`a` SET status = $p.status", "unit", "dept/eng");
        let sql = m.to_sql();
        assert!(sql.contains(
            "LET $updated0 = (UPDATE unit:`a` SET status = $p.status); \
             IF array::len($updated0) != 1 { THROW $p.update0 }"
        ));
        assert!(
            m.params["update0"]
                .as_str()
                .is_some_and(|s| s.starts_with(THROW_UNPROCESSABLE))
        );
    }

    #[test]
    fn single_row_lookups_reject_ambiguity() {
        assert_eq!(one_row(vec![7], "unit", "dept/eng").unwrap(), 7);
        assert!(matches!(
            one_row(Vec::<i32>::new(), "unit", "dept/eng"),
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            one_row(vec![1, 2], "unit", "dept/eng"),
            Err(DbError::Unprocessable(_))
        ));
    }

    #[test]
    fn unguarded_writes_still_run_as_one_statement() {
        let sql = Mutation::new().write("A").write("B").to_sql();
        assert_eq!(sql, "IF true { A; B };");
    }

    #[test]
    fn purge_removes_edges_on_both_sides_before_nodes() {
        let statements = purge("unit", "$units");
        assert!(statements.contains(&"DELETE unit_parent WHERE in IN $units".to_owned()));
        assert!(statements.contains(&"DELETE unit_parent WHERE out IN $units".to_owned()));
        assert!(statements.contains(&"DELETE object_unit WHERE out IN $units".to_owned()));
        assert_eq!(
            statements.last().map(String::as_str),
            Some("DELETE unit WHERE id IN $units")
        );
    }

    #[test]
    fn where_all_skips_missing() {
        assert_eq!(where_all(&[None, None]), "");
        assert_eq!(
            where_all(&[Some("a = 1"), None, Some("b = 2")]),
            "WHERE a = 1 AND b = 2"
        );
    }
}
