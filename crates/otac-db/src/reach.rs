//! Reachability builders: load the parts of the persisted graph an access
//! check needs into request-scoped [`Dag`]s.
//!
//! Hierarchies are walked one level per query with a seen-set instead of a
//! depth cap. Disabled units, scopes, OUs, members and organizations are pruned
//! during the walk; a disabled subject reaches nothing.

use std::collections::HashSet;

use otac_core::dag::{Dag, Vertex, VertexKind};
use otac_core::error::OtacResult;
use otac_core::models::access::PermissionFilter;
use otac_core::models::permission::{Extensions, PermissionGrant};
use otac_core::models::target::Target;
use otac_core::models::tenant::Tenant;
use otac_core::ukey;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::DbError;
use crate::query::{rec, rec_list};

/// One `child -> parent` edge, both ends as record keys.
#[derive(Debug, SurrealValue)]
struct EdgeRow {
    child: String,
    parent: String,
}

#[derive(Debug, SurrealValue)]
struct GrantRow {
    source: String,
    permission: String,
    extensions: Option<serde_json::Value>,
}

#[derive(Debug, SurrealValue)]
struct MemberRef {
    key: String,
    org: String,
}

async fn query_keys<C: Connection>(
    db: &Surreal<C>,
    sql: String,
    p: serde_json::Value,
) -> Result<Vec<String>, DbError> {
    let mut result = db
        .query(sql)
        .bind(("p", p))
        .await?
        .check()
        .map_err(DbError::from_statement)?;
    Ok(result.take(0)?)
}

async fn query_edges<C: Connection>(
    db: &Surreal<C>,
    sql: String,
) -> Result<Vec<EdgeRow>, DbError> {
    let mut result = db.query(sql).await?.check().map_err(DbError::from_statement)?;
    Ok(result.take(0)?)
}

/// Every `child -> parent` edge above `seeds` along `edge`. With
/// `active_only`, disabled parents and everything above them are skipped.
async fn ancestor_edges<C: Connection>(
    db: &Surreal<C>,
    table: &str,
    edge: &str,
    seeds: &[String],
    active_only: bool,
) -> Result<Vec<EdgeRow>, DbError> {
    let status = if active_only {
        " AND out.status >= 0"
    } else {
        ""
    };
    let mut seen: HashSet<String> = seeds.iter().cloned().collect();
    let mut frontier: Vec<String> = seeds.to_vec();
    let mut edges = Vec::new();

    while !frontier.is_empty() {
        let sql = format!(
            "SELECT meta::id(in) AS child, meta::id(out) AS parent FROM {edge} \
             WHERE in IN {}{status}",
            rec_list(table, &frontier)
        );
        let level = query_edges(db, sql).await?;
        frontier = level
            .iter()
            .filter(|e| seen.insert(e.parent.clone()))
            .map(|e| e.parent.clone())
            .collect();
        edges.extend(level);
    }
    Ok(edges)
}

/// `seeds` and every record below them along `edge`, seeds first.
pub(crate) async fn descendants<C: Connection>(
    db: &Surreal<C>,
    table: &str,
    edge: &str,
    seeds: &[String],
) -> Result<Vec<String>, DbError> {
    let mut seen: HashSet<String> = seeds.iter().cloned().collect();
    let mut all: Vec<String> = seeds.to_vec();
    let mut frontier: Vec<String> = seeds.to_vec();

    while !frontier.is_empty() {
        let sql = format!(
            "SELECT VALUE meta::id(in) FROM {edge} WHERE out IN {}",
            rec_list(table, &frontier)
        );
        let children = query_keys(db, sql, serde_json::Value::Null).await?;
        frontier = children
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        all.extend(frontier.iter().cloned());
    }
    Ok(all)
}

/// Units the subject belongs to directly.
async fn direct_units<C: Connection>(
    db: &Surreal<C>,
    tenant: &str,
    subject: &str,
) -> Result<Vec<String>, DbError> {
    let sql = format!(
        "SELECT VALUE meta::id(in) FROM unit_subject \
         WHERE out = subject:`{subject}` AND out.status >= 0 \
         AND in.tenant = $p.tenant AND in.status >= 0"
    );
    query_keys(db, sql, serde_json::json!({ "tenant": tenant })).await
}

/// Units reached through the subject's organization memberships: units
/// created from the member itself, from an OU holding the member (or any
/// OU above it), or from the member's organization.
async fn organization_units<C: Connection>(
    db: &Surreal<C>,
    tenant: &str,
    subject_external_id: &str,
) -> Result<Vec<String>, DbError> {
    let mut result = db
        .query(
            "SELECT meta::id(id) AS key, org FROM member \
             WHERE subject = $p.subject AND status >= 0 \
             AND org NOT IN (SELECT VALUE meta::id(id) FROM organization WHERE status < 0) \
             AND subject NOT IN (SELECT VALUE external_id FROM subject WHERE status < 0)",
        )
        .bind(("p", serde_json::json!({ "subject": subject_external_id })))
        .await?
        .check()
        .map_err(DbError::from_statement)?;
    let members: Vec<MemberRef> = result.take(0)?;
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let member_keys: Vec<String> = members.iter().map(|m| m.key.clone()).collect();
    let mut orgs: Vec<String> = members.into_iter().map(|m| m.org).collect();
    orgs.sort();
    orgs.dedup();
    let p = serde_json::json!({ "tenant": tenant });
    let unit_filter = "in.tenant = $p.tenant AND in.status >= 0";

    let mut units = query_keys(
        db,
        format!(
            "SELECT VALUE meta::id(in) FROM unit_member WHERE out IN {} AND {unit_filter}",
            rec_list("member", &member_keys)
        ),
        p.clone(),
    )
    .await?;

    let mut ous = query_keys(
        db,
        format!(
            "SELECT VALUE meta::id(in) FROM ou_member WHERE out IN {} AND in.status >= 0",
            rec_list("member", &member_keys)
        ),
        serde_json::Value::Null,
    )
    .await?;
    if !ous.is_empty() {
        let above = ancestor_edges(db, "ou", "ou_parent", &ous, true).await?;
        ous.extend(above.into_iter().map(|e| e.parent));
        ous.sort();
        ous.dedup();
        units.extend(
            query_keys(
                db,
                format!(
                    "SELECT VALUE meta::id(in) FROM unit_ou WHERE out IN {} AND {unit_filter}",
                    rec_list("ou", &ous)
                ),
                p.clone(),
            )
            .await?,
        );
    }

    units.extend(
        query_keys(
            db,
            format!(
                "SELECT VALUE meta::id(in) FROM unit_org WHERE out IN {} \
                 AND out.status >= 0 AND {unit_filter}",
                rec_list("organization", &orgs)
            ),
            p,
        )
        .await?,
    );
    units.sort();
    units.dedup();
    Ok(units)
}

/// The subject's unit DAG: `subject -> unit` for every unit the subject
/// belongs to, then `unit -> parent` up each hierarchy.
pub(crate) async fn subject_dag<C: Connection>(
    db: &Surreal<C>,
    tenant: &str,
    subject_key: &str,
    subject_external_id: &str,
    with_organization: bool,
) -> OtacResult<Dag> {
    let mut units = direct_units(db, tenant, subject_key).await?;
    if with_organization {
        units.extend(organization_units(db, tenant, subject_external_id).await?);
        units.sort();
        units.dedup();
    }

    let mut dag = Dag::new();
    dag.add_vertex(Vertex::subject(subject_key))?;
    for unit in &units {
        dag.add_edge(Vertex::subject(subject_key), Vertex::unit(unit), 0)?;
    }
    for edge in ancestor_edges(db, "unit", "unit_parent", &units, true).await? {
        dag.add_edge(Vertex::unit(edge.child), Vertex::unit(edge.parent), 0)?;
    }
    Ok(dag)
}

/// The object's DAG: the object itself, `object -> parent` up its
/// hierarchy, and the links from every object in it to units and (unless
/// `ignore_scope`) scopes.
pub(crate) async fn object_dag<C: Connection>(
    db: &Surreal<C>,
    object_key: &str,
    ignore_scope: bool,
) -> OtacResult<Dag> {
    let mut dag = Dag::new();
    dag.add_vertex(Vertex::object(object_key))?;
    let seeds = vec![object_key.to_owned()];
    for edge in ancestor_edges(db, "object", "object_parent", &seeds, false).await? {
        dag.add_edge(Vertex::object(edge.child), Vertex::object(edge.parent), 0)?;
    }

    let objects = rec_list("object", &dag.ids(VertexKind::Object));
    let sql = format!(
        "SELECT meta::id(in) AS child, meta::id(out) AS parent FROM object_unit \
         WHERE in IN {objects} AND out.status >= 0"
    );
    for edge in query_edges(db, sql).await? {
        dag.add_edge(Vertex::object(edge.child), Vertex::unit(edge.parent), 0)?;
    }
    if !ignore_scope {
        let sql = format!(
            "SELECT meta::id(in) AS child, meta::id(out) AS parent FROM object_scope \
             WHERE in IN {objects} AND out.status >= 0"
        );
        for edge in query_edges(db, sql).await? {
            dag.add_edge(Vertex::object(edge.child), Vertex::scope(edge.parent), 0)?;
        }
    }
    Ok(dag)
}

/// Add `unit -> scope` for every unit of `dag` attached to one of `scopes`.
pub(crate) async fn link_scopes<C: Connection>(
    db: &Surreal<C>,
    dag: &mut Dag,
    scopes: &[String],
) -> OtacResult<()> {
    let units = dag.ids(VertexKind::Unit);
    if units.is_empty() || scopes.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "SELECT meta::id(in) AS child, meta::id(out) AS parent FROM unit_scope \
         WHERE in IN {} AND out IN {} AND out.status >= 0",
        rec_list("unit", &units),
        rec_list("scope", scopes)
    );
    for edge in query_edges(db, sql).await? {
        dag.add_edge(Vertex::unit(edge.child), Vertex::scope(edge.parent), 0)?;
    }
    Ok(())
}

/// Attach to every unit vertex the grants it holds that pass `filter`, and
/// to every object vertex its own permission list.
pub(crate) async fn load_grants<C: Connection>(
    db: &Surreal<C>,
    dag: &mut Dag,
    filter: &PermissionFilter,
) -> OtacResult<()> {
    let units = dag.ids(VertexKind::Unit);
    if !units.is_empty() {
        let (clause, p) = match filter {
            PermissionFilter::Names(names) => (
                " AND out.name IN $p.names",
                serde_json::json!({ "names": names }),
            ),
            PermissionFilter::Resources(resources) if !resources.is_empty() => (
                " AND out.resource IN $p.resources",
                serde_json::json!({ "resources": resources }),
            ),
            PermissionFilter::Resources(_) => ("", serde_json::Value::Null),
        };
        let sql = format!(
            "SELECT meta::id(in) AS source, out.name AS permission, extensions \
             FROM unit_permission WHERE in IN {}{clause} ORDER BY permission ASC",
            rec_list("unit", &units)
        );
        let mut result = db
            .query(sql)
            .bind(("p", p))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_statement)?;
        let rows: Vec<GrantRow> = result.take(0).map_err(DbError::from)?;
        for row in rows {
            let extensions = match row.extensions {
                Some(serde_json::Value::Object(map)) => map,
                _ => Extensions::new(),
            };
            if let Some(vertex) = dag.get_vertex_mut(VertexKind::Unit, &row.source) {
                vertex.permissions.push(PermissionGrant {
                    permission: row.permission,
                    extensions,
                });
            }
        }
    }

    let objects = dag.ids(VertexKind::Object);
    if !objects.is_empty() {
        let sql = format!(
            "SELECT meta::id(in) AS source, out.name AS permission, NONE AS extensions \
             FROM object_permission WHERE in IN {}",
            rec_list("object", &objects)
        );
        let mut result = db
            .query(sql)
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_statement)?;
        let rows: Vec<GrantRow> = result.take(0).map_err(DbError::from)?;
        for row in rows {
            if let Some(vertex) = dag.get_vertex_mut(VertexKind::Object, &row.source) {
                vertex.permissions.push(PermissionGrant::new(row.permission));
            }
        }
    }
    Ok(())
}

/// One unit, object, scope or OU to resolve with [`resolve_targets`].
#[derive(Debug, Clone)]
pub(crate) struct Lookup {
    table: &'static str,
    key: String,
    name: String,
}

impl Lookup {
    pub(crate) fn unit(tenant: &Tenant, unit: &Target) -> Self {
        Self {
            table: "unit",
            key: ukey::unit_key(&tenant.key, &unit.target_type, &unit.target_id),
            name: unit.to_string(),
        }
    }

    pub(crate) fn object(tenant: &Tenant, object: &Target) -> Self {
        Self {
            table: "object",
            key: ukey::object_key(&tenant.key, &object.target_type, &object.target_id),
            name: object.to_string(),
        }
    }

    pub(crate) fn scope(tenant: &Tenant, scope: &Target) -> Self {
        Self {
            table: "scope",
            key: ukey::scope_key(&tenant.key, &scope.target_type, &scope.target_id),
            name: scope.to_string(),
        }
    }

    pub(crate) fn ou(org: &str, ou: &str) -> Self {
        Self {
            table: "ou",
            key: ukey::ou_key(org, ou),
            name: format!("{org}/{ou}"),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Objects carry no status.
    fn has_status(&self) -> bool {
        self.table != "object"
    }
}

/// Resolve every lookup in one round trip. A target that is absent, or
/// whose status is below `min_status` when given, fails with `NotFound`
/// naming it; the first such target in request order is reported.
pub(crate) async fn resolve_targets<C: Connection>(
    db: &Surreal<C>,
    lookups: &[Lookup],
    min_status: Option<i64>,
) -> Result<(), DbError> {
    if lookups.is_empty() {
        return Ok(());
    }
    let statements: Vec<String> = lookups
        .iter()
        .map(|lookup| {
            let status = match min_status {
                Some(_) if lookup.has_status() => " WHERE status >= $min_status",
                _ => "",
            };
            format!(
                "SELECT VALUE meta::id(id) FROM {}{status};",
                rec(lookup.table, &lookup.key)
            )
        })
        .collect();
    let mut result = db
        .query(statements.join(" "))
        .bind(("min_status", min_status.unwrap_or_default()))
        .await?
        .check()
        .map_err(DbError::from_statement)?;
    for (i, lookup) in lookups.iter().enumerate() {
        let found: Vec<String> = result.take(i)?;
        if found.is_empty() {
            return Err(DbError::NotFound {
                entity: lookup.table.to_owned(),
                id: lookup.name.clone(),
            });
        }
    }
    Ok(())
}
