//! Permission aggregation over a closed DAG.
//!
//! Storage fills vertex grants; everything here is pure so the decision
//! procedure can be tested without a database. Boolean and detail answers
//! share one fold and differ only in [`project`].

use std::collections::BTreeSet;

use crate::dag::{Dag, DagError, VertexKind};
use crate::models::access::{CheckOutcome, PermissionPayload};
use crate::models::permission::Extensions;
use crate::models::target::Target;

/// A unit grant tagged with the unit that holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub source: String,
    pub permission: String,
    pub extensions: Extensions,
}

/// Every grant held by a unit vertex, in unit order. Used by unit and scope
/// checks, where no object can filter the result.
pub fn unit_grants(dag: &Dag) -> Vec<Grant> {
    dag.vertices(VertexKind::Unit, true)
        .into_iter()
        .flat_map(|unit| {
            unit.permissions.iter().map(|p| Grant {
                source: unit.id.clone(),
                permission: p.permission.clone(),
                extensions: p.extensions.clone(),
            })
        })
        .collect()
}

/// Fold grants from `start` down every path, applying object overrides.
///
/// A unit adds its grants to the running set. An object with a non-empty
/// permission list keeps only the grants named in that list; an object
/// with an empty list passes the set through. Both steps distribute over
/// union, so each vertex is folded once over the union of what reaches it.
/// The same grant reached along several paths is reported once.
pub fn fold_with_overrides(dag: &Dag, start: &str) -> Vec<Grant> {
    let reached = dag.fold(
        start,
        BTreeSet::new(),
        |vertex, mut acc: BTreeSet<(String, String)>| {
            match vertex.kind {
                VertexKind::Unit => {
                    acc.extend(
                        vertex
                            .permissions
                            .iter()
                            .map(|p| (vertex.id.clone(), p.permission.clone())),
                    );
                }
                VertexKind::Object if !vertex.permissions.is_empty() => {
                    acc.retain(|(_, permission)| {
                        vertex.permissions.iter().any(|p| &p.permission == permission)
                    });
                }
                VertexKind::Object | VertexKind::Subject | VertexKind::Scope => {}
            }
            acc
        },
    );

    reached
        .into_iter()
        .filter_map(|(source, permission)| {
            let unit = dag.get_vertex(VertexKind::Unit, &source)?;
            let held = unit.permissions.iter().find(|p| p.permission == permission)?;
            Some(Grant {
                extensions: held.extensions.clone(),
                source,
                permission,
            })
        })
        .collect()
}

/// Join the subject's unit DAG with an object's ancestor DAG and close the
/// result between the two.
///
/// `objects` points child to parent and object to its linked units and
/// scopes; it is reversed so a single forward walk goes from the subject
/// through units (and scopes) down to the object.
pub fn join_object_dag(
    units: &Dag,
    objects: &Dag,
    subject: &str,
    object: &str,
) -> Result<Dag, DagError> {
    let mut merged = units.clone();
    merged.merge(&objects.reverse())?;
    Ok(merged.close(subject, &[object]))
}

/// Project folded grants into the answer shape the caller asked for.
/// Payloads name `target`, the entity the check was made against.
pub fn project(grants: Vec<Grant>, target: &Target, detail: bool) -> CheckOutcome {
    if !detail {
        return CheckOutcome::Granted(!grants.is_empty());
    }
    CheckOutcome::Detail(
        grants
            .into_iter()
            .map(|g| PermissionPayload {
                target_type: target.target_type.clone(),
                target_id: target.target_id.clone(),
                permission: g.permission,
                extensions: (!g.extensions.is_empty()).then_some(g.extensions),
            })
            .collect(),
    )
}
