//! Request-scoped directed acyclic graph.
//!
//! An access check assembles a [`Dag`] from query results, prunes it to the
//! paths between the subject and the target with [`Dag::close`], then folds
//! permission grants along those paths with [`Dag::fold`]. The graph is
//! owned by a single request and never persisted.
//!
//! Vertex ids are unique across kinds (they are [`crate::ukey`] keys), so a
//! vertex is stored by id and its kind is verified on every access.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::error::OtacError;
use crate::models::permission::PermissionGrant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexKind {
    Subject,
    Unit,
    Object,
    Scope,
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subject => "Subject",
            Self::Unit => "Unit",
            Self::Object => "Object",
            Self::Scope => "Scope",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub kind: VertexKind,
    pub id: String,
    /// Grants loaded onto the vertex after the graph is closed. Units carry
    /// the grants they hand down; objects carry their override list.
    pub permissions: Vec<PermissionGrant>,
}

impl Vertex {
    pub fn new(kind: VertexKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            permissions: Vec::new(),
        }
    }

    pub fn subject(id: impl Into<String>) -> Self {
        Self::new(VertexKind::Subject, id)
    }

    pub fn unit(id: impl Into<String>) -> Self {
        Self::new(VertexKind::Unit, id)
    }

    pub fn object(id: impl Into<String>) -> Self {
        Self::new(VertexKind::Object, id)
    }

    pub fn scope(id: impl Into<String>) -> Self {
        Self::new(VertexKind::Scope, id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    #[error("edge {from} -> {to} would close a cycle")]
    Cycle { from: String, to: String },

    #[error("vertex {id} is a {existing}, not a {requested}")]
    KindMismatch {
        id: String,
        existing: VertexKind,
        requested: VertexKind,
    },
}

impl From<DagError> for OtacError {
    fn from(err: DagError) -> Self {
        OtacError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dag {
    vertices: HashMap<String, Vertex>,
    /// Outgoing edges with their weight.
    edges: HashMap<String, HashMap<String, i64>>,
    incoming: HashMap<String, HashSet<String>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|out| out.contains_key(to))
    }

    /// Insert a vertex on its own. An existing vertex of the same kind is
    /// left untouched.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), DagError> {
        match self.vertices.get(&vertex.id) {
            Some(existing) if existing.kind != vertex.kind => Err(DagError::KindMismatch {
                id: vertex.id,
                existing: existing.kind,
                requested: vertex.kind,
            }),
            Some(_) => Ok(()),
            None => {
                self.vertices.insert(vertex.id.clone(), vertex);
                Ok(())
            }
        }
    }

    /// Insert `from -> to`, adding either vertex if absent. Re-adding an
    /// existing edge is a no-op.
    pub fn add_edge(&mut self, from: Vertex, to: Vertex, weight: i64) -> Result<(), DagError> {
        self.check_kind(&from)?;
        self.check_kind(&to)?;
        if self.has_edge(&from.id, &to.id) {
            return Ok(());
        }
        if from.id == to.id || self.reaches(&to.id, &from.id) {
            return Err(DagError::Cycle {
                from: from.id,
                to: to.id,
            });
        }

        let (from_id, to_id) = (from.id.clone(), to.id.clone());
        self.add_vertex(from)?;
        self.add_vertex(to)?;
        self.edges
            .entry(from_id.clone())
            .or_default()
            .insert(to_id.clone(), weight);
        self.incoming.entry(to_id).or_default().insert(from_id);
        Ok(())
    }

    pub fn get_vertex(&self, kind: VertexKind, id: &str) -> Option<&Vertex> {
        self.vertices.get(id).filter(|v| v.kind == kind)
    }

    pub fn get_vertex_mut(&mut self, kind: VertexKind, id: &str) -> Option<&mut Vertex> {
        self.vertices.get_mut(id).filter(|v| v.kind == kind)
    }

    /// All vertices of `kind`, ordered by id when `sorted` is set.
    pub fn vertices(&self, kind: VertexKind, sorted: bool) -> Vec<&Vertex> {
        let mut out: Vec<&Vertex> = self.vertices.values().filter(|v| v.kind == kind).collect();
        if sorted {
            out.sort_by(|a, b| a.id.cmp(&b.id));
        }
        out
    }

    /// Ids of every vertex of `kind`, sorted.
    pub fn ids(&self, kind: VertexKind) -> Vec<String> {
        self.vertices(kind, true)
            .into_iter()
            .map(|v| v.id.clone())
            .collect()
    }

    /// Vertices without incoming edges, ordered by id.
    pub fn starting_vertices(&self) -> Vec<&Vertex> {
        let mut out: Vec<&Vertex> = self
            .vertices
            .values()
            .filter(|v| self.incoming.get(&v.id).is_none_or(HashSet::is_empty))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Children of `id`, ordered by id.
    pub fn children(&self, id: &str) -> Vec<&Vertex> {
        let mut out: Vec<&Vertex> = self
            .edges
            .get(id)
            .into_iter()
            .flat_map(HashMap::keys)
            .filter_map(|child| self.vertices.get(child))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// The sub-DAG of vertices and edges lying on some path from `start` to
    /// one of `ends`. With no `ends`, everything reachable from `start`.
    ///
    /// Returns an empty DAG when `start` is absent or reaches none of `ends`.
    pub fn close(&self, start: &str, ends: &[&str]) -> Dag {
        if !self.vertices.contains_key(start) {
            return Dag::new();
        }
        let forward = self.walk(std::iter::once(start), |id| {
            self.edges
                .get(id)
                .into_iter()
                .flat_map(|out| out.keys().map(String::as_str))
                .collect()
        });
        let keep = if ends.is_empty() {
            forward
        } else {
            let present = ends.iter().copied().filter(|e| self.vertices.contains_key(*e));
            let backward = self.walk(present, |id| {
                self.incoming
                    .get(id)
                    .into_iter()
                    .flat_map(|inc| inc.iter().map(String::as_str))
                    .collect()
            });
            if !backward.contains(start) {
                return Dag::new();
            }
            forward.intersection(&backward).copied().collect()
        };

        let mut closed = Dag::new();
        for id in &keep {
            if let Some(v) = self.vertices.get(*id) {
                closed.vertices.insert(v.id.clone(), v.clone());
            }
        }
        for from in &keep {
            let Some(out) = self.edges.get(*from) else {
                continue;
            };
            for (to, weight) in out {
                if keep.contains(to.as_str()) {
                    closed
                        .edges
                        .entry((*from).to_owned())
                        .or_default()
                        .insert(to.clone(), *weight);
                    closed
                        .incoming
                        .entry(to.clone())
                        .or_default()
                        .insert((*from).to_owned());
                }
            }
        }
        closed
    }

    /// A copy with every edge flipped.
    pub fn reverse(&self) -> Dag {
        let mut reversed = Dag {
            vertices: self.vertices.clone(),
            ..Dag::default()
        };
        for (from, out) in &self.edges {
            for (to, weight) in out {
                reversed
                    .edges
                    .entry(to.clone())
                    .or_default()
                    .insert(from.clone(), *weight);
                reversed
                    .incoming
                    .entry(from.clone())
                    .or_default()
                    .insert(to.clone());
            }
        }
        reversed
    }

    /// Union `other` into `self`. Fails on a kind mismatch for a shared id,
    /// or when the union would contain a cycle.
    pub fn merge(&mut self, other: &Dag) -> Result<(), DagError> {
        let mut ids: Vec<&String> = other.vertices.keys().collect();
        ids.sort();
        for id in ids {
            let vertex = &other.vertices[id];
            self.add_vertex(vertex.clone())?;
            if let Some(existing) = self.vertices.get_mut(id)
                && existing.permissions.is_empty()
            {
                existing.permissions = vertex.permissions.clone();
            }
        }
        let mut edges: Vec<(&String, &String, i64)> = other
            .edges
            .iter()
            .flat_map(|(from, out)| out.iter().map(move |(to, w)| (from, to, *w)))
            .collect();
        edges.sort();
        for (from, to, weight) in edges {
            let from = other.vertices[from].clone();
            let to = other.vertices[to].clone();
            self.add_edge(from, to, weight)?;
        }
        Ok(())
    }

    /// Depth-first fold from `start`.
    ///
    /// `visit(vertex, depth, acc)` receives the accumulator built along the
    /// current path and returns the one handed to the vertex's children.
    /// Every path ends at a vertex without children; the accumulators at
    /// those ends are concatenated into the result. An absent `start`
    /// yields an empty result.
    pub fn iterate<T, F>(&self, start: &str, seed: Vec<T>, mut visit: F) -> Vec<T>
    where
        T: Clone,
        F: FnMut(&Vertex, usize, Vec<T>) -> Vec<T>,
    {
        let mut out = Vec::new();
        if let Some(vertex) = self.vertices.get(start) {
            self.iterate_from(vertex, 0, seed, &mut visit, &mut out);
        }
        out
    }

    fn iterate_from<T, F>(
        &self,
        vertex: &Vertex,
        depth: usize,
        acc: Vec<T>,
        visit: &mut F,
        out: &mut Vec<T>,
    )
    where
        T: Clone,
        F: FnMut(&Vertex, usize, Vec<T>) -> Vec<T>,
    {
        let acc = visit(vertex, depth, acc);
        let children = self.children(&vertex.id);
        if children.is_empty() {
            out.extend(acc);
            return;
        }
        for child in children {
            self.iterate_from(child, depth + 1, acc.clone(), visit, out);
        }
    }

    /// Set fold from `start`, visiting every reachable vertex once.
    ///
    /// A vertex receives the union of its parents' outputs (`seed` for
    /// `start`) and `visit` maps that to its own output. The outputs of
    /// vertices without children are unioned into the result. When `visit`
    /// distributes over union this equals folding every path with
    /// [`Dag::iterate`] and unioning the ends, in time linear in the edges.
    pub fn fold<T, F>(&self, start: &str, seed: BTreeSet<T>, mut visit: F) -> BTreeSet<T>
    where
        T: Ord + Clone,
        F: FnMut(&Vertex, BTreeSet<T>) -> BTreeSet<T>,
    {
        let mut out = BTreeSet::new();
        let Some((start, _)) = self.vertices.get_key_value(start) else {
            return out;
        };
        let reachable = self.walk(std::iter::once(start.as_str()), |id| {
            self.children(id).into_iter().map(|v| v.id.as_str()).collect()
        });

        let mut pending: HashMap<&str, usize> = reachable
            .iter()
            .map(|id| {
                let parents = self.incoming.get(*id).map_or(0, |from| {
                    from.iter()
                        .filter(|p| reachable.contains(p.as_str()))
                        .count()
                });
                (*id, parents)
            })
            .collect();
        let mut inputs: HashMap<&str, BTreeSet<T>> = HashMap::new();
        inputs.insert(start.as_str(), seed);
        let mut ready: VecDeque<&str> = VecDeque::from([start.as_str()]);

        while let Some(id) = ready.pop_front() {
            let vertex = &self.vertices[id];
            let output = visit(vertex, inputs.remove(id).unwrap_or_default());
            let children = self.children(id);
            if children.is_empty() {
                out.extend(output);
                continue;
            }
            for child in children {
                let child = child.id.as_str();
                inputs.entry(child).or_default().extend(output.iter().cloned());
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }
        out
    }

    fn check_kind(&self, vertex: &Vertex) -> Result<(), DagError> {
        match self.vertices.get(&vertex.id) {
            Some(existing) if existing.kind != vertex.kind => Err(DagError::KindMismatch {
                id: vertex.id.clone(),
                existing: existing.kind,
                requested: vertex.kind,
            }),
            _ => Ok(()),
        }
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        self.walk(std::iter::once(from), |id| {
            self.edges
                .get(id)
                .into_iter()
                .flat_map(|out| out.keys().map(String::as_str))
                .collect()
        })
        .contains(to)
    }

    /// Breadth-first walk collecting every id reachable from `starts`
    /// (inclusive) through `next`.
    fn walk<'a, 's, I, N>(&'a self, starts: I, next: N) -> BTreeSet<&'a str>
    where
        I: Iterator<Item = &'s str>,
        N: Fn(&str) -> Vec<&'a str>,
    {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&'a str> = VecDeque::new();
        for s in starts {
            if let Some((key, _)) = self.vertices.get_key_value(s)
                && seen.insert(key.as_str())
            {
                queue.push_back(key.as_str());
            }
        }
        while let Some(id) = queue.pop_front() {
            for n in next(id) {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen
    }
}
