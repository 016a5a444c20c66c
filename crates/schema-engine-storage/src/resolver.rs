//! The Dependency Resolver -- wraps [`schema_engine_core::graph`]'s pure
//! `i64`-node algorithms with the [`SchemaDependencyEdge`] vocabulary the
//! repository actually stores, plus the statistics/`can_delete`/
//! `validate_graph` queries layered on top.
//!
//! Every function here is pure given an edge set and a tie-break key map;
//! fetching that edge set from SQLite is the caller's job
//! (`sqlite::dependencies`), keeping the graph math itself trivially
//! unit-testable.

use std::collections::HashMap;

use schema_engine_core::dependency::SchemaDependencyEdge;
use schema_engine_core::graph::{self, CircularDependency};

/// The reason a schema cannot currently be deleted, plus the dependents
/// that block it.
#[derive(Debug, Clone)]
pub struct CanDeleteResult {
    pub ok: bool,
    pub reason: Option<String>,
    pub blocking_dependents: Vec<i64>,
}

/// A node reached from the root in a [`dependency_chain`]/[`dependents`]
/// traversal.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub schema_id: i64,
    pub depth: u32,
    pub edge: SchemaDependencyEdge,
}

/// The result of [`validate_graph`]: the execution order over every
/// supplied (active) schema, plus any edge whose referent is missing or not
/// currently active.
#[derive(Debug, Clone, Default)]
pub struct GraphValidationReport {
    pub order: Vec<i64>,
    pub unresolved_edges: Vec<SchemaDependencyEdge>,
}

/// Aggregate statistics over a dependency edge set.
#[derive(Debug, Clone, Default)]
pub struct DependencyStatistics {
    pub total_schemas: usize,
    pub total_edges: usize,
    pub average_out_degree: f64,
    pub average_in_degree: f64,
    pub most_dependent: Option<(i64, String, usize)>,
    pub most_depended_on: Option<(i64, String, usize)>,
}

fn resolved_pairs(edges: &[SchemaDependencyEdge]) -> Vec<(i64, i64)> {
    edges
        .iter()
        .filter_map(|e| e.to_schema_id.map(|to| (e.from_schema_id, to)))
        .collect()
}

/// Like [`resolved_pairs`], but also returns a parallel vector mapping each
/// pair's index back to the originating edge, so a `via_edge_index` from
/// [`graph::dependency_chain`]/[`graph::dependents`] (which indexes into the
/// filtered pair list) can be resolved back to its [`SchemaDependencyEdge`].
fn resolved_pairs_with_source(edges: &[SchemaDependencyEdge]) -> (Vec<(i64, i64)>, Vec<&SchemaDependencyEdge>) {
    let mut pairs = Vec::new();
    let mut source = Vec::new();
    for e in edges {
        if let Some(to) = e.to_schema_id {
            pairs.push((e.from_schema_id, to));
            source.push(e);
        }
    }
    (pairs, source)
}

/// Topologically orders `schema_ids` over the subgraph induced by `edges`,
/// breaking ties by `model_id` (`tie_break_key`) ascending.
pub fn execution_order(
    schema_ids: &[i64],
    edges: &[SchemaDependencyEdge],
    tie_break_key: &HashMap<i64, String>,
) -> Result<Vec<i64>, CircularDependency> {
    let pairs = resolved_pairs(edges);
    graph::execution_order(schema_ids, &pairs, tie_break_key)
}

/// `true` if adding an edge `candidate_from -> candidate_to` would create a
/// cycle given the existing `edges`.
pub fn has_cycle(edges: &[SchemaDependencyEdge], candidate_from: i64, candidate_to: i64) -> bool {
    let pairs = resolved_pairs(edges);
    graph::has_cycle(&pairs, candidate_from, candidate_to)
}

/// BFS outward from `root` over what it depends on, capped at `max_depth`,
/// carrying the edge that reached each node.
pub fn dependency_chain(root: i64, edges: &[SchemaDependencyEdge], max_depth: u32) -> Vec<DependencyNode> {
    let (pairs, source) = resolved_pairs_with_source(edges);
    graph::dependency_chain(root, &pairs, max_depth)
        .into_iter()
        .map(|node| DependencyNode { schema_id: node.id, depth: node.depth, edge: source[node.via_edge_index].clone() })
        .collect()
}

/// Reverse traversal: everything that (transitively) depends on `root`.
pub fn dependents(root: i64, edges: &[SchemaDependencyEdge], max_depth: u32) -> Vec<DependencyNode> {
    let (pairs, source) = resolved_pairs_with_source(edges);
    graph::dependents(root, &pairs, max_depth)
        .into_iter()
        .map(|node| DependencyNode { schema_id: node.id, depth: node.depth, edge: source[node.via_edge_index].clone() })
        .collect()
}

/// `id` is safe to delete iff no other schema has a direct edge into it.
/// Recursive/transitive dependents never block deletion directly -- only
/// the immediate ones the repository's FK-style edges actually name.
pub fn can_delete(id: i64, edges: &[SchemaDependencyEdge]) -> CanDeleteResult {
    let direct_dependents = graph::dependents(id, &resolved_pairs(edges), 1);
    if direct_dependents.is_empty() {
        CanDeleteResult { ok: true, reason: None, blocking_dependents: Vec::new() }
    } else {
        let blocking: Vec<i64> = direct_dependents.iter().map(|n| n.id).collect();
        CanDeleteResult {
            ok: false,
            reason: Some(format!("{} schema(s) depend on this record", blocking.len())),
            blocking_dependents: blocking,
        }
    }
}

/// Runs `execution_order` over every id in `active_schema_ids` and reports
/// any edge among `edges` whose `to_schema_id` is absent or does not name
/// an active schema.
pub fn validate_graph(
    active_schema_ids: &[i64],
    edges: &[SchemaDependencyEdge],
    tie_break_key: &HashMap<i64, String>,
) -> Result<GraphValidationReport, CircularDependency> {
    let order = execution_order(active_schema_ids, edges, tie_break_key)?;

    let active_set: std::collections::HashSet<i64> = active_schema_ids.iter().copied().collect();
    let unresolved_edges: Vec<SchemaDependencyEdge> = edges
        .iter()
        .filter(|e| active_set.contains(&e.from_schema_id))
        .filter(|e| e.to_schema_id.is_none_or(|to| !active_set.contains(&to)))
        .cloned()
        .collect();

    Ok(GraphValidationReport { order, unresolved_edges })
}

/// Aggregate statistics over `edges` among `schema_ids`, with `model_id_of`
/// supplying the label used to break ties in `most_dependent`/
/// `most_depended_on` ascending.
pub fn statistics(
    schema_ids: &[i64],
    edges: &[SchemaDependencyEdge],
    model_id_of: &HashMap<i64, String>,
) -> DependencyStatistics {
    let pairs = resolved_pairs(edges);
    let counts = graph::degree_counts(schema_ids, &pairs);

    let total_schemas = schema_ids.len();
    let total_edges = pairs.len();

    let total_out: usize = counts.values().map(|(out, _)| out).sum();
    let total_in: usize = counts.values().map(|(_, inn)| inn).sum();
    let average_out_degree = if total_schemas == 0 { 0.0 } else { total_out as f64 / total_schemas as f64 };
    let average_in_degree = if total_schemas == 0 { 0.0 } else { total_in as f64 / total_schemas as f64 };

    let empty = String::new();
    let most_dependent = counts
        .iter()
        .map(|(&id, &(out, _))| (id, model_id_of.get(&id).unwrap_or(&empty).clone(), out))
        .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.1.cmp(&a.1)));
    let most_depended_on = counts
        .iter()
        .map(|(&id, &(_, inn))| (id, model_id_of.get(&id).unwrap_or(&empty).clone(), inn))
        .max_by(|a, b| a.2.cmp(&b.2).then_with(|| b.1.cmp(&a.1)));

    DependencyStatistics {
        total_schemas,
        total_edges,
        average_out_degree,
        average_in_degree,
        most_dependent,
        most_depended_on,
    }
}
