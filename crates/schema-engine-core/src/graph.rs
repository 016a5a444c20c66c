//! Pure graph algorithms over a dependency edge set.
//!
//! Every function here takes plain `i64` node ids and a `(from, to)` edge
//! list -- no SQL, no suspension points. `schema-engine-storage`'s
//! Dependency Resolver fetches the edge set for a transaction and calls
//! through to these; that split keeps the algorithms themselves trivially
//! unit-testable without a database.
//!
//! Edges point from a dependent node to the schema it depends on (`a -> b`
//! means "a depends on b"), matching [`crate::dependency::SchemaDependencyEdge`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Raised by [`execution_order`] when the induced subgraph is not a DAG.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circular dependency among: {0:?}")]
pub struct CircularDependency(pub Vec<i64>);

/// Computes a topological order of `ids` such that for every edge `a -> b`
/// with both ends in `ids`, `b` precedes `a` in the output -- i.e. the
/// order in which schemas must be activated/created so dependencies exist
/// before dependents.
///
/// Ties among independent nodes are broken by `tie_break_key` ascending
/// (the resolver passes `model_id`), for repeatable output. Raises
/// [`CircularDependency`] naming the residual set if any nodes remain
/// unresolved after Kahn's algorithm drains the zero-in-degree queue.
pub fn execution_order(
    ids: &[i64],
    edges: &[(i64, i64)],
    tie_break_key: &HashMap<i64, String>,
) -> Result<Vec<i64>, CircularDependency> {
    let id_set: HashSet<i64> = ids.iter().copied().collect();

    // in_degree here counts *unresolved dependencies* of each node within
    // the induced subgraph; a node is ready once all its dependencies have
    // been emitted.
    let mut in_degree: HashMap<i64, usize> = ids.iter().map(|&id| (id, 0)).collect();
    let mut dependents_of: HashMap<i64, Vec<i64>> = ids.iter().map(|&id| (id, Vec::new())).collect();

    for &(from, to) in edges {
        if id_set.contains(&from) && id_set.contains(&to) {
            *in_degree.get_mut(&from).unwrap() += 1;
            dependents_of.get_mut(&to).unwrap().push(from);
        }
    }

    let key_of = |id: &i64| tie_break_key.get(id).cloned().unwrap_or_default();

    let mut ready: Vec<i64> = ids.iter().copied().filter(|id| in_degree[id] == 0).collect();
    ready.sort_by_key(&key_of);

    let mut order = Vec::with_capacity(ids.len());
    let mut queue: VecDeque<i64> = ready.into();

    while let Some(node) = queue.pop_front() {
        order.push(node);
        let mut newly_ready = Vec::new();
        for &dependent in &dependents_of[&node] {
            let deg = in_degree.get_mut(&dependent).unwrap();
            *deg -= 1;
            if *deg == 0 {
                newly_ready.push(dependent);
            }
        }
        newly_ready.sort_by_key(&key_of);
        for n in newly_ready {
            queue.push_back(n);
        }
    }

    if order.len() != ids.len() {
        let emitted: HashSet<i64> = order.iter().copied().collect();
        let mut residual: Vec<i64> = ids.iter().copied().filter(|id| !emitted.contains(id)).collect();
        residual.sort_by_key(&key_of);
        return Err(CircularDependency(residual));
    }

    Ok(order)
}

/// Returns `true` if a candidate edge `candidate_from -> candidate_to`
/// would create a cycle, i.e. `candidate_to` can already reach
/// `candidate_from` by following existing outgoing dependency edges.
pub fn has_cycle(edges: &[(i64, i64)], candidate_from: i64, candidate_to: i64) -> bool {
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for &(from, to) in edges {
        adjacency.entry(from).or_default().push(to);
    }

    let mut visited = HashSet::new();
    let mut stack = vec![candidate_to];
    while let Some(node) = stack.pop() {
        if node == candidate_from {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            stack.extend(neighbors.iter().copied());
        }
    }
    false
}

/// A node discovered by [`dependency_chain`] or [`dependents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainNode {
    pub id: i64,
    pub depth: u32,
    /// The edge that led to this node from its parent in the traversal,
    /// `(parent_id, edge_index)`. `None` only for the (excluded) root.
    pub via_edge_index: usize,
}

/// BFS outward from `root` following outgoing dependency edges (what `root`
/// depends on, transitively), capped at `max_depth`. The root itself is not
/// included in the output.
pub fn dependency_chain(
    root: i64,
    edges: &[(i64, i64)],
    max_depth: u32,
) -> Vec<ChainNode> {
    traverse(root, edges, max_depth, Direction::Forward)
}

/// BFS outward from `root` following incoming dependency edges (who depends
/// on `root`, transitively), capped at `max_depth`. The root itself is not
/// included in the output.
pub fn dependents(root: i64, edges: &[(i64, i64)], max_depth: u32) -> Vec<ChainNode> {
    traverse(root, edges, max_depth, Direction::Reverse)
}

enum Direction {
    Forward,
    Reverse,
}

fn traverse(root: i64, edges: &[(i64, i64)], max_depth: u32, direction: Direction) -> Vec<ChainNode> {
    let mut adjacency: HashMap<i64, Vec<(i64, usize)>> = HashMap::new();
    for (idx, &(from, to)) in edges.iter().enumerate() {
        match direction {
            Direction::Forward => adjacency.entry(from).or_default().push((to, idx)),
            Direction::Reverse => adjacency.entry(to).or_default().push((from, idx)),
        }
    }

    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0u32)]);
    let mut out = Vec::new();

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            for &(next, edge_idx) in neighbors {
                if visited.insert(next) {
                    out.push(ChainNode { id: next, depth: depth + 1, via_edge_index: edge_idx });
                    queue.push_back((next, depth + 1));
                }
            }
        }
    }

    out
}

/// Aggregate counts over an edge set, keyed by node id: `(out_degree,
/// in_degree)` -- "depends on N others" and "N others depend on this".
pub fn degree_counts(node_ids: &[i64], edges: &[(i64, i64)]) -> BTreeMap<i64, (usize, usize)> {
    let mut counts: BTreeMap<i64, (usize, usize)> = node_ids.iter().map(|&id| (id, (0, 0))).collect();
    for &(from, to) in edges {
        if let Some(entry) = counts.get_mut(&from) {
            entry.0 += 1;
        }
        if let Some(entry) = counts.get_mut(&to) {
            entry.1 += 1;
        }
    }
    counts
}
