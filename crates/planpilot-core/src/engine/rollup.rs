//! Dependency roll-up: deriving parent-level blocking edges from
//! child-level dependencies.
//!
//! If a child of parent A depends on a child of parent B (A != B), then A
//! is blocked by B, recursively up the hierarchy: a task-level dependency
//! rolls up to the story level and again to the epic level. The result is
//! an explicit, de-duplicated edge set computed before any relation call
//! is issued.
//!
//! A derived edge that would close a cycle is dropped and reported, never
//! applied and never fatal. Direct plan edges are not eligible for
//! dropping; they come from the plan as authored.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::plan::Plan;

/// A blocking edge: `from` is blocked by `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_owned(),
            to: to.to_owned(),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} blocked-by {}", self.from, self.to)
    }
}

/// The computed relation graph: the edges to apply and the derived edges
/// dropped because they would have closed a cycle.
#[derive(Debug, Default)]
pub struct RollupResult {
    /// Direct and derived edges, de-duplicated, cycle-free.
    pub edges: BTreeSet<Edge>,
    /// Derived edges dropped to keep the graph acyclic.
    pub dropped: Vec<Edge>,
}

/// Build the full dependency edge set for a plan.
///
/// Direct edges (each item's `depends_on`, restricted to loaded targets)
/// are taken as-is. Derived edges come from walking both endpoints'
/// ancestor chains in lockstep; the walk stops as soon as the ancestors
/// converge. Derived edges are added in sorted order and checked against
/// the union graph, so the outcome is deterministic.
pub fn rollup_dependencies(plan: &Plan) -> RollupResult {
    let mut direct: BTreeSet<Edge> = BTreeSet::new();
    for item in plan.items() {
        for dep in &item.depends_on {
            if dep == &item.id {
                tracing::debug!(item = %item.id, "skipping self-dependency");
                continue;
            }
            // Unresolved targets (partial plan slices) have no external
            // record to link against.
            if plan.contains(dep) {
                direct.insert(Edge::new(&item.id, dep));
            } else {
                tracing::debug!(item = %item.id, dependency = %dep, "skipping unresolved dependency");
            }
        }
    }

    let mut derived: BTreeSet<Edge> = BTreeSet::new();
    for edge in &direct {
        let mut a = parent_of(plan, &edge.from);
        let mut b = parent_of(plan, &edge.to);
        while let (Some(pa), Some(pb)) = (a.as_deref(), b.as_deref()) {
            if pa == pb {
                break;
            }
            derived.insert(Edge::new(pa, pb));
            a = parent_of(plan, pa);
            b = parent_of(plan, pb);
        }
    }

    let mut result = RollupResult {
        edges: direct,
        dropped: Vec::new(),
    };

    // Derived edges already present as direct edges are dedup'd by the
    // set; the rest are admitted one at a time, in sorted order, unless
    // the reverse path already exists.
    for edge in derived {
        if result.edges.contains(&edge) {
            continue;
        }
        if reaches(&result.edges, &edge.to, &edge.from) {
            tracing::warn!(edge = %edge, "dropping rolled-up dependency edge: would create a cycle");
            result.dropped.push(edge);
        } else {
            result.edges.insert(edge);
        }
    }

    result
}

fn parent_of(plan: &Plan, id: &str) -> Option<String> {
    plan.get(id).and_then(|item| {
        let parent = item.parent_id.as_deref()?;
        // Only loaded ancestors participate in the roll-up.
        plan.contains(parent).then(|| parent.to_owned())
    })
}

/// Depth-first reachability over the current edge set.
fn reaches(edges: &BTreeSet<Edge>, from: &str, to: &str) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut stack = vec![from];
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(node) {
            stack.extend(next);
        }
    }
    false
}
