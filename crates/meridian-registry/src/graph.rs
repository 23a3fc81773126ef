//! Dependency graph construction over agent descriptors.
//!
//! An agent's effective dependencies are the union of:
//!
//!   1. its explicitly declared dependency ids, and
//!   2. every other agent that produces a field it consumes.
//!
//! The build is a pure function of the descriptor set so tests can assert on
//! graphs directly. Self-references and ids that are not in the set are
//! dropped; the registry reports both as warnings at registration time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use meridian_contracts::agent::{AgentDescriptor, AgentId};

/// Adjacency list: agent → agents that must run before it.
pub type DependencyGraph = BTreeMap<AgentId, Vec<AgentId>>;

/// Build the effective dependency graph for `agents`.
///
/// Dependency lists keep explicit dependencies first (declaration order),
/// followed by inferred producers ordered by id.
pub fn build_graph<'a, I>(agents: I) -> DependencyGraph
where
    I: IntoIterator<Item = &'a AgentDescriptor>,
{
    let agents: Vec<&AgentDescriptor> = agents.into_iter().collect();
    let known: BTreeSet<&AgentId> = agents.iter().map(|a| &a.id).collect();

    let mut producers: HashMap<&str, BTreeSet<&AgentId>> = HashMap::new();
    for agent in &agents {
        for field in &agent.produced_fields {
            producers.entry(field.as_str()).or_default().insert(&agent.id);
        }
    }

    let mut graph = DependencyGraph::new();
    for agent in &agents {
        let mut deps: Vec<AgentId> = Vec::new();
        let push = |dep: &AgentId, deps: &mut Vec<AgentId>| {
            if dep != &agent.id && known.contains(dep) && !deps.contains(dep) {
                deps.push(dep.clone());
            }
        };

        for dep in &agent.dependencies {
            push(dep, &mut deps);
        }
        for field in &agent.consumed_fields {
            if let Some(ids) = producers.get(field.as_str()) {
                for dep in ids {
                    push(*dep, &mut deps);
                }
            }
        }
        graph.insert(agent.id.clone(), deps);
    }
    graph
}

/// Return one dependency cycle as a closed path (`a -> b -> a`), if any.
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<AgentId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: &AgentId,
        graph: &DependencyGraph,
        marks: &mut HashMap<AgentId, Mark>,
        stack: &mut Vec<AgentId>,
    ) -> Option<Vec<AgentId>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| n == node).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(node.clone());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node.clone(), Mark::Visiting);
        stack.push(node.clone());
        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(cycle) = visit(dep, graph, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node.clone(), Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for node in graph.keys() {
        if let Some(cycle) = visit(node, graph, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// Every agent reachable from `start` by following dependency edges.
pub fn transitive_dependencies(graph: &DependencyGraph, start: &AgentId) -> BTreeSet<AgentId> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&AgentId> = graph.get(start).map(|d| d.iter().collect()).unwrap_or_default();
    while let Some(next) = pending.pop() {
        if seen.insert(next.clone()) {
            if let Some(deps) = graph.get(next) {
                pending.extend(deps.iter());
            }
        }
    }
    seen
}

/// True when either agent (transitively) depends on the other.
pub fn related(graph: &DependencyGraph, a: &AgentId, b: &AgentId) -> bool {
    transitive_dependencies(graph, a).contains(b) || transitive_dependencies(graph, b).contains(a)
}
