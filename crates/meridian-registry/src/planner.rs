//! Execution planner: intent → ordered agent list.
//!
//! Planning pipeline for one intent:
//!
//!   Intent table → target capabilities → needed set → priority-ordered DFS
//!
//! The needed set is every active agent exposing a target capability plus
//! everything those agents transitively depend on, so a producer always lands
//! before the consumer that needs its field. Planning never fails: an intent
//! nobody can serve yields an empty plan.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_contracts::agent::{AgentDescriptor, AgentId};

use crate::graph::{build_graph, related, transitive_dependencies, DependencyGraph};
use crate::registry::AgentRegistry;

/// Node name appended after the last agent of every plan.
pub const FINALIZE_NODE: &str = "finalize";

/// What an intent needs: capabilities to run, fields that must end up populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSpec {
    pub capabilities: BTreeSet<String>,
    pub required_outputs: Vec<String>,
}

impl IntentSpec {
    pub fn new<C, O>(capabilities: C, required_outputs: O) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            required_outputs: required_outputs.into_iter().map(Into::into).collect(),
        }
    }
}

/// An ordered, deduplicated agent sequence for one intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub intent: String,
    pub agents: Vec<AgentDescriptor>,
}

impl ExecutionPlan {
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id.clone()).collect()
    }

    /// Agent ids followed by the `finalize` node.
    pub fn node_names(&self) -> Vec<String> {
        self.agents
            .iter()
            .map(|a| a.id.to_string())
            .chain(std::iter::once(FINALIZE_NODE.to_string()))
            .collect()
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.iter().any(|a| &a.id == agent_id)
    }

    pub fn position(&self, agent_id: &AgentId) -> Option<usize> {
        self.agents.iter().position(|a| &a.id == agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    intents: BTreeMap<String, IntentSpec>,
}

impl Default for ExecutionPlanner {
    /// The maritime intent table.
    fn default() -> Self {
        let mut intents = BTreeMap::new();
        intents.insert(
            "route_planning".to_string(),
            IntentSpec::new(["route_calculation"], ["route_data"]),
        );
        intents.insert(
            "weather_analysis".to_string(),
            IntentSpec::new(["weather_forecast"], ["route_data", "weather_forecast"]),
        );
        intents.insert(
            "bunker_planning".to_string(),
            IntentSpec::new(
                ["bunker_optimization"],
                ["route_data", "weather_forecast", "bunker_analysis"],
            ),
        );
        intents.insert(
            "compliance_check".to_string(),
            IntentSpec::new(["compliance_check"], ["compliance_data"]),
        );
        intents.insert(
            "voyage_planning".to_string(),
            IntentSpec::new(
                [
                    "route_calculation",
                    "weather_forecast",
                    "bunker_optimization",
                    "compliance_check",
                ],
                [
                    "route_data",
                    "weather_forecast",
                    "bunker_analysis",
                    "compliance_data",
                ],
            ),
        );
        Self { intents }
    }
}

impl ExecutionPlanner {
    /// A planner with an empty intent table; every intent falls back to
    /// being its own capability.
    pub fn empty() -> Self {
        Self {
            intents: BTreeMap::new(),
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>, spec: IntentSpec) -> Self {
        self.intents.insert(intent.into(), spec);
        self
    }

    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.intents.keys().map(String::as_str)
    }

    pub fn intent_spec(&self, intent: &str) -> Option<&IntentSpec> {
        self.intents.get(intent)
    }

    /// Capabilities an intent targets. Unknown intents target themselves.
    pub fn target_capabilities(&self, intent: &str) -> BTreeSet<String> {
        match self.intents.get(intent) {
            Some(spec) => spec.capabilities.clone(),
            None => BTreeSet::from([intent.to_string()]),
        }
    }

    /// State fields that must be populated before `intent` is complete.
    pub fn required_outputs(&self, intent: &str) -> Vec<String> {
        self.intents
            .get(intent)
            .map(|s| s.required_outputs.clone())
            .unwrap_or_default()
    }

    pub fn dependency_graph(&self, registry: &AgentRegistry) -> DependencyGraph {
        registry.dependency_graph()
    }

    /// Compute the ordered agent list for `intent` over the active agents.
    pub fn plan(&self, registry: &AgentRegistry, intent: &str) -> ExecutionPlan {
        let targets = self.target_capabilities(intent);
        let active = registry.active();
        let graph = build_graph(active.iter().copied());

        let mut needed: BTreeSet<AgentId> = BTreeSet::new();
        for agent in &active {
            if agent.capabilities.iter().any(|c| targets.contains(c)) {
                needed.insert(agent.id.clone());
                needed.extend(transitive_dependencies(&graph, &agent.id));
            }
        }

        fn visit(
            id: &AgentId,
            graph: &DependencyGraph,
            needed: &BTreeSet<AgentId>,
            visited: &mut HashSet<AgentId>,
            order: &mut Vec<AgentId>,
        ) {
            if !visited.insert(id.clone()) {
                return;
            }
            if let Some(deps) = graph.get(id) {
                for dep in deps {
                    visit(dep, graph, needed, visited, order);
                }
            }
            if needed.contains(id) {
                order.push(id.clone());
            }
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for agent in &active {
            visit(&agent.id, &graph, &needed, &mut visited, &mut order);
        }

        let agents: Vec<AgentDescriptor> = order
            .iter()
            .filter_map(|id| registry.get(id).cloned())
            .collect();
        debug!(
            intent,
            targets = targets.len(),
            planned = agents.len(),
            "execution plan computed"
        );
        ExecutionPlan {
            intent: intent.to_string(),
            agents,
        }
    }

    pub fn plan_node_names(&self, registry: &AgentRegistry, intent: &str) -> Vec<String> {
        self.plan(registry, intent).node_names()
    }

    /// Greedy buckets of parallel-eligible active agents. Two agents share a
    /// bucket only when neither (transitively) depends on the other.
    pub fn parallel_groups(&self, registry: &AgentRegistry) -> Vec<Vec<AgentId>> {
        let active = registry.active();
        let graph = build_graph(active.iter().copied());
        let mut groups: Vec<Vec<AgentId>> = Vec::new();

        for agent in active.iter().filter(|a| a.can_run_parallel) {
            let slot = groups
                .iter_mut()
                .find(|g| g.iter().all(|member| !related(&graph, member, &agent.id)));
            match slot {
                Some(group) => group.push(agent.id.clone()),
                None => groups.push(vec![agent.id.clone()]),
            }
        }
        groups
    }

    /// Split an ordered plan into sequential stages.
    ///
    /// Consecutive parallel-eligible agents with no dependency relation share
    /// a stage; everything else runs alone. Stage order preserves plan order,
    /// so every dependency finishes in an earlier stage.
    pub fn execution_stages(&self, plan: &ExecutionPlan) -> Vec<Vec<AgentId>> {
        let graph = build_graph(plan.agents.iter());
        let mut stages: Vec<Vec<AgentId>> = Vec::new();
        let mut current: Vec<&AgentDescriptor> = Vec::new();

        for agent in &plan.agents {
            let joins = agent.can_run_parallel
                && !current.is_empty()
                && current
                    .iter()
                    .all(|m| m.can_run_parallel && !related(&graph, &m.id, &agent.id));
            if !joins && !current.is_empty() {
                stages.push(current.drain(..).map(|a| a.id.clone()).collect());
            }
            current.push(agent);
        }
        if !current.is_empty() {
            stages.push(current.into_iter().map(|a| a.id.clone()).collect());
        }
        stages
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest::sample::Index;

    use super::*;

    fn maritime_registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor::new("route_agent", "Route Agent")
                    .with_capabilities(["route_calculation"])
                    .produces(["route_data"])
                    .with_priority(10),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("weather_agent", "Weather Agent")
                    .with_capabilities(["weather_forecast"])
                    .depends_on(["route_agent"])
                    .produces(["weather_forecast"])
                    .with_priority(20)
                    .parallel(),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("compliance_agent", "Compliance Agent")
                    .with_capabilities(["compliance_check"])
                    .consumes(["route_data"])
                    .produces(["compliance_data"])
                    .with_priority(25)
                    .parallel(),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("bunker_agent", "Bunker Agent")
                    .with_capabilities(["bunker_optimization"])
                    .depends_on(["route_agent", "weather_agent"])
                    .produces(["bunker_analysis"])
                    .with_priority(30),
            )
            .unwrap();
        registry
    }

    #[test]
    fn consumed_field_pulls_in_its_producer() {
        let registry = maritime_registry();
        let plan = ExecutionPlanner::default().plan(&registry, "compliance_check");
        assert_eq!(
            plan.agent_ids(),
            vec![AgentId::new("route_agent"), AgentId::new("compliance_agent")]
        );
    }

    #[test]
    fn voyage_planning_orders_every_agent() {
        let registry = maritime_registry();
        let plan = ExecutionPlanner::default().plan(&registry, "voyage_planning");
        assert_eq!(plan.len(), 4);
        let route = plan.position(&AgentId::new("route_agent")).unwrap();
        let weather = plan.position(&AgentId::new("weather_agent")).unwrap();
        let bunker = plan.position(&AgentId::new("bunker_agent")).unwrap();
        assert!(route < weather && weather < bunker);
    }

    #[test]
    fn inactive_agents_are_not_planned() {
        let mut registry = maritime_registry();
        registry
            .set_status(
                &AgentId::new("compliance_agent"),
                meridian_contracts::agent::AgentStatus::Maintenance,
            )
            .unwrap();
        let plan = ExecutionPlanner::default().plan(&registry, "compliance_check");
        assert!(plan.is_empty(), "only the provider of the capability is down");
    }

    #[test]
    fn unknown_intent_uses_itself_as_capability() {
        let mut registry = maritime_registry();
        registry
            .register(
                AgentDescriptor::new("port_agent", "Port Agent")
                    .with_capabilities(["port_lookup"])
                    .produces(["ports_found"]),
            )
            .unwrap();
        let planner = ExecutionPlanner::default();

        let plan = planner.plan(&registry, "port_lookup");
        assert_eq!(plan.agent_ids(), vec![AgentId::new("port_agent")]);
        assert!(planner.required_outputs("port_lookup").is_empty());

        assert!(planner.plan(&registry, "crew_scheduling").is_empty());
        assert_eq!(planner.plan_node_names(&registry, "crew_scheduling"), vec!["finalize"]);
    }

    #[test]
    fn required_outputs_follow_intent_table() {
        let planner = ExecutionPlanner::default();
        assert_eq!(
            planner.required_outputs("bunker_planning"),
            vec!["route_data", "weather_forecast", "bunker_analysis"]
        );
        let custom = ExecutionPlanner::empty()
            .with_intent("eta", IntentSpec::new(["route_calculation"], ["route_data"]));
        assert_eq!(custom.required_outputs("eta"), vec!["route_data"]);
        assert_eq!(custom.intents().collect::<Vec<_>>(), vec!["eta"]);
    }

    #[test]
    fn parallel_groups_separate_related_agents() {
        let mut registry = maritime_registry();
        registry
            .register(
                AgentDescriptor::new("price_agent", "Price Agent")
                    .with_capabilities(["price_lookup"])
                    .produces(["price_data"])
                    .with_priority(15)
                    .parallel(),
            )
            .unwrap();
        let groups = ExecutionPlanner::default().parallel_groups(&registry);

        // price and weather are unrelated; compliance is unrelated to both.
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0],
            vec![
                AgentId::new("price_agent"),
                AgentId::new("weather_agent"),
                AgentId::new("compliance_agent"),
            ]
        );
    }

    #[test]
    fn parallel_groups_open_new_bucket_on_dependency() {
        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor::new("a", "A")
                    .with_capabilities(["x"])
                    .produces(["fa"])
                    .parallel(),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("b", "B")
                    .with_capabilities(["x"])
                    .consumes(["fa"])
                    .parallel(),
            )
            .unwrap();
        let groups = ExecutionPlanner::default().parallel_groups(&registry);
        assert_eq!(groups, vec![vec![AgentId::new("a")], vec![AgentId::new("b")]]);
    }

    #[test]
    fn stages_group_consecutive_independent_parallel_agents() {
        let registry = maritime_registry();
        let planner = ExecutionPlanner::default();
        let plan = planner.plan(&registry, "voyage_planning");
        let stages = planner.execution_stages(&plan);

        assert_eq!(
            stages,
            vec![
                vec![AgentId::new("route_agent")],
                vec![AgentId::new("weather_agent"), AgentId::new("compliance_agent")],
                vec![AgentId::new("bunker_agent")],
            ]
        );
    }

    // ── Property tests ──

    /// Agents only depend on (or consume from) lower-indexed agents, so every
    /// generated registry is acyclic.
    fn arb_agents() -> impl Strategy<Value = Vec<AgentDescriptor>> {
        prop::collection::vec(
            (
                0u32..5,
                prop::collection::vec(any::<Index>(), 0..3),
                prop::collection::vec(any::<Index>(), 0..2),
                0usize..3,
                any::<bool>(),
            ),
            1..8,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (priority, deps, consumes, cap, parallel))| {
                    let mut d = AgentDescriptor::new(format!("agent_{i}"), format!("Agent {i}"))
                        .with_capabilities([format!("cap{cap}")])
                        .with_priority(priority)
                        .produces([format!("field_{i}")]);
                    if i > 0 {
                        d = d
                            .depends_on(deps.iter().map(|ix| format!("agent_{}", ix.index(i))))
                            .consumes(consumes.iter().map(|ix| format!("field_{}", ix.index(i))));
                    }
                    if parallel {
                        d = d.parallel();
                    }
                    d
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn dependencies_always_precede_dependents(agents in arb_agents(), cap in 0usize..3) {
            let mut registry = AgentRegistry::new();
            for agent in agents {
                registry.register(agent).unwrap();
            }
            let plan = ExecutionPlanner::default().plan(&registry, &format!("cap{cap}"));
            let graph = registry.dependency_graph();

            for (pos, agent) in plan.agents.iter().enumerate() {
                for dep in &graph[&agent.id] {
                    let dep_pos = plan.position(dep);
                    prop_assert!(dep_pos.is_some(), "dependency {} missing from plan", dep);
                    prop_assert!(dep_pos.unwrap() < pos, "{} planned after {}", dep, agent.id);
                }
            }
        }

        #[test]
        fn producers_precede_consumers(agents in arb_agents(), cap in 0usize..3) {
            let mut registry = AgentRegistry::new();
            for agent in agents {
                registry.register(agent).unwrap();
            }
            let plan = ExecutionPlanner::default().plan(&registry, &format!("cap{cap}"));

            for (pos, consumer) in plan.agents.iter().enumerate() {
                for field in &consumer.consumed_fields {
                    for producer in registry.producers_of(field) {
                        if producer.id == consumer.id {
                            continue;
                        }
                        let p = plan.position(&producer.id);
                        prop_assert!(p.is_some_and(|p| p < pos));
                    }
                }
            }
        }

        #[test]
        fn stages_never_split_a_dependency_into_the_same_stage(agents in arb_agents()) {
            let mut registry = AgentRegistry::new();
            for agent in agents {
                registry.register(agent).unwrap();
            }
            let planner = ExecutionPlanner::default();
            let plan = planner.plan(&registry, "cap0");
            let graph = registry.dependency_graph();

            for stage in planner.execution_stages(&plan) {
                for a in &stage {
                    for b in &stage {
                        prop_assert!(a == b || !related(&graph, a, b));
                    }
                }
            }
        }
    }
}
