//! Descriptors for the maritime agents and the composition root that binds
//! them to their handlers.

use std::sync::Arc;

use tracing::warn;

use meridian_contracts::{agent::AgentDescriptor, error::MeridianResult};
use meridian_core::traits::{Agent, CompletionService, PatternMatcher};
use meridian_registry::ExecutionPlanner;
use meridian_supervisor::{Orchestrator, OrchestratorConfig};

use crate::agents::{BunkerAgent, ComplianceAgent, RouteAgent, WeatherAgent};

pub const ROUTE_AGENT: &str = "route_agent";
pub const WEATHER_AGENT: &str = "weather_agent";
pub const BUNKER_AGENT: &str = "bunker_agent";
pub const COMPLIANCE_AGENT: &str = "compliance_agent";

pub fn route_descriptor() -> AgentDescriptor {
    AgentDescriptor::new(ROUTE_AGENT, "Route Planner")
        .with_capabilities(["route_calculation", "port_lookup"])
        .produces(["route_data"])
        .with_tools(["port_database", "great_circle"])
        .with_priority(10)
}

pub fn weather_descriptor() -> AgentDescriptor {
    AgentDescriptor::new(WEATHER_AGENT, "Weather Analyst")
        .with_capabilities(["weather_forecast"])
        .depends_on([ROUTE_AGENT])
        .consumes(["route_data"])
        .produces(["weather_forecast"])
        .with_tools(["marine_forecast"])
        .with_priority(20)
        .parallel()
}

pub fn compliance_descriptor() -> AgentDescriptor {
    AgentDescriptor::new(COMPLIANCE_AGENT, "Emissions Compliance")
        .with_capabilities(["compliance_check"])
        .consumes(["route_data"])
        .produces(["compliance_data"])
        .with_tools(["eca_zones"])
        .with_priority(25)
        .parallel()
}

pub fn bunker_descriptor() -> AgentDescriptor {
    AgentDescriptor::new(BUNKER_AGENT, "Bunker Optimizer")
        .with_capabilities(["bunker_optimization"])
        .depends_on([ROUTE_AGENT, WEATHER_AGENT])
        .consumes(["route_data", "weather_forecast"])
        .produces(["bunker_analysis", "ports_found"])
        .with_tools(["bunker_prices"])
        .with_priority(30)
}

/// Every maritime descriptor paired with its handler.
pub fn maritime_agents() -> Vec<(AgentDescriptor, Arc<dyn Agent>)> {
    vec![
        (route_descriptor(), Arc::new(RouteAgent) as Arc<dyn Agent>),
        (weather_descriptor(), Arc::new(WeatherAgent)),
        (compliance_descriptor(), Arc::new(ComplianceAgent)),
        (bunker_descriptor(), Arc::new(BunkerAgent)),
    ]
}

/// An orchestrator with the four maritime agents registered.
///
/// `replace` swaps the handler of a named agent, which the scenarios use for
/// fault injection.
pub fn maritime_orchestrator(
    config: &OrchestratorConfig,
    matcher: Arc<dyn PatternMatcher>,
    completion: Arc<dyn CompletionService>,
    replace: Option<(&str, Arc<dyn Agent>)>,
) -> MeridianResult<Orchestrator> {
    let mut orch = Orchestrator::new(config, ExecutionPlanner::default(), matcher, completion)?;
    for (descriptor, handler) in maritime_agents() {
        let handler = match &replace {
            Some((id, substitute)) if *id == descriptor.id.as_str() => Arc::clone(substitute),
            _ => handler,
        };
        for warning in orch.register(descriptor, handler)? {
            warn!(agent_id = %warning.agent_id, message = %warning.message, "registration warning");
        }
    }
    for warning in orch.registry().validate() {
        warn!(agent_id = %warning.agent_id, message = %warning.message, "registry validation");
    }
    Ok(orch)
}
