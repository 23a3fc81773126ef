//! Mock maritime agents.
//!
//! Each agent reads what it needs from the state snapshot in its context and
//! returns a single-field patch. In production these would call routing,
//! weather, and price services; here they call `mock_data`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use meridian_contracts::{
    agent::{AgentContext, AgentInput, AgentOutput},
    error::{MeridianError, MeridianResult},
};
use meridian_core::traits::Agent;

use crate::mock_data::{
    bunker_options, compliance_for, compute_route, find_port, forecast_for, fuel_required_t,
    ports_in_text, Port,
};

fn failed(agent_id: &str, reason: impl Into<String>) -> MeridianError {
    MeridianError::AgentFailed {
        agent_id: agent_id.to_string(),
        reason: reason.into(),
    }
}

fn waypoints_of<'a>(agent_id: &str, ctx: &'a AgentContext) -> MeridianResult<&'a Vec<Value>> {
    ctx.state
        .field("route_data")
        .and_then(|r| r.get("waypoints"))
        .and_then(Value::as_array)
        .ok_or_else(|| failed(agent_id, "route_data with waypoints is required"))
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// Resolves origin and destination, then computes the route.
///
/// Port resolution order: supervisor overrides, matcher parameters, then the
/// ports named in the query text.
pub struct RouteAgent;

impl RouteAgent {
    fn resolve(input: &AgentInput, ctx: &AgentContext) -> Option<(&'static Port, &'static Port)> {
        for source in [ctx.overrides.as_ref(), Some(&input.params)].into_iter().flatten() {
            let origin = source.get("origin").and_then(Value::as_str).and_then(find_port);
            let destination = source
                .get("destination")
                .and_then(Value::as_str)
                .and_then(find_port);
            if let (Some(o), Some(d)) = (origin, destination) {
                return Some((o, d));
            }
        }
        match ports_in_text(&input.query).as_slice() {
            [origin, destination, ..] => Some((*origin, *destination)),
            _ => None,
        }
    }
}

#[async_trait]
impl Agent for RouteAgent {
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput> {
        let (origin, destination) = Self::resolve(input, ctx).ok_or_else(|| {
            failed(
                "route_agent",
                format!("could not resolve origin and destination ports in '{}'", input.query),
            )
        })?;
        if origin.code == destination.code {
            return Err(failed("route_agent", "origin and destination are the same port"));
        }
        let route = compute_route(origin, destination);
        debug!(origin = origin.code, destination = destination.code, "route computed");
        Ok(AgentOutput::new()
            .with_field("route_data", route)
            .with_summary(format!("{} to {}", origin.name, destination.name)))
    }
}

// ── Weather ───────────────────────────────────────────────────────────────────

pub struct WeatherAgent;

#[async_trait]
impl Agent for WeatherAgent {
    async fn execute(&self, _input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput> {
        let waypoints = waypoints_of("weather_agent", ctx)?;
        let forecast = forecast_for(waypoints);
        Ok(AgentOutput::new().with_field("weather_forecast", forecast))
    }
}

// ── Bunker ────────────────────────────────────────────────────────────────────

/// Ranks bunker ports along the route by total fuel cost.
pub struct BunkerAgent;

#[async_trait]
impl Agent for BunkerAgent {
    async fn execute(&self, _input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput> {
        let waypoints = waypoints_of("bunker_agent", ctx)?;
        let distance = ctx
            .state
            .field("route_data")
            .and_then(|r| r.get("distance_nm"))
            .and_then(Value::as_f64)
            .ok_or_else(|| failed("bunker_agent", "route distance is missing"))?;
        let rough = ctx
            .state
            .field("weather_forecast")
            .and_then(|w| w.get("rough_segments"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let fuel_t = fuel_required_t(distance, rough);
        let options = bunker_options(waypoints, fuel_t);
        let Some(best) = options.first() else {
            return Err(failed("bunker_agent", "no bunkering ports on the route"));
        };

        let analysis = serde_json::json!({
            "recommended_port": best["port"],
            "fuel_required_t": fuel_t,
            "total_cost_usd": best["cost_usd"],
            "options": options,
        });
        let ports: Vec<Value> = options.iter().map(|o| o["port"].clone()).collect();
        Ok(AgentOutput::new()
            .with_field("bunker_analysis", analysis)
            .with_field("ports_found", Value::Array(ports)))
    }
}

// ── Compliance ────────────────────────────────────────────────────────────────

pub struct ComplianceAgent;

#[async_trait]
impl Agent for ComplianceAgent {
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput> {
        let waypoints = waypoints_of("compliance_agent", ctx)?;
        let fuel = ctx
            .overrides
            .as_ref()
            .and_then(|o| o.get("fuel"))
            .or_else(|| input.params.get("fuel"))
            .and_then(Value::as_str)
            .unwrap_or("VLSFO");
        Ok(AgentOutput::new().with_field("compliance_data", compliance_for(waypoints, fuel)))
    }
}

// ── Fault injection ───────────────────────────────────────────────────────────

/// Fails its first `failures` invocations, then delegates.
pub struct FlakyAgent {
    agent_id: String,
    inner: Arc<dyn Agent>,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyAgent {
    pub fn new(agent_id: impl Into<String>, inner: Arc<dyn Agent>, failures: u32) -> Self {
        Self {
            agent_id: agent_id.into(),
            inner,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FlakyAgent {
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(failed(
                &self.agent_id,
                format!("upstream provider unavailable (attempt {call})"),
            ));
        }
        self.inner.execute(input, ctx).await
    }
}
