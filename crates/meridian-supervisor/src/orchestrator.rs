//! The orchestration loop.
//!
//! ```text
//! query ─► Supervisor::decide ─┬─ Agent(id) ─► AgentRuntime::invoke ─► merge ─► checkpoint ─┐
//!              ▲               ├─ Continue ──────────────────────────────────────────────────┤
//!              └───────────────┴───────────────────────────────────────────────────────────◄─┘
//!                              └─ Finalize ─► synthesize ─► FinalPayload
//! ```
//!
//! `execute_plan` is the non-adaptive path: it runs a planned pipeline stage
//! by stage (fan-out/fan-in) without consulting the supervisor.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use meridian_contracts::{
    agent::{AgentContext, AgentDescriptor, AgentErrorRecord, AgentId, AgentInput, AgentRunStatus},
    error::MeridianResult,
    state::{ComputationState, Message},
};
use meridian_core::{
    traits::{Agent, CompletionService, PatternMatcher, RoutingRecorder},
    AgentInvocation, AgentRuntime,
};
use meridian_registry::{AgentRegistry, ExecutionPlanner, RegistrationWarning};
use meridian_state::{
    shape::{HasComplianceStatus, HasCost, HasDistance, HasForecast, HasPorts, HasWaypoints},
    CheckpointManager, CheckpointPurpose,
};

use crate::actions::NextStep;
use crate::config::OrchestratorConfig;
use crate::supervisor::Supervisor;

const GENERIC_FAILURE: &str = "I encountered issues processing your request. \
     Please try again or rephrase your question.";

/// What a finished query returns to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct FinalPayload {
    pub correlation_id: String,
    pub answer: String,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub completed_agents: Vec<String>,
    pub failed_agents: Vec<String>,
    pub skipped_agents: Vec<String>,
    /// Decision cycles taken.
    pub steps: usize,
    pub state: ComputationState,
}

pub struct Orchestrator {
    registry: AgentRegistry,
    runtime: AgentRuntime,
    supervisor: Supervisor,
    checkpoints: Option<CheckpointManager>,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        planner: ExecutionPlanner,
        matcher: Arc<dyn PatternMatcher>,
        completion: Arc<dyn CompletionService>,
    ) -> MeridianResult<Self> {
        let supervisor = Supervisor::with_completion(
            config.supervisor.clone(),
            planner,
            matcher,
            completion,
            config.matcher_timeout(),
            config.completion_timeout(),
        )?;
        Ok(Self {
            registry: AgentRegistry::new(),
            runtime: AgentRuntime::new(config.runtime_config()),
            supervisor,
            checkpoints: None,
        })
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RoutingRecorder>) -> Self {
        self.supervisor = self.supervisor.with_recorder(recorder);
        self
    }

    /// Register a descriptor and bind its handler in one step.
    pub fn register(
        &mut self,
        descriptor: AgentDescriptor,
        agent: Arc<dyn Agent>,
    ) -> MeridianResult<Vec<RegistrationWarning>> {
        let id = descriptor.id.clone();
        let warnings = self.registry.register(descriptor)?;
        self.runtime.bind(id, agent);
        Ok(warnings)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn checkpoints(&self) -> Option<&CheckpointManager> {
        self.checkpoints.as_ref()
    }

    /// Answer a query with a fresh correlation id.
    pub async fn run(&mut self, query: &str) -> FinalPayload {
        self.run_with_id(&Uuid::new_v4().to_string(), query).await
    }

    /// Drive the decision loop until the supervisor finalizes.
    ///
    /// The step and recovery ceilings guarantee termination.
    pub async fn run_with_id(&mut self, correlation_id: &str, query: &str) -> FinalPayload {
        let mut state = ComputationState::new(correlation_id);
        state.messages.push(Message::user(query));
        info!(correlation_id, "query received");

        loop {
            let decision = self.supervisor.decide(&mut state, &self.registry).await;
            match decision.next {
                NextStep::Agent(agent_id) => {
                    let invocation = self.dispatch(&agent_id, &state).await;
                    self.absorb(&mut state, invocation);
                    self.checkpoint(&state, CheckpointPurpose::Resume).await;
                }
                NextStep::Continue => {}
                NextStep::Finalize => break,
            }
        }

        self.finish(state).await
    }

    /// Run the planned pipeline for `intent` stage by stage.
    ///
    /// Agents of one stage run concurrently against the same snapshot; their
    /// patches are merged in plan order after the whole stage completes. An
    /// agent whose dependency did not succeed is skipped.
    pub async fn execute_plan(&mut self, intent: &str, query: &str) -> FinalPayload {
        let correlation_id = Uuid::new_v4().to_string();
        let mut state = ComputationState::new(correlation_id.as_str());
        state.messages.push(Message::user(query));
        state.original_intent = Some(intent.to_string());

        let planner = self.supervisor.planner();
        let plan = planner.plan(&self.registry, intent);
        let stages = planner.execution_stages(&plan);
        let graph = self.registry.dependency_graph();
        info!(
            correlation_id = %correlation_id,
            intent,
            agents = plan.len(),
            stages = stages.len(),
            "executing plan"
        );

        for stage in stages {
            let mut calls = Vec::with_capacity(stage.len());
            for agent_id in stage {
                let blocked = graph
                    .get(&agent_id)
                    .into_iter()
                    .flatten()
                    .find(|dep| state.status_of(dep.as_str()) != Some(AgentRunStatus::Success));
                if let Some(dep) = blocked {
                    warn!(
                        correlation_id = %correlation_id,
                        agent_id = %agent_id,
                        dependency = %dep,
                        "dependency did not succeed, skipping"
                    );
                    state
                        .agent_status
                        .insert(agent_id.to_string(), AgentRunStatus::Skipped);
                    continue;
                }
                let (input, ctx) = invocation_args(&agent_id, &state);
                calls.push((agent_id, input, ctx));
            }

            for invocation in self.runtime.invoke_stage(calls).await {
                self.absorb(&mut state, invocation);
            }
            self.checkpoint(&state, CheckpointPurpose::Resume).await;
        }

        self.finish(state).await
    }

    async fn dispatch(&self, agent_id: &AgentId, state: &ComputationState) -> AgentInvocation {
        let (input, ctx) = invocation_args(agent_id, state);
        self.runtime.invoke(agent_id, input, ctx).await
    }

    /// Fold one invocation outcome into the state and the registry metadata.
    fn absorb(&mut self, state: &mut ComputationState, invocation: AgentInvocation) {
        let AgentInvocation {
            agent_id,
            outcome,
            duration,
        } = invocation;
        let key = agent_id.to_string();
        let merged = outcome.and_then(|output| state.merge(output.patch));
        let success = merged.is_ok();

        match merged {
            Ok(()) => {
                state.agent_status.insert(key.clone(), AgentRunStatus::Success);
                state.agent_errors.remove(&key);
                state.agent_overrides.remove(&key);
            }
            Err(err) => {
                state.agent_status.insert(key.clone(), AgentRunStatus::Failed);
                state.agent_errors.insert(
                    key,
                    AgentErrorRecord {
                        error: err.to_string(),
                        timestamp: Utc::now(),
                        resource_error: err.is_resource_error(),
                    },
                );
                state.recovery_attempts += 1;
            }
        }

        let duration_ms = duration.as_millis() as u64;
        if let Err(err) = self.registry.record_execution(&agent_id, duration_ms, success) {
            warn!(agent_id = %agent_id, error = %err, "execution metadata not recorded");
        }
    }

    async fn checkpoint(&self, state: &ComputationState, purpose: CheckpointPurpose) {
        let Some(checkpoints) = &self.checkpoints else {
            return;
        };
        if let Err(err) = checkpoints.save(&state.correlation_id, state, purpose).await {
            warn!(correlation_id = %state.correlation_id, error = %err, "checkpoint not saved");
        }
    }

    async fn finish(&self, mut state: ComputationState) -> FinalPayload {
        let payload = synthesize(&mut state);
        self.checkpoint(&state, CheckpointPurpose::Display).await;
        info!(
            correlation_id = %payload.correlation_id,
            steps = payload.steps,
            completed = payload.completed_agents.len(),
            failed = payload.failed_agents.len(),
            needs_clarification = payload.needs_clarification,
            "query finished"
        );
        FinalPayload { state, ..payload }
    }
}

fn invocation_args(agent_id: &AgentId, state: &ComputationState) -> (AgentInput, AgentContext) {
    let params = state
        .routing_metadata
        .as_ref()
        .map(|m| m.extracted_params.clone())
        .unwrap_or(Value::Null);
    let input = AgentInput {
        query: state.latest_query().to_string(),
        params,
    };
    let ctx = AgentContext {
        correlation_id: state.correlation_id.clone(),
        state: state.clone(),
        overrides: state.agent_overrides.get(agent_id.as_str()).cloned(),
    };
    (input, ctx)
}

fn agents_with(state: &ComputationState, status: AgentRunStatus) -> Vec<String> {
    state
        .agent_status
        .iter()
        .filter(|(_, s)| **s == status)
        .map(|(a, _)| a.clone())
        .collect()
}

/// Build the user-facing answer deterministically from the final state.
///
/// Sets `final_recommendation` and appends the answer as an assistant message.
/// The returned payload carries an empty placeholder state.
fn synthesize(state: &mut ComputationState) -> FinalPayload {
    let completed = agents_with(state, AgentRunStatus::Success);
    let failed = agents_with(state, AgentRunStatus::Failed);
    let skipped = agents_with(state, AgentRunStatus::Skipped);

    let answer = if state.needs_clarification {
        state
            .clarification_question
            .clone()
            .unwrap_or_else(|| GENERIC_FAILURE.to_string())
    } else if completed.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        let mut lines = result_lines(state);
        if !failed.is_empty() || !skipped.is_empty() {
            let missing: Vec<&str> = failed.iter().chain(&skipped).map(String::as_str).collect();
            lines.push(format!(
                "Some results are incomplete: {} did not finish.",
                missing.join(", ")
            ));
        }
        lines.join("\n")
    };

    state.final_recommendation = Some(answer.clone());
    state.messages.push(Message::assistant(answer.as_str()));

    FinalPayload {
        correlation_id: state.correlation_id.clone(),
        answer,
        needs_clarification: state.needs_clarification,
        clarification_question: state.clarification_question.clone(),
        completed_agents: completed,
        failed_agents: failed,
        skipped_agents: skipped,
        steps: state.reasoning_history.len(),
        state: ComputationState::new(""),
    }
}

fn result_lines(state: &ComputationState) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(route) = state.field("route_data") {
        let distance = route
            .distance_nm()
            .map_or_else(|| "unknown distance".to_string(), |d| format!("{d:.0} nm"));
        let waypoints = route.waypoints().map_or(0, Vec::len);
        lines.push(format!("Route: {distance} via {waypoints} waypoints."));
    }
    if let Some(weather) = state.field("weather_forecast") {
        if weather.has_forecast() {
            let summary = weather
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("forecast available");
            lines.push(format!("Weather: {summary}."));
        }
    }
    if let Some(ports) = state.field("ports_found").and_then(|p| p.ports()) {
        lines.push(format!("Ports: {} candidate bunker ports found.", ports.len()));
    }
    if let Some(bunker) = state.field("bunker_analysis") {
        if bunker.has_cost() {
            match bunker.get("total_cost_usd").and_then(Value::as_f64) {
                Some(cost) => {
                    let port = bunker
                        .get("recommended_port")
                        .and_then(Value::as_str)
                        .unwrap_or("the best-ranked port");
                    lines.push(format!("Bunkering: refuel at {port}, estimated ${cost:.0}."));
                }
                None => lines.push("Bunkering: options ranked.".to_string()),
            }
        }
    }
    if let Some(compliance) = state.field("compliance_data") {
        if compliance.has_compliance_status() {
            let verdict = match compliance.get("compliant").and_then(Value::as_bool) {
                Some(true) => "compliant",
                Some(false) => "not compliant",
                None => compliance
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("checked"),
            };
            lines.push(format!("Compliance: {verdict}."));
        }
    }
    if lines.is_empty() {
        lines.push(format!(
            "Completed with results for: {}.",
            state.domain.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    lines
}
