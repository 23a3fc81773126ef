//! Reasoning fallback for medium-confidence and ambiguous queries.
//!
//! ```text
//! registry + plan ──► system prompt ─┐
//!                                    ├─► CompletionService ─► raw text
//! state summary ───► user prompt ────┘                           │
//!                                                                ▼
//!                        serde_json ─► JSON Schema ─► ReasoningDecision
//!                              (any failure ─► fallback: finalize)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};

use meridian_contracts::{
    error::{MeridianError, MeridianResult},
    reasoning::ReasoningAction,
    state::ComputationState,
};
use meridian_core::traits::{CompletionRequest, CompletionService};
use meridian_registry::{AgentRegistry, ExecutionPlan};

/// The typed reasoning-model answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub thought: String,
    pub action: ReasoningAction,
    pub params: Value,
}

impl ReasoningDecision {
    /// The decision used whenever the model's answer cannot be used.
    pub fn fallback(reason: &str) -> Self {
        Self {
            thought: format!("Reasoning response unusable ({reason}); finalizing with current results"),
            action: ReasoningAction::Finalize,
            params: json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    pub decision: ReasoningDecision,
    pub completion_calls: u32,
    /// True when `decision` is the fallback.
    pub degraded: bool,
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["thought", "action", "params"],
        "properties": {
            "thought": { "type": "string" },
            "action": {
                "enum": ["call_agent", "validate", "recover", "clarify", "finalize"]
            },
            "params": { "type": "object" }
        }
    })
}

pub struct ReasoningFallback {
    completion: Arc<dyn CompletionService>,
    timeout: Duration,
    recent_steps: usize,
    response_validator: jsonschema::Validator,
}

impl ReasoningFallback {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        timeout: Duration,
        recent_steps: usize,
    ) -> MeridianResult<Self> {
        let response_validator =
            jsonschema::validator_for(&response_schema()).map_err(|e| MeridianError::ConfigError {
                reason: format!("reasoning response schema is invalid: {e}"),
            })?;
        Ok(Self {
            completion,
            timeout,
            recent_steps,
            response_validator,
        })
    }

    pub fn cost_per_call_usd(&self) -> f64 {
        self.completion.cost_per_call_usd()
    }

    /// Ask the completion service for the next action.
    ///
    /// Never fails: timeouts, service errors, and malformed answers all
    /// produce the finalize fallback.
    pub async fn decide(
        &self,
        state: &ComputationState,
        registry: &AgentRegistry,
        plan: Option<&ExecutionPlan>,
    ) -> ReasoningOutcome {
        let request = CompletionRequest {
            system_prompt: self.system_prompt(registry, plan),
            user_prompt: self.user_prompt(state),
        };

        let raw = match timeout(self.timeout, self.completion.complete(&request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(correlation_id = %state.correlation_id, error = %err, "completion service failed");
                return degraded(&format!("completion failed: {err}"));
            }
            Err(_) => {
                warn!(
                    correlation_id = %state.correlation_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "completion service timed out"
                );
                return degraded("completion timed out");
            }
        };

        match self.parse_decision(&raw) {
            Ok(decision) => {
                debug!(
                    correlation_id = %state.correlation_id,
                    action = %decision.action,
                    "reasoning decision parsed"
                );
                ReasoningOutcome {
                    decision,
                    completion_calls: 1,
                    degraded: false,
                }
            }
            Err(reason) => {
                warn!(correlation_id = %state.correlation_id, %reason, "reasoning response rejected");
                degraded(&reason)
            }
        }
    }

    /// Strict decode: one JSON object, schema-checked, then typed.
    pub fn parse_decision(&self, raw: &str) -> Result<ReasoningDecision, String> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| format!("invalid JSON: {e}"))?;

        let violations: Vec<String> = self
            .response_validator
            .iter_errors(&value)
            .map(|e| format!("{} at '{}'", e, e.instance_path))
            .collect();
        if !violations.is_empty() {
            return Err(format!("schema violation: {}", violations.join("; ")));
        }

        serde_json::from_value(value).map_err(|e| format!("decode failed: {e}"))
    }

    pub fn system_prompt(&self, registry: &AgentRegistry, plan: Option<&ExecutionPlan>) -> String {
        let mut prompt = String::from(
            "You are the supervisor of a maritime operations agent pipeline. \
             Decide the single next action.\n\n## Available agents\n",
        );
        for agent in registry.active() {
            let deps: Vec<&str> = agent.dependencies.iter().map(|d| d.as_str()).collect();
            prompt.push_str(&format!(
                "- {} ({}): capabilities [{}]; requires [{}]; consumes [{}]; produces [{}]\n",
                agent.id,
                agent.name,
                agent.capabilities.iter().cloned().collect::<Vec<_>>().join(", "),
                deps.join(", "),
                agent.consumed_fields.join(", "),
                agent.produced_fields.join(", "),
            ));
        }

        if let Some(plan) = plan.filter(|p| !p.is_empty()) {
            prompt.push_str(&format!(
                "\n## Planned order for '{}'\n{}\n",
                plan.intent,
                plan.node_names().join(" -> ")
            ));
        }

        prompt.push_str(
            "\n## Decision rules\n\
             1. Prefer action over clarification. If an agent can make progress, call it.\n\
             2. Trust downstream agents to resolve ambiguous details such as port names or dates.\n\
             3. Ask for clarification only when required information is completely absent.\n\
             4. Never call an agent whose output is already present.\n\
             5. When an agent failed, use recover: retry_agent with corrected_params, skip_agent, or ask_user.\n\
             6. Finalize once the outputs the user asked for are present.\n\
             \n## Response format\n\
             Respond with exactly one JSON object and nothing else:\n\
             {\"thought\": string, \"action\": \"call_agent\" | \"validate\" | \"recover\" | \"clarify\" | \"finalize\", \"params\": object}\n\
             call_agent params: {\"agent\": agent id}\n\
             recover params: {\"strategy\": \"retry_agent\" | \"skip_agent\" | \"ask_user\", \"agent\": agent id, \"corrected_params\": object, \"question\": string}\n\
             clarify params: {\"question\": string}\n",
        );
        prompt
    }

    pub fn user_prompt(&self, state: &ComputationState) -> String {
        let mut prompt = format!("## Query\n{}\n\n## State\n", state.latest_query());
        if let Some(intent) = state.original_intent.as_deref() {
            prompt.push_str(&format!("intent: {intent}\n"));
        }
        let populated: Vec<&str> = state
            .domain
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect();
        prompt.push_str(&format!(
            "populated fields: [{}]\nrecovery attempts: {}\n",
            populated.join(", "),
            state.recovery_attempts
        ));

        prompt.push_str("\n## Agent status\n");
        if state.agent_status.is_empty() {
            prompt.push_str("no agents have run yet\n");
        }
        for (agent, status) in &state.agent_status {
            prompt.push_str(&format!("- {agent}: {status:?}"));
            if let Some(err) = state.agent_errors.get(agent) {
                prompt.push_str(&format!(" (error: {})", err.error));
            }
            prompt.push('\n');
        }

        let skip = state.reasoning_history.len().saturating_sub(self.recent_steps);
        let recent = &state.reasoning_history[skip..];
        if !recent.is_empty() {
            prompt.push_str("\n## Recent reasoning\n");
            for step in recent {
                prompt.push_str(&format!(
                    "{}. [{}] {}",
                    step.step_number, step.action, step.thought
                ));
                if let Some(obs) = step.observation.as_deref() {
                    prompt.push_str(&format!(" -> {obs}"));
                }
                prompt.push('\n');
            }
        }
        prompt
    }
}

/// The fallback outcome after one completion call that produced nothing usable.
fn degraded(reason: &str) -> ReasoningOutcome {
    ReasoningOutcome {
        decision: ReasoningDecision::fallback(reason),
        completion_calls: 1,
        degraded: true,
    }
}
