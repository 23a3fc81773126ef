//! Handlers for the actions a reasoning decision can name.
//!
//! | action       | effect                                            | terminal |
//! |--------------|---------------------------------------------------|----------|
//! | `call_agent` | route to the agent if registered, active, not done | no       |
//! | `validate`   | nothing; loop back into the decision engine       | no       |
//! | `recover`    | retry (with corrections), skip, or ask the user   | ask only |
//! | `clarify`    | stop with a follow-up question                    | yes      |
//! | `finalize`   | stop and synthesize                               | yes      |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use meridian_contracts::{
    agent::{AgentId, AgentRunStatus},
    reasoning::ReasoningAction,
    state::ComputationState,
};
use meridian_registry::AgentRegistry;

use crate::decision::already_completed;
use crate::reasoning::ReasoningDecision;

const DEFAULT_QUESTION: &str =
    "Could you provide more details about the voyage, such as the ports, vessel, and dates?";

/// What the decision loop does after a supervisor cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Agent(AgentId),
    /// Re-enter the decision engine without invoking anything.
    Continue,
    Finalize,
}

/// The result of applying one action to the state.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub next: NextStep,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub observation: String,
}

impl ActionOutcome {
    fn route(agent: AgentId, observation: String) -> Self {
        Self {
            next: NextStep::Agent(agent),
            needs_clarification: false,
            clarification_question: None,
            observation,
        }
    }

    fn resume(observation: String) -> Self {
        Self {
            next: NextStep::Continue,
            needs_clarification: false,
            clarification_question: None,
            observation,
        }
    }

    fn finish(observation: String) -> Self {
        Self {
            next: NextStep::Finalize,
            needs_clarification: false,
            clarification_question: None,
            observation,
        }
    }

    fn ask(question: Option<String>, observation: String) -> Self {
        Self {
            next: NextStep::Finalize,
            needs_clarification: true,
            clarification_question: Some(question.unwrap_or_else(|| DEFAULT_QUESTION.to_string())),
            observation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RetryAgent,
    SkipAgent,
    AskUser,
}

#[derive(Debug, Clone, Deserialize)]
struct CallAgentParams {
    agent: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RecoverParams {
    strategy: RecoveryStrategy,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    corrected_params: Option<Value>,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ClarifyParams {
    #[serde(default)]
    question: Option<String>,
}

/// Apply a reasoning decision. Malformed params degrade to `Continue` (or
/// `Finalize` for terminal actions) with an observation; they never fail.
pub fn apply(
    decision: &ReasoningDecision,
    state: &mut ComputationState,
    registry: &AgentRegistry,
) -> ActionOutcome {
    match decision.action {
        ReasoningAction::CallAgent => call_agent(&decision.params, state, registry),
        ReasoningAction::Recover => recover(&decision.params, state, registry),
        ReasoningAction::Validate => ActionOutcome::resume("validated; re-evaluating".into()),
        ReasoningAction::Clarify => {
            let params: ClarifyParams =
                serde_json::from_value(decision.params.clone()).unwrap_or_default();
            ActionOutcome::ask(params.question, "clarification requested".into())
        }
        ReasoningAction::Finalize => ActionOutcome::finish("finalizing".into()),
    }
}

fn call_agent(params: &Value, state: &ComputationState, registry: &AgentRegistry) -> ActionOutcome {
    let Ok(CallAgentParams { agent }) = serde_json::from_value(params.clone()) else {
        warn!(correlation_id = %state.correlation_id, "call_agent without an agent id");
        return ActionOutcome::resume("call_agent rejected: missing agent id".into());
    };
    let agent = AgentId::new(agent);

    match registry.get(&agent) {
        None => {
            warn!(correlation_id = %state.correlation_id, agent_id = %agent, "call_agent names an unregistered agent");
            ActionOutcome::resume(format!("call_agent rejected: '{agent}' is not registered"))
        }
        Some(desc) if !desc.is_active() => {
            warn!(correlation_id = %state.correlation_id, agent_id = %agent, "call_agent names an inactive agent");
            ActionOutcome::resume(format!("call_agent rejected: '{agent}' is not active"))
        }
        Some(_) if already_completed(&agent, state, registry) => {
            info!(correlation_id = %state.correlation_id, agent_id = %agent, "agent already completed, not re-invoking");
            ActionOutcome::resume(format!("'{agent}' already completed; output present"))
        }
        Some(_) => ActionOutcome::route(agent.clone(), format!("routing to {agent}")),
    }
}

fn recover(params: &Value, state: &mut ComputationState, registry: &AgentRegistry) -> ActionOutcome {
    let params: RecoverParams = match serde_json::from_value(params.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(correlation_id = %state.correlation_id, error = %e, "recover params unusable");
            return ActionOutcome::resume(format!("recover rejected: {e}"));
        }
    };

    if params.strategy == RecoveryStrategy::AskUser {
        return ActionOutcome::ask(params.question, "recovery: asking the user".into());
    }

    let Some(agent) = params.agent.map(AgentId::new).filter(|a| registry.contains(a)) else {
        return ActionOutcome::resume("recover rejected: no registered agent named".into());
    };

    match params.strategy {
        RecoveryStrategy::RetryAgent => {
            state.agent_status.remove(agent.as_str());
            state.agent_errors.remove(agent.as_str());
            let corrected = params.corrected_params.is_some();
            if let Some(overrides) = params.corrected_params {
                state.agent_overrides.insert(agent.to_string(), overrides);
            }
            info!(correlation_id = %state.correlation_id, agent_id = %agent, corrected, "retrying agent");
            ActionOutcome::route(
                agent.clone(),
                format!("retrying {agent}{}", if corrected { " with corrected parameters" } else { "" }),
            )
        }
        RecoveryStrategy::SkipAgent => {
            state
                .agent_status
                .insert(agent.to_string(), AgentRunStatus::Skipped);
            info!(correlation_id = %state.correlation_id, agent_id = %agent, "skipping agent");
            ActionOutcome::resume(format!("skipped {agent}"))
        }
        RecoveryStrategy::AskUser => ActionOutcome::ask(params.question, "recovery: asking the user".into()),
    }
}
