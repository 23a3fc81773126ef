//! Supervisor bookkeeping: reasoning steps and routing telemetry.
//!
//! `ReasoningStep` is append-only history written by the decision engine.
//! `RoutingMetadata` is overwritten every cycle and is observability only;
//! nothing replays it to make control-flow decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The action the supervisor chose in one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningAction {
    /// Invoke the agent named in `action_params.agent`.
    CallAgent,
    /// Think without acting; control loops back into the decision engine.
    Validate,
    /// Handle a failed agent: retry, skip, or ask the user.
    Recover,
    /// Stop and ask the user a follow-up question.
    Clarify,
    /// Stop and synthesize the final answer.
    Finalize,
}

impl ReasoningAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallAgent => "call_agent",
            Self::Validate => "validate",
            Self::Recover => "recover",
            Self::Clarify => "clarify",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for ReasoningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in `ComputationState::reasoning_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based position in the history.
    pub step_number: u32,
    /// Free-text rationale.
    pub thought: String,
    pub action: ReasoningAction,
    pub action_params: Value,
    pub observation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Which tier produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    PatternMatch,
    LlmIntentClassifier,
    LlmReasoning,
}

/// Telemetry for one decision cycle, keyed by the originating query hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// First 16 hex chars of SHA-256 over the query text.
    pub query_hash: String,
    pub matched_intent: Option<String>,
    pub target_agent: Option<String>,
    /// 0 to 100.
    pub confidence: u8,
    pub method: ClassificationMethod,
    pub reasoning: String,
    pub extracted_params: Value,
    pub latency_ms: u64,
    pub completion_calls: u32,
    pub estimated_cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}
