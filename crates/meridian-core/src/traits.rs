//! Collaborator trait definitions for the meridian orchestration pipeline.
//!
//! These traits mark every boundary the orchestration core calls across:
//!
//! - `Agent`             a task executor (route, weather, bunker, ...)
//! - `PatternMatcher`    the fast deterministic query classifier
//! - `CompletionService` the language-model service behind reasoning fallback
//! - `CacheStore`        the TTL-keyed blob store under checkpoints
//! - `RoutingRecorder`   the sink for per-cycle routing telemetry
//!
//! Every async method is a suspension point; the runtime wraps each call in a
//! bounded timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use meridian_contracts::{
    agent::{AgentContext, AgentId, AgentInput, AgentOutput},
    error::MeridianResult,
    reasoning::RoutingMetadata,
    state::ComputationState,
};

/// A named, independently invocable task unit.
///
/// Implementations own their domain logic. They read `ctx.state` and
/// return a partial state; the orchestrator merges it after the call.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent once.
    ///
    /// An `Err` is recorded in `agent_errors[agent_id]` and drives the
    /// supervisor's recovery path. It never aborts the decision loop.
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> MeridianResult<AgentOutput>;
}

/// The classifier's proposal for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub intent: Option<String>,
    pub suggested_agent: Option<AgentId>,
    /// 0 to 100.
    pub confidence: u8,
    /// Parameters lifted from the query text (ports, dates, vessel, ...).
    pub extracted: Value,
}

/// Fast, deterministic query classification.
#[async_trait]
pub trait PatternMatcher: Send + Sync {
    async fn classify(&self, query: &str, state: &ComputationState) -> MeridianResult<PatternMatch>;
}

/// A system + user prompt pair sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// The language-model completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw completion text.
    async fn complete(&self, request: &CompletionRequest) -> MeridianResult<String>;

    /// Estimated cost of one call in USD, recorded in routing telemetry.
    fn cost_per_call_usd(&self) -> f64 {
        0.0
    }
}

/// A generic TTL-keyed blob store.
///
/// The state lifecycle manager is the only caller of `keys`, which it uses
/// for conversation-scoped cleanup. Patterns support `*` wildcards.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> MeridianResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> MeridianResult<()>;

    async fn exists(&self, key: &str) -> MeridianResult<bool>;

    /// Reset the key's TTL. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> MeridianResult<bool>;

    /// Remove the key. Returns false when the key was absent.
    async fn del(&self, key: &str) -> MeridianResult<bool>;

    async fn keys(&self, pattern: &str) -> MeridianResult<Vec<String>>;
}

/// Sink for the routing telemetry emitted on every decision cycle.
pub trait RoutingRecorder: Send + Sync {
    fn record(&self, metadata: &RoutingMetadata) -> MeridianResult<()>;
}
