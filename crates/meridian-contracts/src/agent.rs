//! Agent identity, descriptor, and invocation types.
//!
//! A descriptor says what an agent can do, what it needs, and which state
//! fields it reads and writes. The runtime never inspects agent internals;
//! it only routes `AgentInput` in and merges `AgentOutput` back.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::ComputationState;

/// Stable, human-readable identifier for an agent.
///
/// Example: `AgentId::new("route_agent")`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Registration-level availability of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

/// Rolling execution statistics, updated only from the agent's own outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    /// Rolling mean of execution latency in milliseconds.
    pub avg_latency_ms: f64,
    /// `successful_executions / total_executions`, 0.0 before the first run.
    pub success_rate: f64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl RuntimeMetadata {
    /// Fold one execution outcome into the rolling statistics.
    pub fn record(&mut self, duration_ms: u64, success: bool) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        }
        let n = self.total_executions as f64;
        self.avg_latency_ms += (duration_ms as f64 - self.avg_latency_ms) / n;
        self.success_rate = self.successful_executions as f64 / n;
    }
}

/// Everything the registry and planner know about one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
    pub version: String,
    /// Capability names matched against an intent's target capability set.
    pub capabilities: BTreeSet<String>,
    /// Agents that must have run before this one.
    pub dependencies: Vec<AgentId>,
    /// Lower runs earlier.
    pub priority: u32,
    pub status: AgentStatus,
    /// State fields this agent writes. The first entry is its primary output.
    pub produced_fields: Vec<String>,
    /// State fields this agent reads; producers of these become implicit dependencies.
    pub consumed_fields: Vec<String>,
    pub tools: Vec<String>,
    /// May share an execution stage with other parallel-eligible agents.
    pub can_run_parallel: bool,
    #[serde(default)]
    pub runtime_metadata: RuntimeMetadata,
}

impl AgentDescriptor {
    /// Start a descriptor with default version `1.0.0`, priority 100, active.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(id),
            name: name.into(),
            version: "1.0.0".to_string(),
            capabilities: BTreeSet::new(),
            dependencies: Vec::new(),
            priority: 100,
            status: AgentStatus::Active,
            produced_fields: Vec::new(),
            consumed_fields: Vec::new(),
            tools: Vec::new(),
            can_run_parallel: false,
            runtime_metadata: RuntimeMetadata::default(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(deps.into_iter().map(|d| AgentId::new(d)));
        self
    }

    pub fn produces<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produced_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn consumes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumed_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.can_run_parallel = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// The field whose presence means this agent's work is done.
    pub fn primary_output(&self) -> Option<&str> {
        self.produced_fields.first().map(String::as_str)
    }
}

/// Per-query execution status of an agent, stored in `ComputationState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

/// The last failure an agent reported for the current query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorRecord {
    pub error: String,
    pub timestamp: DateTime<Utc>,
    /// True when the failure came from a timeout or an open breaker.
    #[serde(default)]
    pub resource_error: bool,
}

/// The input delivered to an agent for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    /// The user's query text.
    pub query: String,
    /// Parameters extracted by the pattern matcher or the reasoning model.
    pub params: Value,
}

/// Ambient context for one invocation.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub correlation_id: String,
    /// Read-only snapshot of the shared state at dispatch time.
    pub state: ComputationState,
    /// Supervisor-corrected parameters. When present, agents use these
    /// instead of running their own extraction step.
    pub overrides: Option<Value>,
}

/// What an agent returns on success: a partial state to shallow-merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOutput {
    pub patch: Map<String, Value>,
    /// Short human-readable note recorded as the reasoning observation.
    pub summary: Option<String>,
}

impl AgentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.patch.insert(field.into(), value);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}
