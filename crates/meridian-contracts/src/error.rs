//! Runtime error types for the meridian orchestration pipeline.
//!
//! All fallible operations in the workspace return `MeridianResult<T>`.
//! Error variants carry enough context to produce actionable log entries.

use thiserror::Error;

/// The unified error type for the meridian runtime.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// An agent descriptor was rejected at registration time.
    #[error("agent registration rejected for '{agent_id}': {reason}")]
    Registration { agent_id: String, reason: String },

    /// Registering the agent would close a dependency cycle.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A referenced agent id is not present in the registry or runtime.
    #[error("unknown agent '{agent_id}'")]
    UnknownAgent { agent_id: String },

    /// An agent ran and reported a failure.
    #[error("agent '{agent_id}' failed: {reason}")]
    AgentFailed { agent_id: String, reason: String },

    /// An external call exceeded its bounded duration.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The agent's circuit breaker is open; the call was short-circuited.
    #[error("circuit open for agent '{agent_id}'")]
    CircuitOpen { agent_id: String },

    /// State failed schema validation in a way that blocks the operation.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },

    /// A state record could not be migrated between schema versions.
    #[error("migration from {from} to {to} failed: {reason}")]
    MigrationFailed {
        from: String,
        to: String,
        reason: String,
    },

    /// A checkpoint could not be written or read.
    #[error("checkpoint error: {reason}")]
    Checkpoint { reason: String },

    /// The cache or reference-content store rejected an operation.
    #[error("cache store error: {reason}")]
    Cache { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl MeridianError {
    /// True for timeout and breaker-open failures.
    ///
    /// The supervisor handles these exactly like agent execution failures.
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CircuitOpen { .. })
    }
}

impl From<serde_json::Error> for MeridianError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the meridian crates.
pub type MeridianResult<T> = Result<T, MeridianError>;
