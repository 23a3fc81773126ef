//! The shared computation state threaded through every agent call.
//!
//! Supervisor bookkeeping is typed; domain payloads (route, weather, bunker,
//! compliance, ...) live in the flattened `domain` map so that agents can add
//! fields the supervisor knows nothing about without them being dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    agent::{AgentErrorRecord, AgentRunStatus},
    error::{MeridianError, MeridianResult},
    reasoning::{ReasoningStep, RoutingMetadata},
    schema::CURRENT_SCHEMA_VERSION,
};

/// Fields whose object values merge key-by-key instead of being replaced.
const KEYED_MERGE_FIELDS: [&str; 3] = ["agent_status", "agent_errors", "agent_overrides"];

/// Fields whose array values are appended to instead of being replaced.
const APPEND_MERGE_FIELDS: [&str; 1] = ["messages"];

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The single mutable aggregate for one user query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationState {
    #[serde(rename = "_schemaVersion")]
    pub schema_version: String,
    pub correlation_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub agent_status: BTreeMap<String, AgentRunStatus>,
    #[serde(default)]
    pub agent_errors: BTreeMap<String, AgentErrorRecord>,
    /// Supervisor-corrected parameters, consumed by the next invocation.
    #[serde(default)]
    pub agent_overrides: BTreeMap<String, Value>,
    #[serde(default)]
    pub reasoning_history: Vec<ReasoningStep>,
    #[serde(default)]
    pub recovery_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_intent: Option<String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_metadata: Option<RoutingMetadata>,
    /// Domain results keyed by field name (`route_data`, `weather_forecast`, ...).
    #[serde(flatten)]
    pub domain: Map<String, Value>,
}

impl ComputationState {
    /// Fresh state tagged with the current schema version.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            correlation_id: correlation_id.into(),
            messages: Vec::new(),
            agent_status: BTreeMap::new(),
            agent_errors: BTreeMap::new(),
            agent_overrides: BTreeMap::new(),
            reasoning_history: Vec::new(),
            recovery_attempts: 0,
            original_intent: None,
            needs_clarification: false,
            clarification_question: None,
            next_agent: None,
            final_recommendation: None,
            routing_metadata: None,
            domain: Map::new(),
        }
    }

    /// The most recent user message, or an empty string.
    pub fn latest_query(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// A populated (non-null) domain field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.domain.get(name).filter(|v| !v.is_null())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn status_of(&self, agent_id: &str) -> Option<AgentRunStatus> {
        self.agent_status.get(agent_id).copied()
    }

    /// Serialize into the flat record form used by the lifecycle passes.
    pub fn to_record(&self) -> MeridianResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(MeridianError::Serialization {
                reason: format!("state serialized to non-object value: {other}"),
            }),
        }
    }

    /// Rebuild a typed state from a flat record.
    pub fn from_record(record: Map<String, Value>) -> MeridianResult<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    /// Shallow-merge a partial state produced by an agent.
    ///
    /// `messages` are appended, the per-agent maps merge key by key, and every
    /// other field in `patch` replaces the prior value. Nothing in `patch` is
    /// dropped: unknown fields land in `domain`.
    pub fn merge(&mut self, patch: Map<String, Value>) -> MeridianResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut record = self.to_record()?;
        for (key, value) in patch {
            if APPEND_MERGE_FIELDS.contains(&key.as_str()) {
                if let (Some(Value::Array(existing)), Value::Array(new_items)) =
                    (record.get_mut(&key), &value)
                {
                    existing.extend(new_items.iter().cloned());
                    continue;
                }
            }
            if KEYED_MERGE_FIELDS.contains(&key.as_str()) {
                if let (Some(Value::Object(existing)), Value::Object(new_entries)) =
                    (record.get_mut(&key), &value)
                {
                    for (k, v) in new_entries {
                        existing.insert(k.clone(), v.clone());
                    }
                    continue;
                }
            }
            record.insert(key, value);
        }
        *self = Self::from_record(record)?;
        Ok(())
    }
}
