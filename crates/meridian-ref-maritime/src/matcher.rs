//! Keyword pattern matcher for maritime queries.
//!
//! Classification is two-part:
//!
//! 1. **Intent** from keywords, most specific rule first.
//! 2. **Next agent** from the state: the first agent of the intent's plan
//!    whose primary output is still missing.
//!
//! Confidence is high when both ports are known (named in the query or
//! already resolved into `route_data`), medium when the next agent has failed
//! or been skipped, and low when no intent matched at all.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use meridian_contracts::{
    agent::{AgentId, AgentRunStatus},
    error::MeridianResult,
    state::ComputationState,
};
use meridian_core::traits::{PatternMatch, PatternMatcher};
use meridian_registry::{AgentRegistry, ExecutionPlanner};

use crate::descriptors::maritime_agents;
use crate::mock_data::ports_in_text;

pub const HIGH_CONFIDENCE: u8 = 95;
pub const PARTIAL_CONFIDENCE: u8 = 60;
pub const RECOVERY_CONFIDENCE: u8 = 50;
pub const UNMATCHED_CONFIDENCE: u8 = 15;

const RULES: [(&str, &[&str]); 5] = [
    ("voyage_planning", &["voyage plan", "full voyage", "plan my voyage", "end-to-end"]),
    ("bunker_planning", &["bunker", "refuel", "fuel stop"]),
    ("compliance_check", &["compliance", "eca zone", "emission", "sulphur", "sulfur"]),
    ("weather_analysis", &["weather", "forecast", "sea state", "storm"]),
    ("route_planning", &["route", "distance", "how far", "passage"]),
];

/// One plan step: the agent and the field that marks it done.
type PlanStep = (AgentId, Option<String>);

pub struct KeywordMatcher {
    plans: BTreeMap<String, Vec<PlanStep>>,
}

impl KeywordMatcher {
    /// Precompute plan order for every intent the planner knows.
    pub fn new(registry: &AgentRegistry, planner: &ExecutionPlanner) -> Self {
        let plans = planner
            .intents()
            .map(|intent| {
                let steps = planner
                    .plan(registry, intent)
                    .agents
                    .iter()
                    .map(|a| (a.id.clone(), a.primary_output().map(str::to_string)))
                    .collect();
                (intent.to_string(), steps)
            })
            .collect();
        Self { plans }
    }

    /// Matcher over the four maritime agents and the default intent table.
    pub fn maritime() -> MeridianResult<Self> {
        let mut registry = AgentRegistry::new();
        for (descriptor, _) in maritime_agents() {
            registry.register(descriptor)?;
        }
        Ok(Self::new(&registry, &ExecutionPlanner::default()))
    }

    pub fn intent_of(query: &str) -> Option<&'static str> {
        let lower = query.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(intent, _)| *intent)
    }

    fn extract(query: &str) -> Value {
        let mut params = Map::new();
        let ports = ports_in_text(query);
        if let [origin, destination, ..] = ports.as_slice() {
            params.insert("origin".into(), json!(origin.code));
            params.insert("destination".into(), json!(destination.code));
        }
        let lower = query.to_lowercase();
        if lower.contains("mgo") || lower.contains("gasoil") {
            params.insert("fuel".into(), json!("MGO"));
        }
        Value::Object(params)
    }
}

#[async_trait]
impl PatternMatcher for KeywordMatcher {
    async fn classify(&self, query: &str, state: &ComputationState) -> MeridianResult<PatternMatch> {
        let extracted = Self::extract(query);
        let ports_known = extracted.get("origin").is_some() || state.has_field("route_data");

        let intent = Self::intent_of(query).or_else(|| ports_known.then_some("route_planning"));
        let Some(intent) = intent else {
            return Ok(PatternMatch {
                intent: None,
                suggested_agent: None,
                confidence: UNMATCHED_CONFIDENCE,
                extracted,
            });
        };

        let pending = self.plans.get(intent).and_then(|steps| {
            steps.iter().find(|(_, output)| {
                output.as_deref().map_or(true, |field| !state.has_field(field))
            })
        });

        let (suggested_agent, confidence) = match pending {
            Some((agent, _)) => {
                let confidence = match state.status_of(agent.as_str()) {
                    Some(AgentRunStatus::Failed | AgentRunStatus::Skipped) => RECOVERY_CONFIDENCE,
                    _ if ports_known => HIGH_CONFIDENCE,
                    _ => PARTIAL_CONFIDENCE,
                };
                (Some(agent.clone()), confidence)
            }
            None => (None, HIGH_CONFIDENCE),
        };

        Ok(PatternMatch {
            intent: Some(intent.to_string()),
            suggested_agent,
            confidence,
            extracted,
        })
    }
}

#[cfg(test)]
mod tests {
    use meridian_contracts::state::Message;

    use super::*;

    fn state(query: &str) -> ComputationState {
        let mut state = ComputationState::new("c");
        state.messages.push(Message::user(query));
        state
    }

    #[tokio::test]
    async fn named_ports_give_high_confidence_first_step() {
        let m = KeywordMatcher::maritime().unwrap();
        let q = "Plan bunkering from Singapore to Rotterdam";
        let pm = m.classify(q, &state(q)).await.unwrap();
        assert_eq!(pm.intent.as_deref(), Some("bunker_planning"));
        assert_eq!(pm.suggested_agent, Some(AgentId::new("route_agent")));
        assert_eq!(pm.confidence, HIGH_CONFIDENCE);
        assert_eq!(pm.extracted["origin"], "SGSIN");
    }

    #[tokio::test]
    async fn next_step_follows_state() {
        let m = KeywordMatcher::maritime().unwrap();
        let q = "Weather from Singapore to Rotterdam";
        let mut s = state(q);
        s.domain.insert("route_data".into(), json!({ "distance_nm": 7456.0 }));
        let pm = m.classify(q, &s).await.unwrap();
        assert_eq!(pm.suggested_agent, Some(AgentId::new("weather_agent")));

        s.domain.insert("weather_forecast".into(), json!({ "summary": "calm" }));
        let pm = m.classify(q, &s).await.unwrap();
        assert_eq!(pm.suggested_agent, None);
        assert_eq!(pm.confidence, HIGH_CONFIDENCE);
    }

    #[tokio::test]
    async fn unresolved_ports_and_failures_lower_confidence() {
        let m = KeywordMatcher::maritime().unwrap();
        let q = "Plan bunkering from Singapur to Rotterdam";
        let mut s = state(q);
        assert_eq!(m.classify(q, &s).await.unwrap().confidence, PARTIAL_CONFIDENCE);

        s.agent_status.insert("route_agent".into(), AgentRunStatus::Failed);
        assert_eq!(m.classify(q, &s).await.unwrap().confidence, RECOVERY_CONFIDENCE);
    }

    #[tokio::test]
    async fn gibberish_is_unmatched() {
        let m = KeywordMatcher::maritime().unwrap();
        let q = "hello there";
        let pm = m.classify(q, &state(q)).await.unwrap();
        assert!(pm.intent.is_none());
        assert_eq!(pm.confidence, UNMATCHED_CONFIDENCE);
    }
}
