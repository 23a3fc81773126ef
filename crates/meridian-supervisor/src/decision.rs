//! The tiered decision framework.
//!
//! Given the pattern match and the current state, decide which tier handles
//! this cycle:
//!
//!   1. Ceilings   max steps → finalize; max recovery → finalize + clarification
//!   2. Immediate  confidence ≥ threshold → route to the suggested agent
//!   3. Complete   every required output of the intent present → finalize
//!   4. Unclear    confidence < clarification threshold → ask the user
//!   5. Otherwise  escalate to the reasoning fallback
//!
//! Everything here is synchronous and side-effect free.

use serde::{Deserialize, Serialize};

use meridian_contracts::{
    agent::{AgentId, AgentRunStatus},
    state::ComputationState,
};
use meridian_core::traits::PatternMatch;
use meridian_registry::AgentRegistry;

use crate::config::SupervisorSettings;

/// Which hard ceiling stopped the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    MaxSteps,
    MaxRecovery,
}

/// The tier that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTier {
    Ceiling,
    ImmediateAction,
    Finalize,
    RequestClarification,
    Reasoning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    ImmediateAction { agent: AgentId, confidence: u8 },
    Finalize,
    RequestClarification,
    EscalateToReasoning,
}

#[derive(Debug, Clone)]
pub struct DecisionFramework {
    settings: SupervisorSettings,
}

impl DecisionFramework {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn check_ceilings(&self, state: &ComputationState) -> Option<Ceiling> {
        if state.reasoning_history.len() >= self.settings.max_steps {
            return Some(Ceiling::MaxSteps);
        }
        if state.recovery_attempts >= self.settings.max_recovery_attempts {
            return Some(Ceiling::MaxRecovery);
        }
        None
    }

    /// Tiers 2 to 5. `pattern` is `None` when the matcher itself failed, in
    /// which case only the completeness check can avoid escalation.
    pub fn classify(
        &self,
        pattern: Option<&PatternMatch>,
        state: &ComputationState,
        registry: &AgentRegistry,
        required_outputs: &[String],
    ) -> Classification {
        if let Some(pm) = pattern {
            if pm.confidence >= self.settings.immediate_action_threshold {
                if let Some(agent) = pm.suggested_agent.as_ref() {
                    if is_callable(agent, state, registry) {
                        return Classification::ImmediateAction {
                            agent: agent.clone(),
                            confidence: pm.confidence,
                        };
                    }
                }
            }
        }

        if outputs_complete(state, required_outputs) {
            return Classification::Finalize;
        }

        match pattern {
            Some(pm) if pm.confidence < self.settings.clarification_threshold => {
                Classification::RequestClarification
            }
            _ => Classification::EscalateToReasoning,
        }
    }
}

/// True when every listed output is populated. An empty list is never complete.
pub fn outputs_complete(state: &ComputationState, required_outputs: &[String]) -> bool {
    !required_outputs.is_empty() && required_outputs.iter().all(|f| state.has_field(f))
}

/// Whether an agent already succeeded and its primary output is populated.
/// Such an agent is never re-invoked.
pub fn already_completed(agent: &AgentId, state: &ComputationState, registry: &AgentRegistry) -> bool {
    let succeeded = state.status_of(agent.as_str()) == Some(AgentRunStatus::Success);
    let output_present = registry
        .primary_output(agent)
        .map_or(true, |field| state.has_field(field));
    succeeded && output_present
}

/// Registered, active, and not already completed.
pub fn is_callable(agent: &AgentId, state: &ComputationState, registry: &AgentRegistry) -> bool {
    registry.get(agent).is_some_and(|d| d.is_active()) && !already_completed(agent, state, registry)
}

/// A follow-up question for a query the classifier could not place.
pub fn clarification_question(registry: &AgentRegistry, pattern: Option<&PatternMatch>) -> String {
    let mut capabilities: Vec<&str> = registry
        .active()
        .iter()
        .flat_map(|a| a.capabilities.iter().map(String::as_str))
        .collect();
    capabilities.sort_unstable();
    capabilities.dedup();
    let offer = capabilities.join(", ").replace('_', " ");

    match pattern.and_then(|p| p.intent.as_deref()) {
        Some(intent) => format!(
            "I could not work out the details for {}. Which ports, vessel, and dates should I use?",
            intent.replace('_', " ")
        ),
        None => format!(
            "Could you clarify what you need? I can help with: {offer}. Please include the ports or vessel involved."
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use meridian_contracts::agent::AgentDescriptor;

    use super::*;

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor::new("route_agent", "Route")
                    .with_capabilities(["route_calculation"])
                    .produces(["route_data"]),
            )
            .unwrap();
        registry
            .register(
                AgentDescriptor::new("weather_agent", "Weather")
                    .with_capabilities(["weather_forecast"])
                    .depends_on(["route_agent"])
                    .produces(["weather_forecast"]),
            )
            .unwrap();
        registry
    }

    fn pm(confidence: u8, agent: Option<&str>) -> PatternMatch {
        PatternMatch {
            intent: Some("weather_analysis".into()),
            suggested_agent: agent.map(AgentId::new),
            confidence,
            extracted: json!({}),
        }
    }

    fn framework() -> DecisionFramework {
        DecisionFramework::new(SupervisorSettings::default())
    }

    #[test]
    fn high_confidence_routes_immediately() {
        let state = ComputationState::new("c");
        let c = framework().classify(Some(&pm(95, Some("weather_agent"))), &state, &registry(), &[]);
        assert_eq!(
            c,
            Classification::ImmediateAction {
                agent: AgentId::new("weather_agent"),
                confidence: 95
            }
        );
    }

    #[test]
    fn threshold_boundaries() {
        let state = ComputationState::new("c");
        let f = framework();
        let reg = registry();
        assert!(matches!(
            f.classify(Some(&pm(80, Some("route_agent"))), &state, &reg, &[]),
            Classification::ImmediateAction { .. }
        ));
        assert_eq!(
            f.classify(Some(&pm(79, Some("route_agent"))), &state, &reg, &[]),
            Classification::EscalateToReasoning
        );
        assert_eq!(
            f.classify(Some(&pm(30, None)), &state, &reg, &[]),
            Classification::EscalateToReasoning
        );
        assert_eq!(
            f.classify(Some(&pm(29, None)), &state, &reg, &[]),
            Classification::RequestClarification
        );
        assert_eq!(
            f.classify(None, &state, &reg, &[]),
            Classification::EscalateToReasoning
        );
    }

    #[test]
    fn completed_agent_is_not_routed_again() {
        let mut state = ComputationState::new("c");
        state.agent_status.insert("route_agent".into(), AgentRunStatus::Success);
        state.domain.insert("route_data".into(), json!({ "distance_nm": 1.0 }));
        let required = vec!["route_data".to_string()];

        let c = framework().classify(Some(&pm(90, Some("route_agent"))), &state, &registry(), &required);
        assert_eq!(c, Classification::Finalize);
    }

    #[test]
    fn unknown_suggested_agent_falls_through() {
        let state = ComputationState::new("c");
        let c = framework().classify(Some(&pm(90, Some("ghost_agent"))), &state, &registry(), &[]);
        assert_eq!(c, Classification::EscalateToReasoning);
    }

    #[test]
    fn ceilings_checked_in_order() {
        let f = framework();
        let mut state = ComputationState::new("c");
        assert_eq!(f.check_ceilings(&state), None);
        state.recovery_attempts = 3;
        assert_eq!(f.check_ceilings(&state), Some(Ceiling::MaxRecovery));
    }

    #[test]
    fn question_mentions_capabilities_without_intent() {
        let q = clarification_question(&registry(), None);
        assert!(q.contains("route calculation"));
        let q = clarification_question(&registry(), Some(&pm(10, None)));
        assert!(q.contains("weather analysis"));
    }
}
