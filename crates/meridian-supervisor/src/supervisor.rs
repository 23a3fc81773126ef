//! The supervisor decision engine.
//!
//! One call to [`Supervisor::decide`] is one decision cycle:
//!
//! ```text
//! ceilings ─► pattern matcher ─► decision framework ─┬─► immediate action
//!                                                    ├─► finalize
//!                                                    ├─► request clarification
//!                                                    └─► reasoning fallback ─► action handler
//! ```
//!
//! Every cycle appends one `ReasoningStep` and emits one `RoutingMetadata`
//! record, whichever tier decided.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use meridian_contracts::{
    agent::AgentId,
    reasoning::{ClassificationMethod, ReasoningAction, ReasoningStep, RoutingMetadata},
    state::ComputationState,
};
use meridian_core::traits::{CompletionService, PatternMatch, PatternMatcher, RoutingRecorder};
use meridian_registry::{AgentRegistry, ExecutionPlanner};

use crate::actions::{self, ActionOutcome, NextStep};
use crate::config::SupervisorSettings;
use crate::decision::{clarification_question, Ceiling, Classification, DecisionFramework, DecisionTier};
use crate::reasoning::ReasoningFallback;
use crate::routing_log::query_hash;

/// The outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorDecision {
    pub next: NextStep,
    pub tier: DecisionTier,
    pub action: ReasoningAction,
    pub thought: String,
    pub confidence: u8,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub completion_calls: u32,
}

impl SupervisorDecision {
    pub fn next_agent(&self) -> Option<&AgentId> {
        match &self.next {
            NextStep::Agent(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next == NextStep::Finalize
    }
}

pub struct Supervisor {
    framework: DecisionFramework,
    planner: ExecutionPlanner,
    matcher: Arc<dyn PatternMatcher>,
    reasoning: ReasoningFallback,
    recorder: Option<Arc<dyn RoutingRecorder>>,
    matcher_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        planner: ExecutionPlanner,
        matcher: Arc<dyn PatternMatcher>,
        reasoning: ReasoningFallback,
        matcher_timeout: Duration,
    ) -> Self {
        Self {
            framework: DecisionFramework::new(settings),
            planner,
            matcher,
            reasoning,
            recorder: None,
            matcher_timeout,
        }
    }

    /// Build with a fresh reasoning fallback over `completion`.
    pub fn with_completion(
        settings: SupervisorSettings,
        planner: ExecutionPlanner,
        matcher: Arc<dyn PatternMatcher>,
        completion: Arc<dyn CompletionService>,
        matcher_timeout: Duration,
        completion_timeout: Duration,
    ) -> meridian_contracts::error::MeridianResult<Self> {
        let reasoning =
            ReasoningFallback::new(completion, completion_timeout, settings.recent_reasoning_steps)?;
        Ok(Self::new(settings, planner, matcher, reasoning, matcher_timeout))
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RoutingRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn planner(&self) -> &ExecutionPlanner {
        &self.planner
    }

    pub fn settings(&self) -> &SupervisorSettings {
        self.framework.settings()
    }

    /// Run one decision cycle, recording it on `state`.
    pub async fn decide(
        &self,
        state: &mut ComputationState,
        registry: &AgentRegistry,
    ) -> SupervisorDecision {
        let started = Instant::now();
        let step = state.reasoning_history.len() + 1;

        if let Some(ceiling) = self.framework.check_ceilings(state) {
            let decision = self.ceiling_decision(ceiling, state, registry);
            return self.commit(state, decision, None, json!({}), "ceiling reached", started);
        }

        let query = state.latest_query().to_string();
        let pattern = match timeout(self.matcher_timeout, self.matcher.classify(&query, state)).await {
            Ok(Ok(pm)) => Some(pm),
            Ok(Err(err)) => {
                warn!(correlation_id = %state.correlation_id, error = %err, "pattern matcher failed");
                None
            }
            Err(_) => {
                warn!(correlation_id = %state.correlation_id, "pattern matcher timed out");
                None
            }
        };

        if state.original_intent.is_none() {
            state.original_intent = pattern.as_ref().and_then(|p| p.intent.clone());
        }
        let required = state
            .original_intent
            .as_deref()
            .map(|intent| self.planner.required_outputs(intent))
            .unwrap_or_default();

        let classification = self.framework.classify(pattern.as_ref(), state, registry, &required);
        let confidence = pattern.as_ref().map_or(0, |p| p.confidence);
        debug!(
            correlation_id = %state.correlation_id,
            step,
            confidence,
            classification = ?classification,
            "decision framework"
        );

        let extracted = pattern
            .as_ref()
            .map(|p| p.extracted.clone())
            .unwrap_or(Value::Null);

        let decision = match classification {
            Classification::ImmediateAction { agent, confidence } => SupervisorDecision {
                thought: format!("Pattern match routed to {agent} at {confidence}% confidence"),
                next: NextStep::Agent(agent),
                tier: DecisionTier::ImmediateAction,
                action: ReasoningAction::CallAgent,
                confidence,
                needs_clarification: false,
                clarification_question: None,
                completion_calls: 0,
            },
            Classification::Finalize => SupervisorDecision {
                next: NextStep::Finalize,
                tier: DecisionTier::Finalize,
                action: ReasoningAction::Finalize,
                thought: "All required outputs are present".into(),
                confidence,
                needs_clarification: false,
                clarification_question: None,
                completion_calls: 0,
            },
            Classification::RequestClarification => SupervisorDecision {
                next: NextStep::Finalize,
                tier: DecisionTier::RequestClarification,
                action: ReasoningAction::Clarify,
                thought: format!("Confidence {confidence}% is too low to act"),
                confidence,
                needs_clarification: true,
                clarification_question: Some(clarification_question(registry, pattern.as_ref())),
                completion_calls: 0,
            },
            Classification::EscalateToReasoning => {
                return self
                    .escalate(state, registry, pattern.as_ref(), extracted, started)
                    .await;
            }
        };

        let observation = match &decision.next {
            NextStep::Agent(agent) => format!("routing to {agent}"),
            _ => "terminal".to_string(),
        };
        self.commit(state, decision, pattern.as_ref(), extracted, &observation, started)
    }

    async fn escalate(
        &self,
        state: &mut ComputationState,
        registry: &AgentRegistry,
        pattern: Option<&PatternMatch>,
        extracted: Value,
        started: Instant,
    ) -> SupervisorDecision {
        let plan = state
            .original_intent
            .as_deref()
            .map(|intent| self.planner.plan(registry, intent));
        let outcome = self.reasoning.decide(state, registry, plan.as_ref()).await;
        let ActionOutcome {
            next,
            needs_clarification,
            clarification_question,
            observation,
        } = actions::apply(&outcome.decision, state, registry);

        let decision = SupervisorDecision {
            next,
            tier: DecisionTier::Reasoning,
            action: outcome.decision.action,
            thought: outcome.decision.thought.clone(),
            confidence: pattern.map_or(0, |p| p.confidence),
            needs_clarification,
            clarification_question,
            completion_calls: outcome.completion_calls,
        };
        let params = outcome.decision.params;
        let merged = if params.as_object().is_some_and(|p| !p.is_empty()) {
            params
        } else {
            extracted
        };
        self.commit(state, decision, pattern, merged, &observation, started)
    }

    fn ceiling_decision(
        &self,
        ceiling: Ceiling,
        state: &ComputationState,
        registry: &AgentRegistry,
    ) -> SupervisorDecision {
        let settings = self.framework.settings();
        match ceiling {
            Ceiling::MaxSteps => SupervisorDecision {
                next: NextStep::Finalize,
                tier: DecisionTier::Ceiling,
                action: ReasoningAction::Finalize,
                thought: format!("Reached max steps ({}); finalizing", settings.max_steps),
                confidence: 0,
                needs_clarification: false,
                clarification_question: None,
                completion_calls: 0,
            },
            Ceiling::MaxRecovery => {
                let failed: Vec<&str> = state.agent_errors.keys().map(String::as_str).collect();
                SupervisorDecision {
                    next: NextStep::Finalize,
                    tier: DecisionTier::Ceiling,
                    action: ReasoningAction::Finalize,
                    thought: format!(
                        "Reached max recovery attempts ({}); finalizing",
                        settings.max_recovery_attempts
                    ),
                    confidence: 0,
                    needs_clarification: true,
                    clarification_question: Some(if failed.is_empty() {
                        clarification_question(registry, None)
                    } else {
                        format!(
                            "I ran into problems with {}. Could you confirm the ports, vessel, and dates so I can try again?",
                            failed.join(", ")
                        )
                    }),
                    completion_calls: 0,
                }
            }
        }
    }

    /// Append the reasoning step, update routing fields on the state, and
    /// emit the routing record.
    fn commit(
        &self,
        state: &mut ComputationState,
        decision: SupervisorDecision,
        pattern: Option<&PatternMatch>,
        params: Value,
        observation: &str,
        started: Instant,
    ) -> SupervisorDecision {
        let step_number = state.reasoning_history.len() as u32 + 1;
        let action_params = match &decision.next {
            NextStep::Agent(agent) if !params.is_object() => json!({ "agent": agent }),
            NextStep::Agent(agent) => {
                let mut p = params.clone();
                if let Some(map) = p.as_object_mut() {
                    map.entry("agent").or_insert_with(|| json!(agent));
                }
                p
            }
            _ => params.clone(),
        };
        state.reasoning_history.push(ReasoningStep {
            step_number,
            thought: decision.thought.clone(),
            action: decision.action,
            action_params,
            observation: Some(observation.to_string()),
            timestamp: Utc::now(),
        });

        state.next_agent = decision.next_agent().map(ToString::to_string);
        if decision.needs_clarification {
            state.needs_clarification = true;
            state.clarification_question = decision.clarification_question.clone();
        }

        let metadata = RoutingMetadata {
            query_hash: query_hash(state.latest_query()),
            matched_intent: pattern.and_then(|p| p.intent.clone()),
            target_agent: state.next_agent.clone(),
            confidence: decision.confidence,
            method: classification_method(decision.tier, pattern),
            reasoning: decision.thought.clone(),
            extracted_params: params,
            latency_ms: started.elapsed().as_millis() as u64,
            completion_calls: decision.completion_calls,
            estimated_cost_usd: f64::from(decision.completion_calls) * self.reasoning.cost_per_call_usd(),
            timestamp: Utc::now(),
        };
        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.record(&metadata) {
                warn!(correlation_id = %state.correlation_id, error = %err, "routing record dropped");
            }
        }
        state.routing_metadata = Some(metadata);

        info!(
            correlation_id = %state.correlation_id,
            step = step_number,
            tier = ?decision.tier,
            action = %decision.action,
            confidence = decision.confidence,
            next_agent = ?state.next_agent,
            "supervisor decision"
        );
        decision
    }
}

/// Reasoning that stands in for a matcher with no intent also classifies
/// the query.
fn classification_method(tier: DecisionTier, pattern: Option<&PatternMatch>) -> ClassificationMethod {
    match tier {
        DecisionTier::Reasoning if pattern.and_then(|p| p.intent.as_ref()).is_none() => {
            ClassificationMethod::LlmIntentClassifier
        }
        DecisionTier::Reasoning => ClassificationMethod::LlmReasoning,
        _ => ClassificationMethod::PatternMatch,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use meridian_contracts::{
        agent::{AgentDescriptor, AgentRunStatus},
        error::{MeridianError, MeridianResult},
        state::Message,
    };
    use meridian_core::traits::CompletionRequest;

    use crate::routing_log::InMemoryRoutingLog;

    use super::*;

    struct FixedMatcher(Mutex<PatternMatch>);

    impl FixedMatcher {
        fn new(confidence: u8, agent: Option<&str>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(PatternMatch {
                intent: Some("bunker_planning".into()),
                suggested_agent: agent.map(AgentId::new),
                confidence,
                extracted: json!({ "origin": "SGSIN" }),
            })))
        }
    }

    #[async_trait]
    impl PatternMatcher for FixedMatcher {
        async fn classify(&self, _query: &str, _state: &ComputationState) -> MeridianResult<PatternMatch> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct FailingMatcher;

    #[async_trait]
    impl PatternMatcher for FailingMatcher {
        async fn classify(&self, _query: &str, _state: &ComputationState) -> MeridianResult<PatternMatch> {
            Err(MeridianError::ConfigError {
                reason: "no patterns loaded".into(),
            })
        }
    }

    /// Replies with the same JSON every time and counts calls.
    struct CountingCompletion {
        reply: String,
        calls: AtomicU32,
    }

    impl CountingCompletion {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for CountingCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> MeridianResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        fn cost_per_call_usd(&self) -> f64 {
            0.002
        }
    }

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
            .register(
                AgentDescriptor::new("bunker_agent", "Bunker")
                    .with_capabilities(["bunker_optimization"])
                    .depends_on(["route_agent", "weather_agent"])
                    .produces(["bunker_analysis"]),
            )
            .unwrap();
        registry
    }

    fn supervisor(
        matcher: Arc<dyn PatternMatcher>,
        completion: Arc<dyn CompletionService>,
    ) -> Supervisor {
        Supervisor::with_completion(
            SupervisorSettings::default(),
            ExecutionPlanner::default(),
            matcher,
            completion,
            Duration::from_secs(5),
            Duration::from_secs(20),
        )
        .unwrap()
    }

    fn state() -> ComputationState {
        let mut state = ComputationState::new("corr-sup");
        state.messages.push(Message::user("What's the weather on my route?"));
        state
    }

    const CALL_ROUTE: &str =
        r#"{"thought":"need a route","action":"call_agent","params":{"agent":"route_agent"}}"#;

    #[tokio::test]
    async fn high_confidence_skips_reasoning() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let log = InMemoryRoutingLog::new();
        let sup = supervisor(FixedMatcher::new(95, Some("weather_agent")), completion.clone())
            .with_recorder(Arc::new(log.clone()));
        let mut state = state();

        let decision = sup.decide(&mut state, &registry()).await;

        assert_eq!(decision.next_agent(), Some(&AgentId::new("weather_agent")));
        assert!(!decision.needs_clarification);
        assert_eq!(decision.tier, DecisionTier::ImmediateAction);
        assert_eq!(completion.calls(), 0);
        assert_eq!(state.next_agent.as_deref(), Some("weather_agent"));
        assert!(!state.needs_clarification);

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, ClassificationMethod::PatternMatch);
        assert_eq!(records[0].completion_calls, 0);
        assert_eq!(records[0].query_hash, query_hash("What's the weather on my route?"));
    }

    #[tokio::test]
    async fn medium_confidence_escalates_once() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let log = InMemoryRoutingLog::new();
        let sup = supervisor(FixedMatcher::new(55, Some("weather_agent")), completion.clone())
            .with_recorder(Arc::new(log.clone()));
        let mut state = state();

        let decision = sup.decide(&mut state, &registry()).await;

        assert_eq!(decision.tier, DecisionTier::Reasoning);
        assert_eq!(decision.next_agent(), Some(&AgentId::new("route_agent")));
        assert_eq!(completion.calls(), 1);
        let record = &log.records()[0];
        assert_eq!(record.method, ClassificationMethod::LlmReasoning);
        assert_eq!(record.completion_calls, 1);
        assert!((record.estimated_cost_usd - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn low_confidence_requests_clarification() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let sup = supervisor(FixedMatcher::new(10, None), completion.clone());
        let mut state = state();

        let decision = sup.decide(&mut state, &registry()).await;

        assert!(decision.is_terminal());
        assert!(decision.needs_clarification);
        assert!(state.needs_clarification);
        assert!(state.clarification_question.is_some());
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn complete_outputs_finalize_without_reasoning() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let sup = supervisor(FixedMatcher::new(60, None), completion.clone());
        let mut state = state();
        for (agent, field) in [
            ("route_agent", "route_data"),
            ("weather_agent", "weather_forecast"),
            ("bunker_agent", "bunker_analysis"),
        ] {
            state.agent_status.insert(agent.into(), AgentRunStatus::Success);
            state.domain.insert(field.into(), json!({ "ok": true }));
        }

        let decision = sup.decide(&mut state, &registry()).await;

        assert_eq!(decision.tier, DecisionTier::Finalize);
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn recovery_ceiling_forces_clarifying_finalize() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let sup = supervisor(FixedMatcher::new(95, Some("route_agent")), completion.clone());
        let mut state = state();
        state.recovery_attempts = 3;

        let decision = sup.decide(&mut state, &registry()).await;

        assert_eq!(decision.tier, DecisionTier::Ceiling);
        assert!(decision.is_terminal());
        assert!(decision.needs_clarification);
        assert_eq!(completion.calls(), 0);
        assert_eq!(state.reasoning_history.len(), 1);
    }

    #[tokio::test]
    async fn step_ceiling_finalizes() {
        let completion = CountingCompletion::new(r#"{"thought":"hmm","action":"validate","params":{}}"#);
        let sup = supervisor(FixedMatcher::new(50, None), completion.clone());
        let mut state = state();

        let mut cycles = 0;
        loop {
            cycles += 1;
            let decision = sup.decide(&mut state, &registry()).await;
            if decision.is_terminal() {
                assert_eq!(decision.tier, DecisionTier::Ceiling);
                assert!(!decision.needs_clarification);
                break;
            }
            assert_eq!(decision.next, NextStep::Continue);
        }
        assert_eq!(cycles, 16);
        assert_eq!(completion.calls(), 15);
    }

    #[tokio::test]
    async fn matcher_failure_goes_to_reasoning() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let sup = supervisor(Arc::new(FailingMatcher), completion.clone());
        let mut state = state();

        let decision = sup.decide(&mut state, &registry()).await;

        assert_eq!(decision.tier, DecisionTier::Reasoning);
        assert_eq!(completion.calls(), 1);
        assert!(state.original_intent.is_none());
        assert_eq!(
            state.routing_metadata.as_ref().map(|r| r.method),
            Some(ClassificationMethod::LlmIntentClassifier)
        );
    }

    /// Never answers within any timeout used here.
    struct StalledMatcher;

    #[async_trait]
    impl PatternMatcher for StalledMatcher {
        async fn classify(&self, _query: &str, _state: &ComputationState) -> MeridianResult<PatternMatch> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(MeridianError::ConfigError {
                reason: "unreachable".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_matcher_is_cut_off_by_matcher_timeout() {
        let completion = CountingCompletion::new(CALL_ROUTE);
        let sup = Supervisor::with_completion(
            SupervisorSettings::default(),
            ExecutionPlanner::default(),
            Arc::new(StalledMatcher),
            completion.clone(),
            Duration::from_secs(2),
            Duration::from_secs(60),
        )
        .unwrap();
        let mut state = state();

        let started = tokio::time::Instant::now();
        let decision = sup.decide(&mut state, &registry()).await;
        let waited = started.elapsed();

        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(60), "waited {waited:?}");
        assert_eq!(decision.tier, DecisionTier::Reasoning);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn unparseable_reasoning_finalizes() {
        let completion = CountingCompletion::new("Sure! Let me call the route agent.");
        let sup = supervisor(FixedMatcher::new(50, None), completion.clone());
        let mut state = state();

        let decision = sup.decide(&mut state, &registry()).await;

        assert!(decision.is_terminal());
        assert_eq!(decision.action, ReasoningAction::Finalize);
        assert!(!decision.needs_clarification);
        assert!(state.reasoning_history[0].thought.contains("unusable"));
    }
}
