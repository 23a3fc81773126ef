//! The agent runtime: bounded, breaker-guarded agent invocation.
//!
//! Every call follows the same pipeline:
//!
//!   Lookup → Breaker → [Agent::execute under timeout] → Breaker outcome → Log
//!
//! The runtime never mutates `ComputationState`. It hands back an
//! `AgentInvocation` and the orchestrator decides how to merge it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use meridian_contracts::{
    agent::{AgentContext, AgentId, AgentInput, AgentOutput},
    error::{MeridianError, MeridianResult},
};

use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use crate::traits::Agent;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub agent_timeout: Duration,
    pub breaker: BreakerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(30),
            breaker: BreakerConfig::default(),
        }
    }
}

/// The result of one agent call, successful or not.
#[derive(Debug)]
pub struct AgentInvocation {
    pub agent_id: AgentId,
    pub outcome: MeridianResult<AgentOutput>,
    pub duration: Duration,
}

impl AgentInvocation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Bound agent implementations plus one breaker per agent.
pub struct AgentRuntime {
    handlers: HashMap<AgentId, Arc<dyn Agent>>,
    breakers: HashMap<AgentId, CircuitBreaker>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            breakers: HashMap::new(),
            config,
        }
    }

    /// Attach an implementation to an agent id. Rebinding replaces the
    /// handler and resets its breaker.
    pub fn bind(&mut self, agent_id: AgentId, agent: Arc<dyn Agent>) {
        let breaker = CircuitBreaker::new(agent_id.as_str(), self.config.breaker.clone());
        self.breakers.insert(agent_id.clone(), breaker);
        self.handlers.insert(agent_id, agent);
    }

    pub fn unbind(&mut self, agent_id: &AgentId) -> bool {
        self.breakers.remove(agent_id);
        self.handlers.remove(agent_id).is_some()
    }

    pub fn is_bound(&self, agent_id: &AgentId) -> bool {
        self.handlers.contains_key(agent_id)
    }

    pub fn breaker_state(&self, agent_id: &AgentId) -> Option<CircuitState> {
        self.breakers.get(agent_id).map(CircuitBreaker::state)
    }

    /// Invoke one agent.
    ///
    /// Unknown agents, open breakers, timeouts, and agent errors all come back
    /// as an `Err` outcome; this method itself never fails.
    pub async fn invoke(
        &self,
        agent_id: &AgentId,
        input: AgentInput,
        ctx: AgentContext,
    ) -> AgentInvocation {
        let started = Instant::now();
        let correlation_id = ctx.correlation_id.clone();

        let (Some(agent), Some(breaker)) = (self.handlers.get(agent_id), self.breakers.get(agent_id))
        else {
            warn!(agent_id = %agent_id, correlation_id = %correlation_id, "no handler bound for agent");
            return AgentInvocation {
                agent_id: agent_id.clone(),
                outcome: Err(MeridianError::UnknownAgent {
                    agent_id: agent_id.to_string(),
                }),
                duration: started.elapsed(),
            };
        };

        if !breaker.try_acquire() {
            warn!(
                agent_id = %agent_id,
                correlation_id = %correlation_id,
                event = "failed",
                "circuit open, returning fallback error"
            );
            return AgentInvocation {
                agent_id: agent_id.clone(),
                outcome: Err(MeridianError::CircuitOpen {
                    agent_id: agent_id.to_string(),
                }),
                duration: started.elapsed(),
            };
        }

        info!(agent_id = %agent_id, correlation_id = %correlation_id, event = "start", "agent execution");

        let outcome = match timeout(self.config.agent_timeout, agent.execute(&input, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(MeridianError::Timeout {
                operation: format!("agent {agent_id}"),
                timeout_ms: self.config.agent_timeout.as_millis() as u64,
            }),
        };
        let duration = started.elapsed();

        match &outcome {
            Ok(output) => {
                breaker.record_success();
                info!(
                    agent_id = %agent_id,
                    correlation_id = %correlation_id,
                    event = "success",
                    duration_ms = duration.as_millis() as u64,
                    fields = output.patch.len(),
                    "agent execution"
                );
            }
            Err(err) => {
                breaker.record_failure();
                warn!(
                    agent_id = %agent_id,
                    correlation_id = %correlation_id,
                    event = "failed",
                    duration_ms = duration.as_millis() as u64,
                    error = %err,
                    "agent execution"
                );
            }
        }

        AgentInvocation {
            agent_id: agent_id.clone(),
            outcome,
            duration,
        }
    }

    /// Run every call of one parallel stage concurrently and wait for all of
    /// them (fan-out/fan-in barrier). Results come back in call order.
    pub async fn invoke_stage(
        &self,
        calls: Vec<(AgentId, AgentInput, AgentContext)>,
    ) -> Vec<AgentInvocation> {
        debug!(stage_size = calls.len(), "dispatching parallel stage");
        let futures = calls
            .into_iter()
            .map(|(id, input, ctx)| async move { self.invoke(&id, input, ctx).await });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use meridian_contracts::state::ComputationState;

    use super::*;

    fn ctx() -> AgentContext {
        AgentContext {
            correlation_id: "corr-test".to_string(),
            state: ComputationState::new("corr-test"),
            overrides: None,
        }
    }

    fn input() -> AgentInput {
        AgentInput {
            query: "route from Singapore to Rotterdam".to_string(),
            params: json!({}),
        }
    }

    /// Succeeds and counts calls.
    struct CountingAgent {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        async fn execute(&self, _input: &AgentInput, _ctx: &AgentContext) -> MeridianResult<AgentOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AgentOutput::new().with_field("route_data", json!({ "distance_nm": 8288.0 })))
        }
    }

    /// Always fails and counts calls.
    struct FailingAgent {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Agent for FailingAgent {
        async fn execute(&self, _input: &AgentInput, _ctx: &AgentContext) -> MeridianResult<AgentOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MeridianError::AgentFailed {
                agent_id: "weather_agent".to_string(),
                reason: "provider unavailable".to_string(),
            })
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl Agent for SlowAgent {
        async fn execute(&self, _input: &AgentInput, _ctx: &AgentContext) -> MeridianResult<AgentOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentOutput::new())
        }
    }

    #[tokio::test]
    async fn successful_invocation_returns_patch() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut runtime = AgentRuntime::new(RuntimeConfig::default());
        let id = AgentId::new("route_agent");
        runtime.bind(id.clone(), Arc::new(CountingAgent { calls: calls.clone() }));

        let invocation = runtime.invoke(&id, input(), ctx()).await;

        assert!(invocation.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let output = invocation.outcome.unwrap();
        assert!(output.patch.contains_key("route_data"));
    }

    #[tokio::test]
    async fn unknown_agent_is_an_error_outcome() {
        let runtime = AgentRuntime::new(RuntimeConfig::default());
        let invocation = runtime.invoke(&AgentId::new("ghost_agent"), input(), ctx()).await;
        assert!(matches!(invocation.outcome, Err(MeridianError::UnknownAgent { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_surfaces_as_resource_error() {
        let mut runtime = AgentRuntime::new(RuntimeConfig {
            agent_timeout: Duration::from_secs(1),
            ..RuntimeConfig::default()
        });
        let id = AgentId::new("slow_agent");
        runtime.bind(id.clone(), Arc::new(SlowAgent));

        let invocation = runtime.invoke(&id, input(), ctx()).await;

        match invocation.outcome {
            Err(err @ MeridianError::Timeout { .. }) => assert!(err.is_resource_error()),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_calling_agent() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut runtime = AgentRuntime::new(RuntimeConfig {
            breaker: BreakerConfig {
                window_size: 4,
                minimum_calls: 2,
                failure_rate_threshold: 0.5,
                cooldown: Duration::from_secs(300),
                half_open_successes: 1,
            },
            ..RuntimeConfig::default()
        });
        let id = AgentId::new("weather_agent");
        runtime.bind(id.clone(), Arc::new(FailingAgent { calls: calls.clone() }));

        runtime.invoke(&id, input(), ctx()).await;
        runtime.invoke(&id, input(), ctx()).await;
        assert_eq!(runtime.breaker_state(&id), Some(CircuitState::Open));

        let invocation = runtime.invoke(&id, input(), ctx()).await;
        assert!(matches!(invocation.outcome, Err(MeridianError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "agent must not run while open");
    }

    #[tokio::test]
    async fn stage_returns_results_in_call_order() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut runtime = AgentRuntime::new(RuntimeConfig::default());
        runtime.bind(AgentId::new("a"), Arc::new(CountingAgent { calls: calls.clone() }));
        runtime.bind(AgentId::new("b"), Arc::new(FailingAgent { calls: calls.clone() }));

        let results = runtime
            .invoke_stage(vec![
                (AgentId::new("a"), input(), ctx()),
                (AgentId::new("b"), input(), ctx()),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].agent_id, AgentId::new("a"));
        assert!(results[0].succeeded());
        assert!(!results[1].succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
