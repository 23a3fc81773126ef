//! # meridian-supervisor
//!
//! Decides, cycle by cycle, what the pipeline does next, and drives the loop.
//!
//! - `DecisionFramework`: hard ceilings and the confidence tiers
//! - `ReasoningFallback`: completion-service escalation with strict decoding
//! - `actions`: `call_agent`, `validate`, `recover`, `clarify`, `finalize`
//! - `Supervisor`: one decision cycle, with reasoning history and routing telemetry
//! - `Orchestrator`: the composition root; runs queries and planned pipelines
//! - `OrchestratorConfig`: TOML configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = OrchestratorConfig::from_file(Path::new("meridian.toml"))?;
//! let mut orch = Orchestrator::new(&config, ExecutionPlanner::default(), matcher, completion)?;
//! orch.register(route_descriptor, Arc::new(RouteAgent))?;
//! let payload = orch.run("Plan bunkering from Singapore to Rotterdam").await;
//! ```

pub mod actions;
pub mod config;
pub mod decision;
pub mod orchestrator;
pub mod reasoning;
pub mod routing_log;
pub mod supervisor;

pub use actions::{ActionOutcome, NextStep, RecoveryStrategy};
pub use config::OrchestratorConfig;
pub use decision::{Classification, DecisionFramework, DecisionTier};
pub use orchestrator::{FinalPayload, Orchestrator};
pub use reasoning::{ReasoningDecision, ReasoningFallback, ReasoningOutcome};
pub use routing_log::{query_hash, InMemoryRoutingLog};
pub use supervisor::{Supervisor, SupervisorDecision};
