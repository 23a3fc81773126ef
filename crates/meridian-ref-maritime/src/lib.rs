//! # meridian-ref-maritime
//!
//! Maritime reference runtime for the meridian orchestration pipeline.
//!
//! Four mock agents (route, weather, bunker, compliance) behind a keyword
//! pattern matcher and a scripted completion service. Three scenarios:
//!
//! 1. **Bunker planning**: every cycle is routed by the pattern matcher, so
//!    the run costs zero completion calls.
//! 2. **Recovery**: a misspelt port is corrected by a reasoning-tier retry, and
//!    a persistently failing agent exhausts the recovery budget.
//! 3. **Checkpoints**: deltas, reference compression of a large field, and
//!    migration of a legacy 1.0 record.
//!
//! All data is hardcoded. No external services are contacted.

pub mod agents;
pub mod completion;
pub mod descriptors;
pub mod matcher;
pub mod mock_data;
pub mod scenarios;

use meridian_contracts::error::MeridianResult;
use meridian_supervisor::OrchestratorConfig;

/// The bundled orchestrator configuration.
pub const MARITIME_CONFIG: &str = include_str!("../config/maritime.toml");

pub fn maritime_config() -> MeridianResult<OrchestratorConfig> {
    OrchestratorConfig::from_toml_str(MARITIME_CONFIG)
}
