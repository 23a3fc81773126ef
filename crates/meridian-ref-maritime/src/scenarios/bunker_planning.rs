//! Scenario 1: Bunker planning on the fast path
//!
//! "Plan bunkering from Singapore to Rotterdam" names both ports, so the
//! keyword matcher proposes each pipeline step at high confidence:
//!
//!   route_agent → weather_agent → bunker_agent → finalize
//!
//! Every cycle is decided by the immediate-action or finalize tier. The
//! routing log shows zero completion calls for the whole run.

use std::sync::Arc;

use meridian_contracts::{error::MeridianResult, reasoning::RoutingMetadata};
use meridian_supervisor::{FinalPayload, InMemoryRoutingLog};

use crate::completion::ScriptedCompletion;
use crate::descriptors::maritime_orchestrator;
use crate::maritime_config;
use crate::matcher::KeywordMatcher;
use crate::scenarios::print_run;

pub const QUERY: &str = "Plan bunkering from Singapore to Rotterdam";

pub struct BunkerPlanningRun {
    pub payload: FinalPayload,
    pub routing: Vec<RoutingMetadata>,
    pub completion_calls: u32,
}

pub async fn run() -> MeridianResult<BunkerPlanningRun> {
    let config = maritime_config()?;
    let completion = Arc::new(ScriptedCompletion::finalizing());
    let log = Arc::new(InMemoryRoutingLog::new());
    let mut orch = maritime_orchestrator(
        &config,
        Arc::new(KeywordMatcher::maritime()?),
        completion.clone(),
        None,
    )?
    .with_recorder(log.clone());

    let payload = orch.run(QUERY).await;
    Ok(BunkerPlanningRun {
        routing: log.for_query(QUERY),
        completion_calls: completion.calls(),
        payload,
    })
}

pub async fn run_scenario() -> MeridianResult<()> {
    println!("=== Scenario 1: Bunker Planning ===");
    println!();
    println!("  Query: {QUERY}");
    println!();

    let result = run().await?;
    print_run(&result.payload);
    println!();

    println!("  Routing log ({} cycles):", result.routing.len());
    for entry in &result.routing {
        println!(
            "    {:<18} target={:<14} confidence={:>3} method={:?} calls={}",
            entry.matched_intent.as_deref().unwrap_or("-"),
            entry.target_agent.as_deref().unwrap_or("-"),
            entry.confidence,
            entry.method,
            entry.completion_calls,
        );
    }
    let calls: u32 = result.routing.iter().map(|r| r.completion_calls).sum();
    println!("  Completion calls: {calls} (service saw {})", result.completion_calls);
    println!();
    println!("  Scenario 1 complete.");
    println!();
    Ok(())
}
