//! Scenario 2: Recovery through the reasoning tier
//!
//! Part A, corrected typo:
//!   "Singapur" does not resolve, so the matcher is unsure and the supervisor
//!   escalates. The scripted reasoning calls route_agent, sees it fail, then
//!   retries it with corrected ports. The rest of the pipeline runs on the
//!   fast path.
//!
//! Part B, exhausted budget:
//!   weather_agent is swapped for a handler that keeps failing. Each retry
//!   costs one recovery attempt; at the ceiling the supervisor stops and asks
//!   the user instead of looping.

use std::sync::Arc;

use serde_json::json;

use meridian_contracts::error::MeridianResult;
use meridian_core::traits::Agent;
use meridian_supervisor::FinalPayload;

use crate::agents::{FlakyAgent, WeatherAgent};
use crate::completion::ScriptedCompletion;
use crate::descriptors::{maritime_orchestrator, ROUTE_AGENT, WEATHER_AGENT};
use crate::maritime_config;
use crate::matcher::KeywordMatcher;
use crate::scenarios::print_run;

pub const TYPO_QUERY: &str = "Plan bunkering from Singapur to Rotterdam";
pub const OUTAGE_QUERY: &str = "Plan bunkering from Singapore to Rotterdam";

pub struct RecoveryRun {
    pub payload: FinalPayload,
    pub completion_calls: u32,
    /// Invocations of the swapped-in handler, when there is one.
    pub handler_calls: Option<u32>,
}

fn call_agent(agent: &str) -> String {
    json!({
        "thought": format!("the matcher is unsure; start with {agent}"),
        "action": "call_agent",
        "params": { "agent": agent },
    })
    .to_string()
}

fn retry(agent: &str, corrected: Option<serde_json::Value>) -> String {
    let mut params = json!({ "strategy": "retry_agent", "agent": agent });
    if let Some(corrected) = corrected {
        params["corrected_params"] = corrected;
    }
    json!({
        "thought": format!("{agent} failed; retry it"),
        "action": "recover",
        "params": params,
    })
    .to_string()
}

/// Part A: a misspelt origin corrected by a retry with overrides.
pub async fn run_typo() -> MeridianResult<RecoveryRun> {
    let completion = Arc::new(ScriptedCompletion::new([
        call_agent(ROUTE_AGENT),
        retry(
            ROUTE_AGENT,
            Some(json!({ "origin": "SGSIN", "destination": "NLRTM" })),
        ),
    ]));
    let mut orch = maritime_orchestrator(
        &maritime_config()?,
        Arc::new(KeywordMatcher::maritime()?),
        completion.clone(),
        None,
    )?;
    let payload = orch.run(TYPO_QUERY).await;
    Ok(RecoveryRun {
        payload,
        completion_calls: completion.calls(),
        handler_calls: None,
    })
}

/// Part B: weather_agent fails `failures` times while reasoning keeps retrying.
pub async fn run_outage(failures: u32) -> MeridianResult<RecoveryRun> {
    let flaky = Arc::new(FlakyAgent::new(WEATHER_AGENT, Arc::new(WeatherAgent), failures));
    let completion = Arc::new(ScriptedCompletion::new([retry(WEATHER_AGENT, None)]));
    let mut orch = maritime_orchestrator(
        &maritime_config()?,
        Arc::new(KeywordMatcher::maritime()?),
        completion.clone(),
        Some((WEATHER_AGENT, flaky.clone() as Arc<dyn Agent>)),
    )?;
    let payload = orch.run(OUTAGE_QUERY).await;
    Ok(RecoveryRun {
        payload,
        completion_calls: completion.calls(),
        handler_calls: Some(flaky.calls()),
    })
}

pub async fn run_scenario() -> MeridianResult<()> {
    println!("=== Scenario 2: Recovery ===");
    println!();

    println!("  --- Part A: misspelt port ---");
    println!("  Query: {TYPO_QUERY}");
    println!();
    let typo = run_typo().await?;
    print_run(&typo.payload);
    println!(
        "  Recovery attempts: {}, completion calls: {}",
        typo.payload.state.recovery_attempts, typo.completion_calls
    );
    println!();

    println!("  --- Part B: weather provider outage ---");
    println!("  Query: {OUTAGE_QUERY}");
    println!();
    let outage = run_outage(u32::MAX).await?;
    print_run(&outage.payload);
    println!(
        "  Recovery attempts: {}, weather invocations: {}",
        outage.payload.state.recovery_attempts,
        outage.handler_calls.unwrap_or(0)
    );
    println!();
    println!("  Scenario 2 complete.");
    println!();
    Ok(())
}
