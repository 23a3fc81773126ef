//! End-to-end runs of the maritime reference runtime.

use std::sync::Arc;

use meridian_contracts::reasoning::ClassificationMethod;
use meridian_ref_maritime::{
    completion::ScriptedCompletion,
    descriptors::{maritime_orchestrator, BUNKER_AGENT, ROUTE_AGENT, WEATHER_AGENT},
    maritime_config,
    matcher::KeywordMatcher,
    scenarios::{bunker_planning, checkpoint, recovery},
};
use meridian_state::InMemoryCacheStore;

fn has(agents: &[String], id: &str) -> bool {
    agents.iter().any(|a| a == id)
}

#[tokio::test]
async fn bunker_planning_needs_no_completion_calls() {
    let run = bunker_planning::run().await.unwrap();

    assert!(!run.payload.needs_clarification);
    for agent in [ROUTE_AGENT, WEATHER_AGENT, BUNKER_AGENT] {
        assert!(has(&run.payload.completed_agents, agent), "{agent} did not complete");
    }
    assert_eq!(run.payload.steps, 4);
    assert_eq!(run.completion_calls, 0);
    assert_eq!(run.routing.len(), 4);
    assert!(run.routing.iter().all(|r| r.completion_calls == 0));
    assert!(run
        .routing
        .iter()
        .all(|r| r.method == ClassificationMethod::PatternMatch));
    assert!(run.payload.answer.contains("AEFJR"), "{}", run.payload.answer);
}

#[tokio::test]
async fn misspelt_port_is_corrected_by_retry() {
    let run = recovery::run_typo().await.unwrap();

    assert!(!run.payload.needs_clarification);
    assert_eq!(run.completion_calls, 2);
    assert_eq!(run.payload.state.recovery_attempts, 1);
    assert!(has(&run.payload.completed_agents, BUNKER_AGENT));
    assert!(run.payload.failed_agents.is_empty());
    let route = run.payload.state.field("route_data").unwrap();
    assert_eq!(route["origin"], "SGSIN");
    assert!(run.payload.state.agent_overrides.is_empty());
}

#[tokio::test]
async fn persistent_outage_exhausts_recovery_and_asks() {
    let run = recovery::run_outage(u32::MAX).await.unwrap();

    assert!(run.payload.needs_clarification);
    assert_eq!(run.payload.state.recovery_attempts, 3);
    assert_eq!(run.handler_calls, Some(3));
    assert_eq!(run.completion_calls, 2);
    assert_eq!(run.payload.failed_agents, vec![WEATHER_AGENT]);
    assert!(run.payload.answer.contains(WEATHER_AGENT));
}

#[tokio::test]
async fn transient_outage_recovers() {
    let run = recovery::run_outage(1).await.unwrap();

    assert!(!run.payload.needs_clarification);
    assert_eq!(run.handler_calls, Some(2));
    assert_eq!(run.payload.state.recovery_attempts, 1);
    assert!(has(&run.payload.completed_agents, BUNKER_AGENT));
}

#[tokio::test]
async fn checkpointed_run_loads_back_with_deltas() {
    let run = checkpoint::run_persisted(Arc::new(InMemoryCacheStore::new()))
        .await
        .unwrap();

    let loaded = run.loaded.expect("checkpoint present");
    assert!(!loaded.migrated);
    assert_eq!(loaded.stored_version, "2.1.0");
    assert_eq!(
        loaded.state.final_recommendation,
        run.payload.state.final_recommendation
    );
    // three resume checkpoints and one display checkpoint
    assert_eq!(run.delta_count, 3);
}

#[tokio::test]
async fn large_checksum_is_stored_by_reference() {
    let (receipt, loaded) = checkpoint::run_compression(Arc::new(InMemoryCacheStore::new()))
        .await
        .unwrap();

    assert_eq!(receipt.compression.fields_compressed, vec!["checksum"]);
    assert!(receipt.compression.bytes_after < receipt.compression.bytes_before);
    let loaded = loaded.unwrap();
    assert_eq!(loaded.decompression.references_resolved, 1);
    assert_eq!(loaded.state.field("checksum").unwrap().as_str().unwrap().len(), 10 * 1024);
}

#[tokio::test]
async fn legacy_record_is_migrated_on_load() {
    let loaded = checkpoint::run_migration(Arc::new(InMemoryCacheStore::new()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(loaded.stored_version, "1.0.0");
    assert!(loaded.migrated);
    let forecast = loaded.state.field("weather_forecast").unwrap();
    assert_eq!(forecast["summary"], "rough seas on 1 segment(s)");
    assert_eq!(loaded.state.recovery_attempts, 0);
    assert!(!loaded.warnings.is_empty());
}

#[tokio::test]
async fn compliance_query_uses_extracted_fuel() {
    let mut orch = maritime_orchestrator(
        &maritime_config().unwrap(),
        Arc::new(KeywordMatcher::maritime().unwrap()),
        Arc::new(ScriptedCompletion::finalizing()),
        None,
    )
    .unwrap();

    let payload = orch
        .run("Emission compliance from Singapore to Rotterdam burning MGO")
        .await;

    assert_eq!(payload.steps, 3);
    let compliance = payload.state.field("compliance_data").unwrap();
    assert_eq!(compliance["fuel"], "MGO");
    assert_eq!(compliance["compliant"], true);
    assert!(payload.answer.contains("Compliance: compliant."));
}

#[tokio::test]
async fn voyage_plan_runs_stage_by_stage() {
    let mut orch = maritime_orchestrator(
        &maritime_config().unwrap(),
        Arc::new(KeywordMatcher::maritime().unwrap()),
        Arc::new(ScriptedCompletion::finalizing()),
        None,
    )
    .unwrap();

    let payload = orch
        .execute_plan("voyage_planning", "Full voyage plan from Singapore to Rotterdam")
        .await;

    assert_eq!(payload.completed_agents.len(), 4);
    assert!(payload.answer.contains("not compliant"));
    assert!(payload.answer.contains("Bunkering: refuel at AEFJR"));
}

#[tokio::test]
async fn unplaceable_query_asks_for_clarification() {
    let completion = Arc::new(ScriptedCompletion::finalizing());
    let mut orch = maritime_orchestrator(
        &maritime_config().unwrap(),
        Arc::new(KeywordMatcher::maritime().unwrap()),
        completion.clone(),
        None,
    )
    .unwrap();

    let payload = orch.run("hello there").await;

    assert!(payload.needs_clarification);
    assert_eq!(payload.clarification_question.as_deref(), Some(payload.answer.as_str()));
    assert!(payload.completed_agents.is_empty());
    assert_eq!(completion.calls(), 0);
}
