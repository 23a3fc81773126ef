//! Scenario 3: Checkpoint lifecycle
//!
//! Three independent walk-throughs over one in-memory store:
//!
//! 1. A bunker-planning run checkpoints after every agent. The latest record
//!    loads back and the deltas replay the run's progress.
//! 2. A state carrying a 10 KB `checksum` is saved; the field is moved into
//!    the store behind a `ref:` token and restored transparently on load.
//! 3. A legacy 1.0 record with `weather_data` is written directly and loaded;
//!    migration fills `weather_forecast` and the current bookkeeping fields.

use std::sync::Arc;

use serde_json::{json, Value};

use meridian_contracts::{
    error::MeridianResult,
    state::{ComputationState, Message},
};
use meridian_core::traits::CacheStore;
use meridian_state::{
    checkpoint::latest_key, CheckpointManager, CheckpointPurpose, CheckpointReceipt,
    InMemoryCacheStore, LoadedCheckpoint,
};
use meridian_supervisor::FinalPayload;

use crate::completion::ScriptedCompletion;
use crate::descriptors::maritime_orchestrator;
use crate::maritime_config;
use crate::matcher::KeywordMatcher;

pub const CONVERSATION: &str = "voyage-042";
pub const QUERY: &str = "Plan bunkering from Singapore to Rotterdam";

pub struct PersistedRun {
    pub payload: FinalPayload,
    pub loaded: Option<LoadedCheckpoint>,
    pub delta_count: usize,
}

fn manager(store: &Arc<InMemoryCacheStore>) -> MeridianResult<CheckpointManager> {
    let config = maritime_config()?;
    Ok(CheckpointManager::new(
        store.clone(),
        meridian_state::SchemaCatalog::maritime(),
        config.lifecycle_limits(),
    ))
}

/// Run the bunker pipeline with checkpointing, then read it back.
pub async fn run_persisted(store: Arc<InMemoryCacheStore>) -> MeridianResult<PersistedRun> {
    let mut orch = maritime_orchestrator(
        &maritime_config()?,
        Arc::new(KeywordMatcher::maritime()?),
        Arc::new(ScriptedCompletion::finalizing()),
        None,
    )?
    .with_checkpoints(manager(&store)?);

    let payload = orch.run_with_id(CONVERSATION, QUERY).await;
    let checkpoints = manager(&store)?;
    let loaded = checkpoints.load(CONVERSATION).await?;
    let delta_count = checkpoints.deltas(CONVERSATION).await?.len();
    Ok(PersistedRun {
        payload,
        loaded,
        delta_count,
    })
}

/// Save a state with an oversized `checksum` and load it back.
pub async fn run_compression(
    store: Arc<InMemoryCacheStore>,
) -> MeridianResult<(CheckpointReceipt, Option<LoadedCheckpoint>)> {
    let checkpoints = manager(&store)?;
    let mut state = ComputationState::new("integrity-check");
    state.messages.push(Message::user("verify voyage data integrity"));
    state.domain.insert("checksum".into(), json!("f".repeat(10 * 1024)));

    let receipt = checkpoints
        .save("integrity-check", &state, CheckpointPurpose::Resume)
        .await?;
    let loaded = checkpoints.load("integrity-check").await?;
    Ok((receipt, loaded))
}

/// A record as written by a 1.0 deployment.
pub fn legacy_record() -> Value {
    json!({
        "correlation_id": "legacy-7",
        "messages": [{ "role": "user", "content": "Weather from Singapore to Fujairah" }],
        "agent_status": { "route_agent": "success", "weather_agent": "success" },
        "agent_errors": {},
        "route_data": { "distance_nm": 3290.0, "origin": "SGSIN", "destination": "AEFJR" },
        "weather_data": {
            "forecast": [{ "port": "AEFJR", "wave_height_m": 3.3 }],
            "summary": "rough seas on 1 segment(s)"
        }
    })
}

/// Write a legacy record under the latest-checkpoint key and load it.
pub async fn run_migration(store: Arc<InMemoryCacheStore>) -> MeridianResult<Option<LoadedCheckpoint>> {
    let checkpoints = manager(&store)?;
    let ttl = maritime_config()?.lifecycle.checkpoint_ttl_secs;
    store
        .set(&latest_key("legacy-7"), legacy_record().to_string(), ttl)
        .await?;
    checkpoints.load("legacy-7").await
}

pub async fn run_scenario() -> MeridianResult<()> {
    println!("=== Scenario 3: Checkpoint Lifecycle ===");
    println!();
    let store = Arc::new(InMemoryCacheStore::new());

    println!("  --- Part A: checkpointed run ---");
    let run = run_persisted(store.clone()).await?;
    println!("  Conversation:     {CONVERSATION}");
    println!("  Decision cycles:  {}", run.payload.steps);
    println!("  Deltas stored:    {}", run.delta_count);
    match &run.loaded {
        Some(loaded) => {
            println!("  Loaded version:   {}", loaded.stored_version);
            println!(
                "  Loaded answer:    {}",
                loaded.state.final_recommendation.as_deref().unwrap_or("-")
            );
        }
        None => println!("  No checkpoint found."),
    }
    println!();

    println!("  --- Part B: reference compression ---");
    let (receipt, loaded) = run_compression(store.clone()).await?;
    println!("  Fields compressed: {:?}", receipt.compression.fields_compressed);
    println!(
        "  Record size:       {} -> {} bytes (ratio {:.2})",
        receipt.compression.bytes_before,
        receipt.compression.bytes_after,
        receipt.compression.ratio()
    );
    if let Some(loaded) = loaded {
        let restored = loaded
            .state
            .field("checksum")
            .and_then(Value::as_str)
            .map_or(0, str::len);
        println!(
            "  Restored checksum: {restored} bytes ({} reference(s) resolved)",
            loaded.decompression.references_resolved
        );
    }
    println!();

    println!("  --- Part C: legacy migration ---");
    match run_migration(store).await? {
        Some(loaded) => {
            println!("  Stored version:   {}", loaded.stored_version);
            println!("  Migrated:         {}", loaded.migrated);
            println!(
                "  weather_forecast: {}",
                loaded
                    .state
                    .field("weather_forecast")
                    .and_then(|w| w.get("summary"))
                    .and_then(Value::as_str)
                    .unwrap_or("-")
            );
            for warning in &loaded.warnings {
                println!("  Warning:          {warning}");
            }
        }
        None => println!("  Legacy record not found."),
    }
    println!();
    println!("  Scenario 3 complete.");
    println!();
    Ok(())
}
