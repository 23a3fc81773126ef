//! meridian maritime reference runtime: demo CLI
//!
//! Runs the maritime demo scenarios, inspects execution plans, or answers an
//! ad-hoc query with the mock agents.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- bunker-planning
//!   cargo run -p demo -- recovery
//!   cargo run -p demo -- checkpoint
//!   cargo run -p demo -- plan --intent voyage_planning --execute
//!   cargo run -p demo -- query "Weather from Singapore to Rotterdam"

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meridian_contracts::error::MeridianResult;
use meridian_ref_maritime::{
    completion::ScriptedCompletion,
    descriptors::maritime_orchestrator,
    maritime_config,
    matcher::KeywordMatcher,
    scenarios::{bunker_planning, checkpoint, recovery},
};
use meridian_registry::FINALIZE_NODE;
use meridian_supervisor::{FinalPayload, Orchestrator, OrchestratorConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// meridian: supervised multi-agent orchestration, maritime demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "meridian maritime reference runtime demo",
    long_about = "Runs meridian maritime scenarios showing tiered routing decisions,\n\
                  reasoning-tier recovery, and checkpoint persistence."
)]
struct Cli {
    /// Orchestrator configuration file. Defaults to the bundled maritime.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three maritime scenarios in sequence.
    RunAll,
    /// Scenario 1: Bunker planning on the pattern-match fast path.
    BunkerPlanning,
    /// Scenario 2: Retry with corrected ports, then an exhausted recovery budget.
    Recovery,
    /// Scenario 3: Checkpoint deltas, compression, and legacy migration.
    Checkpoint,
    /// Show the execution plan for an intent.
    Plan {
        #[arg(long, default_value = "voyage_planning")]
        intent: String,
        /// Also run the plan stage by stage.
        #[arg(long)]
        execute: bool,
        #[arg(long, default_value = "Full voyage plan from Singapore to Rotterdam")]
        query: String,
    },
    /// Answer a free-text query through the adaptive decision loop.
    Query {
        text: String,
        /// Print the final payload as JSON.
        #[arg(long)]
        json: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::BunkerPlanning => bunker_planning::run_scenario().await,
        Command::Recovery => recovery::run_scenario().await,
        Command::Checkpoint => checkpoint::run_scenario().await,
        Command::Plan {
            intent,
            execute,
            query,
        } => run_plan(cli.config, &intent, execute, &query).await,
        Command::Query { text, json } => run_query(cli.config, &text, json).await,
    };

    match result {
        Ok(()) => {
            println!("Done.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

async fn run_all() -> MeridianResult<()> {
    bunker_planning::run_scenario().await?;
    recovery::run_scenario().await?;
    checkpoint::run_scenario().await?;
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> MeridianResult<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::from_file(&path),
        None => maritime_config(),
    }
}

fn orchestrator(config: &OrchestratorConfig) -> MeridianResult<Orchestrator> {
    maritime_orchestrator(
        config,
        Arc::new(KeywordMatcher::maritime()?),
        Arc::new(ScriptedCompletion::finalizing()),
        None,
    )
}

async fn run_plan(
    config: Option<PathBuf>,
    intent: &str,
    execute: bool,
    query: &str,
) -> MeridianResult<()> {
    let mut orch = orchestrator(&load_config(config)?)?;
    let planner = orch.supervisor().planner();
    let plan = planner.plan(orch.registry(), intent);

    println!("=== Execution plan: {intent} ===");
    println!();
    println!("  Nodes:   {}", planner.plan_node_names(orch.registry(), intent).join(" → "));
    for (n, stage) in planner.execution_stages(&plan).iter().enumerate() {
        let ids: Vec<&str> = stage.iter().map(|id| id.as_str()).collect();
        println!("  Stage {}: {}", n + 1, ids.join(" + "));
    }
    println!(
        "  Needs:   {}",
        planner.required_outputs(intent).join(", ")
    );
    println!();

    if plan.is_empty() {
        println!("  No agents serve this intent; the plan is just '{FINALIZE_NODE}'.");
        return Ok(());
    }
    if execute {
        println!("  Query: {query}");
        let payload = orch.execute_plan(intent, query).await;
        print_payload(&payload);
    }
    Ok(())
}

async fn run_query(config: Option<PathBuf>, text: &str, json: bool) -> MeridianResult<()> {
    let mut orch = orchestrator(&load_config(config)?)?;
    let payload = orch.run(text).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_payload(&payload);
    }
    Ok(())
}

fn print_payload(payload: &FinalPayload) {
    println!();
    println!("  Completed: {}", payload.completed_agents.join(", "));
    if !payload.failed_agents.is_empty() {
        println!("  Failed:    {}", payload.failed_agents.join(", "));
    }
    if !payload.skipped_agents.is_empty() {
        println!("  Skipped:   {}", payload.skipped_agents.join(", "));
    }
    if payload.needs_clarification {
        println!("  Clarification needed.");
    }
    println!("  Answer:");
    for line in payload.answer.lines() {
        println!("    {line}");
    }
    println!();
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("meridian: Supervised Agent Orchestration");
    println!("Maritime Reference Demo");
    println!("=========================================");
    println!();
    println!("Decision tiers per cycle:");
    println!("  [0] Ceilings: max steps / max recovery attempts → finalize");
    println!("  [1] Pattern match ≥ 80% with a callable agent → call it directly");
    println!("  [2] All required outputs present → finalize");
    println!("  [3] Pattern match < 30% → ask the user");
    println!("  [4] Otherwise → reasoning fallback (one completion call)");
    println!();
}
