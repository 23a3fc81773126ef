//! Maritime demo scenarios.
//!
//! Each scenario wires the real orchestrator to the mock agents and prints a
//! step-by-step walk-through. The payloads are returned so tests can assert
//! on them.

pub mod bunker_planning;
pub mod checkpoint;
pub mod recovery;

use meridian_supervisor::FinalPayload;

/// Print the reasoning history and outcome of a finished run.
pub(crate) fn print_run(payload: &FinalPayload) {
    for step in &payload.state.reasoning_history {
        println!("  [{}] {:<11} {}", step.step_number, step.action.as_str(), step.thought);
        if let Some(observation) = &step.observation {
            println!("      observation: {observation}");
        }
    }
    println!();
    println!("  Completed: {}", list(&payload.completed_agents));
    if !payload.failed_agents.is_empty() {
        println!("  Failed:    {}", list(&payload.failed_agents));
    }
    if !payload.skipped_agents.is_empty() {
        println!("  Skipped:   {}", list(&payload.skipped_agents));
    }
    println!("  Answer:");
    for line in payload.answer.lines() {
        println!("    {line}");
    }
}

fn list(agents: &[String]) -> String {
    if agents.is_empty() {
        "-".to_string()
    } else {
        agents.join(", ")
    }
}
