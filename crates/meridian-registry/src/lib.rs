//! # meridian-registry
//!
//! Agent catalog and dependency-aware planning.
//!
//! - `AgentRegistry`: descriptors, lookup, runtime metadata, registration rules
//! - `graph`: the explicit + field-inferred dependency graph (pure functions)
//! - `ExecutionPlanner`: intent → ordered plan, parallel groups, stages
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = AgentRegistry::new();
//! registry.register(route_descriptor)?;
//! let plan = ExecutionPlanner::default().plan(&registry, "bunker_planning");
//! ```

pub mod graph;
pub mod planner;
pub mod registry;

pub use graph::DependencyGraph;
pub use planner::{ExecutionPlan, ExecutionPlanner, IntentSpec, FINALIZE_NODE};
pub use registry::{AgentRegistry, RegistrationWarning};
