//! # meridian-core
//!
//! The execution boundary of the meridian orchestration runtime.
//!
//! This crate provides:
//! - The collaborator traits (`Agent`, `PatternMatcher`, `CompletionService`,
//!   `CacheStore`, `RoutingRecorder`)
//! - A rolling-window `CircuitBreaker`
//! - The `AgentRuntime` that invokes agents under timeout and breaker guard
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_core::{AgentRuntime, RuntimeConfig, traits::Agent};
//! ```

pub mod breaker;
pub mod runtime;
pub mod traits;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use runtime::{AgentInvocation, AgentRuntime, RuntimeConfig};
