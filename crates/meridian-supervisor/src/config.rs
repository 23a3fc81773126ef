//! TOML configuration for the orchestrator.
//!
//! Every section and key is optional; omitted keys take the defaults below.
//!
//! ```toml
//! [supervisor]
//! max_steps = 15
//! max_recovery_attempts = 3
//! immediate_action_threshold = 80
//! clarification_threshold = 30
//! recent_reasoning_steps = 3
//!
//! [timeouts]
//! agent_secs = 30
//! matcher_secs = 5
//! completion_secs = 20
//! cache_secs = 5
//!
//! [circuit_breaker]
//! window_size = 10
//! minimum_calls = 4
//! failure_rate_threshold = 0.5
//! cooldown_secs = 30
//! half_open_successes = 1
//!
//! [lifecycle]
//! min_reference_bytes = 1024
//! # ...
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_contracts::error::{MeridianError, MeridianResult};
use meridian_core::{BreakerConfig, RuntimeConfig};
use meridian_state::LifecycleLimits;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub supervisor: SupervisorSettings,
    pub timeouts: TimeoutSettings,
    pub circuit_breaker: BreakerSettings,
    pub lifecycle: LifecycleSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Reasoning-history length that forces finalize.
    pub max_steps: usize,
    /// Failed agent invocations that force finalize with clarification.
    pub max_recovery_attempts: u32,
    pub immediate_action_threshold: u8,
    pub clarification_threshold: u8,
    /// Reasoning steps included in the reasoning prompt.
    pub recent_reasoning_steps: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_recovery_attempts: 3,
            immediate_action_threshold: 80,
            clarification_threshold: 30,
            recent_reasoning_steps: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub agent_secs: u64,
    /// Bound on one pattern-matcher classification.
    pub matcher_secs: u64,
    pub completion_secs: u64,
    pub cache_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            agent_secs: 30,
            matcher_secs: 5,
            completion_secs: 20,
            cache_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub minimum_calls: usize,
    pub failure_rate_threshold: f64,
    pub cooldown_secs: u64,
    pub half_open_successes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 4,
            failure_rate_threshold: 0.5,
            cooldown_secs: 30,
            half_open_successes: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub min_reference_bytes: usize,
    pub reference_ttl_secs: u64,
    pub checkpoint_ttl_secs: u64,
    pub field_soft_limit_bytes: usize,
    pub field_hard_limit_bytes: usize,
    pub total_budget_bytes: usize,
    pub max_nesting_depth: usize,
    pub array_head: usize,
    pub array_tail: usize,
    pub max_message_chars: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        let limits = LifecycleLimits::default();
        Self {
            min_reference_bytes: limits.min_reference_bytes,
            reference_ttl_secs: limits.reference_ttl_secs,
            checkpoint_ttl_secs: limits.checkpoint_ttl_secs,
            field_soft_limit_bytes: limits.field_soft_limit_bytes,
            field_hard_limit_bytes: limits.field_hard_limit_bytes,
            total_budget_bytes: limits.total_budget_bytes,
            max_nesting_depth: limits.max_nesting_depth,
            array_head: limits.array_head,
            array_tail: limits.array_tail,
            max_message_chars: limits.max_message_chars,
        }
    }
}

impl OrchestratorConfig {
    /// Parse and check a TOML document.
    ///
    /// Returns `MeridianError::ConfigError` for malformed TOML, unknown value
    /// types, or inconsistent thresholds.
    pub fn from_toml_str(s: &str) -> MeridianResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| MeridianError::ConfigError {
            reason: format!("failed to parse orchestrator TOML: {}", e),
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> MeridianResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| MeridianError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn check(&self) -> MeridianResult<()> {
        let s = &self.supervisor;
        let reject = |reason: String| Err(MeridianError::ConfigError { reason });
        if s.immediate_action_threshold > 100 {
            return reject("supervisor.immediate_action_threshold must be at most 100".into());
        }
        if s.clarification_threshold > s.immediate_action_threshold {
            return reject(format!(
                "supervisor.clarification_threshold ({}) exceeds immediate_action_threshold ({})",
                s.clarification_threshold, s.immediate_action_threshold
            ));
        }
        if s.max_steps == 0 {
            return reject("supervisor.max_steps must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.circuit_breaker.failure_rate_threshold) {
            return reject("circuit_breaker.failure_rate_threshold must be within 0.0..=1.0".into());
        }
        if self.lifecycle.field_soft_limit_bytes > self.lifecycle.field_hard_limit_bytes {
            return reject("lifecycle.field_soft_limit_bytes exceeds field_hard_limit_bytes".into());
        }
        Ok(())
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        let b = &self.circuit_breaker;
        RuntimeConfig {
            agent_timeout: Duration::from_secs(self.timeouts.agent_secs),
            breaker: BreakerConfig {
                window_size: b.window_size,
                minimum_calls: b.minimum_calls,
                failure_rate_threshold: b.failure_rate_threshold,
                cooldown: Duration::from_secs(b.cooldown_secs),
                half_open_successes: b.half_open_successes,
            },
        }
    }

    pub fn lifecycle_limits(&self) -> LifecycleLimits {
        let l = &self.lifecycle;
        LifecycleLimits {
            min_reference_bytes: l.min_reference_bytes,
            reference_ttl_secs: l.reference_ttl_secs,
            checkpoint_ttl_secs: l.checkpoint_ttl_secs,
            field_soft_limit_bytes: l.field_soft_limit_bytes,
            field_hard_limit_bytes: l.field_hard_limit_bytes,
            total_budget_bytes: l.total_budget_bytes,
            max_nesting_depth: l.max_nesting_depth,
            array_head: l.array_head,
            array_tail: l.array_tail,
            max_message_chars: l.max_message_chars,
            cache_timeout: Duration::from_secs(self.timeouts.cache_secs),
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.completion_secs)
    }

    pub fn matcher_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.matcher_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = OrchestratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.supervisor.max_steps, 15);
        assert_eq!(config.runtime_config(), RuntimeConfig::default());
        assert_eq!(config.lifecycle_limits(), LifecycleLimits::default());
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            [supervisor]
            max_recovery_attempts = 2

            [timeouts]
            agent_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.supervisor.max_recovery_attempts, 2);
        assert_eq!(config.supervisor.immediate_action_threshold, 80);
        assert_eq!(config.runtime_config().agent_timeout, Duration::from_secs(5));
        assert_eq!(config.completion_timeout(), Duration::from_secs(20));
        assert_eq!(config.matcher_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn matcher_timeout_is_its_own_key() {
        let config =
            OrchestratorConfig::from_toml_str("[timeouts]\nmatcher_secs = 2\ncompletion_secs = 40\n").unwrap();
        assert_eq!(config.matcher_timeout(), Duration::from_secs(2));
        assert_eq!(config.completion_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = OrchestratorConfig::from_toml_str("[supervisor\nmax_steps = 1").unwrap_err();
        assert!(matches!(err, MeridianError::ConfigError { .. }));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let err = OrchestratorConfig::from_toml_str(
            "[supervisor]\nimmediate_action_threshold = 20\nclarification_threshold = 40\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("clarification_threshold"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = OrchestratorConfig::from_file(Path::new("/nonexistent/meridian.toml")).unwrap_err();
        assert!(matches!(err, MeridianError::ConfigError { .. }));
    }
}
